//! HTTP routes for user accounts
//!
//! - POST /api/users/register  - Create an account (201, sets cookie)
//! - POST /api/users/login     - Authenticate (sets cookie)
//! - POST /api/users/logout    - Clear the session cookie
//! - GET  /api/users/me        - Current user from token
//! - GET  /api/users?username= - Find another user

use hyper::{Response, StatusCode};
use serde::{Deserialize, Serialize};

use crate::auth::{PublicUser, RegisterInput, SanitizedUser, Session};
use crate::routes::common::{
    json_response, with_session_cookie, ApiRequest, BoxBody, SuccessResponse,
};
use crate::server::AppState;
use crate::types::{FavorrError, Result};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LookupQuery {
    pub username: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeResponse {
    pub user: SanitizedUser,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupResponse {
    pub user: PublicUser,
}

fn session_response(state: &AppState, status: StatusCode, session: &Session) -> Result<Response<BoxBody>> {
    with_session_cookie(
        json_response(status, session),
        Some(&session.token),
        state.identity.token_window(),
    )
}

/// POST /api/users/register
pub async fn handle_register(state: &AppState, req: &ApiRequest) -> Result<Response<BoxBody>> {
    let input: RegisterInput = req.json()?;
    let session = state.identity.register(input).await?;
    session_response(state, StatusCode::CREATED, &session)
}

/// POST /api/users/login
pub async fn handle_login(state: &AppState, req: &ApiRequest) -> Result<Response<BoxBody>> {
    let body: LoginRequest = req.json()?;
    if body.username.trim().is_empty() || body.password.is_empty() {
        return Err(FavorrError::Validation(
            "Missing required fields: username, password".into(),
        ));
    }

    let session = state
        .identity
        .authenticate(&body.username, &body.password)
        .await?;
    session_response(state, StatusCode::OK, &session)
}

/// POST|GET /api/users/logout
///
/// Tokens are stateless, so this only clears the cookie.
pub async fn handle_logout(state: &AppState, req: &ApiRequest) -> Result<Response<BoxBody>> {
    state.identity.revoke(req.token());
    with_session_cookie(
        json_response(
            StatusCode::OK,
            &SuccessResponse {
                success: true,
                message: "Logged out".into(),
            },
        ),
        None,
        0,
    )
}

/// GET /api/users/me
pub async fn handle_me(state: &AppState, req: &ApiRequest) -> Result<Response<BoxBody>> {
    let identity = req.identity(state)?;
    let user = state.identity.current(&identity).await?;
    Ok(json_response(StatusCode::OK, &MeResponse { user }))
}

/// GET /api/users?username=
pub async fn handle_lookup(state: &AppState, req: &ApiRequest) -> Result<Response<BoxBody>> {
    let query: LookupQuery = req.query()?;
    let username = query
        .username
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| FavorrError::Validation("username query parameter is required".into()))?;

    let user = state.identity.lookup(&username).await?;
    Ok(json_response(StatusCode::OK, &LookupResponse { user }))
}
