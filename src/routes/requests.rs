//! HTTP routes for the public request board
//!
//! Listing and reading open requests needs no token; everything that changes
//! a request does.

use hyper::{Response, StatusCode};
use serde::Deserialize;

use crate::board::MineRole;
use crate::routes::common::{json_response, ApiRequest, BoxBody, ListQuery, SuccessResponse};
use crate::server::AppState;
use crate::types::{FavorrError, Result};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRequestBody {
    pub request_detail: String,
    /// Favor kind id of the creator's reward
    pub reward: String,
}

#[derive(Debug, Deserialize)]
pub struct AddRewardBody {
    pub kind: String,
}

/// GET /api/public-requests
pub async fn handle_list_open(state: &AppState, req: &ApiRequest) -> Result<Response<BoxBody>> {
    let query: ListQuery = req.query()?;
    let mut page = state.board.list_open(query.cursor()?).await?;
    let views = state.board.views(std::mem::take(&mut page.items)).await?;
    Ok(json_response(StatusCode::OK, &page.with_items(views)))
}

/// GET /api/public-requests/mine?role=creator|taker
pub async fn handle_list_mine(state: &AppState, req: &ApiRequest) -> Result<Response<BoxBody>> {
    let identity = req.identity(state)?;
    let query: ListQuery = req.query()?;
    let role = query
        .role
        .as_deref()
        .unwrap_or("creator")
        .parse::<MineRole>()?;

    let mut page = state
        .board
        .list_mine(&identity.user_id, role, query.cursor()?)
        .await?;
    let views = state.board.views(std::mem::take(&mut page.items)).await?;
    Ok(json_response(StatusCode::OK, &page.with_items(views)))
}

/// POST /api/public-requests
pub async fn handle_create(state: &AppState, req: &ApiRequest) -> Result<Response<BoxBody>> {
    let identity = req.identity(state)?;
    let body: CreateRequestBody = req.json()?;

    let request = state
        .board
        .create(&identity, &body.request_detail, &body.reward)
        .await?;
    Ok(json_response(
        StatusCode::CREATED,
        &state.board.view(request).await?,
    ))
}

/// GET /api/public-requests/{id}
pub async fn handle_get(state: &AppState, request_id: &str) -> Result<Response<BoxBody>> {
    let request = state.board.get(request_id).await?;
    Ok(json_response(StatusCode::OK, &state.board.view(request).await?))
}

/// POST /api/public-requests/{id}/rewards
pub async fn handle_add_reward(
    state: &AppState,
    req: &ApiRequest,
    request_id: &str,
) -> Result<Response<BoxBody>> {
    let identity = req.identity(state)?;
    let body: AddRewardBody = req.json()?;
    if body.kind.trim().is_empty() {
        return Err(FavorrError::Validation("Reward kind is required".into()));
    }

    let request = state
        .board
        .add_reward(request_id, &identity, body.kind.trim())
        .await?;
    Ok(json_response(StatusCode::OK, &state.board.view(request).await?))
}

/// POST /api/public-requests/{id}/claim
pub async fn handle_claim(
    state: &AppState,
    req: &ApiRequest,
    request_id: &str,
) -> Result<Response<BoxBody>> {
    let identity = req.identity(state)?;
    let request = state.board.claim(request_id, &identity).await?;
    Ok(json_response(StatusCode::OK, &state.board.view(request).await?))
}

/// POST /api/public-requests/{id}/complete
pub async fn handle_complete(
    state: &AppState,
    req: &ApiRequest,
    request_id: &str,
) -> Result<Response<BoxBody>> {
    let identity = req.identity(state)?;
    let request = state.board.complete(request_id, &identity).await?;
    Ok(json_response(StatusCode::OK, &state.board.view(request).await?))
}

/// DELETE /api/public-requests/{id}
pub async fn handle_withdraw(
    state: &AppState,
    req: &ApiRequest,
    request_id: &str,
) -> Result<Response<BoxBody>> {
    let identity = req.identity(state)?;
    state.board.withdraw(request_id, &identity).await?;
    Ok(json_response(
        StatusCode::OK,
        &SuccessResponse {
            success: true,
            message: format!("Public request {} withdrawn", request_id),
        },
    ))
}
