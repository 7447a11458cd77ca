//! HTTP routes for Favorr
//!
//! `dispatch` takes an already collected request, so the whole API can be
//! driven without a socket.

pub mod common;
pub mod favors;
pub mod health;
pub mod leaderboard;
pub mod requests;
pub mod uploads;
pub mod users;

pub use common::{
    cors_preflight, error_response, json_response, ApiRequest, BoxBody, ListQuery,
};
pub use health::health_check;

use hyper::{Method, Response};

use crate::server::AppState;
use crate::types::{FavorrError, Result};

use favors::Side;

/// Route a request to its handler and render any error
pub async fn dispatch(state: &AppState, req: ApiRequest) -> Response<BoxBody> {
    if req.method == Method::OPTIONS {
        return cors_preflight();
    }

    match route(state, &req).await {
        Ok(response) => response,
        Err(err) => error_response(err),
    }
}

async fn route(state: &AppState, req: &ApiRequest) -> Result<Response<BoxBody>> {
    // Split before decoding, so an escaped '/' stays inside its segment
    let decoded = req
        .path
        .trim_matches('/')
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|s| {
            urlencoding::decode(s)
                .map_err(|_| FavorrError::Validation(format!("Malformed path segment '{}'", s)))
        })
        .collect::<Result<Vec<_>>>()?;
    let segments: Vec<&str> = decoded.iter().map(|s| s.as_ref()).collect();

    match (&req.method, segments.as_slice()) {
        (&Method::GET, ["health"]) => Ok(health_check(state)),

        // Users
        (&Method::POST, ["api", "users", "register"]) => users::handle_register(state, req).await,
        (&Method::POST, ["api", "users", "login"]) => users::handle_login(state, req).await,
        (&Method::POST | &Method::GET, ["api", "users", "logout"]) => {
            users::handle_logout(state, req).await
        }
        (&Method::GET, ["api", "users", "me"]) => users::handle_me(state, req).await,
        (&Method::GET, ["api", "users"]) => users::handle_lookup(state, req).await,

        // Favors
        (&Method::GET, ["api", "favors", "kinds"]) => favors::handle_kinds(state).await,
        (&Method::POST, ["api", "favors"]) => favors::handle_create(state, req).await,
        (&Method::GET, ["api", "favors", "owed-by-me"]) => {
            favors::handle_list(state, req, Side::OwedByMe).await
        }
        (&Method::GET, ["api", "favors", "owed-to-me"]) => {
            favors::handle_list(state, req, Side::OwedToMe).await
        }
        (&Method::GET, ["api", "favors", id]) => favors::handle_get(state, req, id).await,
        (&Method::POST, ["api", "favors", id, "settlement"]) => {
            favors::handle_settlement(state, req, id).await
        }
        (&Method::POST, ["api", "favors", id, "confirm"]) => {
            favors::handle_confirm(state, req, id).await
        }

        // Public requests
        (&Method::GET, ["api", "public-requests"]) => requests::handle_list_open(state, req).await,
        (&Method::POST, ["api", "public-requests"]) => requests::handle_create(state, req).await,
        (&Method::GET, ["api", "public-requests", "mine"]) => {
            requests::handle_list_mine(state, req).await
        }
        (&Method::GET, ["api", "public-requests", id]) => requests::handle_get(state, id).await,
        (&Method::DELETE, ["api", "public-requests", id]) => {
            requests::handle_withdraw(state, req, id).await
        }
        (&Method::POST, ["api", "public-requests", id, "rewards"]) => {
            requests::handle_add_reward(state, req, id).await
        }
        (&Method::POST, ["api", "public-requests", id, "claim"]) => {
            requests::handle_claim(state, req, id).await
        }
        (&Method::POST, ["api", "public-requests", id, "complete"]) => {
            requests::handle_complete(state, req, id).await
        }

        (&Method::GET, ["api", "leaderboard"]) => {
            leaderboard::handle_leaderboard(state, req).await
        }

        (&Method::POST, ["api", "upload"]) => uploads::handle_upload(state, req).await,
        (&Method::GET, ["uploads", name]) => uploads::handle_serve(state, name).await,

        _ => Err(FavorrError::UnknownEntity(format!(
            "route {} {}",
            req.method, req.path
        ))),
    }
}
