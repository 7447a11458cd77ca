//! HTTP routes for the obligation ledger

use hyper::{Response, StatusCode};
use serde::Deserialize;

use crate::db::schemas::FavorStatus;
use crate::ledger::Direction;
use crate::routes::common::{json_response, ApiRequest, BoxBody, ListQuery};
use crate::server::AppState;
use crate::types::{FavorrError, Result};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFavorRequest {
    pub description: String,
    /// Username of the other participant
    pub counterparty: String,
    pub direction: Direction,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementRequest {
    #[serde(default)]
    pub proof_image_ref: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub enum Side {
    OwedByMe,
    OwedToMe,
}

/// GET /api/favors/kinds
pub async fn handle_kinds(state: &AppState) -> Result<Response<BoxBody>> {
    Ok(json_response(StatusCode::OK, state.ledger.catalog()))
}

/// POST /api/favors
pub async fn handle_create(state: &AppState, req: &ApiRequest) -> Result<Response<BoxBody>> {
    let identity = req.identity(state)?;
    let body: CreateFavorRequest = req.json()?;

    let favor = state
        .ledger
        .create_for(&body.description, &body.counterparty, body.direction, &identity)
        .await?;
    let view = state.ledger.view(favor).await?;
    Ok(json_response(StatusCode::CREATED, &view))
}

/// GET /api/favors/owed-by-me and /api/favors/owed-to-me
pub async fn handle_list(state: &AppState, req: &ApiRequest, side: Side) -> Result<Response<BoxBody>> {
    let identity = req.identity(state)?;
    let query: ListQuery = req.query()?;
    let cursor = query.cursor()?;
    let status = query
        .status
        .as_deref()
        .map(str::parse::<FavorStatus>)
        .transpose()
        .map_err(FavorrError::Validation)?;

    let mut page = match side {
        Side::OwedByMe => {
            state
                .ledger
                .list_owed_by_me(&identity.user_id, cursor, status)
                .await?
        }
        Side::OwedToMe => {
            state
                .ledger
                .list_owed_to_me(&identity.user_id, cursor, status)
                .await?
        }
    };

    let views = state.ledger.views(std::mem::take(&mut page.items)).await?;
    Ok(json_response(StatusCode::OK, &page.with_items(views)))
}

/// GET /api/favors/{id}
pub async fn handle_get(state: &AppState, req: &ApiRequest, favor_id: &str) -> Result<Response<BoxBody>> {
    let identity = req.identity(state)?;
    let favor = state.ledger.get(favor_id, &identity).await?;
    Ok(json_response(StatusCode::OK, &state.ledger.view(favor).await?))
}

/// POST /api/favors/{id}/settlement
pub async fn handle_settlement(
    state: &AppState,
    req: &ApiRequest,
    favor_id: &str,
) -> Result<Response<BoxBody>> {
    let identity = req.identity(state)?;
    let body: SettlementRequest = if req.body.is_empty() {
        SettlementRequest::default()
    } else {
        req.json()?
    };

    let favor = state
        .ledger
        .request_settlement(favor_id, &identity, body.proof_image_ref)
        .await?;
    Ok(json_response(StatusCode::OK, &state.ledger.view(favor).await?))
}

/// POST /api/favors/{id}/confirm
pub async fn handle_confirm(
    state: &AppState,
    req: &ApiRequest,
    favor_id: &str,
) -> Result<Response<BoxBody>> {
    let identity = req.identity(state)?;
    let favor = state.ledger.confirm_settlement(favor_id, &identity).await?;
    Ok(json_response(StatusCode::OK, &state.ledger.view(favor).await?))
}
