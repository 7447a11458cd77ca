//! GET /api/leaderboard - public ranking by completed favors

use hyper::{Response, StatusCode};

use crate::routes::common::{json_response, ApiRequest, BoxBody, ListQuery};
use crate::server::AppState;
use crate::types::Result;

pub async fn handle_leaderboard(state: &AppState, req: &ApiRequest) -> Result<Response<BoxBody>> {
    let query: ListQuery = req.query()?;
    let page = state.leaderboard.rank(query.cursor()?).await?;
    Ok(json_response(StatusCode::OK, &page))
}
