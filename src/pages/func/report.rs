use axum::{extract::State, http::HeaderMap, routing::get, Router};
use chrono::Utc;
use serde_json::json;

use crate::{report::dashboard_stats, token::current_actor, AppState, Response, ResponseResult};

pub fn report_router() -> Router<AppState> {
    Router::new().route("/reports/dashboard", get(dashboard))
}

async fn dashboard(State(state): State<AppState>, headers: HeaderMap) -> ResponseResult {
    let actor = current_actor(&state, &headers).await?;
    let stats = dashboard_stats(
        state.store.as_ref(),
        &actor,
        Utc::now(),
        state.config.follow_up_days(),
    )
    .await?;
    Ok(Response::ok(json!(stats)))
}
