mod account;
mod events;
pub mod func;
mod user;

use axum::{routing::get, Router};
use chrono::Utc;
use serde_json::json;

use crate::{AppState, Response, ResponseResult};

pub fn pages_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .merge(account::account_router())
        .merge(user::user_router())
        .merge(func::func_router())
        .merge(events::events_router())
}

async fn health() -> ResponseResult {
    Ok(Response::ok(json!({
        "status": "ok",
        "timestamp": Utc::now(),
    })))
}
