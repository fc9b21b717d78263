mod login;

use axum::{
    routing::{get, post},
    Router,
};

use crate::AppState;

pub fn account_router() -> Router<AppState> {
    Router::new()
        .route("/auth/login", post(login::user_login))
        .route("/auth/refresh", post(login::refresh))
        .route("/auth/logout", post(login::logout))
        .route("/auth/me", get(login::me))
}
