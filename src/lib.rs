pub mod config;
pub mod error;
pub mod response;
pub mod token;

pub mod database;
pub mod libs;
pub mod model;
pub mod notify;
pub mod pages;
pub mod perm;
pub mod report;
pub mod seed;
pub mod store;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    Router,
};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

pub use config::Config;
pub use error::{CrmError, CrmResult};
pub use libs::{base64_decode, base64_encode};
pub use response::Response;

use notify::{DomainEvent, NoopNotifier, Notifier};
use store::{EntityStore, MemoryStore};

pub type ResponseResult = Result<Response, Response>;

/// Shared by every handler. Owned by `main`, nothing here is global.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn EntityStore>,
    pub notifier: Arc<dyn Notifier>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(store: Arc<dyn EntityStore>, notifier: Arc<dyn Notifier>, config: Config) -> Self {
        Self {
            store,
            notifier,
            config: Arc::new(config),
        }
    }

    /// Empty in-memory store, events discarded.
    pub fn in_memory(config: Config) -> Self {
        Self::new(
            Arc::new(MemoryStore::new()),
            Arc::new(NoopNotifier),
            config,
        )
    }

    pub fn publish(&self, event: DomainEvent) {
        self.notifier.publish(event);
    }
}

fn cors_layer(origin: &str) -> CorsLayer {
    let methods = [Method::GET, Method::POST, Method::PUT, Method::DELETE];
    let layer = CorsLayer::new()
        .allow_methods(methods)
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);
    if origin == "*" {
        return layer.allow_origin(Any);
    }
    match HeaderValue::from_str(origin) {
        // cookies need an explicit origin
        Ok(origin) => layer
            .allow_origin(AllowOrigin::exact(origin))
            .allow_credentials(true),
        Err(e) => {
            tracing::warn!(origin, error = %e, "unusable cors origin, allowing any");
            layer.allow_origin(Any)
        }
    }
}

/// The full HTTP surface, ready to serve.
pub fn app(state: AppState) -> Router {
    let cors = cors_layer(state.config.cors_origin());
    let body_limit = state.config.body_limit_bytes();
    pages::pages_router()
        .layer(cors)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
