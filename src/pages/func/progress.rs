//! 跟进记录
//!
//! Append-only. Writing a note needs the customer to be visible, not
//! writable, so a GM can log a call on a customer of one of its AMs.

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::HeaderMap,
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use validator::Validate;

use crate::{
    error::{CrmError, CrmResult},
    libs::dser::parse_body,
    model::{CreateProgress, NewProgress, Progress},
    notify::{Audience, DomainEvent},
    perm::{require_customer_read, Actor},
    token::current_actor,
    AppState, Response, ResponseResult,
};

pub const DEFAULT_PROGRESS_LIMIT: usize = 10;
pub const MAX_PROGRESS_LIMIT: usize = 100;

pub fn progress_router() -> Router<AppState> {
    Router::new().route("/progress", get(list_progress_handler).post(add_progress))
}

pub async fn create_progress(
    state: &AppState,
    actor: &Actor,
    input: NewProgress,
) -> CrmResult<Progress> {
    input.validate()?;
    let customer = require_customer_read(actor, state.store.get_customer(&input.customer_id).await?)?;
    let progress = state
        .store
        .create_progress(&CreateProgress {
            customer_id: customer.id.clone(),
            am_id: actor.id.clone(),
            date: input.date.unwrap_or_else(Utc::now),
            description: input.description,
            status: input.status,
        })
        .await?;
    tracing::info!(actor = %actor.id, customer = %customer.id, progress = %progress.id, "progress logged");
    state.publish(
        DomainEvent::new(
            "progress.created",
            json!({
                "id": progress.id,
                "customerId": customer.id,
                "companyName": customer.company_name,
                "amId": progress.am_id,
            }),
        )
        .to(Audience::User(customer.am_id.clone())),
    );
    Ok(progress)
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressParams {
    #[serde(default)]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

/// By customer when one is named, otherwise the actor's own notes.
pub async fn list_progress(
    state: &AppState,
    actor: &Actor,
    params: &ProgressParams,
) -> CrmResult<Vec<Progress>> {
    match &params.customer_id {
        Some(customer_id) => {
            let customer = require_customer_read(actor, state.store.get_customer(customer_id).await?)?;
            let limit = params.limit.map(|l| l.clamp(1, MAX_PROGRESS_LIMIT));
            state.store.list_progress_by_customer(&customer.id, limit).await
        }
        None => {
            let limit = params
                .limit
                .unwrap_or(DEFAULT_PROGRESS_LIMIT)
                .clamp(1, MAX_PROGRESS_LIMIT);
            state.store.list_progress_by_am(&actor.id, limit).await
        }
    }
}

async fn add_progress(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(value): Json<Value>,
) -> ResponseResult {
    let actor = current_actor(&state, &headers).await?;
    let input: NewProgress = parse_body(value)?;
    let progress = create_progress(&state, &actor, input).await?;
    Ok(Response::created(json!(progress)))
}

async fn list_progress_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    params: Result<Query<ProgressParams>, QueryRejection>,
) -> ResponseResult {
    let actor = current_actor(&state, &headers).await?;
    let Query(params) = params.map_err(Response::invalid_format)?;
    let progress = list_progress(&state, &actor, &params).await?;
    Ok(Response::ok(json!(progress)))
}
