use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use chrono::Utc;
use serde_json::{json, Value};
use validator::Validate;

use super::customer_event;
use crate::{
    error::{CrmError, CrmResult},
    libs::dser::parse_body,
    model::{Customer, CustomerPatch},
    perm::{require_customer_write, Actor},
    token::current_actor,
    AppState, Response, ResponseResult,
};

/// Partial update. The owning AM does not change.
pub async fn update_customer(
    state: &AppState,
    actor: &Actor,
    id: &str,
    patch: CustomerPatch,
) -> CrmResult<Customer> {
    let patch = patch.normalize();
    patch.validate()?;
    if !patch.email_is_valid() {
        return Err(CrmError::invalid("email", "Invalid email"));
    }
    let before = require_customer_write(actor, state.store.get_customer(id).await?)?;
    let customer = state
        .store
        .update_customer(id, &patch, Utc::now())
        .await?
        .ok_or_else(|| CrmError::not_found("Customer not found"))?;
    if before.status != customer.status {
        tracing::info!(
            actor = %actor.id,
            customer = %customer.id,
            from = %before.status,
            to = %customer.status,
            "customer status changed"
        );
    } else {
        tracing::info!(actor = %actor.id, customer = %customer.id, "customer updated");
    }
    state.publish(customer_event("customer.updated", &customer));
    Ok(customer)
}

pub async fn update_customer_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(value): Json<Value>,
) -> ResponseResult {
    let actor = current_actor(&state, &headers).await?;
    let patch: CustomerPatch = parse_body(value)?;
    let customer = update_customer(&state, &actor, &id, patch).await?;
    Ok(Response::ok(json!(customer)))
}
