use axum::{
    extract::{Path, State},
    http::HeaderMap,
};
use chrono::Utc;

use super::customer_event;
use crate::{
    error::{CrmError, CrmResult},
    perm::{require_customer_write, Actor},
    token::current_actor,
    AppState, Response, ResponseResult,
};

/// Soft delete. The row and its progress stay in storage but drop out of
/// every read.
pub async fn delete_customer(state: &AppState, actor: &Actor, id: &str) -> CrmResult<()> {
    let customer = require_customer_write(actor, state.store.get_customer(id).await?)?;
    if !state.store.soft_delete_customer(id, Utc::now()).await? {
        return Err(CrmError::not_found("Customer not found"));
    }
    tracing::info!(actor = %actor.id, customer = %customer.id, "customer deleted");
    state.publish(customer_event("customer.deleted", &customer));
    Ok(())
}

pub async fn delete_customer_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ResponseResult {
    let actor = current_actor(&state, &headers).await?;
    delete_customer(&state, &actor, &id).await?;
    Ok(Response::empty())
}
