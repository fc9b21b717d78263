use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    http::HeaderMap,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{CustomerDetail, DETAIL_PROGRESS_LIMIT};
use crate::{
    error::{CrmError, CrmResult},
    model::{Customer, CustomerStatus},
    perm::{require_customer_read, scope_for, Actor},
    store::{CustomerQuery, Page},
    token::current_actor,
    AppState, Response, ResponseResult,
};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    #[serde(default)]
    pub status: Option<CustomerStatus>,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub limit: Option<u32>,
    /// Narrows the actor's own scope to one AM, never widens it.
    #[serde(default)]
    pub am_id: Option<String>,
}

impl ListParams {
    fn page(&self) -> CrmResult<Page> {
        let page = self.page.unwrap_or(1);
        let limit = self.limit.unwrap_or(Page::DEFAULT_LIMIT);
        if page < 1 {
            return Err(CrmError::invalid("page", "Page starts at 1"));
        }
        if !(1..=Page::MAX_LIMIT).contains(&limit) {
            return Err(CrmError::invalid(
                "limit",
                format!("Limit must be between 1 and {}", Page::MAX_LIMIT),
            ));
        }
        Ok(Page { page, limit })
    }
}

#[derive(Debug, Serialize)]
pub struct CustomerList {
    pub customers: Vec<Customer>,
    /// Rows matching the filter, across all pages.
    pub total: u64,
    pub page: u32,
    pub limit: u32,
}

pub async fn list_customers(
    state: &AppState,
    actor: &Actor,
    params: &ListParams,
) -> CrmResult<CustomerList> {
    let page = params.page()?;
    let mut scope = scope_for(actor);
    if let Some(am_id) = &params.am_id {
        let department = state
            .store
            .get_user(am_id)
            .await?
            .and_then(|am| am.department_id);
        scope = scope.restrict_to_owner(am_id, department.as_deref());
    }
    let query = CustomerQuery::scoped(scope).with_status(params.status);
    let (customers, total) = tokio::try_join!(
        state.store.list_customers(&query, Some(page)),
        state.store.count_customers(&query),
    )?;
    Ok(CustomerList {
        customers,
        total,
        page: page.page,
        limit: page.limit,
    })
}

pub async fn get_customer(state: &AppState, actor: &Actor, id: &str) -> CrmResult<CustomerDetail> {
    let customer = require_customer_read(actor, state.store.get_customer(id).await?)?;
    let progress = state
        .store
        .list_progress_by_customer(&customer.id, Some(DETAIL_PROGRESS_LIMIT))
        .await?;
    Ok(CustomerDetail { customer, progress })
}

pub async fn list_customers_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    params: Result<Query<ListParams>, QueryRejection>,
) -> ResponseResult {
    let actor = current_actor(&state, &headers).await?;
    let Query(params) = params.map_err(Response::invalid_format)?;
    let list = list_customers(&state, &actor, &params).await?;
    Ok(Response::ok(json!(list)))
}

pub async fn get_customer_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ResponseResult {
    let actor = current_actor(&state, &headers).await?;
    let detail = get_customer(&state, &actor, &id).await?;
    Ok(Response::ok(json!(detail)))
}
