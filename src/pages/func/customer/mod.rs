//! 客户
//!
//! Reads outside the actor's scope answer 404, writes answer 403 when the
//! customer exists. Events go to the owning AM only.

mod delete;
mod insert;
mod query;
mod update;

use axum::{routing::get, Router};
use serde::Serialize;
use serde_json::json;

use crate::{
    model::{Customer, Progress},
    notify::{Audience, DomainEvent},
    AppState,
};

/// How many progress entries the detail view carries.
pub const DETAIL_PROGRESS_LIMIT: usize = 10;

pub fn customer_router() -> Router<AppState> {
    Router::new()
        .route(
            "/customers",
            get(query::list_customers_handler).post(insert::insert_customer),
        )
        .route(
            "/customers/:id",
            get(query::get_customer_handler)
                .put(update::update_customer_handler)
                .delete(delete::delete_customer_handler),
        )
}

#[derive(Debug, Serialize)]
pub struct CustomerDetail {
    #[serde(flatten)]
    pub customer: Customer,
    /// Newest first.
    pub progress: Vec<Progress>,
}

fn customer_event(kind: &'static str, customer: &Customer) -> DomainEvent {
    DomainEvent::new(
        kind,
        json!({
            "id": customer.id,
            "companyName": customer.company_name,
            "status": customer.status,
            "amId": customer.am_id,
        }),
    )
    .to(Audience::User(customer.am_id.clone()))
}
