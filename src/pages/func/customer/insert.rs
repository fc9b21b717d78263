use axum::{extract::State, http::HeaderMap, Json};
use chrono::Utc;
use serde_json::{json, Value};
use validator::Validate;

use super::customer_event;
use crate::{
    error::{CrmError, CrmResult},
    libs::dser::parse_body,
    model::{Customer, NewCustomer},
    perm::{Actor, Role},
    token::current_actor,
    AppState, Response, ResponseResult,
};

/// An AM always owns what it creates. GM and ADMIN name the owning AM, a GM
/// only from its own department.
async fn resolve_owner(state: &AppState, actor: &Actor, input: &NewCustomer) -> CrmResult<String> {
    match actor.role {
        Role::Am => Ok(actor.id.clone()),
        Role::Gm | Role::Admin => {
            let am_id = input
                .am_id
                .as_deref()
                .ok_or_else(|| CrmError::invalid("amId", "Choose the account manager"))?;
            let am = state
                .store
                .get_user(am_id)
                .await?
                .filter(|user| user.role == Role::Am)
                .ok_or_else(|| CrmError::invalid("amId", "Account manager not found"))?;
            if actor.role == Role::Gm && !actor.in_department(am.department_id.as_deref()) {
                tracing::warn!(actor = %actor.id, am = %am.id, "customer for an AM outside the department");
                return Err(CrmError::forbidden(
                    "You can only create customers for your department",
                ));
            }
            Ok(am.id)
        }
    }
}

pub async fn create_customer(
    state: &AppState,
    actor: &Actor,
    input: NewCustomer,
) -> CrmResult<Customer> {
    input.validate()?;
    let am_id = resolve_owner(state, actor, &input).await?;
    let customer = state
        .store
        .create_customer(&am_id, &input, Utc::now())
        .await?;
    tracing::info!(actor = %actor.id, customer = %customer.id, am = %am_id, "customer created");
    state.publish(customer_event("customer.created", &customer));
    Ok(customer)
}

pub async fn insert_customer(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(value): Json<Value>,
) -> ResponseResult {
    let actor = current_actor(&state, &headers).await?;
    let input: NewCustomer = parse_body(value)?;
    let customer = create_customer(&state, &actor, input).await?;
    Ok(Response::created(json!(customer)))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        model::CustomerStatus,
        notify::{BroadcastNotifier, Notifier},
        pages::func::demo_state,
    };

    fn input(am_id: Option<&str>) -> NewCustomer {
        serde_json::from_value(json!({
            "amId": am_id,
            "companyName": "PT Maju",
            "pic": "Budi",
            "phone": "+62 812 3456",
            "potential": 50_000_000.0,
            "status": "prospect",
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn am_always_creates_for_itself() {
        let (state, org) = demo_state().await;
        let customer = create_customer(&state, &Actor::from(&org.am1), input(Some(&org.am2.id)))
            .await
            .unwrap();
        assert_eq!(customer.am_id, org.am1.id);
        assert_eq!(customer.status, CustomerStatus::Prospect);
    }

    #[tokio::test]
    async fn gm_stays_inside_department() {
        let (state, org) = demo_state().await;
        let gm1 = Actor::from(&org.gm1);
        assert!(matches!(
            create_customer(&state, &gm1, input(Some(&org.am2.id))).await,
            Err(CrmError::Forbidden(_))
        ));
        assert!(matches!(
            create_customer(&state, &gm1, input(None)).await,
            Err(CrmError::Validation(_))
        ));
        assert!(matches!(
            create_customer(&state, &gm1, input(Some(&org.gm1.id))).await,
            Err(CrmError::Validation(_))
        ));
        let customer = create_customer(&state, &gm1, input(Some(&org.am1.id)))
            .await
            .unwrap();
        assert_eq!(customer.am_id, org.am1.id);
    }

    #[tokio::test]
    async fn invalid_input_is_rejected_before_storage() {
        let (state, org) = demo_state().await;
        let mut bad = input(None);
        bad.potential = 0.0;
        bad.company_name = String::new();
        let Err(CrmError::Validation(fields)) =
            create_customer(&state, &Actor::from(&org.am1), bad).await
        else {
            panic!("expected a validation error");
        };
        assert!(fields.contains_key("potential"));
        assert!(fields.contains_key("companyName"));
    }

    #[tokio::test]
    async fn owner_is_notified() {
        let (mut state, org) = demo_state().await;
        let notifier = Arc::new(BroadcastNotifier::default());
        state.notifier = notifier.clone() as Arc<dyn Notifier>;
        let mut rx = notifier.subscribe().unwrap();
        create_customer(&state, &Actor::from(&org.am1), input(None))
            .await
            .unwrap();
        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, "customer.created");
        assert!(event.is_for(&Actor::from(&org.am1)));
        assert!(!event.is_for(&Actor::from(&org.gm2)));
    }
}
