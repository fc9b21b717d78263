//! 销售目标
//!
//! One row per (owner, month, year). Setting a target that already exists
//! overwrites its amount and nothing else.

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::HeaderMap,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use validator::Validate;

use crate::{
    error::{CrmError, CrmResult},
    libs::{dser::parse_body, time::Period},
    model::{Target, TargetInput, TargetOwner},
    notify::{Audience, DomainEvent},
    perm::{can_manage_target, can_set_target_for, resolve_target_owner, scope_for, Actor},
    token::current_actor,
    AppState, Response, ResponseResult,
};

pub fn target_router() -> Router<AppState> {
    Router::new().route("/targets", get(list_targets_handler).post(set_target))
}

#[derive(Debug, Default, Deserialize)]
pub struct PeriodParams {
    #[serde(default)]
    pub month: Option<u32>,
    #[serde(default)]
    pub year: Option<i32>,
}

impl PeriodParams {
    /// Missing parts fall back to the current month.
    fn period(&self, now: DateTime<Utc>) -> CrmResult<Period> {
        let current = Period::containing(now);
        Period::new(
            self.month.unwrap_or(current.month),
            self.year.unwrap_or(current.year),
        )
        .ok_or_else(|| CrmError::invalid("month", "Month must be between 1 and 12"))
    }
}

/// ADMIN sees every row, GM its department and the department's users, AM
/// its own.
pub async fn list_targets(
    state: &AppState,
    actor: &Actor,
    params: &PeriodParams,
) -> CrmResult<Vec<Target>> {
    let period = params.period(Utc::now())?;
    state.store.list_targets(&scope_for(actor), period).await
}

/// Insert or overwrite the target of one owner for one month.
///
/// Returns whether a row was created. Two writers racing on the same key
/// can both miss the existing row; the loser sees a conflict and is retried
/// once, which turns it into an overwrite.
pub async fn create_or_update_target(
    state: &AppState,
    actor: &Actor,
    input: TargetInput,
) -> CrmResult<(Target, bool)> {
    if !can_manage_target(actor) {
        tracing::warn!(actor = %actor.id, "target change by a role that cannot manage targets");
        return Err(CrmError::forbidden("Only admins and GMs can set targets"));
    }
    input.validate()?;
    let owner = resolve_target_owner(actor, input.department_id.clone(), input.user_id.clone())?;
    let target_user = match owner.user_id() {
        Some(id) => state.store.get_user(id).await?,
        None => None,
    };
    if !can_set_target_for(actor, &owner, target_user.as_ref()) {
        tracing::warn!(actor = %actor.id, owner = ?owner, "target outside the actor's department");
        return Err(CrmError::forbidden(
            "You can only set targets for your own department",
        ));
    }
    match &owner {
        TargetOwner::User(_) if target_user.is_none() => {
            return Err(CrmError::invalid("userId", "User not found"));
        }
        TargetOwner::Department(id) if state.store.get_department(id).await?.is_none() => {
            return Err(CrmError::invalid("departmentId", "Department not found"));
        }
        _ => {}
    }
    let period = Period::new(input.month, input.year)
        .ok_or_else(|| CrmError::invalid("month", "Month must be between 1 and 12"))?;

    let store = &state.store;
    let (target, created) = match store
        .upsert_target(&owner, input.amount, &input.currency, period)
        .await
    {
        Err(CrmError::Conflict(_)) => {
            tracing::info!(owner = ?owner, month = period.month, year = period.year, "target upsert raced, retrying");
            store
                .upsert_target(&owner, input.amount, &input.currency, period)
                .await?
        }
        other => other?,
    };
    tracing::info!(
        actor = %actor.id,
        target = %target.id,
        amount = target.amount,
        created,
        "target saved"
    );
    let audience = match &owner {
        TargetOwner::User(id) => Audience::User(id.clone()),
        TargetOwner::Department(id) => Audience::Department(id.clone()),
    };
    state.publish(
        DomainEvent::new(
            "target.updated",
            json!({
                "id": target.id,
                "amount": target.amount,
                "currency": target.currency,
                "month": target.month,
                "year": target.year,
            }),
        )
        .to(audience),
    );
    Ok((target, created))
}

async fn list_targets_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    params: Result<Query<PeriodParams>, QueryRejection>,
) -> ResponseResult {
    let actor = current_actor(&state, &headers).await?;
    let Query(params) = params.map_err(Response::invalid_format)?;
    let targets = list_targets(&state, &actor, &params).await?;
    Ok(Response::ok(json!(targets)))
}

async fn set_target(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(value): Json<Value>,
) -> ResponseResult {
    let actor = current_actor(&state, &headers).await?;
    let input: TargetInput = parse_body(value)?;
    let (target, created) = create_or_update_target(&state, &actor, input).await?;
    Ok(crate::do_if!(created => Response::created(json!(target)), Response::ok(json!(target))))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{pages::func::demo_state, perm::Role};

    fn input(amount: f64, department: Option<&str>, user: Option<&str>) -> TargetInput {
        serde_json::from_value(json!({
            "amount": amount,
            "month": 3,
            "year": 2025,
            "departmentId": department,
            "userId": user,
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn second_write_overwrites_amount_only() {
        let (state, org) = demo_state().await;
        let admin = Actor::new("admin", Role::Admin, None);
        let (first, created) =
            create_or_update_target(&state, &admin, input(1000.0, None, Some(&org.am1.id)))
                .await
                .unwrap();
        assert!(created);
        assert_eq!(first.currency, "IDR");

        let mut again = input(2500.0, None, Some(&org.am1.id));
        again.currency = "USD".into();
        let (second, created) = create_or_update_target(&state, &admin, again).await.unwrap();
        assert!(!created);
        assert_eq!(second.id, first.id);
        assert_eq!(second.amount, 2500.0);
        assert_eq!(second.currency, "IDR");
    }

    #[tokio::test]
    async fn gm_is_kept_to_its_department() {
        let (state, org) = demo_state().await;
        let gm1 = Actor::from(&org.gm1);
        assert!(matches!(
            create_or_update_target(&state, &gm1, input(10.0, None, Some(&org.am2.id))).await,
            Err(CrmError::Forbidden(_))
        ));
        assert!(matches!(
            create_or_update_target(&state, &gm1, input(10.0, Some(&org.d2.id), None)).await,
            Err(CrmError::Forbidden(_))
        ));
        let (own, _) = create_or_update_target(&state, &gm1, input(10.0, None, None))
            .await
            .unwrap();
        assert_eq!(own.department_id.as_deref(), Some(org.d1.id.as_str()));
        assert!(create_or_update_target(&state, &gm1, input(10.0, None, Some(&org.am1.id)))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn am_cannot_set_targets() {
        let (state, org) = demo_state().await;
        assert!(matches!(
            create_or_update_target(&state, &Actor::from(&org.am1), input(10.0, None, None)).await,
            Err(CrmError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn unknown_owner_is_a_bad_request() {
        let (state, _) = demo_state().await;
        let admin = Actor::new("admin", Role::Admin, None);
        assert!(matches!(
            create_or_update_target(&state, &admin, input(10.0, None, Some("ghost"))).await,
            Err(CrmError::Validation(_))
        ));
        assert!(matches!(
            create_or_update_target(&state, &admin, input(10.0, Some("ghost"), None)).await,
            Err(CrmError::Validation(_))
        ));
        assert!(matches!(
            create_or_update_target(&state, &admin, input(0.0, Some("ghost"), None)).await,
            Err(CrmError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn concurrent_writers_leave_one_row() {
        let (state, org) = demo_state().await;
        let state = Arc::new(state);
        let admin = Actor::new("admin", Role::Admin, None);
        let mut handles = Vec::new();
        for i in 0..8 {
            let state = state.clone();
            let admin = admin.clone();
            let department = org.d1.id.clone();
            handles.push(tokio::spawn(async move {
                create_or_update_target(&state, &admin, input(100.0 + i as f64, Some(department.as_str()), None))
                    .await
                    .unwrap()
            }));
        }
        let mut inserts = 0;
        for handle in handles {
            if handle.await.unwrap().1 {
                inserts += 1;
            }
        }
        assert_eq!(inserts, 1);
        let period = Period::new(3, 2025).unwrap();
        let rows = list_targets(
            &state,
            &admin,
            &PeriodParams {
                month: Some(period.month),
                year: Some(period.year),
            },
        )
        .await
        .unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn listing_follows_scope() {
        let (state, org) = demo_state().await;
        let admin = Actor::new("admin", Role::Admin, None);
        for (department, user) in [
            (Some(org.d1.id.as_str()), None),
            (None, Some(org.am1.id.as_str())),
            (None, Some(org.am2.id.as_str())),
        ] {
            create_or_update_target(&state, &admin, input(10.0, department, user))
                .await
                .unwrap();
        }
        let params = PeriodParams {
            month: Some(3),
            year: Some(2025),
        };
        let all = list_targets(&state, &admin, &params).await.unwrap();
        assert_eq!(all.len(), 3);
        let gm1 = list_targets(&state, &Actor::from(&org.gm1), &params).await.unwrap();
        assert_eq!(gm1.len(), 2);
        let am2 = list_targets(&state, &Actor::from(&org.am2), &params).await.unwrap();
        assert_eq!(am2.len(), 1);
        let bad = PeriodParams {
            month: Some(13),
            year: None,
        };
        assert!(matches!(
            list_targets(&state, &admin, &bad).await,
            Err(CrmError::Validation(_))
        ));
    }
}
