use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    error::CrmResult,
    libs::time::{days_before, Period},
    model::{Customer, CustomerStatus, Progress, TargetOwner},
    perm::{scope_for, Actor, Role},
    store::{CustomerQuery, EntityStore, StatusGroup},
};

pub const RECENT_PROGRESS_LIMIT: usize = 5;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub period: Period,
    pub target_amount: f64,
    pub actual_amount: f64,
    pub pipeline_value: f64,
    pub active_customers: u64,
    /// All six statuses in funnel order, zero rows included.
    pub customers_by_status: Vec<StatusGroup>,
    /// AM only.
    pub needs_follow_up: Vec<Customer>,
    /// AM only.
    pub recent_progress: Vec<Progress>,
}

/// Whose target the dashboard compares against. ADMIN has none.
fn target_owner(actor: &Actor) -> Option<TargetOwner> {
    match actor.role {
        Role::Am => Some(TargetOwner::User(actor.id.clone())),
        Role::Gm => actor.department_id.clone().map(TargetOwner::Department),
        Role::Admin => None,
    }
}

/// Pure in (actor, now, store contents). The sub-queries run concurrently
/// and all derive their period and cutoff from the one `now`.
pub async fn dashboard_stats(
    store: &dyn EntityStore,
    actor: &Actor,
    now: DateTime<Utc>,
    follow_up_days: i64,
) -> CrmResult<DashboardStats> {
    let period = Period::containing(now);
    let scope = scope_for(actor);
    let in_scope = CustomerQuery::scoped(scope.clone());
    let won_in_period = CustomerQuery::scoped(scope)
        .with_status(Some(CustomerStatus::ClosedWon))
        .updated_within(period);
    let owner = target_owner(actor);
    let is_am = matches!(actor.role, Role::Am);
    let cutoff = days_before(now, follow_up_days);

    let (target, groups, won, needs_follow_up, recent_progress) = tokio::try_join!(
        async {
            match &owner {
                Some(owner) => store.find_target(owner, period).await,
                None => Ok(None),
            }
        },
        store.group_customers_by_status(&in_scope),
        store.group_customers_by_status(&won_in_period),
        async {
            if is_am {
                store.customers_needing_follow_up(&actor.id, cutoff).await
            } else {
                Ok(Vec::new())
            }
        },
        async {
            if is_am {
                store.list_progress_by_am(&actor.id, RECENT_PROGRESS_LIMIT).await
            } else {
                Ok(Vec::new())
            }
        },
    )?;

    let customers_by_status: Vec<StatusGroup> = CustomerStatus::ALL
        .into_iter()
        .map(|status| {
            groups
                .iter()
                .find(|g| g.status == status)
                .cloned()
                .unwrap_or(StatusGroup {
                    status,
                    count: 0,
                    value: 0.0,
                })
        })
        .collect();
    let open = customers_by_status.iter().filter(|g| g.status.is_open());

    Ok(DashboardStats {
        period,
        target_amount: target.map_or(0.0, |t| t.amount),
        actual_amount: won.iter().map(|g| g.value).sum(),
        pipeline_value: open.clone().map(|g| g.value).sum(),
        active_customers: open.map(|g| g.count).sum(),
        customers_by_status,
        needs_follow_up,
        recent_progress,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::{
        model::{CreateProgress, CreateUser, NewCustomer, User},
        store::{CustomerOps, MemoryStore, ProgressOps, TargetOps, UserOps},
    };

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 15, 12, 0, 0).unwrap()
    }

    async fn user(store: &MemoryStore, email: &str, role: Role, department: Option<&str>) -> User {
        store
            .create_user(CreateUser {
                email: email.into(),
                username: None,
                name: email.into(),
                password_hash: "x".into(),
                role,
                department_id: department.map(str::to_owned),
                manager_id: None,
            })
            .await
            .unwrap()
    }

    async fn customer(
        store: &MemoryStore,
        am: &User,
        status: CustomerStatus,
        potential: f64,
        at: DateTime<Utc>,
    ) -> Customer {
        let input = NewCustomer {
            am_id: None,
            company_name: format!("{} {}", status, potential),
            pic: "Budi".into(),
            phone: "0812345".into(),
            email: None,
            potential,
            timeline: None,
            status,
        };
        store.create_customer(&am.id, &input, at).await.unwrap()
    }

    async fn progress(store: &MemoryStore, am: &User, customer: &Customer, at: DateTime<Utc>) {
        store
            .create_progress(&CreateProgress {
                customer_id: customer.id.clone(),
                am_id: am.id.clone(),
                date: at,
                description: "visit".into(),
                status: customer.status,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn actual_counts_only_wins_updated_this_period() {
        let store = MemoryStore::new();
        let am = user(&store, "am1@example.com", Role::Am, Some("d1")).await;
        customer(&store, &am, CustomerStatus::ClosedWon, 100.0, now()).await;
        customer(&store, &am, CustomerStatus::ClosedWon, 200.0, now() - Duration::days(30)).await;

        let actor = Actor::from(&am);
        let stats = dashboard_stats(&store, &actor, now(), 7).await.unwrap();
        assert_eq!(stats.actual_amount, 100.0);
        assert_eq!(stats.period, Period::new(3, 2025).unwrap());
    }

    #[tokio::test]
    async fn pipeline_matches_open_groups() {
        let store = MemoryStore::new();
        let am = user(&store, "am1@example.com", Role::Am, Some("d1")).await;
        customer(&store, &am, CustomerStatus::Prospect, 10.0, now()).await;
        customer(&store, &am, CustomerStatus::Negotiation, 30.0, now()).await;
        customer(&store, &am, CustomerStatus::Negotiation, 5.0, now()).await;
        customer(&store, &am, CustomerStatus::ClosedLost, 1000.0, now()).await;

        let stats = dashboard_stats(&store, &Actor::from(&am), now(), 7)
            .await
            .unwrap();
        assert_eq!(stats.pipeline_value, 45.0);
        assert_eq!(stats.active_customers, 3);
        let statuses: Vec<_> = stats.customers_by_status.iter().map(|g| g.status).collect();
        assert_eq!(statuses, CustomerStatus::ALL);
        let open_value: f64 = stats
            .customers_by_status
            .iter()
            .filter(|g| g.status.is_open())
            .map(|g| g.value)
            .sum();
        assert_eq!(open_value, stats.pipeline_value);
        let won = &stats.customers_by_status[4];
        assert_eq!((won.count, won.value), (0, 0.0));
    }

    #[tokio::test]
    async fn follow_up_lists_quiet_open_customers() {
        let store = MemoryStore::new();
        let am = user(&store, "am1@example.com", Role::Am, Some("d1")).await;
        let never = customer(&store, &am, CustomerStatus::Prospect, 1.0, now()).await;
        let today = customer(&store, &am, CustomerStatus::Ongoing, 1.0, now()).await;
        let stale = customer(&store, &am, CustomerStatus::Proposal, 1.0, now()).await;
        progress(&store, &am, &today, now()).await;
        progress(&store, &am, &stale, now() - Duration::days(8)).await;

        let stats = dashboard_stats(&store, &Actor::from(&am), now(), 7)
            .await
            .unwrap();
        let mut ids: Vec<_> = stats.needs_follow_up.iter().map(|c| c.id.clone()).collect();
        ids.sort();
        let mut expected = vec![never.id, stale.id];
        expected.sort();
        assert_eq!(ids, expected);
        assert_eq!(stats.recent_progress.len(), 2);
        assert_eq!(stats.recent_progress[0].customer_id, today.id);
        assert!(stats.recent_progress[0].customer_name.is_some());
    }

    #[tokio::test]
    async fn targets_follow_role() {
        let store = MemoryStore::new();
        let am = user(&store, "am1@example.com", Role::Am, Some("d1")).await;
        let gm = user(&store, "gm1@example.com", Role::Gm, Some("d1")).await;
        let admin = user(&store, "admin@example.com", Role::Admin, None).await;
        let period = Period::containing(now());
        store
            .upsert_target(&TargetOwner::User(am.id.clone()), 500.0, "IDR", period)
            .await
            .unwrap();
        store
            .upsert_target(&TargetOwner::Department("d1".into()), 5000.0, "IDR", period)
            .await
            .unwrap();
        customer(&store, &am, CustomerStatus::Prospect, 1.0, now()).await;

        let am_stats = dashboard_stats(&store, &Actor::from(&am), now(), 7).await.unwrap();
        assert_eq!(am_stats.target_amount, 500.0);
        let gm_stats = dashboard_stats(&store, &Actor::from(&gm), now(), 7).await.unwrap();
        assert_eq!(gm_stats.target_amount, 5000.0);
        assert!(gm_stats.needs_follow_up.is_empty());
        assert!(gm_stats.recent_progress.is_empty());
        assert_eq!(gm_stats.active_customers, 1);
        let admin_stats = dashboard_stats(&store, &Actor::from(&admin), now(), 7)
            .await
            .unwrap();
        assert_eq!(admin_stats.target_amount, 0.0);
        assert_eq!(admin_stats.active_customers, 1);
    }

    #[tokio::test]
    async fn gm_without_department_sees_zeroes() {
        let store = MemoryStore::new();
        let am = user(&store, "am1@example.com", Role::Am, Some("d1")).await;
        customer(&store, &am, CustomerStatus::Prospect, 10.0, now()).await;
        let gm = Actor::new("gm", Role::Gm, None);
        let stats = dashboard_stats(&store, &gm, now(), 7).await.unwrap();
        assert_eq!(stats.pipeline_value, 0.0);
        assert_eq!(stats.target_amount, 0.0);
        assert_eq!(stats.customers_by_status.len(), 6);
    }
}
