//! 初始数据
//!
//! The bootstrap admin is created on every start when missing. The demo
//! organisation is opt-in (`seed_demo`) and only lands in an empty store.

use chrono::{DateTime, Duration, Utc};

use crate::{
    config::Config,
    error::CrmResult,
    libs::{password::hash_password, time::Period},
    model::{
        CreateProgress, CreateUser, CustomerStatus, Department, NewCustomer, NewDepartment,
        TargetOwner, User,
    },
    perm::Role,
    store::EntityStore,
};

pub const DEMO_PASSWORD: &str = "password123";

/// Two departments, one GM and one AM in each.
pub struct DemoOrg {
    pub d1: Department,
    pub d2: Department,
    pub gm1: User,
    pub gm2: User,
    pub am1: User,
    pub am2: User,
}

/// Creates the configured ADMIN unless a user with that email exists.
pub async fn bootstrap_admin(store: &dyn EntityStore, config: &Config) -> CrmResult<Option<User>> {
    if store.find_user_by_login(config.admin_email()).await?.is_some() {
        return Ok(None);
    }
    let admin = store
        .create_user(CreateUser {
            email: config.admin_email().to_owned(),
            username: Some("admin".to_owned()),
            name: "Administrator".to_owned(),
            password_hash: hash_password(config.admin_password()).await?,
            role: Role::Admin,
            department_id: None,
            manager_id: None,
        })
        .await?;
    tracing::info!(email = %admin.email, "bootstrap admin created");
    Ok(Some(admin))
}

async fn demo_user(
    store: &dyn EntityStore,
    password_hash: &str,
    handle: &str,
    name: &str,
    role: Role,
    department: &Department,
    manager: Option<&User>,
) -> CrmResult<User> {
    store
        .create_user(CreateUser {
            email: format!("{}@crm.local", handle),
            username: Some(handle.to_owned()),
            name: name.to_owned(),
            password_hash: password_hash.to_owned(),
            role,
            department_id: Some(department.id.clone()),
            manager_id: manager.map(|m| m.id.clone()),
        })
        .await
}

/// Departments and people only, no pipeline data. `None` when the store
/// already has departments.
pub async fn seed_demo_org(store: &dyn EntityStore) -> CrmResult<Option<DemoOrg>> {
    if !store.list_departments().await?.is_empty() {
        tracing::info!("store already has departments, demo organisation skipped");
        return Ok(None);
    }
    let hash = hash_password(DEMO_PASSWORD).await?;
    let d1 = store
        .create_department(&NewDepartment {
            name: "Enterprise Jakarta".to_owned(),
            gm_id: None,
        })
        .await?;
    let d2 = store
        .create_department(&NewDepartment {
            name: "Enterprise Surabaya".to_owned(),
            gm_id: None,
        })
        .await?;
    let gm1 = demo_user(store, &hash, "gm1", "Gita Maharani", Role::Gm, &d1, None).await?;
    let gm2 = demo_user(store, &hash, "gm2", "Galih Mahendra", Role::Gm, &d2, None).await?;
    let am1 = demo_user(store, &hash, "am1", "Ayu Mulyani", Role::Am, &d1, Some(&gm1)).await?;
    let am2 = demo_user(store, &hash, "am2", "Arif Maulana", Role::Am, &d2, Some(&gm2)).await?;
    tracing::info!("demo organisation created");
    Ok(Some(DemoOrg {
        d1,
        d2,
        gm1,
        gm2,
        am1,
        am2,
    }))
}

struct DemoCustomer {
    company: &'static str,
    pic: &'static str,
    potential: f64,
    status: CustomerStatus,
    /// days since the last progress entry
    last_touch: Option<i64>,
}

const fn demo(
    company: &'static str,
    pic: &'static str,
    potential: f64,
    status: CustomerStatus,
    last_touch: Option<i64>,
) -> DemoCustomer {
    DemoCustomer {
        company,
        pic,
        potential,
        status,
        last_touch,
    }
}

const AM1_CUSTOMERS: [DemoCustomer; 4] = [
    demo("PT Nusantara Logistik", "Budi Santoso", 50_000_000.0, CustomerStatus::Prospect, None),
    demo("PT Sinar Mas Retail", "Dewi Lestari", 120_000_000.0, CustomerStatus::Proposal, Some(2)),
    demo("CV Karya Abadi", "Hendra Wijaya", 35_000_000.0, CustomerStatus::Negotiation, Some(12)),
    demo("PT Bumi Energi", "Rina Kartika", 80_000_000.0, CustomerStatus::ClosedWon, Some(1)),
];

const AM2_CUSTOMERS: [DemoCustomer; 3] = [
    demo("PT Samudra Pangan", "Joko Prasetyo", 65_000_000.0, CustomerStatus::Ongoing, Some(3)),
    demo("PT Cahaya Medika", "Sari Utami", 95_000_000.0, CustomerStatus::ClosedLost, Some(20)),
    demo("PT Arta Digital", "Yusuf Hakim", 40_000_000.0, CustomerStatus::Prospect, None),
];

async fn demo_customers(
    store: &dyn EntityStore,
    am: &User,
    customers: &[DemoCustomer],
    now: DateTime<Utc>,
) -> CrmResult<()> {
    for (i, c) in customers.iter().enumerate() {
        let input = NewCustomer {
            am_id: None,
            company_name: c.company.to_owned(),
            pic: c.pic.to_owned(),
            phone: format!("+62 812 0000 {:04}", i + 1),
            email: None,
            potential: c.potential,
            timeline: Some(now + Duration::days(30)),
            status: c.status,
        };
        let customer = store.create_customer(&am.id, &input, now).await?;
        if let Some(days) = c.last_touch {
            store
                .create_progress(&CreateProgress {
                    customer_id: customer.id,
                    am_id: am.id.clone(),
                    date: now - Duration::days(days),
                    description: format!("Follow-up call with {}", c.pic),
                    status: c.status,
                })
                .await?;
        }
    }
    Ok(())
}

/// The demo organisation plus customers, progress and this month's targets.
pub async fn seed_demo(store: &dyn EntityStore) -> CrmResult<()> {
    let Some(org) = seed_demo_org(store).await? else {
        return Ok(());
    };
    let now = Utc::now();
    demo_customers(store, &org.am1, &AM1_CUSTOMERS, now).await?;
    demo_customers(store, &org.am2, &AM2_CUSTOMERS, now).await?;

    let period = Period::containing(now);
    for (owner, amount) in [
        (TargetOwner::User(org.am1.id.clone()), 150_000_000.0),
        (TargetOwner::User(org.am2.id.clone()), 120_000_000.0),
        (TargetOwner::Department(org.d1.id.clone()), 400_000_000.0),
        (TargetOwner::Department(org.d2.id.clone()), 300_000_000.0),
    ] {
        store.upsert_target(&owner, amount, "IDR", period).await?;
    }
    tracing::info!("demo pipeline created");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        perm::{scope_for, Actor, Scope},
        store::{CustomerOps, CustomerQuery, DepartmentOps, MemoryStore, UserOps},
    };

    #[tokio::test]
    async fn admin_is_created_once() {
        let store = MemoryStore::new();
        let config = Config::for_tests();
        assert!(bootstrap_admin(&store, &config).await.unwrap().is_some());
        assert!(bootstrap_admin(&store, &config).await.unwrap().is_none());
        let admin = store
            .find_user_by_login(config.admin_email())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(admin.role, Role::Admin);
    }

    #[tokio::test]
    async fn demo_seeds_only_an_empty_store() {
        let store = MemoryStore::new();
        seed_demo(&store).await.unwrap();
        assert!(seed_demo_org(&store).await.unwrap().is_none());
        assert_eq!(store.list_departments().await.unwrap().len(), 2);

        let am1 = store.find_user_by_login("am1").await.unwrap().unwrap();
        let query = CustomerQuery::scoped(scope_for(&Actor::from(&am1)));
        assert_eq!(store.count_customers(&query).await.unwrap(), 4);
        let all = CustomerQuery::scoped(Scope::All);
        assert_eq!(store.count_customers(&all).await.unwrap(), 7);
    }
}
