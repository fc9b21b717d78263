use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::{mapref::entry::Entry, DashMap};

use super::{
    CustomerOps, CustomerQuery, DepartmentOps, Page, ProgressOps, SessionOps, StatusGroup,
    TargetOps, UserOps,
};
use crate::{
    error::{CrmError, CrmResult},
    libs::{
        gen_id,
        time::{Period, Timestamp},
    },
    model::{
        CreateProgress, CreateUser, Customer, CustomerPatch, Department, NewCustomer,
        NewDepartment, Progress, Session, Target, TargetOwner, User, UserPatch,
    },
    perm::{Role, Scope},
};

/// In-process store used by tests and by `database_url = "memory"`.
///
/// Uniqueness is kept with index maps claimed through `DashMap::entry`, which
/// holds the shard lock for the check and the insert together.
#[derive(Default)]
pub struct MemoryStore {
    users: DashMap<String, User>,
    /// lower-cased email -> user id, live users only
    emails: DashMap<String, String>,
    /// lower-cased username -> user id, live users only
    usernames: DashMap<String, String>,
    departments: DashMap<String, Department>,
    department_names: DashMap<String, String>,
    customers: DashMap<String, Customer>,
    progress: DashMap<String, Progress>,
    targets: DashMap<String, Target>,
    target_keys: DashMap<(TargetOwner, Period), String>,
    /// token -> session
    sessions: DashMap<String, Session>,
}

fn claim(index: &DashMap<String, String>, key: String, id: &str) -> bool {
    match index.entry(key) {
        Entry::Occupied(owner) => owner.get() == id,
        Entry::Vacant(slot) => {
            slot.insert(id.to_owned());
            true
        }
    }
}

fn release(index: &DashMap<String, String>, key: &str, id: &str) {
    index.remove_if(key, |_, owner| owner == id);
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn live_user(&self, id: &str) -> Option<User> {
        self.users
            .get(id)
            .filter(|user| user.deleted_at.is_none())
            .map(|user| user.clone())
    }

    /// Fills the AM columns from the owner as it is now.
    fn join_customer(&self, mut customer: Customer) -> Customer {
        if let Some(am) = self.users.get(&customer.am_id) {
            customer.am_name = Some(am.name.clone());
            customer.am_department_id = am.department_id.clone();
        }
        customer
    }

    fn live_customers(&self) -> Vec<Customer> {
        let raw: Vec<Customer> = self
            .customers
            .iter()
            .filter(|c| c.deleted_at.is_none())
            .map(|c| c.clone())
            .collect();
        raw.into_iter().map(|c| self.join_customer(c)).collect()
    }

    fn join_progress(&self, mut progress: Progress) -> Option<Progress> {
        let customer = self.customers.get(&progress.customer_id)?;
        if customer.deleted_at.is_some() {
            return None;
        }
        progress.customer_name = Some(customer.company_name.clone());
        drop(customer);
        progress.am_name = self.users.get(&progress.am_id).map(|am| am.name.clone());
        Some(progress)
    }

    fn progress_where(&self, keep: impl Fn(&Progress) -> bool, limit: Option<usize>) -> Vec<Progress> {
        let mut rows: Vec<Progress> = self
            .progress
            .iter()
            .filter(|p| keep(p))
            .map(|p| p.clone())
            .collect();
        rows.sort_by(|a, b| b.date.cmp(&a.date).then(b.created_at.cmp(&a.created_at)));
        rows.into_iter()
            .filter_map(|p| self.join_progress(p))
            .take(limit.unwrap_or(usize::MAX))
            .collect()
    }
}

#[async_trait]
impl UserOps for MemoryStore {
    async fn create_user(&self, user: CreateUser) -> CrmResult<User> {
        let id = gen_id();
        let email_key = user.email.to_lowercase();
        if !claim(&self.emails, email_key.clone(), &id) {
            return Err(CrmError::conflict("Email already in use"));
        }
        if let Some(username) = &user.username {
            if !claim(&self.usernames, username.to_lowercase(), &id) {
                release(&self.emails, &email_key, &id);
                return Err(CrmError::conflict("Username already in use"));
            }
        }
        let now = Timestamp::now();
        let row = User {
            id: id.clone(),
            email: user.email,
            username: user.username,
            name: user.name,
            password: user.password_hash,
            role: user.role,
            department_id: user.department_id,
            manager_id: user.manager_id,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        };
        self.users.insert(id, row.clone());
        Ok(row)
    }

    async fn get_user(&self, id: &str) -> CrmResult<Option<User>> {
        Ok(self.live_user(id))
    }

    async fn find_user_by_login(&self, login: &str) -> CrmResult<Option<User>> {
        let key = login.trim().to_lowercase();
        let id = self
            .emails
            .get(&key)
            .or_else(|| self.usernames.get(&key))
            .map(|id| id.clone());
        Ok(id.and_then(|id| self.live_user(&id)))
    }

    async fn list_users(&self, role: Option<Role>) -> CrmResult<Vec<User>> {
        let mut users: Vec<User> = self
            .users
            .iter()
            .filter(|u| u.deleted_at.is_none() && role.map_or(true, |r| u.role == r))
            .map(|u| u.clone())
            .collect();
        users.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(users)
    }

    async fn update_user(&self, id: &str, patch: &UserPatch) -> CrmResult<Option<User>> {
        let Some(current) = self.live_user(id) else {
            return Ok(None);
        };
        let old_email = current.email.to_lowercase();
        let new_email = patch
            .email
            .as_ref()
            .map(|e| e.to_lowercase())
            .filter(|e| *e != old_email);
        if let Some(key) = &new_email {
            if !claim(&self.emails, key.clone(), id) {
                return Err(CrmError::conflict("Email already in use"));
            }
        }
        if let Some(username) = &patch.username {
            let old = current.username.as_ref().map(|u| u.to_lowercase());
            let new = username.as_ref().map(|u| u.to_lowercase());
            if old != new {
                if let Some(key) = new {
                    if !claim(&self.usernames, key, id) {
                        if let Some(key) = &new_email {
                            release(&self.emails, key, id);
                        }
                        return Err(CrmError::conflict("Username already in use"));
                    }
                }
                if let Some(key) = old {
                    release(&self.usernames, &key, id);
                }
            }
        }
        if new_email.is_some() {
            release(&self.emails, &old_email, id);
        }
        let Some(mut user) = self.users.get_mut(id) else {
            return Ok(None);
        };
        patch.apply(&mut user, Utc::now());
        Ok(Some(user.clone()))
    }

    async fn soft_delete_user(&self, id: &str) -> CrmResult<bool> {
        let Some(mut user) = self.users.get_mut(id) else {
            return Ok(false);
        };
        if user.deleted_at.is_some() {
            return Ok(false);
        }
        let now = Timestamp::now();
        user.deleted_at = Some(now);
        user.updated_at = now;
        let email = user.email.to_lowercase();
        let username = user.username.as_ref().map(|u| u.to_lowercase());
        drop(user);
        release(&self.emails, &email, id);
        if let Some(username) = username {
            release(&self.usernames, &username, id);
        }
        Ok(true)
    }

    async fn set_password(&self, id: &str, password_hash: &str) -> CrmResult<bool> {
        match self.users.get_mut(id) {
            Some(mut user) if user.deleted_at.is_none() => {
                user.password = password_hash.to_owned();
                user.updated_at = Timestamp::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl DepartmentOps for MemoryStore {
    async fn create_department(&self, department: &NewDepartment) -> CrmResult<Department> {
        let id = gen_id();
        if !claim(&self.department_names, department.name.to_lowercase(), &id) {
            return Err(CrmError::conflict("Department name already exists"));
        }
        let row = Department {
            id: id.clone(),
            name: department.name.clone(),
            gm_id: department.gm_id.clone(),
        };
        self.departments.insert(id, row.clone());
        Ok(row)
    }

    async fn get_department(&self, id: &str) -> CrmResult<Option<Department>> {
        Ok(self.departments.get(id).map(|d| d.clone()))
    }

    async fn list_departments(&self) -> CrmResult<Vec<Department>> {
        let mut departments: Vec<Department> =
            self.departments.iter().map(|d| d.clone()).collect();
        departments.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(departments)
    }
}

#[async_trait]
impl CustomerOps for MemoryStore {
    async fn create_customer(
        &self,
        am_id: &str,
        input: &NewCustomer,
        now: DateTime<Utc>,
    ) -> CrmResult<Customer> {
        let customer = Customer {
            id: gen_id(),
            am_id: am_id.to_owned(),
            am_name: None,
            am_department_id: None,
            company_name: input.company_name.clone(),
            pic: input.pic.clone(),
            phone: input.phone.clone(),
            email: input.email.clone(),
            potential: input.potential,
            timeline: input.timeline.map(Timestamp),
            status: input.status,
            deleted_at: None,
            created_at: now.into(),
            updated_at: now.into(),
        };
        self.customers.insert(customer.id.clone(), customer.clone());
        Ok(self.join_customer(customer))
    }

    async fn get_customer(&self, id: &str) -> CrmResult<Option<Customer>> {
        let customer = self
            .customers
            .get(id)
            .filter(|c| c.deleted_at.is_none())
            .map(|c| c.clone());
        Ok(customer.map(|c| self.join_customer(c)))
    }

    async fn update_customer(
        &self,
        id: &str,
        patch: &CustomerPatch,
        now: DateTime<Utc>,
    ) -> CrmResult<Option<Customer>> {
        let updated = match self.customers.get_mut(id) {
            Some(mut c) if c.deleted_at.is_none() => {
                patch.apply(&mut c, now);
                c.clone()
            }
            _ => return Ok(None),
        };
        Ok(Some(self.join_customer(updated)))
    }

    async fn soft_delete_customer(&self, id: &str, now: DateTime<Utc>) -> CrmResult<bool> {
        match self.customers.get_mut(id) {
            Some(mut c) if c.deleted_at.is_none() => {
                c.deleted_at = Some(now.into());
                c.updated_at = now.into();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_customers(
        &self,
        query: &CustomerQuery,
        page: Option<Page>,
    ) -> CrmResult<Vec<Customer>> {
        let mut rows: Vec<Customer> = self
            .live_customers()
            .into_iter()
            .filter(|c| query.matches(c))
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(match page {
            Some(page) => rows
                .into_iter()
                .skip(page.offset())
                .take(page.limit as usize)
                .collect(),
            None => rows,
        })
    }

    async fn count_customers(&self, query: &CustomerQuery) -> CrmResult<u64> {
        Ok(self
            .live_customers()
            .iter()
            .filter(|c| query.matches(c))
            .count() as u64)
    }

    async fn group_customers_by_status(
        &self,
        query: &CustomerQuery,
    ) -> CrmResult<Vec<StatusGroup>> {
        let mut groups = BTreeMap::new();
        for customer in self.live_customers().iter().filter(|c| query.matches(c)) {
            let (count, value) = groups.entry(customer.status).or_insert((0u64, 0f64));
            *count += 1;
            *value += customer.potential;
        }
        Ok(groups
            .into_iter()
            .map(|(status, (count, value))| StatusGroup {
                status,
                count,
                value,
            })
            .collect())
    }

    async fn customers_needing_follow_up(
        &self,
        am_id: &str,
        cutoff: DateTime<Utc>,
    ) -> CrmResult<Vec<Customer>> {
        let mut rows: Vec<Customer> = self
            .live_customers()
            .into_iter()
            .filter(|c| c.am_id == am_id && c.status.is_open())
            .filter(|c| {
                !self
                    .progress
                    .iter()
                    .any(|p| p.customer_id == c.id && p.date >= cutoff)
            })
            .collect();
        rows.sort_by(|a, b| a.updated_at.cmp(&b.updated_at).then(a.id.cmp(&b.id)));
        Ok(rows)
    }
}

#[async_trait]
impl ProgressOps for MemoryStore {
    async fn create_progress(&self, progress: &CreateProgress) -> CrmResult<Progress> {
        let row = Progress {
            id: gen_id(),
            customer_id: progress.customer_id.clone(),
            customer_name: None,
            am_id: progress.am_id.clone(),
            am_name: None,
            date: progress.date.into(),
            description: progress.description.clone(),
            status: progress.status,
            created_at: Timestamp::now(),
        };
        self.progress.insert(row.id.clone(), row.clone());
        self.join_progress(row)
            .ok_or_else(|| CrmError::not_found("Customer not found"))
    }

    async fn list_progress_by_customer(
        &self,
        customer_id: &str,
        limit: Option<usize>,
    ) -> CrmResult<Vec<Progress>> {
        Ok(self.progress_where(|p| p.customer_id == customer_id, limit))
    }

    async fn list_progress_by_am(&self, am_id: &str, limit: usize) -> CrmResult<Vec<Progress>> {
        Ok(self.progress_where(|p| p.am_id == am_id, Some(limit)))
    }
}

#[async_trait]
impl TargetOps for MemoryStore {
    async fn find_target(&self, owner: &TargetOwner, period: Period) -> CrmResult<Option<Target>> {
        let id = self
            .target_keys
            .get(&(owner.clone(), period))
            .map(|id| id.clone());
        Ok(id.and_then(|id| self.targets.get(&id).map(|t| t.clone())))
    }

    async fn list_targets(&self, scope: &Scope, period: Period) -> CrmResult<Vec<Target>> {
        let in_period: Vec<Target> = self
            .targets
            .iter()
            .filter(|t| t.month == period.month && t.year == period.year)
            .map(|t| t.clone())
            .collect();
        let mut rows: Vec<Target> = in_period
            .into_iter()
            .filter(|t| match scope {
                Scope::All => true,
                Scope::Nothing => false,
                Scope::Owner(id) => t.user_id.as_deref() == Some(id.as_str()),
                Scope::Department(department) => match (&t.department_id, &t.user_id) {
                    (Some(d), _) => d == department,
                    (None, Some(user_id)) => self
                        .users
                        .get(user_id)
                        .is_some_and(|u| u.department_id.as_deref() == Some(department.as_str())),
                    (None, None) => false,
                },
            })
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(rows)
    }

    async fn upsert_target(
        &self,
        owner: &TargetOwner,
        amount: f64,
        currency: &str,
        period: Period,
    ) -> CrmResult<(Target, bool)> {
        let now = Timestamp::now();
        match self.target_keys.entry((owner.clone(), period)) {
            Entry::Occupied(key) => {
                let mut target = self
                    .targets
                    .get_mut(key.get())
                    .ok_or_else(|| CrmError::internal("target index points at a missing row"))?;
                target.amount = amount;
                target.updated_at = now;
                Ok((target.clone(), false))
            }
            Entry::Vacant(key) => {
                let target = Target {
                    id: gen_id(),
                    amount,
                    currency: currency.to_owned(),
                    month: period.month,
                    year: period.year,
                    department_id: owner.department_id().map(str::to_owned),
                    user_id: owner.user_id().map(str::to_owned),
                    created_at: now,
                    updated_at: now,
                };
                self.targets.insert(target.id.clone(), target.clone());
                key.insert(target.id.clone());
                Ok((target, true))
            }
        }
    }
}

#[async_trait]
impl SessionOps for MemoryStore {
    async fn create_session(
        &self,
        user_id: &str,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> CrmResult<Session> {
        let session = Session {
            id: gen_id(),
            user_id: user_id.to_owned(),
            token: token.to_owned(),
            expires_at: expires_at.into(),
            created_at: Timestamp::now(),
        };
        match self.sessions.entry(token.to_owned()) {
            Entry::Occupied(_) => Err(CrmError::conflict("Session token already issued")),
            Entry::Vacant(slot) => {
                slot.insert(session.clone());
                Ok(session)
            }
        }
    }

    async fn find_session(&self, token: &str) -> CrmResult<Option<Session>> {
        Ok(self.sessions.get(token).map(|s| s.clone()))
    }

    async fn delete_session(&self, token: &str) -> CrmResult<bool> {
        Ok(self.sessions.remove(token).is_some())
    }

    async fn delete_user_sessions(&self, user_id: &str) -> CrmResult<u64> {
        let before = self.sessions.len();
        self.sessions.retain(|_, s| s.user_id != user_id);
        Ok(before.saturating_sub(self.sessions.len()) as u64)
    }
}
