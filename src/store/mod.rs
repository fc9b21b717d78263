//! Repository-style access to the entities.
//!
//! Every read here excludes soft-deleted rows. Callers never see a row with
//! `deleted_at` set, whatever the [`Scope`].

mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

pub use memory::MemoryStore;

use crate::{
    error::CrmResult,
    libs::time::Period,
    model::{
        CreateProgress, CreateUser, Customer, CustomerPatch, CustomerStatus, Department,
        NewCustomer, NewDepartment, Progress, Session, Target, TargetOwner, User, UserPatch,
    },
    perm::{Role, Scope},
};

/// Filter for customer list, count and group-by queries.
#[derive(Debug, Clone)]
pub struct CustomerQuery {
    pub scope: Scope,
    pub status: Option<CustomerStatus>,
    /// Half-open `[start, end)` window on `updated_at`.
    pub updated_in: Option<(DateTime<Utc>, DateTime<Utc>)>,
}

impl CustomerQuery {
    pub fn scoped(scope: Scope) -> Self {
        Self {
            scope,
            status: None,
            updated_in: None,
        }
    }

    pub fn with_status(mut self, status: Option<CustomerStatus>) -> Self {
        self.status = status;
        self
    }

    pub fn updated_within(mut self, period: Period) -> Self {
        self.updated_in = Some((period.start(), period.end()));
        self
    }

    /// Row-level form of the filter. `MemoryStore` uses it directly and the
    /// SQL built by `MysqlStore` must agree with it.
    pub fn matches(&self, customer: &Customer) -> bool {
        customer.deleted_at.is_none()
            && self
                .scope
                .admits(&customer.am_id, customer.am_department_id.as_deref())
            && self.status.map_or(true, |s| s == customer.status)
            && self
                .updated_in
                .map_or(true, |(start, end)| customer.updated_at >= start && customer.updated_at < end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: u32,
    pub limit: u32,
}

impl Page {
    pub const DEFAULT_LIMIT: u32 = 20;
    pub const MAX_LIMIT: u32 = 100;

    pub fn offset(&self) -> usize {
        (self.page.saturating_sub(1) as usize) * self.limit as usize
    }
}

impl Default for Page {
    fn default() -> Self {
        Self {
            page: 1,
            limit: Self::DEFAULT_LIMIT,
        }
    }
}

/// One funnel bucket.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusGroup {
    pub status: CustomerStatus,
    pub count: u64,
    /// Summed `potential`.
    pub value: f64,
}

#[async_trait]
pub trait UserOps: Send + Sync {
    /// Conflict when the email or username is taken by a live user.
    async fn create_user(&self, user: CreateUser) -> CrmResult<User>;
    async fn get_user(&self, id: &str) -> CrmResult<Option<User>>;
    /// Looks the login up as an email first, then as a username.
    async fn find_user_by_login(&self, login: &str) -> CrmResult<Option<User>>;
    async fn list_users(&self, role: Option<Role>) -> CrmResult<Vec<User>>;
    async fn update_user(&self, id: &str, patch: &UserPatch) -> CrmResult<Option<User>>;
    async fn soft_delete_user(&self, id: &str) -> CrmResult<bool>;
    async fn set_password(&self, id: &str, password_hash: &str) -> CrmResult<bool>;
}

#[async_trait]
pub trait DepartmentOps: Send + Sync {
    /// Conflict when the name is taken.
    async fn create_department(&self, department: &NewDepartment) -> CrmResult<Department>;
    async fn get_department(&self, id: &str) -> CrmResult<Option<Department>>;
    async fn list_departments(&self) -> CrmResult<Vec<Department>>;
}

#[async_trait]
pub trait CustomerOps: Send + Sync {
    async fn create_customer(
        &self,
        am_id: &str,
        input: &NewCustomer,
        now: DateTime<Utc>,
    ) -> CrmResult<Customer>;
    async fn get_customer(&self, id: &str) -> CrmResult<Option<Customer>>;
    async fn update_customer(
        &self,
        id: &str,
        patch: &CustomerPatch,
        now: DateTime<Utc>,
    ) -> CrmResult<Option<Customer>>;
    async fn soft_delete_customer(&self, id: &str, now: DateTime<Utc>) -> CrmResult<bool>;
    /// Newest first.
    async fn list_customers(
        &self,
        query: &CustomerQuery,
        page: Option<Page>,
    ) -> CrmResult<Vec<Customer>>;
    async fn count_customers(&self, query: &CustomerQuery) -> CrmResult<u64>;
    /// Only statuses with at least one row come back, in funnel order.
    async fn group_customers_by_status(&self, query: &CustomerQuery)
        -> CrmResult<Vec<StatusGroup>>;
    /// Open-pipeline customers of `am_id` with no progress dated at or after
    /// `cutoff`. Customers with no progress at all are included.
    async fn customers_needing_follow_up(
        &self,
        am_id: &str,
        cutoff: DateTime<Utc>,
    ) -> CrmResult<Vec<Customer>>;
}

#[async_trait]
pub trait ProgressOps: Send + Sync {
    async fn create_progress(&self, progress: &CreateProgress) -> CrmResult<Progress>;
    /// Newest `date` first.
    async fn list_progress_by_customer(
        &self,
        customer_id: &str,
        limit: Option<usize>,
    ) -> CrmResult<Vec<Progress>>;
    /// Newest `date` first, authored by `am_id`.
    async fn list_progress_by_am(&self, am_id: &str, limit: usize) -> CrmResult<Vec<Progress>>;
}

#[async_trait]
pub trait TargetOps: Send + Sync {
    async fn find_target(&self, owner: &TargetOwner, period: Period) -> CrmResult<Option<Target>>;
    /// A department scope covers the department row and the rows of users in
    /// that department.
    async fn list_targets(&self, scope: &Scope, period: Period) -> CrmResult<Vec<Target>>;
    /// Inserts, or overwrites only `amount` of the existing row for the key.
    /// The flag is true when a row was inserted.
    async fn upsert_target(
        &self,
        owner: &TargetOwner,
        amount: f64,
        currency: &str,
        period: Period,
    ) -> CrmResult<(Target, bool)>;
}

#[async_trait]
pub trait SessionOps: Send + Sync {
    async fn create_session(
        &self,
        user_id: &str,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> CrmResult<Session>;
    async fn find_session(&self, token: &str) -> CrmResult<Option<Session>>;
    async fn delete_session(&self, token: &str) -> CrmResult<bool>;
    async fn delete_user_sessions(&self, user_id: &str) -> CrmResult<u64>;
}

/// Everything the handlers need from storage.
pub trait EntityStore:
    UserOps + DepartmentOps + CustomerOps + ProgressOps + TargetOps + SessionOps
{
}

impl<T> EntityStore for T where
    T: UserOps + DepartmentOps + CustomerOps + ProgressOps + TargetOps + SessionOps
{
}
