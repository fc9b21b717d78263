//! Rows as the store hands them out, and the shapes callers send in.

mod input;

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use mysql_common::prelude::FromRow;
use serde::{Deserialize, Serialize};

pub use input::*;

use crate::{libs::time::Timestamp, perm::Role};

/// 员工数据
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
#[mysql(table_name = "user")]
pub struct User {
    pub id: String,
    pub email: String,
    pub username: Option<String>,
    pub name: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub role: Role,
    pub department_id: Option<String>,
    pub manager_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Department {
    pub id: String,
    pub name: String,
    /// The GM leading this department.
    pub gm_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CustomerStatus {
    Prospect,
    Ongoing,
    Proposal,
    Negotiation,
    ClosedWon,
    ClosedLost,
}

impl CustomerStatus {
    /// Funnel order.
    pub const ALL: [CustomerStatus; 6] = [
        CustomerStatus::Prospect,
        CustomerStatus::Ongoing,
        CustomerStatus::Proposal,
        CustomerStatus::Negotiation,
        CustomerStatus::ClosedWon,
        CustomerStatus::ClosedLost,
    ];

    /// The open pipeline.
    pub const OPEN: [CustomerStatus; 4] = [
        CustomerStatus::Prospect,
        CustomerStatus::Ongoing,
        CustomerStatus::Proposal,
        CustomerStatus::Negotiation,
    ];

    pub fn is_open(&self) -> bool {
        Self::OPEN.contains(self)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CustomerStatus::Prospect => "prospect",
            CustomerStatus::Ongoing => "ongoing",
            CustomerStatus::Proposal => "proposal",
            CustomerStatus::Negotiation => "negotiation",
            CustomerStatus::ClosedWon => "closed-won",
            CustomerStatus::ClosedLost => "closed-lost",
        }
    }
}

impl fmt::Display for CustomerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CustomerStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown customer status {:?}", s))
    }
}

/// 客户数据
///
/// `am_name` and `am_department_id` are joined from the owning AM when the
/// row is read; they are not stored on the customer itself.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub id: String,
    pub am_id: String,
    pub am_name: Option<String>,
    pub am_department_id: Option<String>,
    pub company_name: String,
    /// Contact person.
    pub pic: String,
    pub phone: String,
    pub email: Option<String>,
    pub potential: f64,
    pub timeline: Option<Timestamp>,
    pub status: CustomerStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// One activity log entry against a customer. Never updated or deleted.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub id: String,
    pub customer_id: String,
    pub customer_name: Option<String>,
    pub am_id: String,
    pub am_name: Option<String>,
    pub date: Timestamp,
    pub description: String,
    pub status: CustomerStatus,
    pub created_at: Timestamp,
}

/// Whose number a target is.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TargetOwner {
    User(String),
    Department(String),
}

impl TargetOwner {
    pub fn user_id(&self) -> Option<&str> {
        match self {
            TargetOwner::User(id) => Some(id),
            TargetOwner::Department(_) => None,
        }
    }

    pub fn department_id(&self) -> Option<&str> {
        match self {
            TargetOwner::Department(id) => Some(id),
            TargetOwner::User(_) => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    pub id: String,
    pub amount: f64,
    pub currency: String,
    pub month: u32,
    pub year: i32,
    pub department_id: Option<String>,
    pub user_id: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Target {
    /// `None` for the reserved org-wide rows that name neither side.
    pub fn owner(&self) -> Option<TargetOwner> {
        match (&self.user_id, &self.department_id) {
            (Some(user), _) => Some(TargetOwner::User(user.clone())),
            (None, Some(department)) => Some(TargetOwner::Department(department.clone())),
            (None, None) => None,
        }
    }
}

/// A refresh token issued at login.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub user_id: String,
    #[serde(skip_serializing)]
    pub token: String,
    pub expires_at: Timestamp,
    pub created_at: Timestamp,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_use_kebab_case() {
        assert_eq!(
            serde_json::to_string(&CustomerStatus::ClosedWon).unwrap(),
            "\"closed-won\""
        );
        assert_eq!(
            "negotiation".parse::<CustomerStatus>().unwrap(),
            CustomerStatus::Negotiation
        );
        assert!(!CustomerStatus::ClosedLost.is_open());
        assert!(CustomerStatus::Prospect.is_open());
    }
}
