//! Who may see and touch which rows.
//!
//! [`policy`] answers yes/no for a single resource, [`scope`] narrows list,
//! count and group-by queries to what an actor may see.

pub mod policy;
pub mod scope;

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

pub use policy::{
    can_access_customer, can_manage_target, can_set_target_for, require_admin,
    require_customer_read, require_customer_write, resolve_target_owner,
};
pub use scope::{scope_for, Scope};

/// Closed set of roles. Every policy site matches on it exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "ADMIN")]
    Admin,
    /// General manager, leads one department.
    #[serde(rename = "GM")]
    Gm,
    /// Account manager, owns customers directly.
    #[serde(rename = "AM")]
    Am,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Gm => "GM",
            Role::Am => "AM",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ADMIN" => Ok(Role::Admin),
            "GM" => Ok(Role::Gm),
            "AM" => Ok(Role::Am),
            other => Err(format!("unknown role {:?}", other)),
        }
    }
}

/// An already authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    pub id: String,
    pub role: Role,
    pub department_id: Option<String>,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: Role, department_id: Option<&str>) -> Self {
        Self {
            id: id.into(),
            role,
            department_id: department_id.map(str::to_owned),
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self.role, Role::Admin)
    }

    /// True when both sides name the same, non-empty department.
    pub fn in_department(&self, department_id: Option<&str>) -> bool {
        matches!((self.department_id.as_deref(), department_id), (Some(a), Some(b)) if a == b)
    }
}

impl From<&crate::model::User> for Actor {
    fn from(user: &crate::model::User) -> Self {
        Self {
            id: user.id.clone(),
            role: user.role,
            department_id: user.department_id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_use_upper_case_names() {
        assert_eq!(serde_json::to_string(&Role::Gm).unwrap(), "\"GM\"");
        assert_eq!("AM".parse::<Role>().unwrap(), Role::Am);
        assert!("am".parse::<Role>().is_err());
    }

    #[test]
    fn missing_department_never_matches() {
        let gm = Actor::new("gm", Role::Gm, None);
        assert!(!gm.in_department(None));
        assert!(!gm.in_department(Some("d1")));
        let gm = Actor::new("gm", Role::Gm, Some("d1"));
        assert!(gm.in_department(Some("d1")));
    }
}
