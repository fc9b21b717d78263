//! Single-resource allow/deny decisions. Pure functions, no store access:
//! anything a decision depends on is resolved by the caller first.

use super::{Actor, Role};
use crate::{
    error::{CrmError, CrmResult},
    model::{Customer, TargetOwner, User},
};

/// ADMIN always; AM when it owns the customer; GM when it owns the customer
/// or the owning AM sits in the GM's department.
pub fn can_access_customer(actor: &Actor, customer: &Customer) -> bool {
    match actor.role {
        Role::Admin => true,
        Role::Am => customer.am_id == actor.id,
        Role::Gm => {
            customer.am_id == actor.id || actor.in_department(customer.am_department_id.as_deref())
        }
    }
}

/// Reads answer "not found" for out-of-scope rows so existence is not confirmed.
pub fn require_customer_read(actor: &Actor, customer: Option<Customer>) -> CrmResult<Customer> {
    match customer {
        Some(customer) if can_access_customer(actor, &customer) => Ok(customer),
        Some(customer) => {
            tracing::info!(actor = %actor.id, customer = %customer.id, "customer read outside scope");
            Err(CrmError::not_found("Customer not found"))
        }
        None => Err(CrmError::not_found("Customer not found")),
    }
}

/// Writes answer "forbidden" for rows that exist but are out of scope.
pub fn require_customer_write(actor: &Actor, customer: Option<Customer>) -> CrmResult<Customer> {
    match customer {
        Some(customer) if can_access_customer(actor, &customer) => Ok(customer),
        Some(customer) => {
            tracing::warn!(actor = %actor.id, customer = %customer.id, "customer write outside scope");
            Err(CrmError::forbidden("You cannot modify this customer"))
        }
        None => Err(CrmError::not_found("Customer not found")),
    }
}

/// User and department administration.
pub fn require_admin(actor: &Actor) -> CrmResult<()> {
    match actor.role {
        Role::Admin => Ok(()),
        Role::Gm | Role::Am => {
            tracing::warn!(actor = %actor.id, "admin-only action refused");
            Err(CrmError::forbidden("Admin access required"))
        }
    }
}

/// Only ADMIN and GM set targets; an AM can only read its own.
pub fn can_manage_target(actor: &Actor) -> bool {
    match actor.role {
        Role::Admin | Role::Gm => true,
        Role::Am => false,
    }
}

/// Works out whose target a request is about.
///
/// Exactly one of `department_id` / `user_id` may be named. A GM naming
/// neither means its own department. Org-wide targets (neither side) are
/// not created through this path.
pub fn resolve_target_owner(
    actor: &Actor,
    department_id: Option<String>,
    user_id: Option<String>,
) -> CrmResult<TargetOwner> {
    match (department_id, user_id) {
        (Some(_), Some(_)) => Err(CrmError::invalid(
            "userId",
            "Set either departmentId or userId, not both",
        )),
        (Some(department), None) => Ok(TargetOwner::Department(department)),
        (None, Some(user)) => Ok(TargetOwner::User(user)),
        (None, None) => match actor.role {
            Role::Gm => actor
                .department_id
                .clone()
                .map(TargetOwner::Department)
                .ok_or_else(|| CrmError::forbidden("You are not assigned to a department")),
            Role::Admin => Err(CrmError::invalid(
                "departmentId",
                "A target needs a departmentId or a userId",
            )),
            Role::Am => Err(CrmError::forbidden("Only admins and GMs can set targets")),
        },
    }
}

/// `target_user` is the live user behind `TargetOwner::User`, when it resolved.
pub fn can_set_target_for(actor: &Actor, owner: &TargetOwner, target_user: Option<&User>) -> bool {
    match actor.role {
        Role::Admin => true,
        Role::Gm => match owner {
            TargetOwner::Department(department) => actor.in_department(Some(department.as_str())),
            TargetOwner::User(_) => {
                target_user.is_some_and(|user| actor.in_department(user.department_id.as_deref()))
            }
        },
        Role::Am => false,
    }
}
