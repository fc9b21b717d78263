use chrono::{DateTime, Utc};
use serde::Deserialize;
use validator::{Validate, ValidateEmail, ValidationError};

use super::{Customer, CustomerStatus, User};
use crate::{
    libs::{
        dser::{deser_date, deser_empty_to_none, deser_nullable, deser_nullable_date},
        time::Timestamp,
    },
    perm::Role,
};

lazy_static::lazy_static! {
    static ref PHONE: regex::Regex = regex::Regex::new(r"^\+?[0-9][0-9 ()\-]{3,24}$").unwrap();
}

fn validate_phone(phone: &str) -> Result<(), ValidationError> {
    if PHONE.is_match(phone.trim()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("phone");
        err.message = Some("Invalid phone number".into());
        Err(err)
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[serde(default, deserialize_with = "deser_empty_to_none")]
    pub username: Option<String>,
    #[validate(length(min = 2, message = "Name must be at least 2 characters"))]
    pub name: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
    pub role: Role,
    #[serde(default)]
    pub department_id: Option<String>,
    #[serde(default)]
    pub manager_id: Option<String>,
}

/// Missing fields stay as they are; `null` clears the nullable ones.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UserPatch {
    #[validate(length(min = 2, message = "Name must be at least 2 characters"))]
    pub name: Option<String>,
    #[validate(email(message = "Invalid email address"))]
    pub email: Option<String>,
    pub role: Option<Role>,
    #[serde(default, deserialize_with = "deser_nullable")]
    pub department_id: Option<Option<String>>,
    #[serde(default, deserialize_with = "deser_nullable")]
    pub manager_id: Option<Option<String>>,
    #[serde(default, deserialize_with = "deser_nullable")]
    pub username: Option<Option<String>>,
}

impl UserPatch {
    pub fn apply(&self, user: &mut User, now: DateTime<Utc>) {
        if let Some(name) = &self.name {
            user.name = name.clone();
        }
        if let Some(email) = &self.email {
            user.email = email.clone();
        }
        if let Some(role) = self.role {
            user.role = role;
        }
        if let Some(department_id) = &self.department_id {
            user.department_id = department_id.clone();
        }
        if let Some(manager_id) = &self.manager_id {
            user.manager_id = manager_id.clone();
        }
        if let Some(username) = &self.username {
            user.username = username.clone();
        }
        user.updated_at = Timestamp(now);
    }
}

/// What the store needs to insert a user; the password is already hashed.
#[derive(Debug, Clone)]
pub struct CreateUser {
    pub email: String,
    pub username: Option<String>,
    pub name: String,
    pub password_hash: String,
    pub role: Role,
    pub department_id: Option<String>,
    pub manager_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewDepartment {
    #[validate(length(min = 1, message = "Department name is required"))]
    pub name: String,
    #[serde(default)]
    pub gm_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewCustomer {
    /// Ignored for AMs, who always create for themselves.
    #[serde(default)]
    pub am_id: Option<String>,
    #[validate(length(min = 1, message = "Company name is required"))]
    pub company_name: String,
    #[validate(length(min = 1, message = "PIC name is required"))]
    pub pic: String,
    #[validate(custom(function = "validate_phone"))]
    pub phone: String,
    #[serde(default, deserialize_with = "deser_empty_to_none")]
    #[validate(email(message = "Invalid email"))]
    pub email: Option<String>,
    #[validate(range(exclusive_min = 0.0, message = "Potential must be positive"))]
    pub potential: f64,
    #[serde(default, deserialize_with = "deser_date")]
    pub timeline: Option<DateTime<Utc>>,
    pub status: CustomerStatus,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CustomerPatch {
    #[validate(length(min = 1, message = "Company name is required"))]
    pub company_name: Option<String>,
    #[validate(length(min = 1, message = "PIC name is required"))]
    pub pic: Option<String>,
    #[validate(custom(function = "validate_phone"))]
    pub phone: Option<String>,
    #[serde(default, deserialize_with = "deser_nullable")]
    pub email: Option<Option<String>>,
    #[validate(range(exclusive_min = 0.0, message = "Potential must be positive"))]
    pub potential: Option<f64>,
    #[serde(default, deserialize_with = "deser_nullable_date")]
    pub timeline: Option<Option<DateTime<Utc>>>,
    pub status: Option<CustomerStatus>,
}

impl CustomerPatch {
    /// `email: ""` clears the column like `null` does.
    pub fn normalize(mut self) -> Self {
        if let Some(Some(email)) = &self.email {
            if email.trim().is_empty() {
                self.email = Some(None);
            }
        }
        self
    }

    /// `am_id` is not part of the patch: ownership does not move on update.
    pub fn apply(&self, customer: &mut Customer, now: DateTime<Utc>) {
        if let Some(company_name) = &self.company_name {
            customer.company_name = company_name.clone();
        }
        if let Some(pic) = &self.pic {
            customer.pic = pic.clone();
        }
        if let Some(phone) = &self.phone {
            customer.phone = phone.clone();
        }
        if let Some(email) = &self.email {
            customer.email = email.clone();
        }
        if let Some(potential) = self.potential {
            customer.potential = potential;
        }
        if let Some(timeline) = self.timeline {
            customer.timeline = timeline.map(Timestamp);
        }
        if let Some(status) = self.status {
            customer.status = status;
        }
        customer.updated_at = Timestamp(now);
    }

    pub fn email_is_valid(&self) -> bool {
        match &self.email {
            Some(Some(email)) => email.validate_email(),
            _ => true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewProgress {
    #[validate(length(min = 1, message = "Customer is required"))]
    pub customer_id: String,
    #[validate(length(min = 1, message = "Description is required"))]
    pub description: String,
    pub status: CustomerStatus,
    /// Defaults to the time of the request.
    #[serde(default, deserialize_with = "deser_date")]
    pub date: Option<DateTime<Utc>>,
}

/// Progress as the store inserts it, author and date resolved.
#[derive(Debug, Clone)]
pub struct CreateProgress {
    pub customer_id: String,
    pub am_id: String,
    pub date: DateTime<Utc>,
    pub description: String,
    pub status: CustomerStatus,
}

fn default_currency() -> String {
    "IDR".to_owned()
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct TargetInput {
    #[validate(range(exclusive_min = 0.0, message = "Amount must be positive"))]
    pub amount: f64,
    #[serde(default = "default_currency")]
    #[validate(length(min = 1, max = 8, message = "Invalid currency"))]
    pub currency: String,
    #[validate(range(min = 1, max = 12, message = "Month must be between 1 and 12"))]
    pub month: u32,
    #[validate(range(min = 2000, max = 2100, message = "Invalid year"))]
    pub year: i32,
    #[serde(default, deserialize_with = "deser_empty_to_none")]
    pub department_id: Option<String>,
    #[serde(default, deserialize_with = "deser_empty_to_none")]
    pub user_id: Option<String>,
}
