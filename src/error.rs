use std::collections::BTreeMap;

use axum::http::StatusCode;
use thiserror::Error;

/// Field name -> messages, as reported back to the caller on a 400.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

/// Failures raised by the policy, scoping and storage layers.
///
/// Handlers never build status codes themselves: they return a `CrmError`
/// and the conversion into [`crate::Response`] picks the code from
/// [`CrmError::status_code`].
#[derive(Error, Debug)]
pub enum CrmError {
    /// No valid actor could be resolved for the request.
    #[error("{0}")]
    Unauthorized(String),

    #[error("Invalid email or password")]
    InvalidCredentials,

    /// Valid actor, disallowed action.
    #[error("{0}")]
    Forbidden(String),

    /// Absent, or deliberately hidden because it is out of the actor's scope.
    #[error("{0}")]
    NotFound(String),

    #[error("Validation failed")]
    Validation(FieldErrors),

    #[error("{0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

pub type CrmResult<T> = Result<T, CrmError>;

impl CrmError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) | Self::InvalidCredentials => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Database(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// A single-field validation failure.
    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        let mut fields = FieldErrors::new();
        fields.insert(field.to_owned(), vec![message.into()]);
        Self::Validation(fields)
    }
}

/// Validation reports Rust field names; callers know the JSON ones.
fn camel_case(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut upper = false;
    for c in field.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

impl From<validator::ValidationErrors> for CrmError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let fields = errors
            .field_errors()
            .into_iter()
            .map(|(field, errs)| {
                let messages = errs
                    .iter()
                    .map(|e| {
                        e.message
                            .as_ref()
                            .map(|m| m.to_string())
                            .unwrap_or_else(|| format!("Invalid value for {}", field))
                    })
                    .collect();
                (camel_case(&field), messages)
            })
            .collect();
        Self::Validation(fields)
    }
}

impl From<mysql::Error> for CrmError {
    fn from(err: mysql::Error) -> Self {
        match err {
            mysql::Error::MySqlError(e) if e.code == crate::database::Database::DUPLICATE_KEY_ERROR_CODE => {
                Self::Conflict(e.message)
            }
            e => Self::Database(e.to_string()),
        }
    }
}

impl From<mysql::FromRowError> for CrmError {
    fn from(err: mysql::FromRowError) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<tokio::task::JoinError> for CrmError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Internal(err.to_string())
    }
}
