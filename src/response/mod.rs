use std::fmt::Display;

use axum::{
    http::{header, HeaderValue, StatusCode},
    Json,
};
use serde::{ser::SerializeStruct, Serialize};
use serde_json::{json, Value};

use crate::error::CrmError;

/// 响应数据
///
/// Every body has the same envelope: `{"status": i32, "code": u16, "data": ...}`.
/// `code` mirrors the HTTP status line, `status` is the application code
/// (0 success, see the constructors for the rest).
#[derive(Debug)]
pub struct Response {
    /// 响应状态码
    code: StatusCode,
    status: i32,
    data: Value,
    cookies: Vec<String>,
}

impl axum::response::IntoResponse for Response {
    fn into_response(self) -> axum::response::Response {
        let mut response = (self.code, Json(&self)).into_response();
        let headers = response.headers_mut();
        headers.insert(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-cache, no-store, must-revalidate"),
        );
        for cookie in &self.cookies {
            if let Ok(value) = HeaderValue::from_str(cookie) {
                headers.append(header::SET_COOKIE, value);
            }
        }
        response
    }
}

impl Serialize for Response {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut s = serializer.serialize_struct("Response", 3)?;
        s.serialize_field("status", &self.status)?;
        s.serialize_field("code", &self.code.as_u16())?;
        s.serialize_field("data", &self.data)?;
        s.end()
    }
}

impl Response {
    pub fn new(code: StatusCode, status: i32, data: Value) -> Response {
        Self {
            code,
            status,
            data,
            cookies: Vec::new(),
        }
    }
    pub fn ok(data: Value) -> Self {
        Self::new(StatusCode::OK, 0, data)
    }
    pub fn created(data: Value) -> Self {
        Self::new(StatusCode::CREATED, 0, data)
    }
    pub fn empty() -> Self {
        Self::new(StatusCode::OK, 0, json!("OK"))
    }
    /// Attach a `Set-Cookie` header.
    pub fn with_cookie(mut self, cookie: String) -> Self {
        self.cookies.push(cookie);
        self
    }
    pub fn token_error(e: impl Display) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, -1, json!({ "error": e.to_string() }))
    }
    /// 内部错误
    ///
    /// The detail only goes to the log, callers get a fixed message.
    pub fn internal_server_error(e: impl Display) -> Self {
        tracing::error!(error = %e, "internal server error");
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            -1,
            json!({ "error": "Internal server error" }),
        )
    }
    /// 参数格式错误
    pub fn invalid_format(e: impl Display) -> Self {
        Self::new(StatusCode::BAD_REQUEST, 1, json!({ "error": e.to_string() }))
    }
    /// 请求的数据不存在
    pub fn not_exist(e: impl Display) -> Self {
        Self::new(StatusCode::NOT_FOUND, 2, json!({ "error": e.to_string() }))
    }
    /// 要添加的数据已存在
    pub fn already_exist(e: impl Display) -> Self {
        Self::new(StatusCode::CONFLICT, 3, json!({ "error": e.to_string() }))
    }
    /// 权限不足
    pub fn permission_denied(e: impl Display) -> Self {
        Self::new(StatusCode::FORBIDDEN, 4, json!({ "error": e.to_string() }))
    }
    /// 密码错误
    pub fn wrong_password() -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            5,
            json!({ "error": "Invalid email or password" }),
        )
    }
    /// 数值不对
    pub fn invalid_value(fields: &crate::error::FieldErrors) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            7,
            json!({ "error": "Validation failed", "fields": fields }),
        )
    }
    pub fn code(&self) -> StatusCode {
        self.code
    }
    pub fn status(&self) -> i32 {
        self.status
    }
    pub fn data(&self) -> &Value {
        &self.data
    }
}

impl From<CrmError> for Response {
    fn from(value: CrmError) -> Self {
        match value {
            CrmError::Unauthorized(msg) => Response::token_error(msg),
            CrmError::InvalidCredentials => Response::wrong_password(),
            CrmError::Forbidden(msg) => Response::permission_denied(msg),
            CrmError::NotFound(msg) => Response::not_exist(msg),
            CrmError::Validation(fields) => Response::invalid_value(&fields),
            CrmError::Conflict(msg) => Response::already_exist(msg),
            e @ (CrmError::Database(_) | CrmError::Internal(_)) => {
                Response::internal_server_error(e)
            }
        }
    }
}

impl From<serde_json::Error> for Response {
    fn from(value: serde_json::Error) -> Self {
        Response::invalid_format(value)
    }
}

impl From<validator::ValidationErrors> for Response {
    fn from(value: validator::ValidationErrors) -> Self {
        CrmError::from(value).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_errors_do_not_leak_details() {
        let response = Response::from(CrmError::Database("table customer is locked".into()));
        assert_eq!(response.code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.data()["error"], "Internal server error");
    }

    #[test]
    fn validation_errors_carry_fields() {
        let response = Response::from(CrmError::invalid("potential", "must be positive"));
        assert_eq!(response.code(), StatusCode::BAD_REQUEST);
        assert_eq!(response.status(), 7);
        assert_eq!(response.data()["fields"]["potential"][0], "must be positive");
    }
}
