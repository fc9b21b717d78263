use axum::http::{header, HeaderMap};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use jwt::{SignWithKey, VerifyWithKey};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::{
    error::{CrmError, CrmResult},
    libs::random_token,
    model::User,
    perm::{Actor, Role},
    AppState,
};

pub const ACCESS_COOKIE: &str = "accessToken";
pub const REFRESH_COOKIE: &str = "refreshToken";

/// Access token claims.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Token {
    /// user id
    pub sub: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

pub enum TokenVerification {
    Ok,
    Expired,
}

impl Token {
    pub fn verify(&self, now: DateTime<Utc>) -> TokenVerification {
        op::ternary!(self.exp > now.timestamp() => TokenVerification::Ok; TokenVerification::Expired)
    }
}

fn key(secret: &str) -> CrmResult<Hmac<Sha256>> {
    Hmac::new_from_slice(secret.as_bytes()).map_err(|e| CrmError::internal(e.to_string()))
}

/// Signs an HS256 access token for `user`, valid for `minutes`.
pub fn generate_jwt(secret: &str, user: &User, now: DateTime<Utc>, minutes: i64) -> CrmResult<String> {
    let token = Token {
        sub: user.id.clone(),
        role: user.role,
        iat: now.timestamp(),
        exp: (now + Duration::minutes(minutes)).timestamp(),
    };
    token
        .sign_with_key(&key(secret)?)
        .map_err(|e| CrmError::internal(e.to_string()))
}

/// `None` when the signature or the payload is bad. Expiry is not checked
/// here, see [`Token::verify`].
pub fn parse_jwt(secret: &str, token: &str) -> Option<Token> {
    let key = key(secret).ok()?;
    token.verify_with_key(&key).ok()
}

/// Opaque refresh token, stored server side as a session.
pub fn generate_refresh_token() -> String {
    random_token(48)
}

/// Credentials as they arrived on the request.
pub struct Bearer {
    token: String,
}

impl Bearer {
    /// `Authorization: Bearer ...` first, then the access token cookie.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let from_header = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(|v| v.trim().to_owned());
        from_header
            .or_else(|| read_cookie(headers, ACCESS_COOKIE))
            .filter(|token| !token.is_empty())
            .map(|token| Self { token })
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}

/// 获取请求头中的token
#[macro_export]
macro_rules! bearer {
    ($headers:expr) => {
        match $crate::token::Bearer::from_headers($headers) {
            Some(bearer) => bearer,
            None => {
                return Err($crate::Response::from($crate::error::CrmError::unauthorized(
                    "Authentication required",
                )))
            }
        }
    };
    ($headers:expr, Allow Missing) => {
        $crate::token::Bearer::from_headers($headers)
    };
}

pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_owned())
}

pub fn set_cookie(name: &str, value: &str, max_age_secs: i64) -> String {
    format!("{name}={value}; HttpOnly; SameSite=Lax; Path=/; Max-Age={max_age_secs}")
}

pub fn clear_cookie(name: &str) -> String {
    set_cookie(name, "", 0)
}

/// Turns request credentials into the live user behind them.
///
/// The user is re-read on every request, so a deleted user is locked out
/// even while its access token has not expired.
pub async fn authenticate(state: &AppState, bearer: &Bearer) -> CrmResult<User> {
    let token = parse_jwt(state.config.jwt_secret(), bearer.token())
        .ok_or_else(|| CrmError::unauthorized("Invalid token"))?;
    if let TokenVerification::Expired = token.verify(Utc::now()) {
        return Err(CrmError::unauthorized("Token expired"));
    }
    match state.store.get_user(&token.sub).await? {
        Some(user) => Ok(user),
        None => {
            tracing::info!(user = %token.sub, "token for a missing or deleted user");
            Err(CrmError::unauthorized("User no longer exists"))
        }
    }
}

/// Resolves the acting user for a handler. `Err` is ready to return.
pub async fn current_user(state: &AppState, headers: &HeaderMap) -> Result<User, crate::Response> {
    let bearer = bearer!(headers);
    Ok(authenticate(state, &bearer).await?)
}

pub async fn current_actor(state: &AppState, headers: &HeaderMap) -> Result<Actor, crate::Response> {
    current_user(state, headers).await.map(|user| Actor::from(&user))
}
