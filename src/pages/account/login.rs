use axum::{body::Bytes, extract::State, http::HeaderMap, Json};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{
    error::{CrmError, CrmResult},
    libs::{dser::parse_body, password::verify_password},
    model::User,
    token::{
        clear_cookie, current_user, generate_jwt, generate_refresh_token, read_cookie, set_cookie,
        ACCESS_COOKIE, REFRESH_COOKIE,
    },
    AppState, Response, ResponseResult,
};

#[derive(Deserialize)]
struct LoginID {
    /// email, or a username
    #[serde(alias = "username", alias = "login")]
    email: String,
    password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginOutcome {
    pub user: User,
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct RefreshBody {
    #[serde(default)]
    refresh_token: Option<String>,
}

/// Unknown login and wrong password look the same to the caller.
pub async fn login(
    state: &AppState,
    login: &str,
    password: &str,
    now: DateTime<Utc>,
) -> CrmResult<LoginOutcome> {
    let Some(user) = state.store.find_user_by_login(login).await? else {
        tracing::info!(login, "login for unknown user");
        return Err(CrmError::InvalidCredentials);
    };
    if let Err(e) = verify_password(password, &user.password).await {
        tracing::info!(user = %user.id, "login with wrong password");
        return Err(e);
    }
    let access_token = generate_jwt(
        state.config.jwt_secret(),
        &user,
        now,
        state.config.access_token_minutes(),
    )?;
    let refresh_token = generate_refresh_token();
    let expires_at = now + Duration::days(state.config.refresh_token_days());
    state
        .store
        .create_session(&user.id, &refresh_token, expires_at)
        .await?;
    tracing::info!(user = %user.id, role = %user.role, "logged in");
    Ok(LoginOutcome {
        user,
        access_token,
        refresh_token,
    })
}

/// A fresh access token for a live session. The refresh token itself is kept.
pub async fn refresh_access(
    state: &AppState,
    refresh_token: &str,
    now: DateTime<Utc>,
) -> CrmResult<(User, String)> {
    let session = state
        .store
        .find_session(refresh_token)
        .await?
        .ok_or_else(|| CrmError::unauthorized("Invalid refresh token"))?;
    if session.is_expired(now) {
        state.store.delete_session(refresh_token).await?;
        return Err(CrmError::unauthorized("Refresh token expired"));
    }
    let user = state
        .store
        .get_user(&session.user_id)
        .await?
        .ok_or_else(|| CrmError::unauthorized("User no longer exists"))?;
    let access_token = generate_jwt(
        state.config.jwt_secret(),
        &user,
        now,
        state.config.access_token_minutes(),
    )?;
    Ok((user, access_token))
}

fn access_cookie(state: &AppState, token: &str) -> String {
    set_cookie(ACCESS_COOKIE, token, state.config.access_token_minutes() * 60)
}

/// Optional JSON body, the refresh token falls back to its cookie.
fn refresh_token_from(headers: &HeaderMap, body: &Bytes) -> Result<Option<String>, Response> {
    let body: RefreshBody = if body.is_empty() {
        RefreshBody::default()
    } else {
        serde_json::from_slice(body)?
    };
    Ok(body
        .refresh_token
        .filter(|t| !t.is_empty())
        .or_else(|| read_cookie(headers, REFRESH_COOKIE)))
}

pub async fn user_login(State(state): State<AppState>, Json(value): Json<Value>) -> ResponseResult {
    let id: LoginID = parse_body(value)?;
    if id.email.trim().is_empty() {
        return Err(CrmError::invalid("email", "Email or username is required").into());
    }
    let outcome = login(&state, &id.email, &id.password, Utc::now()).await?;
    let refresh_max_age = state.config.refresh_token_days() * 24 * 60 * 60;
    Ok(Response::ok(json!(outcome))
        .with_cookie(access_cookie(&state, &outcome.access_token))
        .with_cookie(set_cookie(REFRESH_COOKIE, &outcome.refresh_token, refresh_max_age)))
}

pub async fn refresh(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> ResponseResult {
    let token = refresh_token_from(&headers, &body)?
        .ok_or_else(|| Response::from(CrmError::unauthorized("Refresh token required")))?;
    let (user, access_token) = refresh_access(&state, &token, Utc::now()).await?;
    Ok(Response::ok(json!({ "user": user, "accessToken": access_token }))
        .with_cookie(access_cookie(&state, &access_token)))
}

/// Always succeeds; an unknown token simply has nothing to revoke.
pub async fn logout(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> ResponseResult {
    if let Some(token) = refresh_token_from(&headers, &body)? {
        if state.store.delete_session(&token).await? {
            tracing::info!("session revoked on logout");
        }
    }
    Ok(Response::empty()
        .with_cookie(clear_cookie(ACCESS_COOKIE))
        .with_cookie(clear_cookie(REFRESH_COOKIE)))
}

pub async fn me(State(state): State<AppState>, headers: HeaderMap) -> ResponseResult {
    let user = current_user(&state, &headers).await?;
    Ok(Response::ok(json!(user)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        seed::{seed_demo_org, DEMO_PASSWORD},
        token::parse_jwt,
        Config,
    };

    async fn state() -> AppState {
        let state = AppState::in_memory(Config::for_tests());
        seed_demo_org(state.store.as_ref()).await.unwrap();
        state
    }

    #[tokio::test]
    async fn login_by_email_or_username() {
        let state = state().await;
        let by_email = login(&state, "am1@crm.local", DEMO_PASSWORD, Utc::now()).await.unwrap();
        let by_name = login(&state, "AM1", DEMO_PASSWORD, Utc::now()).await.unwrap();
        assert_eq!(by_email.user.id, by_name.user.id);
        let token = parse_jwt(state.config.jwt_secret(), &by_email.access_token).unwrap();
        assert_eq!(token.sub, by_email.user.id);
    }

    #[tokio::test]
    async fn bad_credentials_are_indistinguishable() {
        let state = state().await;
        let wrong = login(&state, "am1@crm.local", "nope-nope", Utc::now()).await;
        let unknown = login(&state, "ghost@crm.local", DEMO_PASSWORD, Utc::now()).await;
        assert!(matches!(wrong, Err(CrmError::InvalidCredentials)));
        assert!(matches!(unknown, Err(CrmError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn refresh_needs_a_live_session_and_user() {
        let state = state().await;
        let now = Utc::now();
        let outcome = login(&state, "am2", DEMO_PASSWORD, now).await.unwrap();
        assert!(refresh_access(&state, &outcome.refresh_token, now).await.is_ok());

        let later = now + Duration::days(state.config.refresh_token_days() + 1);
        assert!(matches!(
            refresh_access(&state, &outcome.refresh_token, later).await,
            Err(CrmError::Unauthorized(_))
        ));

        let again = login(&state, "am2", DEMO_PASSWORD, now).await.unwrap();
        state.store.soft_delete_user(&again.user.id).await.unwrap();
        assert!(matches!(
            refresh_access(&state, &again.refresh_token, now).await,
            Err(CrmError::Unauthorized(_))
        ));
    }
}
