//! 员工管理
//!
//! ADMIN only, apart from reading the department list.

mod department;

use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use validator::Validate;

use crate::{
    error::{CrmError, CrmResult},
    libs::{dser::parse_body, password::hash_password},
    model::{CreateUser, NewUser, User, UserPatch},
    perm::{require_admin, Actor, Role},
    token::current_actor,
    AppState, Response, ResponseResult,
};

pub fn user_router() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users_handler).post(create_user_handler))
        .route(
            "/users/:id",
            get(get_user_handler)
                .put(update_user_handler)
                .delete(delete_user_handler),
        )
        .route("/users/:id/reset-password", post(reset_password_handler))
        .merge(department::department_router())
}

/// Role, department and manager must agree with each other and with the store.
async fn check_placement(
    state: &AppState,
    role: Role,
    department_id: Option<&str>,
    manager_id: Option<&str>,
) -> CrmResult<()> {
    if role == Role::Gm && department_id.is_none() {
        return Err(CrmError::invalid("departmentId", "A GM must belong to a department"));
    }
    if let Some(department_id) = department_id {
        if state.store.get_department(department_id).await?.is_none() {
            return Err(CrmError::invalid("departmentId", "Department not found"));
        }
    }
    if let Some(manager_id) = manager_id {
        let manager = state.store.get_user(manager_id).await?;
        match manager.map(|m| m.role) {
            Some(Role::Gm | Role::Admin) => {}
            Some(Role::Am) => {
                return Err(CrmError::invalid("managerId", "Manager must be a GM or an admin"))
            }
            None => return Err(CrmError::invalid("managerId", "Manager not found")),
        }
    }
    Ok(())
}

pub async fn create_user(state: &AppState, actor: &Actor, input: NewUser) -> CrmResult<User> {
    require_admin(actor)?;
    input.validate()?;
    check_placement(
        state,
        input.role,
        input.department_id.as_deref(),
        input.manager_id.as_deref(),
    )
    .await?;
    let user = state
        .store
        .create_user(CreateUser {
            email: input.email.trim().to_owned(),
            username: input.username,
            name: input.name,
            password_hash: hash_password(&input.password).await?,
            role: input.role,
            department_id: input.department_id,
            manager_id: input.manager_id,
        })
        .await?;
    tracing::info!(actor = %actor.id, user = %user.id, role = %user.role, "user created");
    Ok(user)
}

pub async fn update_user(
    state: &AppState,
    actor: &Actor,
    id: &str,
    patch: UserPatch,
) -> CrmResult<User> {
    require_admin(actor)?;
    patch.validate()?;
    let current = state
        .store
        .get_user(id)
        .await?
        .ok_or_else(|| CrmError::not_found("User not found"))?;
    let mut merged = current.clone();
    patch.apply(&mut merged, *current.updated_at);
    check_placement(
        state,
        merged.role,
        merged.department_id.as_deref(),
        merged.manager_id.as_deref(),
    )
    .await?;
    if merged.manager_id.as_deref() == Some(id) {
        return Err(CrmError::invalid("managerId", "A user cannot manage themselves"));
    }
    let user = state
        .store
        .update_user(id, &patch)
        .await?
        .ok_or_else(|| CrmError::not_found("User not found"))?;
    tracing::info!(actor = %actor.id, user = %user.id, "user updated");
    Ok(user)
}

/// Soft delete. Open sessions of the user are revoked with it.
pub async fn delete_user(state: &AppState, actor: &Actor, id: &str) -> CrmResult<()> {
    require_admin(actor)?;
    if actor.id == id {
        return Err(CrmError::invalid("id", "You cannot delete your own account"));
    }
    if !state.store.soft_delete_user(id).await? {
        return Err(CrmError::not_found("User not found"));
    }
    let revoked = state.store.delete_user_sessions(id).await?;
    tracing::info!(actor = %actor.id, user = %id, revoked, "user deleted");
    Ok(())
}

#[derive(Deserialize, Validate)]
struct NewPassword {
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    password: String,
}

pub async fn reset_password(
    state: &AppState,
    actor: &Actor,
    id: &str,
    password: &str,
) -> CrmResult<()> {
    require_admin(actor)?;
    let hash = hash_password(password).await?;
    if !state.store.set_password(id, &hash).await? {
        return Err(CrmError::not_found("User not found"));
    }
    let revoked = state.store.delete_user_sessions(id).await?;
    tracing::info!(actor = %actor.id, user = %id, revoked, "password reset");
    Ok(())
}

#[derive(Deserialize)]
struct UserFilter {
    #[serde(default)]
    role: Option<Role>,
}

async fn list_users_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    filter: Result<Query<UserFilter>, QueryRejection>,
) -> ResponseResult {
    let actor = current_actor(&state, &headers).await?;
    require_admin(&actor)?;
    let Query(filter) = filter.map_err(Response::invalid_format)?;
    let users = state.store.list_users(filter.role).await?;
    Ok(Response::ok(json!(users)))
}

async fn get_user_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ResponseResult {
    let actor = current_actor(&state, &headers).await?;
    require_admin(&actor)?;
    let user = state
        .store
        .get_user(&id)
        .await?
        .ok_or_else(|| CrmError::not_found("User not found"))?;
    Ok(Response::ok(json!(user)))
}

async fn create_user_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(value): Json<Value>,
) -> ResponseResult {
    let actor = current_actor(&state, &headers).await?;
    let input: NewUser = parse_body(value)?;
    let user = create_user(&state, &actor, input).await?;
    Ok(Response::created(json!(user)))
}

async fn update_user_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(value): Json<Value>,
) -> ResponseResult {
    let actor = current_actor(&state, &headers).await?;
    let patch: UserPatch = parse_body(value)?;
    let user = update_user(&state, &actor, &id, patch).await?;
    Ok(Response::ok(json!(user)))
}

async fn delete_user_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ResponseResult {
    let actor = current_actor(&state, &headers).await?;
    delete_user(&state, &actor, &id).await?;
    Ok(Response::empty())
}

async fn reset_password_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(value): Json<Value>,
) -> ResponseResult {
    let actor = current_actor(&state, &headers).await?;
    let body: NewPassword = parse_body(value)?;
    body.validate()?;
    reset_password(&state, &actor, &id, &body.password).await?;
    Ok(Response::empty())
}
