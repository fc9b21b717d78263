use axum::{extract::State, http::HeaderMap, routing::get, Json, Router};
use serde_json::{json, Value};
use validator::Validate;

use crate::{
    error::{CrmError, CrmResult},
    libs::dser::parse_body,
    model::{Department, NewDepartment, User},
    perm::{require_admin, Actor, Role},
    token::current_actor,
    AppState, Response, ResponseResult,
};

pub fn department_router() -> Router<AppState> {
    Router::new()
        .route(
            "/departments",
            get(list_departments).post(create_department_handler),
        )
        .route("/managers", get(list_managers_handler))
}

pub async fn create_department(
    state: &AppState,
    actor: &Actor,
    input: NewDepartment,
) -> CrmResult<Department> {
    require_admin(actor)?;
    input.validate()?;
    if let Some(gm_id) = &input.gm_id {
        match state.store.get_user(gm_id).await? {
            Some(user) if user.role == Role::Gm => {}
            _ => return Err(CrmError::invalid("gmId", "GM not found")),
        }
    }
    let department = state.store.create_department(&input).await?;
    tracing::info!(actor = %actor.id, department = %department.id, name = %department.name, "department created");
    Ok(department)
}

/// Everyone who can be set as a manager, by name.
pub async fn list_managers(state: &AppState) -> CrmResult<Vec<User>> {
    let (mut managers, admins) = tokio::try_join!(
        state.store.list_users(Some(Role::Gm)),
        state.store.list_users(Some(Role::Admin)),
    )?;
    managers.extend(admins);
    managers.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(managers)
}

/// Any signed-in user may read the department list.
async fn list_departments(State(state): State<AppState>, headers: HeaderMap) -> ResponseResult {
    current_actor(&state, &headers).await?;
    let departments = state.store.list_departments().await?;
    Ok(Response::ok(json!(departments)))
}

async fn create_department_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(value): Json<Value>,
) -> ResponseResult {
    let actor = current_actor(&state, &headers).await?;
    let input: NewDepartment = parse_body(value)?;
    let department = create_department(&state, &actor, input).await?;
    Ok(Response::created(json!(department)))
}

async fn list_managers_handler(State(state): State<AppState>, headers: HeaderMap) -> ResponseResult {
    let actor = current_actor(&state, &headers).await?;
    require_admin(&actor)?;
    Ok(Response::ok(json!(list_managers(&state).await?)))
}
