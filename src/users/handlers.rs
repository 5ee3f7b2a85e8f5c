use axum::{
    extract::State,
    http::StatusCode,
    routing::{delete, get, patch},
    Json, Router,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::{
        extractors::CurrentUser,
        password::{hash_password, validate_new_password},
        roles::{Capability, Role},
        services::{normalize_email, normalize_name},
        repo_types::User,
        store::{NewUser, ProfileUpdate, UserScope},
        UserData,
    },
    error::{AppError, AppJson, AppPath, AppQuery},
    query::ListQuery,
    response::Envelope,
    state::AppState,
};

use super::{
    dto::{AdminUpdateUserRequest, CreateUserRequest, ScopeParams, UpdateMeRequest, UsersData},
    repo,
};

const INCLUDE_INACTIVE: &str = "includeInactive";

pub fn self_service_routes() -> Router<AppState> {
    Router::new()
        .route("/users/me", get(get_me))
        .route("/users/updateMe", patch(update_me))
        .route("/users/deleteMe", delete(delete_me))
}

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route(
            "/users/:id",
            get(get_user).patch(update_user).delete(delete_user),
        )
}

/// Soft-deleted users are only visible to callers allowed to ask for them.
fn requested_scope(current: &CurrentUser, include_inactive: bool) -> Result<UserScope, AppError> {
    if !include_inactive {
        return Ok(UserScope::Active);
    }
    current.authorize(Capability::IncludeInactiveUsers)?;
    Ok(UserScope::IncludeInactive)
}

/// Only admins hand out elevated roles.
fn check_role_grant(current: &CurrentUser, role: Option<Role>) -> Result<(), AppError> {
    match role {
        Some(r) if r != Role::User && current.0.role != Role::Admin => {
            warn!(user_id = %current.0.id, role = %r, "role grant refused");
            Err(AppError::Forbidden)
        }
        _ => Ok(()),
    }
}

/// Accounts holding an elevated role are managed by admins only.
fn check_target(current: &CurrentUser, target: &User) -> Result<(), AppError> {
    if target.role != Role::User && current.0.role != Role::Admin {
        warn!(
            user_id = %current.0.id,
            target_id = %target.id,
            "staff edit of elevated account refused"
        );
        return Err(AppError::Forbidden);
    }
    Ok(())
}

#[instrument(skip_all, fields(user_id = %current.0.id))]
pub async fn get_me(current: CurrentUser) -> Json<Envelope<UserData>> {
    Json(Envelope::success(UserData { user: current.0 }))
}

#[instrument(skip(state, current, payload), fields(user_id = %current.0.id))]
pub async fn update_me(
    State(state): State<AppState>,
    current: CurrentUser,
    AppJson(payload): AppJson<UpdateMeRequest>,
) -> Result<Json<Envelope<UserData>>, AppError> {
    if payload.touches_password() {
        return Err(AppError::Validation(
            "This route is not for password updates. Please use /updateMyPassword.".into(),
        ));
    }
    let update = ProfileUpdate {
        name: payload.name.as_deref().map(normalize_name).transpose()?,
        email: payload.email.as_deref().map(normalize_email).transpose()?,
        ..ProfileUpdate::default()
    };

    let user = state
        .credentials
        .update_profile(current.0.id, update)
        .await?
        .ok_or_else(|| AppError::not_found("user"))?;
    info!(user_id = %user.id, "profile updated");
    Ok(Json(Envelope::success(UserData { user })))
}

#[instrument(skip(state, current), fields(user_id = %current.0.id))]
pub async fn delete_me(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<StatusCode, AppError> {
    state.credentials.deactivate(current.0.id).await?;
    info!(user_id = %current.0.id, "user deactivated");
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, current, params), fields(user_id = %current.0.id))]
pub async fn list_users(
    State(state): State<AppState>,
    current: CurrentUser,
    AppQuery(scope): AppQuery<ScopeParams>,
    AppQuery(params): AppQuery<Vec<(String, String)>>,
) -> Result<Json<Envelope<UsersData>>, AppError> {
    current.authorize(Capability::ListUsers)?;
    let scope = requested_scope(&current, scope.include_inactive)?;

    let params: Vec<_> = params
        .into_iter()
        .filter(|(k, _)| k != INCLUDE_INACTIVE)
        .collect();
    let q = ListQuery::parse(&repo::USERS, &params)?;
    let users = repo::list(&state.db, &q, scope).await?;
    let n = users.len();
    Ok(Json(Envelope::success(UsersData { users }).with_results(n)))
}

#[instrument(skip(state, current, payload), fields(user_id = %current.0.id))]
pub async fn create_user(
    State(state): State<AppState>,
    current: CurrentUser,
    AppJson(payload): AppJson<CreateUserRequest>,
) -> Result<(StatusCode, Json<Envelope<UserData>>), AppError> {
    current.authorize(Capability::CreateUser)?;
    check_role_grant(&current, payload.role)?;

    let name = normalize_name(&payload.name)?;
    let email = normalize_email(&payload.email)?;
    validate_new_password(&payload.password, &payload.password_confirm)?;

    let user = state
        .credentials
        .create(NewUser {
            name,
            email,
            password_hash: hash_password(&payload.password)?,
            role: payload.role.unwrap_or_default(),
        })
        .await?;
    info!(created = %user.id, role = %user.role, "user created by staff");
    Ok((StatusCode::CREATED, Json(Envelope::success(UserData { user }))))
}

#[instrument(skip(state, current), fields(user_id = %current.0.id))]
pub async fn get_user(
    State(state): State<AppState>,
    current: CurrentUser,
    AppPath(id): AppPath<Uuid>,
    AppQuery(scope): AppQuery<ScopeParams>,
) -> Result<Json<Envelope<UserData>>, AppError> {
    current.authorize(Capability::ReadUser)?;
    let scope = requested_scope(&current, scope.include_inactive)?;

    let user = state
        .credentials
        .find_by_id(id, scope)
        .await?
        .ok_or_else(|| AppError::not_found("user"))?;
    Ok(Json(Envelope::success(UserData { user })))
}

#[instrument(skip(state, current, payload), fields(user_id = %current.0.id))]
pub async fn update_user(
    State(state): State<AppState>,
    current: CurrentUser,
    AppPath(id): AppPath<Uuid>,
    AppJson(payload): AppJson<AdminUpdateUserRequest>,
) -> Result<Json<Envelope<UserData>>, AppError> {
    current.authorize(Capability::UpdateUser)?;
    check_role_grant(&current, payload.role)?;
    if payload.active.is_some() {
        current.authorize(Capability::IncludeInactiveUsers)?;
    }
    let target = state
        .credentials
        .find_by_id(id, UserScope::IncludeInactive)
        .await?
        .ok_or_else(|| AppError::not_found("user"))?;
    check_target(&current, &target)?;

    let update = ProfileUpdate {
        name: payload.name.as_deref().map(normalize_name).transpose()?,
        email: payload.email.as_deref().map(normalize_email).transpose()?,
        role: payload.role,
        active: payload.active,
    };
    let user = state
        .credentials
        .update_profile(target.id, update)
        .await?
        .ok_or_else(|| AppError::not_found("user"))?;
    info!(updated = %user.id, "user updated by staff");
    Ok(Json(Envelope::success(UserData { user })))
}

#[instrument(skip(state, current), fields(user_id = %current.0.id))]
pub async fn delete_user(
    State(state): State<AppState>,
    current: CurrentUser,
    AppPath(id): AppPath<Uuid>,
) -> Result<StatusCode, AppError> {
    current.authorize(Capability::DeleteUser)?;
    if !state.credentials.delete(id).await? {
        return Err(AppError::not_found("user"));
    }
    info!(deleted = %id, "user deleted");
    Ok(StatusCode::NO_CONTENT)
}
