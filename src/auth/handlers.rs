use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use axum_extra::extract::CookieJar;
use serde_json::{json, Value};
use time::OffsetDateTime;
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        dto::{
            ForgotPasswordRequest, LoginRequest, ResetPasswordRequest, SignupRequest,
            UpdatePasswordRequest, ValidResetTokenData,
        },
        extractors::CurrentUser,
        password::{hash_password, validate_new_password, verify_password},
        reset,
        roles::Role,
        services::{
            logout_cookie, normalize_email, normalize_name, send_session, SessionResponse,
        },
        store::{NewUser, UserScope},
    },
    error::{AppError, AppJson, AppPath},
    response::Envelope,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/users/signup", post(signup))
        .route("/users/login", post(login))
        .route("/users/logout", post(logout))
        .route("/users/forgotPassword", post(forgot_password))
        .route("/users/resetPassword/:token", patch(reset_password))
        .route("/users/valid/:reset_token", get(is_valid_reset_token))
        .route("/users/updateMyPassword", patch(update_my_password))
}

#[instrument(skip(state, payload))]
pub async fn signup(
    State(state): State<AppState>,
    AppJson(payload): AppJson<SignupRequest>,
) -> Result<SessionResponse, AppError> {
    let name = normalize_name(&payload.name)?;
    let email = normalize_email(&payload.email)?;
    validate_new_password(&payload.password, &payload.password_confirm)?;

    let user = state
        .credentials
        .create(NewUser {
            name,
            email,
            password_hash: hash_password(&payload.password)?,
            role: Role::User,
        })
        .await?;
    info!(user_id = %user.id, email = %user.email, "user registered");

    let welcome = format!(
        "Welcome to Placemark, {}!\n\nThank you for signing up. We're excited to have you on board.",
        user.name
    );
    if let Err(e) = state
        .mailer
        .send(&user.email, "Welcome to our platform!", welcome)
        .await
    {
        warn!(error = %e, user_id = %user.id, "welcome email not delivered");
    }

    send_session(&state, user, StatusCode::CREATED)
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    AppJson(payload): AppJson<LoginRequest>,
) -> Result<SessionResponse, AppError> {
    let (Some(email), Some(password)) = (payload.email, payload.password) else {
        return Err(AppError::Validation(
            "please provide an email and a password".into(),
        ));
    };
    let email = email.trim().to_lowercase();

    let user = state
        .credentials
        .find_by_email(&email, UserScope::Active)
        .await?;
    let Some(user) = user else {
        warn!(%email, "login unknown email");
        return Err(AppError::InvalidCredentials("incorrect email or password"));
    };
    if !verify_password(&password, &user.password_hash)? {
        warn!(%email, user_id = %user.id, "login invalid password");
        return Err(AppError::InvalidCredentials("incorrect email or password"));
    }

    info!(user_id = %user.id, "user logged in");
    send_session(&state, user, StatusCode::OK)
}

pub async fn logout() -> (CookieJar, Json<Value>) {
    let jar = CookieJar::new().add(logout_cookie());
    (jar, Json(json!({ "status": "success" })))
}

#[instrument(skip(state, payload))]
pub async fn forgot_password(
    State(state): State<AppState>,
    AppJson(payload): AppJson<ForgotPasswordRequest>,
) -> Result<Json<Envelope<()>>, AppError> {
    let email = normalize_email(&payload.email)?;
    reset::request_reset(&state, &email).await?;
    Ok(Json(Envelope::success(()).with_message("Token sent to email!")))
}

#[instrument(skip(state, token, payload))]
pub async fn reset_password(
    State(state): State<AppState>,
    AppPath(token): AppPath<String>,
    AppJson(payload): AppJson<ResetPasswordRequest>,
) -> Result<SessionResponse, AppError> {
    let user =
        reset::consume_reset(&state, &token, &payload.password, &payload.password_confirm).await?;
    send_session(&state, user, StatusCode::OK)
}

#[instrument(skip(state, reset_token))]
pub async fn is_valid_reset_token(
    State(state): State<AppState>,
    AppPath(reset_token): AppPath<String>,
) -> Result<Json<Envelope<ValidResetTokenData>>, AppError> {
    let user = reset::validate_token(&state, &reset_token).await?;
    Ok(Json(Envelope::success(ValidResetTokenData {
        is_exist: true,
        user,
    })))
}

#[instrument(skip(state, current, payload), fields(user_id = %current.0.id))]
pub async fn update_my_password(
    State(state): State<AppState>,
    current: CurrentUser,
    AppJson(payload): AppJson<UpdatePasswordRequest>,
) -> Result<SessionResponse, AppError> {
    let CurrentUser(user) = current;
    if !verify_password(&payload.password_current, &user.password_hash)? {
        warn!(user_id = %user.id, "wrong current password");
        return Err(AppError::InvalidCredentials("Your current password is wrong."));
    }
    validate_new_password(&payload.password, &payload.password_confirm)?;

    let hash = hash_password(&payload.password)?;
    let user = state
        .credentials
        .set_password(user.id, &hash, OffsetDateTime::now_utc())
        .await?;
    info!(user_id = %user.id, "password updated");
    send_session(&state, user, StatusCode::OK)
}
