use axum::{extract::FromRef, http::StatusCode, Json};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use lazy_static::lazy_static;
use regex::Regex;
use time::Duration;

use super::{dto::UserData, extractors::SESSION_COOKIE, jwt::JwtKeys, repo_types::User};
use crate::{error::AppError, response::Envelope, state::AppState};

pub const MAX_NAME_LEN: usize = 30;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Trims and lowercases, then checks the format.
pub fn normalize_email(raw: &str) -> Result<String, AppError> {
    let email = raw.trim().to_lowercase();
    if !is_valid_email(&email) {
        return Err(AppError::Validation("please enter a correct email".into()));
    }
    Ok(email)
}

pub fn normalize_name(raw: &str) -> Result<String, AppError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(AppError::Validation("a user must have a name".into()));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(AppError::Validation(format!(
            "a name must not exceed {MAX_NAME_LEN} characters"
        )));
    }
    Ok(name.to_string())
}

pub fn session_cookie(token: String, state: &AppState) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .secure(state.config.env.is_production())
        .max_age(Duration::days(state.config.jwt.cookie_ttl_days))
        .build()
}

/// Overwrites the session cookie with a dummy value that expires shortly.
pub fn logout_cookie() -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, "loggedout"))
        .path("/")
        .http_only(true)
        .max_age(Duration::seconds(10))
        .build()
}

pub type SessionResponse = (StatusCode, CookieJar, Json<Envelope<UserData>>);

/// Issues a session token for `user`, delivered in the body and as a cookie.
pub fn send_session(
    state: &AppState,
    user: User,
    status: StatusCode,
) -> Result<SessionResponse, AppError> {
    let token = JwtKeys::from_ref(state).issue(user.id)?;
    let jar = CookieJar::new().add(session_cookie(token.clone(), state));
    Ok((
        status,
        jar,
        Json(Envelope::success(UserData { user }).with_token(token)),
    ))
}
