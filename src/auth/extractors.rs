use std::convert::Infallible;

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use axum_extra::extract::CookieJar;
use tracing::warn;

use super::{jwt::JwtKeys, repo_types::User, roles::Capability, store::UserScope};
use crate::{error::AppError, state::AppState};

/// Name of the cookie carrying the session token.
pub const SESSION_COOKIE: &str = "jwt";

/// Session token from `Authorization: Bearer`, falling back to the cookie.
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer ").or_else(|| h.strip_prefix("bearer ")))
        .map(str::trim)
        .filter(|t| !t.is_empty());
    if let Some(token) = bearer {
        return Some(token.to_string());
    }
    CookieJar::from_headers(headers)
        .get(SESSION_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|t| !t.is_empty())
}

/// Resolves a session token to an active user whose password has not changed
/// since the token was issued.
pub async fn authenticate(state: &AppState, token: &str) -> Result<User, AppError> {
    let keys = JwtKeys::from_ref(state);
    let claims = keys.verify(token).map_err(|e| {
        warn!(error = %e, "invalid or expired token");
        AppError::NotAuthenticated
    })?;

    let user = state
        .credentials
        .find_by_id(claims.sub, UserScope::Active)
        .await?
        .ok_or_else(|| {
            warn!(user_id = %claims.sub, "token subject no longer exists");
            AppError::UserGone
        })?;

    if user.changed_password_after(claims.iat as i64) {
        warn!(user_id = %user.id, "token issued before password change");
        return Err(AppError::StaleToken);
    }
    Ok(user)
}

/// Authenticated caller. Rejects the request when authentication fails.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

impl CurrentUser {
    pub fn can(&self, capability: Capability) -> bool {
        self.0.role.allows(capability)
    }

    /// Role gate. Only reachable with an authenticated user, so a failure here
    /// is always 403.
    pub fn authorize(&self, capability: Capability) -> Result<(), AppError> {
        if self.can(capability) {
            Ok(())
        } else {
            warn!(user_id = %self.0.id, role = %self.0.role, ?capability, "forbidden");
            Err(AppError::Forbidden)
        }
    }
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = session_token(&parts.headers).ok_or(AppError::NotAuthenticated)?;
        authenticate(state, &token).await.map(CurrentUser)
    }
}

/// Same checks as [`CurrentUser`], but any failure just means "guest".
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<User>);

#[async_trait]
impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(token) = session_token(&parts.headers) else {
            return Ok(MaybeUser(None));
        };
        Ok(MaybeUser(authenticate(state, &token).await.ok()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::http::Request;
    use time::{Duration, OffsetDateTime};

    use super::*;
    use crate::{
        auth::{
            roles::Role,
            store::{memory::MemoryCredentialStore, CredentialStore, NewUser},
        },
        mailer::LogMailer,
    };

    async fn setup(role: Role) -> (AppState, Arc<MemoryCredentialStore>, User) {
        let store = Arc::new(MemoryCredentialStore::new());
        let user = store
            .create(NewUser {
                name: "Sami".into(),
                email: "sami@example.com".into(),
                password_hash: "unused".into(),
                role,
            })
            .await
            .unwrap();
        let state = AppState::for_tests(store.clone(), Arc::new(LogMailer));
        (state, store, user)
    }

    fn parts_with(header: Option<(&str, String)>) -> Parts {
        let mut builder = Request::builder().uri("/api/users/me");
        if let Some((name, value)) = header {
            builder = builder.header(name, value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[tokio::test]
    async fn missing_token_is_not_authenticated() {
        let (state, _, _) = setup(Role::User).await;
        let err = CurrentUser::from_request_parts(&mut parts_with(None), &state)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotAuthenticated));
    }

    #[tokio::test]
    async fn bearer_token_resolves_user() {
        let (state, _, user) = setup(Role::User).await;
        let token = JwtKeys::from_ref(&state).issue(user.id).unwrap();
        let mut parts = parts_with(Some(("authorization", format!("Bearer {token}"))));
        let CurrentUser(found) = CurrentUser::from_request_parts(&mut parts, &state).await.unwrap();
        assert_eq!(found.id, user.id);
    }

    #[tokio::test]
    async fn cookie_token_is_accepted() {
        let (state, _, user) = setup(Role::User).await;
        let token = JwtKeys::from_ref(&state).issue(user.id).unwrap();
        let mut parts = parts_with(Some(("cookie", format!("theme=dark; jwt={token}"))));
        assert!(CurrentUser::from_request_parts(&mut parts, &state).await.is_ok());
    }

    #[tokio::test]
    async fn logged_out_cookie_is_rejected() {
        let (state, _, _) = setup(Role::User).await;
        let mut parts = parts_with(Some(("cookie", "jwt=loggedout".into())));
        let err = CurrentUser::from_request_parts(&mut parts, &state).await.unwrap_err();
        assert!(matches!(err, AppError::NotAuthenticated));
    }

    #[tokio::test]
    async fn deactivated_user_is_gone() {
        let (state, store, user) = setup(Role::User).await;
        let token = JwtKeys::from_ref(&state).issue(user.id).unwrap();
        store.deactivate(user.id).await.unwrap();
        let mut parts = parts_with(Some(("authorization", format!("Bearer {token}"))));
        let err = CurrentUser::from_request_parts(&mut parts, &state).await.unwrap_err();
        assert!(matches!(err, AppError::UserGone));
    }

    #[tokio::test]
    async fn token_older_than_password_change_is_stale() {
        let (state, store, user) = setup(Role::User).await;
        let issued = OffsetDateTime::now_utc() - Duration::minutes(10);
        let token = JwtKeys::from_ref(&state).issue_at(user.id, issued).unwrap();
        store
            .set_password(user.id, "new-hash", OffsetDateTime::now_utc())
            .await
            .unwrap();
        let mut parts = parts_with(Some(("authorization", format!("Bearer {token}"))));
        let err = CurrentUser::from_request_parts(&mut parts, &state).await.unwrap_err();
        assert!(matches!(err, AppError::StaleToken));
    }

    #[tokio::test]
    async fn token_issued_after_password_change_is_fine() {
        let (state, store, user) = setup(Role::User).await;
        store
            .set_password(user.id, "new-hash", OffsetDateTime::now_utc() - Duration::minutes(5))
            .await
            .unwrap();
        let token = JwtKeys::from_ref(&state).issue(user.id).unwrap();
        let mut parts = parts_with(Some(("authorization", format!("Bearer {token}"))));
        assert!(CurrentUser::from_request_parts(&mut parts, &state).await.is_ok());
    }

    #[tokio::test]
    async fn maybe_user_swallows_failures() {
        let (state, _, user) = setup(Role::User).await;
        let MaybeUser(guest) = MaybeUser::from_request_parts(&mut parts_with(None), &state)
            .await
            .unwrap();
        assert!(guest.is_none());

        let mut bad = parts_with(Some(("authorization", "Bearer garbage".into())));
        let MaybeUser(guest) = MaybeUser::from_request_parts(&mut bad, &state).await.unwrap();
        assert!(guest.is_none());

        let token = JwtKeys::from_ref(&state).issue(user.id).unwrap();
        let mut good = parts_with(Some(("authorization", format!("Bearer {token}"))));
        let MaybeUser(known) = MaybeUser::from_request_parts(&mut good, &state).await.unwrap();
        assert_eq!(known.map(|u| u.id), Some(user.id));
    }

    #[tokio::test]
    async fn plain_user_is_forbidden_not_unauthenticated() {
        let (state, _, user) = setup(Role::User).await;
        let token = JwtKeys::from_ref(&state).issue(user.id).unwrap();
        let mut parts = parts_with(Some(("authorization", format!("Bearer {token}"))));
        let current = CurrentUser::from_request_parts(&mut parts, &state).await.unwrap();
        let err = current.authorize(Capability::ViewMonthlyPlan).unwrap_err();
        assert!(matches!(err, AppError::Forbidden));
        assert_eq!(err.status_code(), axum::http::StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn admin_passes_role_gate() {
        let (state, _, user) = setup(Role::Admin).await;
        let token = JwtKeys::from_ref(&state).issue(user.id).unwrap();
        let mut parts = parts_with(Some(("authorization", format!("Bearer {token}"))));
        let current = CurrentUser::from_request_parts(&mut parts, &state).await.unwrap();
        assert!(current.authorize(Capability::DeleteUser).is_ok());
    }
}
