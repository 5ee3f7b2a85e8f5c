//! Password reset: `NoResetPending -> ResetPending -> NoResetPending`.
//!
//! Only the SHA-256 digest of a reset token is stored; the plaintext exists in
//! memory and in the outgoing email.

use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use time::{Duration, OffsetDateTime};
use tracing::{error, info, warn};

use super::{
    password::{hash_password, validate_new_password},
    repo_types::User,
    store::UserScope,
};
use crate::{error::AppError, state::AppState};

const TOKEN_BYTES: usize = 32;

pub fn generate_reset_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub fn hash_reset_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

fn reset_message(token: &str, ttl_minutes: i64) -> String {
    format!(
        "You have requested a password reset.\n\n\
         Use this code to reset your password: {token}\n\n\
         The code expires in {ttl_minutes} minutes. \
         If you did not request a reset, ignore this email."
    )
}

/// Starts a reset for the active user owning `email` and mails the token.
pub async fn request_reset(state: &AppState, email: &str) -> Result<(), AppError> {
    let user = state
        .credentials
        .find_by_email(email, UserScope::Active)
        .await?
        .ok_or(AppError::NoSuchUser)?;

    let ttl = state.config.reset_token_ttl_minutes;
    let token = generate_reset_token();
    let expires_at = OffsetDateTime::now_utc() + Duration::minutes(ttl);
    state
        .credentials
        .set_reset_token(user.id, &hash_reset_token(&token), expires_at)
        .await?;

    let sent = state
        .mailer
        .send(&user.email, "Password Reset Request", reset_message(&token, ttl))
        .await;
    if let Err(e) = sent {
        error!(error = %e, user_id = %user.id, "reset email delivery failed");
        state.credentials.clear_reset_token(user.id).await?;
        return Err(AppError::DeliveryFailed);
    }

    info!(user_id = %user.id, "password reset requested");
    Ok(())
}

/// User holding a live reset token.
pub async fn validate_token(state: &AppState, token: &str) -> Result<User, AppError> {
    state
        .credentials
        .find_by_reset_token(&hash_reset_token(token), OffsetDateTime::now_utc())
        .await?
        .ok_or_else(|| {
            warn!("invalid or expired reset token");
            AppError::InvalidOrExpiredToken
        })
}

/// Sets the new password and burns the token. The caller logs the user in.
pub async fn consume_reset(
    state: &AppState,
    token: &str,
    password: &str,
    password_confirm: &str,
) -> Result<User, AppError> {
    let user = validate_token(state, token).await?;
    validate_new_password(password, password_confirm)?;

    let hash = hash_password(password)?;
    let user = state
        .credentials
        .set_password(user.id, &hash, OffsetDateTime::now_utc())
        .await?;
    info!(user_id = %user.id, "password reset completed");
    Ok(user)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        auth::{
            password::verify_password,
            roles::Role,
            store::{memory::MemoryCredentialStore, CredentialStore, NewUser},
        },
        mailer::fakes::{FailingMailer, RecordingMailer},
    };

    async fn seed(store: &MemoryCredentialStore) -> User {
        store
            .create(NewUser {
                name: "Nour".into(),
                email: "nour@example.com".into(),
                password_hash: hash_password("old-pass").unwrap(),
                role: Role::User,
            })
            .await
            .unwrap()
    }

    fn token_from(mailer: &RecordingMailer) -> String {
        let body = mailer.last().expect("an email").body;
        body.split_whitespace()
            .find(|w| w.len() == TOKEN_BYTES * 2 && w.chars().all(|c| c.is_ascii_hexdigit()))
            .expect("token in body")
            .to_string()
    }

    #[test]
    fn tokens_are_long_and_random() {
        let a = generate_reset_token();
        let b = generate_reset_token();
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
        assert_ne!(hash_reset_token(&a), a);
        assert_eq!(hash_reset_token(&a), hash_reset_token(&a));
    }

    #[tokio::test]
    async fn only_the_digest_is_stored() {
        let store = Arc::new(MemoryCredentialStore::new());
        let mailer = Arc::new(RecordingMailer::default());
        let user = seed(&store).await;
        let state = AppState::for_tests(store.clone(), mailer.clone());

        request_reset(&state, "nour@example.com").await.unwrap();
        let token = token_from(&mailer);
        let stored = store.snapshot(user.id).unwrap();
        assert_eq!(stored.password_reset_token_hash, Some(hash_reset_token(&token)));
        assert!(stored.password_reset_expires_at.unwrap() > OffsetDateTime::now_utc());
        assert_eq!(mailer.last().unwrap().to, "nour@example.com");
    }

    #[tokio::test]
    async fn unknown_email_is_no_such_user() {
        let store = Arc::new(MemoryCredentialStore::new());
        let state = AppState::for_tests(store, Arc::new(RecordingMailer::default()));
        let err = request_reset(&state, "ghost@example.com").await.unwrap_err();
        assert!(matches!(err, AppError::NoSuchUser));
    }

    #[tokio::test]
    async fn delivery_failure_clears_pending_state() {
        let store = Arc::new(MemoryCredentialStore::new());
        let user = seed(&store).await;
        let state = AppState::for_tests(store.clone(), Arc::new(FailingMailer));

        let err = request_reset(&state, "nour@example.com").await.unwrap_err();
        assert!(matches!(err, AppError::DeliveryFailed));
        let stored = store.snapshot(user.id).unwrap();
        assert!(stored.password_reset_token_hash.is_none());
        assert!(stored.password_reset_expires_at.is_none());
    }

    #[tokio::test]
    async fn reset_is_single_use() {
        let store = Arc::new(MemoryCredentialStore::new());
        let mailer = Arc::new(RecordingMailer::default());
        let user = seed(&store).await;
        let state = AppState::for_tests(store.clone(), mailer.clone());

        request_reset(&state, "nour@example.com").await.unwrap();
        let token = token_from(&mailer);
        assert_eq!(validate_token(&state, &token).await.unwrap().id, user.id);

        let updated = consume_reset(&state, &token, "brand-new", "brand-new").await.unwrap();
        assert!(verify_password("brand-new", &updated.password_hash).unwrap());
        assert!(updated.password_changed_at.is_some());
        assert!(updated.password_reset_token_hash.is_none());

        let again = consume_reset(&state, &token, "other-pass", "other-pass").await.unwrap_err();
        assert!(matches!(again, AppError::InvalidOrExpiredToken));
    }

    #[tokio::test]
    async fn expired_token_fails_validation() {
        let store = Arc::new(MemoryCredentialStore::new());
        let user = seed(&store).await;
        let state = AppState::for_tests(store.clone(), Arc::new(RecordingMailer::default()));

        let token = generate_reset_token();
        store
            .set_reset_token(
                user.id,
                &hash_reset_token(&token),
                OffsetDateTime::now_utc() - Duration::seconds(1),
            )
            .await
            .unwrap();
        let err = validate_token(&state, &token).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidOrExpiredToken));
    }

    #[tokio::test]
    async fn mismatched_confirmation_keeps_token_alive() {
        let store = Arc::new(MemoryCredentialStore::new());
        let mailer = Arc::new(RecordingMailer::default());
        seed(&store).await;
        let state = AppState::for_tests(store.clone(), mailer.clone());

        request_reset(&state, "nour@example.com").await.unwrap();
        let token = token_from(&mailer);
        let err = consume_reset(&state, &token, "first-pass", "second-pass").await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(validate_token(&state, &token).await.is_ok());
    }
}
