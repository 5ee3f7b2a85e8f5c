use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use super::{repo_types::User, roles::Role};
use crate::error::AppError;

/// Which users a lookup may see. Soft-deleted users are hidden unless the
/// caller explicitly asks for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UserScope {
    #[default]
    Active,
    IncludeInactive,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
}

/// Profile fields an update may touch; `None` leaves the column alone.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: Option<Role>,
    pub active: Option<bool>,
}

/// Persistence port for everything authentication needs from the users table.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid, scope: UserScope) -> Result<Option<User>, AppError>;

    async fn find_by_email(&self, email: &str, scope: UserScope) -> Result<Option<User>, AppError>;

    /// Fails with `Conflict` when the email is taken.
    async fn create(&self, new_user: NewUser) -> Result<User, AppError>;

    /// Replaces the password hash, stamps `password_changed_at` and clears any
    /// pending reset token.
    async fn set_password(
        &self,
        id: Uuid,
        password_hash: &str,
        changed_at: OffsetDateTime,
    ) -> Result<User, AppError>;

    async fn set_reset_token(
        &self,
        id: Uuid,
        token_hash: &str,
        expires_at: OffsetDateTime,
    ) -> Result<(), AppError>;

    async fn clear_reset_token(&self, id: Uuid) -> Result<(), AppError>;

    /// Active user holding `token_hash` whose reset window is still open at `now`.
    async fn find_by_reset_token(
        &self,
        token_hash: &str,
        now: OffsetDateTime,
    ) -> Result<Option<User>, AppError>;

    /// Soft delete. Returns false if no active user matched.
    async fn deactivate(&self, id: Uuid) -> Result<bool, AppError>;

    /// Applies `update` to the user regardless of `active`. `Conflict` when the
    /// new email is taken.
    async fn update_profile(&self, id: Uuid, update: ProfileUpdate)
        -> Result<Option<User>, AppError>;

    /// Hard delete.
    async fn delete(&self, id: Uuid) -> Result<bool, AppError>;
}
