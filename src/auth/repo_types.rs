use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use super::roles::Role;

/// Raw `users` row.
#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub password_changed_at: Option<OffsetDateTime>,
    pub password_reset_token_hash: Option<String>,
    pub password_reset_expires_at: Option<OffsetDateTime>,
    pub active: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Column list matching [`UserRow`].
pub const USER_COLUMNS: &str = "id, name, email, password_hash, role, password_changed_at, \
     password_reset_token_hash, password_reset_expires_at, active, created_at, updated_at";

/// User record. Credential fields never leave the server.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    #[serde(skip_serializing)]
    pub password_changed_at: Option<OffsetDateTime>,
    #[serde(skip_serializing)]
    pub password_reset_token_hash: Option<String>,
    #[serde(skip_serializing)]
    pub password_reset_expires_at: Option<OffsetDateTime>,
    #[serde(skip_serializing)]
    pub active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl User {
    /// True if the password changed strictly after a token issued at `iat`
    /// (unix seconds), which makes that token stale.
    pub fn changed_password_after(&self, iat: i64) -> bool {
        self.password_changed_at
            .map(|changed| changed.unix_timestamp() > iat)
            .unwrap_or(false)
    }
}

impl TryFrom<UserRow> for User {
    type Error = anyhow::Error;

    fn try_from(r: UserRow) -> Result<Self, Self::Error> {
        Ok(Self {
            role: r.role.parse()?,
            id: r.id,
            name: r.name,
            email: r.email,
            password_hash: r.password_hash,
            password_changed_at: r.password_changed_at,
            password_reset_token_hash: r.password_reset_token_hash,
            password_reset_expires_at: r.password_reset_expires_at,
            active: r.active,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}
