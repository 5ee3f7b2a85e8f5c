use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use super::{
    repo_types::{User, UserRow, USER_COLUMNS},
    store::{CredentialStore, NewUser, ProfileUpdate, UserScope},
};
use crate::error::AppError;

/// Postgres-backed credential store.
#[derive(Clone)]
pub struct PgCredentialStore {
    db: PgPool,
}

impl PgCredentialStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

/// Default predicate composed into every read.
pub(crate) fn scope_predicate(scope: UserScope) -> &'static str {
    match scope {
        UserScope::Active => " AND active = TRUE",
        UserScope::IncludeInactive => "",
    }
}

fn into_user(row: Option<UserRow>) -> Result<Option<User>, AppError> {
    Ok(row.map(User::try_from).transpose()?)
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn find_by_id(&self, id: Uuid, scope: UserScope) -> Result<Option<User>, AppError> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1{}",
            scope_predicate(scope)
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        into_user(row)
    }

    async fn find_by_email(&self, email: &str, scope: UserScope) -> Result<Option<User>, AppError> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1{}",
            scope_predicate(scope)
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(email)
            .fetch_optional(&self.db)
            .await?;
        into_user(row)
    }

    async fn create(&self, new_user: NewUser) -> Result<User, AppError> {
        let sql = format!(
            r#"
            INSERT INTO users (name, email, password_hash, role)
            VALUES ($1, $2, $3, $4)
            RETURNING {USER_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(&new_user.name)
            .bind(&new_user.email)
            .bind(&new_user.password_hash)
            .bind(new_user.role.as_str())
            .fetch_one(&self.db)
            .await?;
        Ok(User::try_from(row)?)
    }

    async fn set_password(
        &self,
        id: Uuid,
        password_hash: &str,
        changed_at: OffsetDateTime,
    ) -> Result<User, AppError> {
        let sql = format!(
            r#"
            UPDATE users
               SET password_hash = $2,
                   password_changed_at = $3,
                   password_reset_token_hash = NULL,
                   password_reset_expires_at = NULL,
                   updated_at = now()
             WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .bind(password_hash)
            .bind(changed_at)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::not_found("user"))?;
        Ok(User::try_from(row)?)
    }

    async fn set_reset_token(
        &self,
        id: Uuid,
        token_hash: &str,
        expires_at: OffsetDateTime,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE users
               SET password_reset_token_hash = $2,
                   password_reset_expires_at = $3
             WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(token_hash)
        .bind(expires_at)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn clear_reset_token(&self, id: Uuid) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE users
               SET password_reset_token_hash = NULL,
                   password_reset_expires_at = NULL
             WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn find_by_reset_token(
        &self,
        token_hash: &str,
        now: OffsetDateTime,
    ) -> Result<Option<User>, AppError> {
        let sql = format!(
            r#"
            SELECT {USER_COLUMNS}
              FROM users
             WHERE password_reset_token_hash = $1
               AND password_reset_expires_at > $2
               AND active = TRUE
            "#
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(token_hash)
            .bind(now)
            .fetch_optional(&self.db)
            .await?;
        into_user(row)
    }

    async fn deactivate(&self, id: Uuid) -> Result<bool, AppError> {
        let res = sqlx::query(
            "UPDATE users SET active = FALSE, updated_at = now() WHERE id = $1 AND active = TRUE",
        )
        .bind(id)
        .execute(&self.db)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn update_profile(
        &self,
        id: Uuid,
        update: ProfileUpdate,
    ) -> Result<Option<User>, AppError> {
        let sql = format!(
            r#"
            UPDATE users
               SET name = COALESCE($2, name),
                   email = COALESCE($3, email),
                   role = COALESCE($4, role),
                   active = COALESCE($5, active),
                   updated_at = now()
             WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .bind(update.name)
            .bind(update.email)
            .bind(update.role.map(|r| r.as_str()))
            .bind(update.active)
            .fetch_optional(&self.db)
            .await?;
        into_user(row)
    }

    async fn delete(&self, id: Uuid) -> Result<bool, AppError> {
        let res = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(res.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_scope_adds_predicate() {
        assert_eq!(scope_predicate(UserScope::Active), " AND active = TRUE");
        assert_eq!(scope_predicate(UserScope::IncludeInactive), "");
    }
}
