use serde_json::Value;
use sqlx::PgPool;

use crate::{
    auth::{repo::scope_predicate, store::UserScope},
    query::{Field, FieldKind, ListQuery, Resource},
};

pub static USERS: Resource = Resource {
    table: "users",
    fields: &[
        Field::plain("id", "id", FieldKind::Uuid),
        Field::plain("name", "name", FieldKind::Text),
        Field::plain("email", "email", FieldKind::Text),
        Field::plain("role", "role", FieldKind::Text),
        Field::plain("active", "active", FieldKind::Bool).internal_only(),
        Field::plain("passwordChangedAt", "password_changed_at", FieldKind::Timestamp).internal_only(),
        Field::plain("createdAt", "created_at", FieldKind::Timestamp),
        Field::plain("updatedAt", "updated_at", FieldKind::Timestamp),
    ],
};

pub async fn list(db: &PgPool, q: &ListQuery, scope: UserScope) -> anyhow::Result<Vec<Value>> {
    let mut qb = q.select();
    qb.push(scope_predicate(scope));
    q.finish(&mut qb);
    let docs = qb
        .build_query_scalar::<Value>()
        .fetch_all(db)
        .await?;
    Ok(docs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_never_projects_credentials() {
        let q = ListQuery::parse(&USERS, &[]).unwrap();
        let sql = q.select().sql().to_string();
        assert!(!sql.contains("password_hash"));
        assert!(!sql.contains("reset"));
        assert!(!sql.contains("password_changed_at"));
    }

    #[test]
    fn password_changed_at_on_request() {
        let q = ListQuery::parse(
            &USERS,
            &[("fields".to_string(), "email,passwordChangedAt".to_string())],
        )
        .unwrap();
        assert!(q
            .select()
            .sql()
            .starts_with("SELECT jsonb_build_object('id', id, 'email', email, 'passwordChangedAt', password_changed_at)"));
    }
}
