use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use super::{
    repo_types::{Place, PlaceRow, PlaceType, PLACE_COLUMNS},
    services::PlaceDraft,
    stats::{stats_query, MonthTypeCount, StatsRange, TypeStats, MONTHLY_PLAN_SQL},
};
use crate::{
    error::AppError,
    query::{Field, FieldKind, ListQuery, Resource},
};

const LOCATION_DOC: &str = "CASE WHEN location_lng IS NULL OR location_lat IS NULL THEN NULL \
     ELSE jsonb_build_object('type', 'Point', \
     'coordinates', jsonb_build_array(location_lng, location_lat), \
     'address', location_address, 'city', location_city, \
     'region', location_region, 'country', location_country) END";

pub static PLACES: Resource = Resource {
    table: "places",
    fields: &[
        Field::plain("id", "id", FieldKind::Uuid),
        Field::plain("name", "name", FieldKind::Text),
        Field::plain("address", "address", FieldKind::Text),
        Field::plain("type", "type", FieldKind::Choice(&PlaceType::NAMES)),
        Field::plain("description", "description", FieldKind::Text),
        Field::output_only("startDates", "to_jsonb(start_dates)"),
        Field::output_only("location", LOCATION_DOC),
        Field::plain("createdBy", "created_by", FieldKind::Uuid),
        Field::plain("isAwaited", "is_awaited", FieldKind::Bool),
        Field::plain("slug", "slug", FieldKind::Text),
        Field::plain("createdAt", "created_at", FieldKind::Timestamp),
        Field::plain("updatedAt", "updated_at", FieldKind::Timestamp).internal_only(),
    ],
};

/// Extra predicate narrowing a listing.
#[derive(Debug, Clone, Copy)]
pub enum Listing {
    All,
    CreatedBy(Uuid),
    Awaited,
}

pub async fn list(db: &PgPool, q: &ListQuery, listing: Listing) -> anyhow::Result<Vec<Value>> {
    let mut qb = q.select();
    match listing {
        Listing::All => {}
        Listing::CreatedBy(owner) => {
            qb.push(" AND created_by = ").push_bind(owner);
        }
        Listing::Awaited => {
            qb.push(" AND is_awaited = TRUE");
        }
    }
    q.finish(&mut qb);
    let docs = qb.build_query_scalar::<Value>().fetch_all(db).await?;
    Ok(docs)
}

fn into_place(row: PlaceRow) -> Result<Place, AppError> {
    Ok(Place::try_from(row)?)
}

pub async fn find(db: &PgPool, id: Uuid) -> Result<Option<Place>, AppError> {
    let sql = format!("SELECT {PLACE_COLUMNS} FROM places WHERE id = $1");
    let row = sqlx::query_as::<_, PlaceRow>(&sql)
        .bind(id)
        .fetch_optional(db)
        .await?;
    row.map(into_place).transpose()
}

/// Located places; guests only see those not awaiting review.
pub async fn located(db: &PgPool, include_awaited: bool) -> Result<Vec<Place>, AppError> {
    let mut sql = format!(
        "SELECT {PLACE_COLUMNS} FROM places \
         WHERE location_lng IS NOT NULL AND location_lat IS NOT NULL"
    );
    if !include_awaited {
        sql.push_str(" AND is_awaited = FALSE");
    }
    let rows = sqlx::query_as::<_, PlaceRow>(&sql).fetch_all(db).await?;
    rows.into_iter().map(into_place).collect()
}

/// Same name, address and type for the same creator, other than `exclude`.
pub async fn duplicate_exists(
    db: &PgPool,
    draft: &PlaceDraft,
    created_by: Uuid,
    exclude: Option<Uuid>,
) -> Result<bool, AppError> {
    let exists = sqlx::query_scalar::<_, bool>(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM places
             WHERE name = $1
               AND address IS NOT DISTINCT FROM $2
               AND type = $3
               AND created_by = $4
               AND ($5::uuid IS NULL OR id <> $5)
        )
        "#,
    )
    .bind(&draft.name)
    .bind(&draft.address)
    .bind(draft.place_type.as_str())
    .bind(created_by)
    .bind(exclude)
    .fetch_one(db)
    .await?;
    Ok(exists)
}

fn location_parts(draft: &PlaceDraft) -> (Option<f64>, Option<f64>) {
    draft
        .location
        .as_ref()
        .map(|l| (Some(l.lng()), Some(l.lat())))
        .unwrap_or((None, None))
}

pub async fn insert(
    db: &PgPool,
    id: Uuid,
    draft: &PlaceDraft,
    created_by: Uuid,
    slug: &str,
) -> Result<Place, AppError> {
    let (lng, lat) = location_parts(draft);
    let loc = draft.location.as_ref();
    let sql = format!(
        r#"
        INSERT INTO places (id, name, address, type, description, start_dates,
                            location_lng, location_lat, location_address, location_city,
                            location_region, location_country, created_by, is_awaited, slug)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
        RETURNING {PLACE_COLUMNS}
        "#
    );
    let row = sqlx::query_as::<_, PlaceRow>(&sql)
        .bind(id)
        .bind(&draft.name)
        .bind(&draft.address)
        .bind(draft.place_type.as_str())
        .bind(&draft.description)
        .bind(&draft.start_dates)
        .bind(lng)
        .bind(lat)
        .bind(loc.and_then(|l| l.address.clone()))
        .bind(loc.and_then(|l| l.city.clone()))
        .bind(loc.and_then(|l| l.region.clone()))
        .bind(loc.and_then(|l| l.country.clone()))
        .bind(created_by)
        .bind(draft.is_awaited)
        .bind(slug)
        .fetch_one(db)
        .await?;
    into_place(row)
}

pub async fn update(
    db: &PgPool,
    id: Uuid,
    draft: &PlaceDraft,
    slug: &str,
) -> Result<Option<Place>, AppError> {
    let (lng, lat) = location_parts(draft);
    let loc = draft.location.as_ref();
    let sql = format!(
        r#"
        UPDATE places
           SET name = $2, address = $3, type = $4, description = $5, start_dates = $6,
               location_lng = $7, location_lat = $8, location_address = $9,
               location_city = $10, location_region = $11, location_country = $12,
               is_awaited = $13, slug = $14, updated_at = now()
         WHERE id = $1
        RETURNING {PLACE_COLUMNS}
        "#
    );
    let row = sqlx::query_as::<_, PlaceRow>(&sql)
        .bind(id)
        .bind(&draft.name)
        .bind(&draft.address)
        .bind(draft.place_type.as_str())
        .bind(&draft.description)
        .bind(&draft.start_dates)
        .bind(lng)
        .bind(lat)
        .bind(loc.and_then(|l| l.address.clone()))
        .bind(loc.and_then(|l| l.city.clone()))
        .bind(loc.and_then(|l| l.region.clone()))
        .bind(loc.and_then(|l| l.country.clone()))
        .bind(draft.is_awaited)
        .bind(slug)
        .fetch_optional(db)
        .await?;
    row.map(into_place).transpose()
}

pub async fn delete(db: &PgPool, id: Uuid) -> Result<bool, AppError> {
    let res = sqlx::query("DELETE FROM places WHERE id = $1")
        .bind(id)
        .execute(db)
        .await?;
    Ok(res.rows_affected() > 0)
}

pub async fn stats(db: &PgPool, range: StatsRange) -> Result<Vec<TypeStats>, AppError> {
    let mut qb = stats_query(range);
    let rows = qb.build_query_as::<TypeStats>().fetch_all(db).await?;
    Ok(rows)
}

pub async fn monthly_starts(db: &PgPool, year: i32) -> Result<Vec<MonthTypeCount>, AppError> {
    let rows = sqlx::query_as::<_, MonthTypeCount>(MONTHLY_PLAN_SQL)
        .bind(year)
        .fetch_all(db)
        .await?;
    Ok(rows)
}
