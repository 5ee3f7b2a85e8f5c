//! Aggregations over places: per-type stats and the yearly start plan.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Postgres, QueryBuilder};
use time::OffsetDateTime;

use super::repo_types::PlaceType;
use crate::{error::AppError, query::parse_timestamp};

pub const MIN_PLAN_YEAR: i32 = 1970;
pub const MAX_PLAN_YEAR: i32 = 9999;

#[derive(Debug, Default, Deserialize)]
pub struct StatsParams {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct StatsRange {
    /// Keeps places created at or after this instant.
    pub start: Option<OffsetDateTime>,
    /// Keeps places last updated at or before this instant.
    pub end: Option<OffsetDateTime>,
}

impl TryFrom<StatsParams> for StatsRange {
    type Error = AppError;

    fn try_from(p: StatsParams) -> Result<Self, Self::Error> {
        let parse = |name: &str, raw: Option<String>| {
            raw.filter(|s| !s.trim().is_empty())
                .map(|s| {
                    parse_timestamp(s.trim())
                        .ok_or_else(|| AppError::Validation(format!("invalid {name}: {s}")))
                })
                .transpose()
        };
        Ok(Self {
            start: parse("start_date", p.start_date)?,
            end: parse("end_date", p.end_date)?,
        })
    }
}

/// Both bounds apply together when both are given.
pub fn stats_query(range: StatsRange) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(
        "SELECT type, COUNT(*) AS number_of_places, \
         array_agg(GREATEST(created_at, updated_at) ORDER BY GREATEST(created_at, updated_at)) AS dates \
         FROM places WHERE TRUE",
    );
    if let Some(start) = range.start {
        qb.push(" AND created_at >= ").push_bind(start);
    }
    if let Some(end) = range.end {
        qb.push(" AND updated_at <= ").push_bind(end);
    }
    qb.push(" GROUP BY type ORDER BY MIN(GREATEST(created_at, updated_at)), type");
    qb
}

#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeStats {
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub place_type: String,
    pub number_of_places: i64,
    #[serde(serialize_with = "super::repo_types::rfc3339_vec::serialize")]
    pub dates: Vec<OffsetDateTime>,
}

pub fn plan_year(raw: &str) -> Result<i32, AppError> {
    match raw.trim().parse::<i32>() {
        Ok(y) if (MIN_PLAN_YEAR..=MAX_PLAN_YEAR).contains(&y) => Ok(y),
        _ => Err(AppError::Validation(format!(
            "year must be between {MIN_PLAN_YEAR} and {MAX_PLAN_YEAR}"
        ))),
    }
}

/// Counts by (month, type) of each place's first start date within the year.
pub const MONTHLY_PLAN_SQL: &str = r#"
    SELECT EXTRACT(MONTH FROM start_dates[1] AT TIME ZONE 'UTC')::int AS month,
           type,
           COUNT(*) AS starts
      FROM places
     WHERE cardinality(start_dates) > 0
       AND EXTRACT(YEAR FROM start_dates[1] AT TIME ZONE 'UTC')::int = $1
     GROUP BY 1, 2
"#;

#[derive(Debug, Clone, FromRow)]
pub struct MonthTypeCount {
    pub month: i32,
    #[sqlx(rename = "type")]
    pub place_type: String,
    pub starts: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeStarts {
    #[serde(rename = "type")]
    pub place_type: PlaceType,
    pub number_of_places_starts: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthPlan {
    pub month: u8,
    pub data: Vec<TypeStarts>,
}

/// Twelve months, each listing every place type, zero where nothing started.
pub fn fill_monthly_plan(counts: &[MonthTypeCount]) -> Vec<MonthPlan> {
    let mut by_key: HashMap<(i32, PlaceType), i64> = HashMap::new();
    for c in counts {
        if let Ok(t) = c.place_type.parse::<PlaceType>() {
            *by_key.entry((c.month, t)).or_default() += c.starts;
        }
    }

    (1..=12u8)
        .map(|month| MonthPlan {
            month,
            data: PlaceType::ALL
                .into_iter()
                .map(|t| TypeStarts {
                    place_type: t,
                    number_of_places_starts: by_key
                        .get(&(i32::from(month), t))
                        .copied()
                        .unwrap_or(0),
                })
                .collect(),
        })
        .collect()
}
