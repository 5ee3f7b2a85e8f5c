//! List-endpoint query features: filter, sort, field limiting and pagination.
//!
//! Parsing is pure and produces a [`ListQuery`]; rendering writes onto a
//! `sqlx::QueryBuilder` whose rows are single `jsonb` documents named `doc`.
//! Callers push their own predicates (ownership, soft delete, visibility)
//! between [`ListQuery::select`] and [`ListQuery::finish`].

use sqlx::{Postgres, QueryBuilder};
use time::{format_description::well_known::Rfc3339, macros::format_description, Date, OffsetDateTime};
use uuid::Uuid;

use crate::error::AppError;

pub const DEFAULT_PAGE: i64 = 1;
pub const DEFAULT_LIMIT: i64 = 100;
pub const MAX_LIMIT: i64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Bool,
    Timestamp,
    Uuid,
    /// Closed set of text values. A `+` that arrived form-decoded as a space
    /// still matches.
    Choice(&'static [&'static str]),
    /// Output only; never compared.
    Document,
}

/// One externally visible field of a resource.
#[derive(Debug)]
pub struct Field {
    /// Name used in query strings and in the output document.
    pub name: &'static str,
    pub column: &'static str,
    /// SQL expression producing the output value.
    pub output: &'static str,
    pub kind: FieldKind,
    pub filterable: bool,
    pub sortable: bool,
    /// Only returned when explicitly requested through `fields`.
    pub internal: bool,
}

impl Field {
    pub const fn plain(name: &'static str, column: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            column,
            output: column,
            kind,
            filterable: true,
            sortable: true,
            internal: false,
        }
    }

    pub const fn internal_only(self) -> Self {
        Self {
            internal: true,
            ..self
        }
    }

    pub const fn output_only(name: &'static str, output: &'static str) -> Self {
        Self {
            name,
            column: output,
            output,
            kind: FieldKind::Document,
            filterable: false,
            sortable: false,
            internal: false,
        }
    }
}

#[derive(Debug)]
pub struct Resource {
    pub table: &'static str,
    pub fields: &'static [Field],
}

impl Resource {
    pub fn field(&self, name: &str) -> Option<&'static Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    fn id(&self) -> &'static Field {
        self.fields
            .iter()
            .find(|f| f.name == "id")
            .unwrap_or(&self.fields[0])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl FilterOp {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "eq" => Some(Self::Eq),
            "gt" => Some(Self::Gt),
            "gte" => Some(Self::Gte),
            "lt" => Some(Self::Lt),
            "lte" => Some(Self::Lte),
            _ => None,
        }
    }

    fn sql(self) -> &'static str {
        match self {
            Self::Eq => " = ",
            Self::Gt => " > ",
            Self::Gte => " >= ",
            Self::Lt => " < ",
            Self::Lte => " <= ",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Text(String),
    Bool(bool),
    Timestamp(OffsetDateTime),
    Uuid(Uuid),
}

impl FilterValue {
    fn parse(field: &Field, raw: &str) -> Result<Self, AppError> {
        let invalid = || AppError::Validation(format!("invalid value for {}: {raw}", field.name));
        match field.kind {
            FieldKind::Text => Ok(Self::Text(raw.to_string())),
            FieldKind::Bool => match raw {
                "true" => Ok(Self::Bool(true)),
                "false" => Ok(Self::Bool(false)),
                _ => Err(invalid()),
            },
            FieldKind::Timestamp => parse_timestamp(raw).map(Self::Timestamp).ok_or_else(invalid),
            FieldKind::Uuid => raw.parse().map(Self::Uuid).map_err(|_| invalid()),
            FieldKind::Choice(choices) => choices
                .iter()
                .find(|c| **c == raw || c.replace('+', " ") == raw)
                .map(|c| Self::Text(c.to_string()))
                .ok_or_else(invalid),
            FieldKind::Document => Err(invalid()),
        }
    }

    fn push_bind(&self, qb: &mut QueryBuilder<'static, Postgres>) {
        match self {
            Self::Text(v) => qb.push_bind(v.clone()),
            Self::Bool(v) => qb.push_bind(*v),
            Self::Timestamp(v) => qb.push_bind(*v),
            Self::Uuid(v) => qb.push_bind(*v),
        };
    }
}

/// RFC 3339 timestamp or a bare `YYYY-MM-DD` date (midnight UTC).
pub fn parse_timestamp(raw: &str) -> Option<OffsetDateTime> {
    if let Ok(ts) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Some(ts);
    }
    Date::parse(raw, format_description!("[year]-[month]-[day]"))
        .ok()
        .map(|d| d.midnight().assume_utc())
}

#[derive(Debug, Clone)]
pub struct Filter {
    pub field: &'static Field,
    pub op: FilterOp,
    pub value: FilterValue,
}

#[derive(Debug, Clone, Copy)]
pub struct SortKey {
    pub field: &'static Field,
    pub descending: bool,
}

#[derive(Debug, Clone)]
pub struct ListQuery {
    pub resource: &'static Resource,
    pub filters: Vec<Filter>,
    pub sort: Vec<SortKey>,
    pub fields: Vec<&'static Field>,
    pub page: i64,
    pub limit: i64,
}

impl ListQuery {
    pub fn parse(resource: &'static Resource, params: &[(String, String)]) -> Result<Self, AppError> {
        let mut filters = Vec::new();
        let mut sort_raw = None;
        let mut fields_raw = None;
        let mut page = DEFAULT_PAGE;
        let mut limit = DEFAULT_LIMIT;

        for (key, value) in params {
            match key.as_str() {
                "page" => page = parse_positive("page", value)?,
                "limit" => limit = parse_positive("limit", value)?.min(MAX_LIMIT),
                "sort" => sort_raw = Some(value.as_str()),
                "fields" => fields_raw = Some(value.as_str()),
                _ => filters.push(parse_filter(resource, key, value)?),
            }
        }

        Ok(Self {
            resource,
            filters,
            sort: parse_sort(resource, sort_raw)?,
            fields: parse_fields(resource, fields_raw)?,
            page,
            limit,
        })
    }

    /// Saturates, so a far-out page reads past the data instead of overflowing.
    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }

    /// `SELECT jsonb_build_object(..) AS doc FROM <table> WHERE TRUE` plus the
    /// parsed filters. Append further predicates as ` AND ...`.
    pub fn select(&self) -> QueryBuilder<'static, Postgres> {
        let mut qb = QueryBuilder::new("SELECT jsonb_build_object(");
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                qb.push(", ");
            }
            qb.push("'").push(field.name).push("', ").push(field.output);
        }
        qb.push(") AS doc FROM ")
            .push(self.resource.table)
            .push(" WHERE TRUE");

        for filter in &self.filters {
            qb.push(" AND ")
                .push(filter.field.column)
                .push(filter.op.sql());
            filter.value.push_bind(&mut qb);
        }
        qb
    }

    /// Appends ordering and the page window.
    pub fn finish(&self, qb: &mut QueryBuilder<'static, Postgres>) {
        qb.push(" ORDER BY ");
        for (i, key) in self.sort.iter().enumerate() {
            if i > 0 {
                qb.push(", ");
            }
            qb.push(key.field.column)
                .push(if key.descending { " DESC" } else { " ASC" });
        }
        qb.push(" LIMIT ").push_bind(self.limit);
        qb.push(" OFFSET ").push_bind(self.offset());
    }
}

fn parse_positive(name: &str, raw: &str) -> Result<i64, AppError> {
    match raw.trim().parse::<i64>() {
        Ok(n) if n >= 1 => Ok(n),
        _ => Err(AppError::Validation(format!(
            "{name} must be a positive integer"
        ))),
    }
}

fn parse_filter(resource: &'static Resource, key: &str, raw: &str) -> Result<Filter, AppError> {
    let (name, op) = match key.split_once('[') {
        Some((name, rest)) => {
            let op = rest
                .strip_suffix(']')
                .and_then(FilterOp::parse)
                .ok_or_else(|| AppError::Validation(format!("unsupported operator in {key}")))?;
            (name, op)
        }
        None => (key, FilterOp::Eq),
    };

    let field = resource
        .field(name)
        .filter(|f| f.filterable)
        .ok_or_else(|| AppError::Validation(format!("cannot filter on {name}")))?;
    Ok(Filter {
        field,
        op,
        value: FilterValue::parse(field, raw)?,
    })
}

fn parse_sort(resource: &'static Resource, raw: Option<&str>) -> Result<Vec<SortKey>, AppError> {
    let mut keys = Vec::new();
    match raw {
        Some(raw) => {
            for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
                let (name, descending) = match part.strip_prefix('-') {
                    Some(name) => (name, true),
                    None => (part, false),
                };
                let field = resource
                    .field(name)
                    .filter(|f| f.sortable)
                    .ok_or_else(|| AppError::Validation(format!("cannot sort on {name}")))?;
                keys.push(SortKey { field, descending });
            }
        }
        None => {
            if let Some(field) = resource.field("createdAt") {
                keys.push(SortKey {
                    field,
                    descending: true,
                });
            }
        }
    }

    let id = resource.id();
    if !keys.iter().any(|k| std::ptr::eq(k.field, id)) {
        keys.push(SortKey {
            field: id,
            descending: false,
        });
    }
    Ok(keys)
}

fn parse_fields(resource: &'static Resource, raw: Option<&str>) -> Result<Vec<&'static Field>, AppError> {
    let id = resource.id();
    let Some(raw) = raw else {
        return Ok(resource.fields.iter().filter(|f| !f.internal).collect());
    };

    let mut fields = vec![id];
    for name in raw.split(',').map(str::trim).filter(|n| !n.is_empty()) {
        let field = resource
            .field(name)
            .ok_or_else(|| AppError::Validation(format!("unknown field {name}")))?;
        if !fields.iter().any(|f| std::ptr::eq(*f, field)) {
            fields.push(field);
        }
    }
    Ok(fields)
}
