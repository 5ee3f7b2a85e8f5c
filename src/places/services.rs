//! Write pipelines for places: validate, derive the slug, check for a
//! duplicate, then persist.

use lazy_static::lazy_static;
use regex::Regex;
use sqlx::PgPool;
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use super::{
    dto::{CreatePlaceRequest, PlaceUpdate},
    repo,
    repo_types::{Location, Place, PlaceType},
};
use crate::{
    auth::{extractors::CurrentUser, roles::Capability},
    error::AppError,
    query::parse_timestamp,
};

pub const MAX_NAME_LEN: usize = 30;
pub const DUPLICATE_PLACE: &str =
    "A place with the same name, address, and type already exists for this user. Try updating it";

/// Validated place content, ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaceDraft {
    pub name: String,
    pub address: Option<String>,
    pub place_type: PlaceType,
    pub description: Option<String>,
    pub start_dates: Vec<OffsetDateTime>,
    pub location: Option<Location>,
    pub is_awaited: bool,
}

fn fold_accent(c: char) -> char {
    match c {
        'à' | 'á' | 'â' | 'ä' | 'ã' | 'å' => 'a',
        'ç' => 'c',
        'è' | 'é' | 'ê' | 'ë' => 'e',
        'ì' | 'í' | 'î' | 'ï' => 'i',
        'ñ' => 'n',
        'ò' | 'ó' | 'ô' | 'ö' | 'õ' => 'o',
        'ù' | 'ú' | 'û' | 'ü' => 'u',
        'ý' | 'ÿ' => 'y',
        other => other,
    }
}

/// Lowercase ASCII words joined by `-`.
pub fn slugify(name: &str) -> String {
    lazy_static! {
        static ref NON_WORD: Regex = Regex::new(r"[^a-z0-9]+").unwrap();
    }
    let folded: String = name.to_lowercase().chars().map(fold_accent).collect();
    NON_WORD
        .replace_all(&folded, "-")
        .trim_matches('-')
        .to_string()
}

/// `slugify(name)` plus the last six hex digits of the id.
pub fn make_slug(name: &str, id: Uuid) -> String {
    let hex = id.simple().to_string();
    let suffix = &hex[hex.len() - 6..];
    match slugify(name) {
        base if base.is_empty() => format!("place-{suffix}"),
        base => format!("{base}-{suffix}"),
    }
}

fn clean_name(raw: &str) -> Result<String, AppError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(AppError::Validation("a place must have a name".into()));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(AppError::Validation(format!(
            "a place name must not exceed {MAX_NAME_LEN} characters"
        )));
    }
    Ok(name.to_string())
}

/// Blank text is stored as absent.
fn clean_text(raw: Option<String>) -> Option<String> {
    raw.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn clean_dates(raw: Vec<String>) -> Result<Vec<OffsetDateTime>, AppError> {
    raw.iter()
        .map(|s| {
            parse_timestamp(s.trim())
                .ok_or_else(|| AppError::Validation(format!("invalid start date: {s}")))
        })
        .collect()
}

fn clean_location(loc: Option<Location>) -> Result<Option<Location>, AppError> {
    let Some(mut loc) = loc else {
        return Ok(None);
    };
    if loc.kind != "Point" {
        return Err(AppError::Validation("location type must be Point".into()));
    }
    if !(-180.0..=180.0).contains(&loc.lng()) || !(-90.0..=90.0).contains(&loc.lat()) {
        return Err(AppError::Validation(
            "location coordinates must be [lng, lat] within range".into(),
        ));
    }
    loc.address = clean_text(loc.address);
    loc.city = clean_text(loc.city);
    loc.region = clean_text(loc.region);
    loc.country = clean_text(loc.country);
    Ok(Some(loc))
}

impl TryFrom<CreatePlaceRequest> for PlaceDraft {
    type Error = AppError;

    fn try_from(req: CreatePlaceRequest) -> Result<Self, Self::Error> {
        Ok(Self {
            name: clean_name(&req.name)?,
            address: clean_text(req.address),
            place_type: req.place_type,
            description: clean_text(req.description),
            start_dates: clean_dates(req.start_dates)?,
            location: clean_location(req.location)?,
            is_awaited: req.is_awaited,
        })
    }
}

impl From<&Place> for PlaceDraft {
    fn from(p: &Place) -> Self {
        Self {
            name: p.name.clone(),
            address: p.address.clone(),
            place_type: p.place_type,
            description: p.description.clone(),
            start_dates: p.start_dates.clone(),
            location: p.location.clone(),
            is_awaited: p.is_awaited,
        }
    }
}

impl PlaceDraft {
    /// Applies the fields present in `update`, validating each.
    pub fn merge(mut self, update: PlaceUpdate) -> Result<Self, AppError> {
        if let Some(name) = update.name {
            self.name = clean_name(&name)?;
        }
        if let Some(address) = update.address {
            self.address = clean_text(Some(address));
        }
        if let Some(t) = update.place_type {
            self.place_type = t;
        }
        if let Some(description) = update.description {
            self.description = clean_text(Some(description));
        }
        if let Some(dates) = update.start_dates {
            self.start_dates = clean_dates(dates)?;
        }
        if update.location.is_some() {
            self.location = clean_location(update.location)?;
        }
        if let Some(awaited) = update.is_awaited {
            self.is_awaited = awaited;
        }
        Ok(self)
    }
}

/// A rename re-derives the slug from the new name; anything else keeps it.
pub fn slug_after_update(place: &Place, draft: &PlaceDraft) -> String {
    if draft.name != place.name {
        make_slug(&draft.name, place.id)
    } else {
        place.slug.clone()
    }
}

fn refuse_duplicate(exists: bool, owner: Uuid, name: &str) -> Result<(), AppError> {
    if exists {
        warn!(user_id = %owner, name = %name, "duplicate place refused");
        return Err(AppError::Conflict(DUPLICATE_PLACE.into()));
    }
    Ok(())
}

/// Owners manage their own places; staff with the capability manage any.
pub fn authorize_place_write(current: &CurrentUser, place: &Place) -> Result<(), AppError> {
    if place.created_by == current.0.id {
        return Ok(());
    }
    current.authorize(Capability::ManageAnyPlace)
}

pub async fn create_place(
    db: &PgPool,
    current: &CurrentUser,
    req: CreatePlaceRequest,
) -> Result<Place, AppError> {
    let draft = PlaceDraft::try_from(req)?;
    let owner = current.0.id;
    let exists = repo::duplicate_exists(db, &draft, owner, None).await?;
    refuse_duplicate(exists, owner, &draft.name)?;

    let id = Uuid::new_v4();
    let slug = make_slug(&draft.name, id);
    let place = repo::insert(db, id, &draft, owner, &slug).await?;
    info!(place_id = %place.id, user_id = %owner, "place created");
    Ok(place)
}

pub async fn update_place(
    db: &PgPool,
    current: &CurrentUser,
    id: Uuid,
    update: PlaceUpdate,
) -> Result<Place, AppError> {
    let place = repo::find(db, id)
        .await?
        .ok_or_else(|| AppError::not_found("place"))?;
    authorize_place_write(current, &place)?;

    let draft = PlaceDraft::from(&place).merge(update)?;
    let slug = slug_after_update(&place, &draft);
    let exists = repo::duplicate_exists(db, &draft, place.created_by, Some(place.id)).await?;
    refuse_duplicate(exists, place.created_by, &draft.name)?;

    let updated = repo::update(db, place.id, &draft, &slug)
        .await?
        .ok_or_else(|| AppError::not_found("place"))?;
    info!(place_id = %updated.id, user_id = %current.0.id, "place updated");
    Ok(updated)
}

pub async fn delete_place(db: &PgPool, current: &CurrentUser, id: Uuid) -> Result<(), AppError> {
    let place = repo::find(db, id)
        .await?
        .ok_or_else(|| AppError::not_found("place"))?;
    authorize_place_write(current, &place)?;
    repo::delete(db, place.id).await?;
    info!(place_id = %place.id, user_id = %current.0.id, "place deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{repo_types::User, roles::Role};

    fn request(name: &str) -> CreatePlaceRequest {
        CreatePlaceRequest {
            name: name.into(),
            address: Some("  ".into()),
            place_type: PlaceType::R3,
            description: Some("  sunny  ".into()),
            start_dates: vec!["2024-04-01".into()],
            location: None,
            is_awaited: false,
        }
    }

    fn caller(role: Role) -> CurrentUser {
        let now = OffsetDateTime::now_utc();
        CurrentUser(User {
            id: Uuid::new_v4(),
            name: "Caller".into(),
            email: "caller@example.com".into(),
            password_hash: String::new(),
            role,
            password_changed_at: None,
            password_reset_token_hash: None,
            password_reset_expires_at: None,
            active: true,
            created_at: now,
            updated_at: now,
        })
    }

    fn place_owned_by(owner: Uuid) -> Place {
        Place {
            id: Uuid::new_v4(),
            name: "Villa".into(),
            address: None,
            place_type: PlaceType::R1,
            description: None,
            start_dates: vec![],
            location: None,
            created_by: owner,
            is_awaited: false,
            slug: "villa-abcdef".into(),
            created_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    #[test]
    fn slug_is_lowercase_words_and_id_tail() {
        let id: Uuid = "6f1c2a9e-0000-4000-8000-00000012ab9f".parse().unwrap();
        assert_eq!(make_slug("Villa  Bleue, Sidi Bou Saïd!", id), "villa-bleue-sidi-bou-said-12ab9f");
        assert_eq!(make_slug("Été à Hammamet", id), "ete-a-hammamet-12ab9f");
        assert_eq!(make_slug("!!!", id), "place-12ab9f");
    }

    #[test]
    fn draft_trims_and_blanks() {
        let draft = PlaceDraft::try_from(request("  Dar  ")).unwrap();
        assert_eq!(draft.name, "Dar");
        assert_eq!(draft.address, None);
        assert_eq!(draft.description.as_deref(), Some("sunny"));
        assert_eq!(draft.start_dates.len(), 1);
    }

    #[test]
    fn draft_rejects_bad_input() {
        assert!(PlaceDraft::try_from(request("   ")).is_err());
        assert!(PlaceDraft::try_from(request(&"x".repeat(31))).is_err());

        let mut bad_date = request("Dar");
        bad_date.start_dates = vec!["someday".into()];
        assert!(PlaceDraft::try_from(bad_date).is_err());

        let mut bad_loc = request("Dar");
        bad_loc.location = Some(Location {
            kind: "Point".into(),
            coordinates: [10.0, 95.0],
            address: None,
            city: None,
            region: None,
            country: None,
        });
        assert!(matches!(PlaceDraft::try_from(bad_loc), Err(AppError::Validation(_))));
    }

    #[test]
    fn merge_touches_only_given_fields() {
        let base = PlaceDraft::try_from(request("Dar")).unwrap();
        let merged = base
            .clone()
            .merge(PlaceUpdate {
                place_type: Some(PlaceType::TerrainVide),
                is_awaited: Some(true),
                ..PlaceUpdate::default()
            })
            .unwrap();
        assert_eq!(merged.name, base.name);
        assert_eq!(merged.description, base.description);
        assert_eq!(merged.place_type, PlaceType::TerrainVide);
        assert!(merged.is_awaited);

        let renamed = base
            .merge(PlaceUpdate {
                name: Some("".into()),
                ..PlaceUpdate::default()
            });
        assert!(renamed.is_err());
    }

    #[test]
    fn owner_or_staff_may_write() {
        let owner = caller(Role::User);
        let stranger = caller(Role::User);
        let staff = caller(Role::SousAdmin);
        let place = place_owned_by(owner.0.id);

        assert!(authorize_place_write(&owner, &place).is_ok());
        assert!(authorize_place_write(&staff, &place).is_ok());
        assert!(matches!(
            authorize_place_write(&stranger, &place),
            Err(AppError::Forbidden)
        ));
    }

    #[test]
    fn rename_rederives_slug_and_keeps_id_tail() {
        let mut place = place_owned_by(Uuid::new_v4());
        place.slug = make_slug(&place.name, place.id);
        let draft = PlaceDraft::from(&place);

        assert_eq!(slug_after_update(&place, &draft), place.slug);

        let renamed = draft
            .clone()
            .merge(PlaceUpdate {
                name: Some("Dar Zitoun".into()),
                ..PlaceUpdate::default()
            })
            .unwrap();
        let slug = slug_after_update(&place, &renamed);
        assert_eq!(slug, make_slug("Dar Zitoun", place.id));
        assert!(slug.starts_with("dar-zitoun-"));
        assert_eq!(slug[slug.len() - 6..], place.slug[place.slug.len() - 6..]);

        let retyped = draft
            .merge(PlaceUpdate {
                place_type: Some(PlaceType::R2),
                ..PlaceUpdate::default()
            })
            .unwrap();
        assert_eq!(slug_after_update(&place, &retyped), place.slug);
    }

    #[tokio::test]
    async fn duplicate_is_409_with_hint() {
        use axum::response::IntoResponse;
        use http_body_util::BodyExt;

        assert!(refuse_duplicate(false, Uuid::nil(), "Villa").is_ok());

        let err = refuse_duplicate(true, Uuid::nil(), "Villa").unwrap_err();
        let resp = err.into_response();
        assert_eq!(resp.status(), axum::http::StatusCode::CONFLICT);
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "fail");
        assert_eq!(body["message"], DUPLICATE_PLACE);
    }
}
