use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PlaceType {
    #[serde(rename = "r+1")]
    R1,
    #[serde(rename = "r+2")]
    R2,
    #[serde(rename = "r+3")]
    R3,
    #[serde(rename = "terrain vide")]
    TerrainVide,
}

impl PlaceType {
    pub const ALL: [PlaceType; 4] = [
        PlaceType::R1,
        PlaceType::R2,
        PlaceType::R3,
        PlaceType::TerrainVide,
    ];

    /// Stored and wire names, in [`PlaceType::ALL`] order.
    pub const NAMES: [&'static str; 4] = ["r+1", "r+2", "r+3", "terrain vide"];

    pub fn as_str(self) -> &'static str {
        match self {
            PlaceType::R1 => Self::NAMES[0],
            PlaceType::R2 => Self::NAMES[1],
            PlaceType::R3 => Self::NAMES[2],
            PlaceType::TerrainVide => Self::NAMES[3],
        }
    }
}

impl fmt::Display for PlaceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlaceType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PlaceType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| anyhow::anyhow!("unknown place type: {s}"))
    }
}

/// Raw `places` row; the location is flattened into nullable columns.
#[derive(Debug, Clone, FromRow)]
pub struct PlaceRow {
    pub id: Uuid,
    pub name: String,
    pub address: Option<String>,
    #[sqlx(rename = "type")]
    pub place_type: String,
    pub description: Option<String>,
    pub start_dates: Vec<OffsetDateTime>,
    pub location_lng: Option<f64>,
    pub location_lat: Option<f64>,
    pub location_address: Option<String>,
    pub location_city: Option<String>,
    pub location_region: Option<String>,
    pub location_country: Option<String>,
    pub created_by: Uuid,
    pub is_awaited: bool,
    pub slug: String,
    pub created_at: OffsetDateTime,
}

pub const PLACE_COLUMNS: &str = "id, name, address, type, description, start_dates, \
     location_lng, location_lat, location_address, location_city, location_region, \
     location_country, created_by, is_awaited, slug, created_at";

/// GeoJSON-style point plus free-form address parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    #[serde(rename = "type", default = "Location::point")]
    pub kind: String,
    /// `[lng, lat]`
    pub coordinates: [f64; 2],
    pub address: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub country: Option<String>,
}

impl Location {
    fn point() -> String {
        "Point".into()
    }

    pub fn lng(&self) -> f64 {
        self.coordinates[0]
    }

    pub fn lat(&self) -> f64 {
        self.coordinates[1]
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Place {
    pub id: Uuid,
    pub name: String,
    pub address: Option<String>,
    #[serde(rename = "type")]
    pub place_type: PlaceType,
    pub description: Option<String>,
    #[serde(with = "rfc3339_vec")]
    pub start_dates: Vec<OffsetDateTime>,
    pub location: Option<Location>,
    pub created_by: Uuid,
    pub is_awaited: bool,
    pub slug: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl TryFrom<PlaceRow> for Place {
    type Error = anyhow::Error;

    fn try_from(r: PlaceRow) -> Result<Self, Self::Error> {
        let location = match (r.location_lng, r.location_lat) {
            (Some(lng), Some(lat)) => Some(Location {
                kind: Location::point(),
                coordinates: [lng, lat],
                address: r.location_address,
                city: r.location_city,
                region: r.location_region,
                country: r.location_country,
            }),
            _ => None,
        };
        Ok(Self {
            place_type: r.place_type.parse()?,
            id: r.id,
            name: r.name,
            address: r.address,
            description: r.description,
            start_dates: r.start_dates,
            location,
            created_by: r.created_by,
            is_awaited: r.is_awaited,
            slug: r.slug,
            created_at: r.created_at,
        })
    }
}

pub(crate) mod rfc3339_vec {
    use serde::{ser::SerializeSeq, Serializer};
    use time::{format_description::well_known::Rfc3339, OffsetDateTime};

    pub fn serialize<S: Serializer>(dates: &[OffsetDateTime], s: S) -> Result<S::Ok, S::Error> {
        let mut seq = s.serialize_seq(Some(dates.len()))?;
        for d in dates {
            let text = d.format(&Rfc3339).map_err(serde::ser::Error::custom)?;
            seq.serialize_element(&text)?;
        }
        seq.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn row() -> PlaceRow {
        PlaceRow {
            id: Uuid::nil(),
            name: "Villa".into(),
            address: None,
            place_type: "r+2".into(),
            description: None,
            start_dates: vec![datetime!(2024-05-01 0:00 UTC)],
            location_lng: Some(10.18),
            location_lat: Some(36.8),
            location_address: None,
            location_city: Some("Tunis".into()),
            location_region: None,
            location_country: None,
            created_by: Uuid::nil(),
            is_awaited: false,
            slug: "villa-000000".into(),
            created_at: datetime!(2024-01-01 0:00 UTC),
        }
    }

    #[test]
    fn type_names_roundtrip() {
        for t in PlaceType::ALL {
            assert_eq!(t.as_str().parse::<PlaceType>().unwrap(), t);
            assert_eq!(serde_json::to_value(t).unwrap(), t.as_str());
        }
        assert!("villa".parse::<PlaceType>().is_err());
    }

    #[test]
    fn row_folds_location_into_point() {
        let place = Place::try_from(row()).unwrap();
        let loc = place.location.as_ref().unwrap();
        assert_eq!((loc.lng(), loc.lat()), (10.18, 36.8));

        let v = serde_json::to_value(&place).unwrap();
        assert_eq!(v["type"], "r+2");
        assert_eq!(v["location"]["type"], "Point");
        assert_eq!(v["location"]["coordinates"][0], 10.18);
        assert_eq!(v["startDates"][0], "2024-05-01T00:00:00Z");
        assert!(v.get("updatedAt").is_none());
    }

    #[test]
    fn half_a_coordinate_is_no_location() {
        let mut r = row();
        r.location_lat = None;
        assert!(Place::try_from(r).unwrap().location.is_none());
    }
}
