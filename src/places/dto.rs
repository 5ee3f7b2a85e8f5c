use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{
    geo::PlaceDistance,
    repo_types::{Location, Place, PlaceType},
    stats::{MonthPlan, TypeStats},
};

/// `POST /places`. The creator comes from the session, never the body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePlaceRequest {
    pub name: String,
    pub address: Option<String>,
    #[serde(rename = "type")]
    pub place_type: PlaceType,
    pub description: Option<String>,
    #[serde(default)]
    pub start_dates: Vec<String>,
    pub location: Option<Location>,
    #[serde(default)]
    pub is_awaited: bool,
}

/// `PATCH /places/:id`. Fields left out are kept as they are.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceUpdate {
    pub name: Option<String>,
    pub address: Option<String>,
    #[serde(rename = "type")]
    pub place_type: Option<PlaceType>,
    pub description: Option<String>,
    pub start_dates: Option<Vec<String>>,
    pub location: Option<Location>,
    pub is_awaited: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct PlaceData {
    pub place: Place,
}

#[derive(Debug, Serialize)]
pub struct PlacesData {
    pub places: Vec<Value>,
}

#[derive(Debug, Serialize)]
pub struct NearbyData {
    pub places: Vec<Place>,
}

#[derive(Debug, Serialize)]
pub struct DistancesData {
    pub distances: Vec<PlaceDistance>,
}

#[derive(Debug, Serialize)]
pub struct StatsData {
    pub stats: Vec<TypeStats>,
}

#[derive(Debug, Serialize)]
pub struct PlanData {
    pub plan: Vec<MonthPlan>,
}
