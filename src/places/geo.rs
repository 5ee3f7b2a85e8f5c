//! Great-circle helpers for the radius and distance endpoints.

use std::str::FromStr;

use serde::Serialize;
use uuid::Uuid;

use super::repo_types::Place;
use crate::error::AppError;

pub const EARTH_RADIUS_MI: f64 = 3963.2;
pub const EARTH_RADIUS_KM: f64 = 6378.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Mi,
    Km,
}

impl Unit {
    pub fn earth_radius(self) -> f64 {
        match self {
            Unit::Mi => EARTH_RADIUS_MI,
            Unit::Km => EARTH_RADIUS_KM,
        }
    }
}

impl FromStr for Unit {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mi" => Ok(Unit::Mi),
            "km" => Ok(Unit::Km),
            other => Err(AppError::BadRequest(format!(
                "unit must be mi or km, got {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl FromStr for LatLng {
    type Err = AppError;

    /// `"lat,lng"` in degrees.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || {
            AppError::BadRequest(
                "Please provide latitude and longitude in the format lat,lng.".into(),
            )
        };
        let (lat, lng) = s.split_once(',').ok_or_else(bad)?;
        let lat: f64 = lat.trim().parse().map_err(|_| bad())?;
        let lng: f64 = lng.trim().parse().map_err(|_| bad())?;
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
            return Err(bad());
        }
        Ok(LatLng { lat, lng })
    }
}

/// Search radius in radians for `distance` expressed in `unit`.
pub fn radius_radians(distance: &str, unit: Unit) -> Result<f64, AppError> {
    let d: f64 = distance
        .trim()
        .parse()
        .map_err(|_| AppError::BadRequest(format!("invalid distance: {distance}")))?;
    if !d.is_finite() || d < 0.0 {
        return Err(AppError::BadRequest(
            "distance must be a non-negative number".into(),
        ));
    }
    Ok(d / unit.earth_radius())
}

/// Haversine central angle between two points, in radians.
pub fn angular_distance(a: LatLng, b: LatLng) -> f64 {
    let (lat1, lat2) = (a.lat.to_radians(), b.lat.to_radians());
    let dlat = lat2 - lat1;
    let dlng = (b.lng - a.lng).to_radians();
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
    2.0 * h.sqrt().min(1.0).asin()
}

fn position(place: &Place) -> Option<LatLng> {
    place.location.as_ref().map(|l| LatLng {
        lat: l.lat(),
        lng: l.lng(),
    })
}

/// Places whose location lies within `radius` radians of `center`.
pub fn within(center: LatLng, radius: f64, places: Vec<Place>) -> Vec<Place> {
    places
        .into_iter()
        .filter(|p| position(p).is_some_and(|pos| angular_distance(center, pos) <= radius))
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct PlaceDistance {
    pub id: Uuid,
    pub name: String,
    pub distance: f64,
}

/// Every located place with its distance from `center` in `unit`, nearest first.
pub fn rank_by_distance(center: LatLng, unit: Unit, places: &[Place]) -> Vec<PlaceDistance> {
    let mut ranked: Vec<_> = places
        .iter()
        .filter_map(|p| {
            position(p).map(|pos| PlaceDistance {
                id: p.id,
                name: p.name.clone(),
                distance: angular_distance(center, pos) * unit.earth_radius(),
            })
        })
        .collect();
    ranked.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    ranked
}
