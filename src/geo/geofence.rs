use serde::Serialize;
use utoipa::ToSchema;

use crate::model::location::{LocationSample, OfficeLocation, has_valid_coordinates};

pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, ToSchema)]
pub struct GeofenceResult {
    /// Great-circle distance to the office centre; `null` when it could not
    /// be computed from the inputs.
    #[schema(example = 42.5, value_type = Option<f64>)]
    #[serde(serialize_with = "finite_or_null")]
    pub distance_meters: f64,

    pub within_boundary: bool,
}

fn finite_or_null<S: serde::Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    if value.is_finite() {
        serializer.serialize_some(value)
    } else {
        serializer.serialize_none()
    }
}

/// Haversine distance in meters between two latitude/longitude pairs.
pub fn haversine_distance(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lng2 - lng1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    // rounding can push `a` a hair above 1; a NaN must stay NaN
    let a = if a > 1.0 { 1.0 } else { a };
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_METERS * c
}

/// Classifies `sample` against the office boundary. Never fails: coordinates
/// off the globe, or anything that produces a non-finite distance, are
/// outside.
pub fn evaluate(sample: &LocationSample, office: &OfficeLocation) -> GeofenceResult {
    // haversine is periodic, so lat + 360 would otherwise land on the office
    if !has_valid_coordinates(sample.latitude, sample.longitude) {
        return GeofenceResult {
            distance_meters: f64::NAN,
            within_boundary: false,
        };
    }

    let distance_meters = haversine_distance(
        sample.latitude,
        sample.longitude,
        office.latitude,
        office.longitude,
    );

    GeofenceResult {
        distance_meters,
        within_boundary: distance_meters.is_finite() && distance_meters <= office.radius_meters,
    }
}
