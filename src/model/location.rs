use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Circular office boundary. Admin changes replace the whole value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "latitude": 12.9716,
    "longitude": 77.5946,
    "radius_meters": 100.0
}))]
pub struct OfficeLocation {
    #[schema(example = 12.9716)]
    pub latitude: f64,

    #[schema(example = 77.5946)]
    pub longitude: f64,

    #[schema(example = 100.0)]
    pub radius_meters: f64,
}

/// One position fix as reported by the client's location sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct LocationSample {
    #[schema(example = 12.9716)]
    pub latitude: f64,

    #[schema(example = 77.5946)]
    pub longitude: f64,

    #[schema(example = 15.0)]
    pub accuracy_meters: f64,

    #[schema(example = "2026-01-15T09:15:00Z", value_type = String, format = "date-time")]
    pub captured_at: DateTime<Utc>,
}

/// Latitude within ±90° and longitude within ±180°. NaN is never valid.
pub fn has_valid_coordinates(latitude: f64, longitude: f64) -> bool {
    (-90.0..=90.0).contains(&latitude) && (-180.0..=180.0).contains(&longitude)
}

impl LocationSample {
    pub fn is_valid(&self) -> bool {
        has_valid_coordinates(self.latitude, self.longitude)
            && self.accuracy_meters.is_finite()
            && self.accuracy_meters >= 0.0
    }

    pub fn age_at(&self, now: DateTime<Utc>) -> Duration {
        now - self.captured_at
    }

    /// Fixes stamped in the future (client clock skew) count as fresh.
    pub fn is_fresh(&self, now: DateTime<Utc>, max_age: std::time::Duration) -> bool {
        match Duration::from_std(max_age) {
            Ok(max_age) => self.age_at(now) <= max_age,
            Err(_) => true,
        }
    }
}

/// Opaque reference to a captured verification image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityArtifact(String);

impl IdentityArtifact {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn is_present(&self) -> bool {
        !self.0.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_at(at: DateTime<Utc>) -> LocationSample {
        LocationSample {
            latitude: 0.0,
            longitude: 0.0,
            accuracy_meters: 5.0,
            captured_at: at,
        }
    }

    #[test]
    fn freshness_is_inclusive_of_max_age() {
        let at = Utc.with_ymd_and_hms(2026, 1, 15, 9, 0, 0).unwrap();
        let sample = sample_at(at);
        let max_age = std::time::Duration::from_secs(60);

        assert!(sample.is_fresh(at + Duration::seconds(60), max_age));
        assert!(!sample.is_fresh(at + Duration::seconds(61), max_age));
        assert!(sample.is_fresh(at - Duration::seconds(5), max_age));
    }

    #[test]
    fn out_of_range_coordinates_are_invalid() {
        let at = Utc.with_ymd_and_hms(2026, 1, 15, 9, 0, 0).unwrap();
        assert!(sample_at(at).is_valid());

        for (latitude, longitude) in [(90.5, 0.0), (372.9716, 77.5946), (0.0, -180.5), (f64::NAN, 0.0)] {
            let sample = LocationSample {
                latitude,
                longitude,
                ..sample_at(at)
            };
            assert!(!sample.is_valid(), "{latitude}, {longitude}");
        }

        let negative_accuracy = LocationSample {
            accuracy_meters: -1.0,
            ..sample_at(at)
        };
        assert!(!negative_accuracy.is_valid());
    }

    #[test]
    fn blank_identity_is_absent() {
        assert!(!IdentityArtifact::new("").is_present());
        assert!(!IdentityArtifact::new("   ").is_present());
        assert!(IdentityArtifact::new("selfie/2026-01-15/42.jpg").is_present());
    }
}
