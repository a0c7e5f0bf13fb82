//! Position fix types for the companion agent.
//!
//! A fix is a single reported coordinate. Only what is needed to measure
//! displacement is kept: no altitude, bearing or provider metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single observation from the location provider.
///
/// Fixes are immutable once received and consumed synchronously by the
/// movement daemon.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionFix {
    /// Latitude in degrees, WGS84
    #[serde(rename = "lat")]
    pub latitude: f64,
    /// Longitude in degrees, WGS84
    #[serde(rename = "lon")]
    pub longitude: f64,
    /// Estimated horizontal accuracy in meters, when the provider reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f32>,
    /// When the provider produced the fix
    #[serde(default, rename = "time", skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl PositionFix {
    /// Create a fix at the given coordinate, timestamped now.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, FixError> {
        let fix = Self {
            latitude,
            longitude,
            accuracy: None,
            timestamp: Some(Utc::now()),
        };
        fix.validate()?;
        Ok(fix)
    }

    /// Attach a provider accuracy estimate.
    pub fn with_accuracy(mut self, meters: f32) -> Self {
        self.accuracy = Some(meters);
        self
    }

    /// Check that the coordinate is finite and within WGS84 bounds.
    pub fn validate(&self) -> Result<(), FixError> {
        let lat_ok = self.latitude.is_finite() && (-90.0..=90.0).contains(&self.latitude);
        let lon_ok = self.longitude.is_finite() && (-180.0..=180.0).contains(&self.longitude);
        if lat_ok && lon_ok {
            Ok(())
        } else {
            Err(FixError::OutOfRange {
                latitude: self.latitude,
                longitude: self.longitude,
            })
        }
    }
}

/// Rejected fix.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FixError {
    #[error("coordinate out of range: lat {latitude}, lon {longitude}")]
    OutOfRange { latitude: f64, longitude: f64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fix_validation() {
        assert!(PositionFix::new(48.8566, 2.3522).is_ok());
        assert!(PositionFix::new(90.0, -180.0).is_ok());
        assert!(PositionFix::new(91.0, 0.0).is_err());
        assert!(PositionFix::new(0.0, 180.5).is_err());
        assert!(PositionFix::new(f64::NAN, 0.0).is_err());
    }

    #[test]
    fn test_fix_json_shape() {
        let fix: PositionFix =
            serde_json::from_str(r#"{"lat": 45.5, "lon": -73.6, "accuracy": 8.0}"#).unwrap();
        assert_eq!(fix.latitude, 45.5);
        assert_eq!(fix.longitude, -73.6);
        assert_eq!(fix.accuracy, Some(8.0));
        assert!(fix.timestamp.is_none());

        let fix: PositionFix = serde_json::from_str(
            r#"{"lat": 1.0, "lon": 2.0, "time": "2024-05-01T10:00:00Z"}"#,
        )
        .unwrap();
        assert!(fix.timestamp.is_some());
        assert!(fix.accuracy.is_none());
    }
}
