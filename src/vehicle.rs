// 🚙 Vehicle Record - Durable entity, one per VIN
// Listing fields + transmission verdict + provenance + user tracking

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// MANUAL SOURCE (provenance tag)
// ============================================================================

/// Which evidence decided the manual/automatic verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ManualSource {
    /// First-generation vehicle, collected regardless of transmission
    FirstGenCollection,

    /// High-confidence manual pattern, locked in before reconciliation
    PatternLockedManual,

    /// High-confidence automatic pattern, locked in before reconciliation
    PatternLockedAuto,

    /// Pattern and external decode agree on manual
    PatternAndDecode,

    /// External decode says manual, local signal was weak
    DecodeOnly,

    /// External decode says automatic
    DecodeConfirmsAuto,

    /// No decode, pattern confidence high enough to call it manual
    PatternOnlyUnverified,

    /// No decode, low-confidence pattern defaults to automatic
    DecodeUnavailable,
}

impl ManualSource {
    pub const ALL: [ManualSource; 8] = [
        ManualSource::FirstGenCollection,
        ManualSource::PatternLockedManual,
        ManualSource::PatternLockedAuto,
        ManualSource::PatternAndDecode,
        ManualSource::DecodeOnly,
        ManualSource::DecodeConfirmsAuto,
        ManualSource::PatternOnlyUnverified,
        ManualSource::DecodeUnavailable,
    ];

    /// Stored tag
    pub fn as_str(&self) -> &'static str {
        match self {
            ManualSource::FirstGenCollection => "FIRST_GEN_COLLECTION",
            ManualSource::PatternLockedManual => "PATTERN_LOCKED_MANUAL",
            ManualSource::PatternLockedAuto => "PATTERN_LOCKED_AUTO",
            ManualSource::PatternAndDecode => "PATTERN_AND_DECODE",
            ManualSource::DecodeOnly => "DECODE_ONLY",
            ManualSource::DecodeConfirmsAuto => "DECODE_CONFIRMS_AUTO",
            ManualSource::PatternOnlyUnverified => "PATTERN_ONLY_UNVERIFIED",
            ManualSource::DecodeUnavailable => "DECODE_UNAVAILABLE",
        }
    }

    /// Human-readable provenance
    pub fn description(&self) -> &'static str {
        match self {
            ManualSource::FirstGenCollection => "first generation, collected regardless of transmission",
            ManualSource::PatternLockedManual => "high-confidence manual pattern",
            ManualSource::PatternLockedAuto => "high-confidence automatic pattern",
            ManualSource::PatternAndDecode => "pattern and external decode agree",
            ManualSource::DecodeOnly => "external decode only",
            ManualSource::DecodeConfirmsAuto => "external decode confirms automatic",
            ManualSource::PatternOnlyUnverified => "pattern only, unverified",
            ManualSource::DecodeUnavailable => {
                "decode unavailable, low-confidence pattern defaults to automatic"
            }
        }
    }
}

impl fmt::Display for ManualSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ManualSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ManualSource::ALL
            .iter()
            .find(|source| source.as_str() == s)
            .copied()
            .ok_or_else(|| format!("Unknown manual source tag: {}", s))
    }
}

// ============================================================================
// TRACKING
// ============================================================================

/// Storage-managed state. Reconciliation leaves it at its default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Tracking {
    pub first_seen: Option<DateTime<Utc>>,
    pub last_seen: Option<DateTime<Utc>>,
    pub is_seen: bool,
    pub seen_at: Option<DateTime<Utc>>,
    pub is_watched: bool,
    pub watched_at: Option<DateTime<Utc>>,
}

// ============================================================================
// VEHICLE RECORD
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleRecord {
    pub vin: String,
    pub year: Option<i32>,
    pub price: i64,
    pub mileage: i64,
    pub city: Option<String>,
    pub state: Option<String>,
    pub dealer_name: Option<String>,
    pub trim: Option<String>,
    pub drivetrain: Option<String>,
    pub exterior_color: Option<String>,
    pub interior_color: Option<String>,
    pub distance_from_origin: Option<f64>,
    pub listed_at: Option<String>,

    // Classification
    pub model_code: Option<String>,
    pub transmission_type: String,
    pub decoded_transmission: Option<String>,
    pub engine_info: Option<String>,
    pub color_options: Option<String>,
    pub is_manual: bool,
    pub manual_source: ManualSource,
    pub confidence: u8,
    pub reason: String,
    pub is_first_generation: bool,
    pub needs_research: bool,

    // Snapshots
    pub raw_listing: serde_json::Value,
    pub raw_decode: Option<serde_json::Value>,

    #[serde(default)]
    pub tracking: Tracking,
}

impl VehicleRecord {
    pub fn location(&self) -> String {
        match (&self.city, &self.state) {
            (Some(city), Some(state)) => format!("{}, {}", city, state),
            (Some(city), None) => city.clone(),
            (None, Some(state)) => state.clone(),
            (None, None) => String::new(),
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "{} ({}) {} via {} [{}%] - {}",
            self.vin,
            self.year.map_or_else(|| "?".to_string(), |y| y.to_string()),
            if self.is_manual { "MANUAL" } else { "AUTO" },
            self.manual_source,
            self.confidence,
            self.reason
        )
    }

    /// Days since first sighting
    pub fn days_on_market(&self, now: DateTime<Utc>) -> Option<i64> {
        self.tracking
            .first_seen
            .map(|first_seen| (now - first_seen).num_days())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_source_tags_round_trip() {
        for source in ManualSource::ALL {
            assert_eq!(source.as_str().parse::<ManualSource>(), Ok(source));
            assert_eq!(
                serde_json::to_value(source).unwrap(),
                serde_json::json!(source.as_str())
            );
        }
        assert!("VIN_PATTERN_ONLY".parse::<ManualSource>().is_err());
    }

    #[test]
    fn test_days_on_market() {
        let now = Utc::now();
        let mut tracking = Tracking::default();
        tracking.first_seen = Some(now - chrono::Duration::days(12));

        let record = VehicleRecord {
            vin: "JT3LN130XL0012345".to_string(),
            year: Some(1990),
            price: 0,
            mileage: 0,
            city: Some("Boise".to_string()),
            state: Some("ID".to_string()),
            dealer_name: None,
            trim: None,
            drivetrain: None,
            exterior_color: None,
            interior_color: None,
            distance_from_origin: None,
            listed_at: None,
            model_code: None,
            transmission_type: "5-Speed Manual".to_string(),
            decoded_transmission: None,
            engine_info: None,
            color_options: None,
            is_manual: true,
            manual_source: ManualSource::PatternLockedManual,
            confidence: 95,
            reason: "Pattern 'LN130' matches 5-Speed Manual".to_string(),
            is_first_generation: false,
            needs_research: false,
            raw_listing: serde_json::Value::Null,
            raw_decode: None,
            tracking,
        };

        assert_eq!(record.days_on_market(now), Some(12));
        assert_eq!(record.location(), "Boise, ID");
        assert!(record.summary().contains("MANUAL via PATTERN_LOCKED_MANUAL"));
    }
}
