// 🔬 Decode Record - External VIN-decode payload
// Transmission evidence for reconciliation plus descriptive fields (engine, colors)

use crate::listing::{lenient, lenient_or_default, NumberOrText};
use serde::{Deserialize, Deserializer, Serialize};

// Descriptive fields are read one by one; a mistyped value drops only itself
// and never the transmission evidence.

fn lenient_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    let number: Option<NumberOrText> = lenient(deserializer)?;
    Ok(number
        .as_ref()
        .and_then(NumberOrText::as_f64)
        .filter(|n| n.is_finite() && *n >= 0.0))
}

fn lenient_whole<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: TryFrom<i64>,
{
    Ok(lenient_f64(deserializer)?.and_then(|n| T::try_from(n.round() as i64).ok()))
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodedTransmission {
    #[serde(default, deserialize_with = "lenient")]
    pub transmission_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodedEngine {
    #[serde(default, deserialize_with = "lenient_whole")]
    pub cylinder: Option<u8>,

    /// Displacement in liters
    #[serde(default, deserialize_with = "lenient_f64")]
    pub size: Option<f64>,

    /// "V", "I", "H"
    #[serde(default, deserialize_with = "lenient")]
    pub configuration: Option<String>,

    #[serde(default, deserialize_with = "lenient")]
    pub fuel_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_whole")]
    pub horsepower: Option<u32>,
    #[serde(default, deserialize_with = "lenient_whole")]
    pub torque: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColorOption {
    #[serde(default, deserialize_with = "lenient_or_default")]
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColorCategory {
    #[serde(default, deserialize_with = "lenient_or_default")]
    pub category: String,

    #[serde(default, deserialize_with = "lenient_or_default")]
    pub options: Vec<ColorOption>,
}

// ============================================================================
// ENGINE SIGNATURES
// ============================================================================

/// Cylinders + displacement (+ configuration) → engine code
struct EngineSignature {
    cylinders: u8,
    /// Displacement in tenths of a liter
    displacement_tenths: i64,
    configuration: Option<&'static str>,
    code: &'static str,
}

const ENGINE_SIGNATURES: &[EngineSignature] = &[
    EngineSignature { cylinders: 4, displacement_tenths: 24, configuration: None, code: "22R-E" },
    EngineSignature { cylinders: 4, displacement_tenths: 27, configuration: None, code: "3RZ-FE" },
    EngineSignature { cylinders: 6, displacement_tenths: 30, configuration: Some("V"), code: "3VZ-E" },
    EngineSignature { cylinders: 6, displacement_tenths: 34, configuration: Some("V"), code: "5VZ-FE" },
];

impl DecodedEngine {
    /// Engine code from the cylinder/displacement/configuration triple
    pub fn engine_code(&self) -> Option<&'static str> {
        let cylinders = self.cylinder?;
        let tenths = (self.size? * 10.0).round() as i64;
        let configuration = self
            .configuration
            .as_deref()
            .map(|c| c.trim().to_ascii_uppercase());

        ENGINE_SIGNATURES
            .iter()
            .find(|sig| {
                sig.cylinders == cylinders
                    && sig.displacement_tenths == tenths
                    && sig
                        .configuration
                        .map_or(true, |want| configuration.as_deref() == Some(want))
            })
            .map(|sig| sig.code)
    }

    /// "5VZ-FE 3.4L V6 gasoline 183 HP 217 lb-ft"
    pub fn describe(&self) -> Option<String> {
        let mut parts: Vec<String> = Vec::new();

        if let Some(code) = self.engine_code() {
            parts.push(code.to_string());
        }
        if let Some(size) = self.size.filter(|s| *s > 0.0) {
            parts.push(format!("{:.1}L", size));
        }
        if let (Some(configuration), Some(cylinder)) = (&self.configuration, self.cylinder) {
            parts.push(format!("{}{}", configuration, cylinder));
        }
        if let Some(fuel) = self.fuel_type.as_ref().filter(|f| !f.is_empty()) {
            parts.push(fuel.clone());
        }
        if let Some(hp) = self.horsepower.filter(|hp| *hp > 0) {
            parts.push(format!("{} HP", hp));
        }
        if let Some(torque) = self.torque.filter(|t| *t > 0) {
            parts.push(format!("{} lb-ft", torque));
        }

        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" "))
        }
    }
}

// ============================================================================
// DECODE RECORD
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodeRecord {
    #[serde(default, deserialize_with = "lenient")]
    pub transmission: Option<DecodedTransmission>,
    #[serde(default, deserialize_with = "lenient")]
    pub engine: Option<DecodedEngine>,

    #[serde(default, deserialize_with = "lenient_or_default")]
    pub colors: Vec<ColorCategory>,

    #[serde(default, deserialize_with = "lenient")]
    pub driven_wheels: Option<String>,

    /// Original payload snapshot
    #[serde(skip)]
    pub raw: serde_json::Value,
}

impl DecodeRecord {
    /// Fails only when the payload is not an object
    pub fn from_value(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        let mut record: DecodeRecord = serde_json::from_value(value.clone())?;
        record.raw = value;
        Ok(record)
    }

    /// Upper-cased reported transmission type, if any
    pub fn transmission_type(&self) -> Option<String> {
        self.transmission
            .as_ref()
            .and_then(|t| t.transmission_type.as_deref())
            .map(|t| t.trim().to_uppercase())
            .filter(|t| !t.is_empty())
    }

    pub fn reports_manual(&self) -> bool {
        self.transmission_type()
            .map_or(false, |t| t.contains("MANUAL"))
    }

    pub fn engine_info(&self) -> Option<String> {
        self.engine.as_ref().and_then(DecodedEngine::describe)
    }

    /// "Exterior: Red; Interior: Gray"
    pub fn color_options(&self) -> Option<String> {
        let options: Vec<String> = self
            .colors
            .iter()
            .flat_map(|category| {
                category
                    .options
                    .iter()
                    .filter(|option| !option.name.is_empty())
                    .map(move |option| format!("{}: {}", category.category, option.name))
            })
            .collect();

        if options.is_empty() {
            None
        } else {
            Some(options.join("; "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn engine(cylinder: u8, size: f64, configuration: &str) -> DecodedEngine {
        DecodedEngine {
            cylinder: Some(cylinder),
            size: Some(size),
            configuration: Some(configuration.to_string()),
            ..DecodedEngine::default()
        }
    }

    #[test]
    fn test_engine_codes() {
        assert_eq!(engine(4, 2.4, "I").engine_code(), Some("22R-E"));
        assert_eq!(engine(4, 2.7, "Inline").engine_code(), Some("3RZ-FE"));
        assert_eq!(engine(6, 3.0, "V").engine_code(), Some("3VZ-E"));
        assert_eq!(engine(6, 3.4, "v").engine_code(), Some("5VZ-FE"));
        assert_eq!(engine(6, 3.4, "I").engine_code(), None);
        assert_eq!(engine(8, 4.7, "V").engine_code(), None);
        assert_eq!(DecodedEngine::default().engine_code(), None);
    }

    #[test]
    fn test_engine_description() {
        let engine = DecodedEngine {
            cylinder: Some(6),
            size: Some(3.4),
            configuration: Some("V".to_string()),
            fuel_type: Some("gasoline".to_string()),
            horsepower: Some(183),
            torque: Some(217),
        };

        assert_eq!(
            engine.describe().as_deref(),
            Some("5VZ-FE 3.4L V6 gasoline 183 HP 217 lb-ft")
        );
        assert_eq!(DecodedEngine::default().describe(), None);
    }

    #[test]
    fn test_from_value() {
        let record = DecodeRecord::from_value(json!({
            "transmission": {"transmissionType": "Manual"},
            "engine": {"cylinder": 4, "size": 2.4, "configuration": "I", "fuelType": "regular unleaded"},
            "colors": [
                {"category": "Exterior", "options": [{"name": "Red"}, {"name": ""}, {"name": "White"}]},
                {"category": "Interior", "options": [{"name": "Gray"}]}
            ],
            "drivenWheels": "four wheel drive",
            "make": {"name": "Toyota"}
        }))
        .unwrap();

        assert_eq!(record.transmission_type().as_deref(), Some("MANUAL"));
        assert!(record.reports_manual());
        assert_eq!(
            record.color_options().as_deref(),
            Some("Exterior: Red; Exterior: White; Interior: Gray")
        );
        assert_eq!(
            record.engine_info().as_deref(),
            Some("22R-E 2.4L I4 regular unleaded")
        );
        assert_eq!(record.raw["make"]["name"], json!("Toyota"));
    }

    #[test]
    fn test_missing_transmission_is_not_manual() {
        let record = DecodeRecord::from_value(json!({})).unwrap();

        assert_eq!(record.transmission_type(), None);
        assert!(!record.reports_manual());
        assert_eq!(record.color_options(), None);
        assert_eq!(record.engine_info(), None);

        let automatic = DecodeRecord::from_value(json!({
            "transmission": {"transmissionType": "AUTOMATIC"}
        }))
        .unwrap();
        assert!(!automatic.reports_manual());
    }

    #[test]
    fn test_mistyped_descriptive_fields_keep_transmission() {
        let record = DecodeRecord::from_value(json!({
            "transmission": {"transmissionType": "MANUAL"},
            "engine": {
                "cylinder": "6",
                "size": 3.4,
                "configuration": "V",
                "horsepower": 150.5,
                "torque": {"value": 220}
            },
            "colors": [
                {"category": "Exterior", "options": [{"name": 7}, {"name": "Black"}]},
                {"category": ["Interior"], "options": "none"}
            ],
            "drivenWheels": 4
        }))
        .unwrap();

        assert!(record.reports_manual());
        let engine = record.engine.as_ref().unwrap();
        assert_eq!(engine.cylinder, Some(6));
        assert_eq!(engine.horsepower, Some(151));
        assert_eq!(engine.torque, None);
        assert_eq!(engine.engine_code(), Some("5VZ-FE"));
        assert_eq!(record.color_options().as_deref(), Some("Exterior: Black"));
        assert_eq!(record.driven_wheels, None);
    }

    #[test]
    fn test_mistyped_sections_drop_only_themselves() {
        let record = DecodeRecord::from_value(json!({
            "transmission": {"transmissionType": "Manual 5-Speed"},
            "engine": "3.4L V6",
            "colors": {"exterior": "Red"}
        }))
        .unwrap();

        assert!(record.reports_manual());
        assert_eq!(record.engine, None);
        assert_eq!(record.color_options(), None);

        assert!(DecodeRecord::from_value(json!("JT3GM84R7T0045803")).is_err());
    }
}
