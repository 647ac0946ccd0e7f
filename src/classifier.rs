// 🧭 Pattern Classifier - VIN → manual/automatic verdict with confidence
//
// Rules, first match wins:
//   1. undecodable VIN          → not a candidate, confidence 0, outside range
//   2. first generation         → candidate, confidence 100 (collect all)
//   3. manual table match       → candidate, entry confidence
//   4. automatic table match    → not a candidate, entry confidence
//   5. unknown pattern          → not a candidate, low confidence

use crate::patterns::PatternTables;
use crate::vin::{VinComponents, VinDecoder};
use serde::{Deserialize, Serialize};

pub const FIRST_GEN_TRANSMISSION: &str = "Any (1st Gen Collection)";
pub const UNKNOWN_TRANSMISSION: &str = "Unknown";

// ============================================================================
// CLASSIFICATION RESULT
// ============================================================================

/// Outcome of classifying one VIN. Never mutated; a later decode supersedes it
/// through reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub is_manual_candidate: bool,
    pub confidence: u8,

    /// Audit trail, carried verbatim into storage
    pub reason: String,

    pub transmission_type: String,
    pub year: Option<i32>,
    pub model_code: Option<String>,

    /// Local evidence is weak; an external decode would add information
    pub needs_api_check: bool,

    pub is_first_generation: bool,
    pub outside_target_range: bool,
}

impl ClassificationResult {
    fn rejected(reason: String) -> Self {
        ClassificationResult {
            is_manual_candidate: false,
            confidence: 0,
            reason,
            transmission_type: UNKNOWN_TRANSMISSION.to_string(),
            year: None,
            model_code: None,
            needs_api_check: false,
            is_first_generation: false,
            outside_target_range: true,
        }
    }
}

// ============================================================================
// PATTERN CLASSIFIER
// ============================================================================

pub struct PatternClassifier {
    decoder: VinDecoder,
    tables: PatternTables,

    /// Confidence assigned to model codes in neither table (default: 25)
    pub unknown_pattern_confidence: u8,

    /// Results below this confidence ask for an external check (default: 80)
    pub verification_threshold: u8,
}

impl PatternClassifier {
    pub fn new(decoder: VinDecoder, tables: PatternTables) -> Self {
        PatternClassifier {
            decoder,
            tables,
            unknown_pattern_confidence: 25,
            verification_threshold: 80,
        }
    }

    pub fn with_thresholds(
        decoder: VinDecoder,
        tables: PatternTables,
        unknown_pattern_confidence: u8,
        verification_threshold: u8,
    ) -> Self {
        PatternClassifier {
            decoder,
            tables,
            unknown_pattern_confidence,
            verification_threshold,
        }
    }

    pub fn decoder(&self) -> &VinDecoder {
        &self.decoder
    }

    pub fn tables(&self) -> &PatternTables {
        &self.tables
    }

    pub fn classify(&self, vin: &str) -> ClassificationResult {
        let components = match self.decoder.extract_components(vin) {
            Ok(components) => components,
            Err(err) => return ClassificationResult::rejected(err.to_string()),
        };

        let (is_manual_candidate, confidence, reason) = self.verdict(&components);

        ClassificationResult {
            is_manual_candidate,
            confidence,
            reason,
            transmission_type: self.transmission_type(&components),
            year: Some(components.year),
            needs_api_check: confidence < self.verification_threshold
                && !components.is_first_generation,
            is_first_generation: components.is_first_generation,
            outside_target_range: false,
            model_code: Some(components.model_code),
        }
    }

    fn verdict(&self, components: &VinComponents) -> (bool, u8, String) {
        let year = components.year;
        let code = components.model_code.as_str();

        if components.is_first_generation {
            return (
                true,
                100,
                format!(
                    "First-generation collection ({}) - collected regardless of transmission",
                    year
                ),
            );
        }

        if let Some(entry) = self.tables.manual.lookup(code, year) {
            return (
                true,
                entry.confidence,
                format!("Pattern '{}' matches {}", entry.model_code, entry.transmission_label),
            );
        }

        if let Some(entry) = self.tables.automatic.lookup(code, year) {
            return (
                false,
                entry.confidence,
                format!("Pattern '{}' is {}", entry.model_code, entry.transmission_label),
            );
        }

        (
            false,
            self.unknown_pattern_confidence,
            format!("Unknown pattern '{}' for year {} - needs verification", code, year),
        )
    }

    fn transmission_type(&self, components: &VinComponents) -> String {
        if components.is_first_generation {
            return FIRST_GEN_TRANSMISSION.to_string();
        }

        self.tables
            .transmission_label(&components.model_code, components.year)
            .unwrap_or(UNKNOWN_TRANSMISSION)
            .to_string()
    }
}

impl Default for PatternClassifier {
    fn default() -> Self {
        Self::new(VinDecoder::new(), PatternTables::standard())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_vin_is_outside_range() {
        let classifier = PatternClassifier::default();
        let result = classifier.classify("JT3LN130");

        assert!(!result.is_manual_candidate);
        assert_eq!(result.confidence, 0);
        assert!(result.outside_target_range);
        assert!(!result.needs_api_check);
        assert_eq!(result.transmission_type, UNKNOWN_TRANSMISSION);
        assert!(result.reason.contains("Invalid VIN length"));
    }

    #[test]
    fn test_year_outside_window() {
        let classifier = PatternClassifier::new(
            VinDecoder::with_window("JT3", 1984, 2000, 1989),
            PatternTables::standard(),
        );

        // 2001 and 2002 VZN18: valid VINs, but outside this window
        for vin in ["JT3VZN18010123456", "JT3VZN18020123456"] {
            let result = classifier.classify(vin);
            assert!(result.outside_target_range, "{vin}");
            assert!(!result.is_manual_candidate, "{vin}");
            assert!(result.reason.contains("outside target range"), "{vin}");
        }
    }

    #[test]
    fn test_first_generation_regardless_of_model_code() {
        let classifier = PatternClassifier::default();

        for vin in ["JT3RN60L0F0123456", "JT3HN87R3E0043862", "JT3ZZZZZ1K0000001"] {
            let result = classifier.classify(vin);
            assert!(result.is_manual_candidate, "{vin}");
            assert_eq!(result.confidence, 100, "{vin}");
            assert!(result.is_first_generation, "{vin}");
            assert!(!result.needs_api_check, "{vin}");
            assert_eq!(result.transmission_type, FIRST_GEN_TRANSMISSION);
            assert!(result.reason.starts_with("First-generation collection"));
        }
    }

    #[test]
    fn test_manual_table_wins_over_automatic() {
        let classifier = PatternClassifier::default();
        let result = classifier.classify("JT3LN130XL0012345");

        assert!(result.is_manual_candidate);
        assert_eq!(result.confidence, 95);
        assert_eq!(result.year, Some(1990));
        assert_eq!(result.model_code.as_deref(), Some("LN130"));
        assert_eq!(result.transmission_type, "5-Speed Manual");
        assert_eq!(result.reason, "Pattern 'LN130' matches 5-Speed Manual");
        assert!(!result.needs_api_check);
    }

    #[test]
    fn test_automatic_pattern() {
        let classifier = PatternClassifier::default();
        let result = classifier.classify("JT3HN86R7W0175125");

        assert!(!result.is_manual_candidate);
        assert_eq!(result.confidence, 95);
        assert_eq!(result.year, Some(1998));
        assert_eq!(result.transmission_type, "4-Speed Auto");
        assert!(!result.needs_api_check);
        assert!(!result.outside_target_range);
    }

    #[test]
    fn test_unknown_pattern_needs_check() {
        let classifier = PatternClassifier::default();
        let result = classifier.classify("JT3GM84R7T0045803");

        assert!(!result.is_manual_candidate);
        assert_eq!(result.confidence, 25);
        assert_eq!(result.year, Some(1996));
        assert!(result.needs_api_check);
        assert_eq!(result.transmission_type, UNKNOWN_TRANSMISSION);
        assert_eq!(result.reason, "Unknown pattern 'GM84R' for year 1996 - needs verification");
    }

    #[test]
    fn test_pattern_outside_its_years_is_unknown() {
        let classifier = PatternClassifier::default();
        // LN130 only covers 1990-1995
        let result = classifier.classify("JT3LN130XT0012345");

        assert_eq!(result.confidence, 25);
        assert!(result.needs_api_check);
    }

    #[test]
    fn test_weak_table_match_still_needs_check() {
        let classifier = PatternClassifier::new(
            VinDecoder::new(),
            PatternTables {
                manual: crate::patterns::PatternTable::default(),
                automatic: PatternTables::standard().automatic,
            },
        );

        // VZN18 automatic entry sits at 70
        let result = classifier.classify("JT3VZN18XX0123456");
        assert!(!result.is_manual_candidate);
        assert_eq!(result.confidence, 70);
        assert!(result.needs_api_check);
    }

    #[test]
    fn test_classification_is_deterministic() {
        let classifier = PatternClassifier::default();
        assert_eq!(
            classifier.classify("JT3VN39W4N8043298"),
            classifier.classify("JT3VN39W4N8043298")
        );
    }
}
