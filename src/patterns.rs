// 🏷️ Pattern Tables - Transmission patterns as data
// Curated model-code × year tables, one manual-leaning and one automatic-leaning

use anyhow::{ensure, Context as AnyhowContext, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::ops::RangeInclusive;
use std::path::Path;

// ============================================================================
// PATTERN ENTRY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternEntry {
    /// VIN positions 4-8
    pub model_code: String,

    /// Model years this entry applies to
    #[serde(alias = "years")]
    pub applicable_years: BTreeSet<i32>,

    /// Human-readable transmission label ("5-Speed Manual", "4-Speed Auto")
    #[serde(alias = "trans")]
    pub transmission_label: String,

    /// Confidence score (0 - 100)
    pub confidence: u8,

    /// Curator notes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl PatternEntry {
    pub fn new(model_code: &str, years: RangeInclusive<i32>, label: &str, confidence: u8) -> Self {
        PatternEntry {
            model_code: model_code.to_string(),
            applicable_years: years.collect(),
            transmission_label: label.to_string(),
            confidence,
            note: None,
        }
    }

    pub fn with_note(mut self, note: &str) -> Self {
        self.note = Some(note.to_string());
        self
    }

    pub fn matches(&self, model_code: &str, year: i32) -> bool {
        self.model_code == model_code && self.applicable_years.contains(&year)
    }
}

// ============================================================================
// PATTERN TABLE
// ============================================================================

/// Ordered lookup table. Insertion order is preserved and the first match wins.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatternTable {
    entries: Vec<PatternEntry>,
}

impl PatternTable {
    pub fn new(entries: Vec<PatternEntry>) -> Self {
        PatternTable { entries }
    }

    pub fn lookup(&self, model_code: &str, year: i32) -> Option<&PatternEntry> {
        self.entries.iter().find(|entry| entry.matches(model_code, year))
    }

    pub fn entries(&self) -> &[PatternEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of (model code, year) combinations covered
    pub fn year_combinations(&self) -> usize {
        self.entries.iter().map(|e| e.applicable_years.len()).sum()
    }

    /// Every model-code + year pair may match at most one entry
    fn validate(&self, table_name: &str) -> Result<()> {
        let mut seen: HashSet<(&str, i32)> = HashSet::new();

        for entry in &self.entries {
            ensure!(
                entry.confidence <= 100,
                "{} pattern '{}' has confidence {} (max 100)",
                table_name,
                entry.model_code,
                entry.confidence
            );
            ensure!(
                entry.model_code.chars().count() == 5,
                "{} pattern '{}' is not a 5-character model code",
                table_name,
                entry.model_code
            );

            for year in &entry.applicable_years {
                ensure!(
                    seen.insert((entry.model_code.as_str(), *year)),
                    "{} pattern '{}' covers {} more than once",
                    table_name,
                    entry.model_code,
                    year
                );
            }
        }

        Ok(())
    }
}

// ============================================================================
// PATTERN TABLES
// ============================================================================

/// The two parallel tables.
///
/// A model code may legitimately appear in both (mixed manual/automatic
/// production), so they are never merged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternTables {
    pub manual: PatternTable,
    pub automatic: PatternTable,
}

impl PatternTables {
    /// Built-in curated tables for 1990-2002 Toyota 4Runners
    pub fn standard() -> Self {
        let gen2 = 1990..=1995;
        let gen3 = 1996..=2002;

        let manual = PatternTable::new(vec![
            PatternEntry::new("VN39W", gen2.clone(), "5-Speed Manual", 90),
            PatternEntry::new("VN39J", gen2.clone(), "5-Speed Manual", 90),
            PatternEntry::new("VN29V", 1995..=1995, "5-Speed Manual", 85),
            PatternEntry::new("RN37W", gen2.clone(), "5-Speed Manual", 90),
            PatternEntry::new("LN130", gen2.clone(), "5-Speed Manual", 95),
            PatternEntry::new("RZN13", gen2.clone(), "5-Speed Manual", 95),
            PatternEntry::new("VZN13", gen2.clone(), "5-Speed Manual", 95),
            PatternEntry::new("RZN18", gen3.clone(), "5-Speed Manual", 85),
            PatternEntry::new("VZN18", gen3.clone(), "5-Speed Manual", 85),
        ]);

        let automatic = PatternTable::new(vec![
            PatternEntry::new("LN130", gen2.clone(), "4-Speed Auto", 85)
                .with_note("some LN130 were automatic"),
            PatternEntry::new("VZN13", gen2, "4-Speed Auto", 85)
                .with_note("some VZN13 were automatic"),
            PatternEntry::new("HN87R", gen3.clone(), "4-Speed Auto", 95),
            PatternEntry::new("HN86R", gen3.clone(), "4-Speed Auto", 95)
                .with_note("decode data wrongly reports manual for these"),
            PatternEntry::new("GN86R", gen3.clone(), "4-Speed Auto", 95),
            PatternEntry::new("GN87R", gen3.clone(), "4-Speed Auto", 95),
            PatternEntry::new("VZN18", gen3.clone(), "4-Speed Auto", 70)
                .with_note("some VZN18 were automatic"),
            PatternEntry::new("RZN18", gen3, "4-Speed Auto", 70)
                .with_note("some RZN18 were automatic"),
        ]);

        PatternTables { manual, automatic }
    }

    /// Load replacement tables from a JSON file: `{ "manual": [...], "automatic": [...] }`
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read pattern file: {:?}", path.as_ref()))?;

        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let tables: PatternTables =
            serde_json::from_str(content).context("Failed to parse pattern tables JSON")?;

        tables.manual.validate("manual")?;
        tables.automatic.validate("automatic")?;

        Ok(tables)
    }

    /// Label for a model code + year, manual table first
    pub fn transmission_label(&self, model_code: &str, year: i32) -> Option<&str> {
        self.manual
            .lookup(model_code, year)
            .or_else(|| self.automatic.lookup(model_code, year))
            .map(|entry| entry.transmission_label.as_str())
    }

    pub fn statistics(&self, min_year: i32, max_year: i32, first_gen_max_year: i32) -> PatternStatistics {
        PatternStatistics::collect(self, min_year, max_year, first_gen_max_year)
    }
}

impl Default for PatternTables {
    fn default() -> Self {
        Self::standard()
    }
}

// ============================================================================
// STATISTICS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternStatistics {
    pub target_years: String,
    pub first_gen_years: String,
    pub manual_patterns: usize,
    pub automatic_patterns: usize,
    pub manual_year_combinations: usize,
    pub automatic_year_combinations: usize,
    pub shared_model_codes: Vec<String>,
}

impl PatternStatistics {
    pub fn collect(tables: &PatternTables, min_year: i32, max_year: i32, first_gen_max_year: i32) -> Self {
        let automatic_codes: HashSet<&str> = tables
            .automatic
            .entries()
            .iter()
            .map(|e| e.model_code.as_str())
            .collect();

        let mut shared_model_codes: Vec<String> = tables
            .manual
            .entries()
            .iter()
            .filter(|e| automatic_codes.contains(e.model_code.as_str()))
            .map(|e| e.model_code.clone())
            .collect();
        shared_model_codes.sort();
        shared_model_codes.dedup();

        PatternStatistics {
            target_years: format!("{}-{}", min_year, max_year),
            first_gen_years: format!("{}-{}", min_year, first_gen_max_year),
            manual_patterns: tables.manual.len(),
            automatic_patterns: tables.automatic.len(),
            manual_year_combinations: tables.manual.year_combinations(),
            automatic_year_combinations: tables.automatic.year_combinations(),
            shared_model_codes,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_matching() {
        let entry = PatternEntry::new("LN130", 1990..=1995, "5-Speed Manual", 95);

        assert!(entry.matches("LN130", 1990));
        assert!(entry.matches("LN130", 1995));
        assert!(!entry.matches("LN130", 1996));
        assert!(!entry.matches("LN131", 1990));
    }

    #[test]
    fn test_first_match_wins_in_insertion_order() {
        let table = PatternTable::new(vec![
            PatternEntry::new("ABCDE", 1990..=1992, "first", 60),
            PatternEntry::new("ABCDE", 1993..=1995, "second", 70),
        ]);

        assert_eq!(table.lookup("ABCDE", 1991).unwrap().transmission_label, "first");
        assert_eq!(table.lookup("ABCDE", 1994).unwrap().transmission_label, "second");
        assert!(table.lookup("ABCDE", 1996).is_none());
    }

    #[test]
    fn test_standard_tables_overlap() {
        let tables = PatternTables::standard();

        // Same code, both tables, different confidence
        assert_eq!(tables.manual.lookup("LN130", 1990).unwrap().confidence, 95);
        assert_eq!(tables.automatic.lookup("LN130", 1990).unwrap().confidence, 85);
        assert_eq!(tables.automatic.lookup("HN86R", 1998).unwrap().confidence, 95);
        assert!(tables.manual.lookup("HN86R", 1998).is_none());

        assert_eq!(tables.transmission_label("VZN18", 1999), Some("5-Speed Manual"));
        assert_eq!(tables.transmission_label("GN87R", 2001), Some("4-Speed Auto"));
        assert_eq!(tables.transmission_label("GM84R", 1999), None);
    }

    #[test]
    fn test_standard_tables_are_valid() {
        let tables = PatternTables::standard();
        assert!(tables.manual.validate("manual").is_ok());
        assert!(tables.automatic.validate("automatic").is_ok());
    }

    #[test]
    fn test_from_json_accepts_short_field_names() {
        let json = r#"{
            "manual": [
                {"model_code": "RN37W", "years": [1990, 1991], "trans": "5-Speed Manual", "confidence": 90}
            ],
            "automatic": []
        }"#;

        let tables = PatternTables::from_json(json).unwrap();
        assert_eq!(tables.manual.len(), 1);
        assert!(tables.automatic.is_empty());
        assert_eq!(tables.manual.lookup("RN37W", 1991).unwrap().confidence, 90);
    }

    #[test]
    fn test_from_json_rejects_duplicate_coverage() {
        let json = r#"{
            "manual": [
                {"model_code": "RN37W", "applicable_years": [1990, 1991], "transmission_label": "5-Speed Manual", "confidence": 90},
                {"model_code": "RN37W", "applicable_years": [1991], "transmission_label": "5-Speed Manual", "confidence": 80}
            ],
            "automatic": []
        }"#;

        let err = PatternTables::from_json(json).unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn test_from_json_rejects_confidence_over_100() {
        let json = r#"{
            "manual": [],
            "automatic": [
                {"model_code": "HN87R", "years": [1996], "trans": "4-Speed Auto", "confidence": 120}
            ]
        }"#;

        assert!(PatternTables::from_json(json).is_err());
    }

    #[test]
    fn test_from_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("patterns.json");
        let tables = PatternTables::standard();
        fs::write(&path, serde_json::to_string_pretty(&tables).unwrap()).unwrap();

        let loaded = PatternTables::from_file(&path).unwrap();
        assert_eq!(loaded, tables);
    }

    #[test]
    fn test_statistics() {
        let stats = PatternStatistics::collect(&PatternTables::standard(), 1984, 2002, 1989);

        assert_eq!(stats.target_years, "1984-2002");
        assert_eq!(stats.first_gen_years, "1984-1989");
        assert_eq!(stats.manual_patterns, 9);
        assert_eq!(stats.automatic_patterns, 8);
        // 6 entries × 6 years + 1 × 1 year + 2 × 7 years
        assert_eq!(stats.manual_year_combinations, 51);
        assert_eq!(stats.shared_model_codes, vec!["LN130", "RZN18", "VZN13", "VZN18"]);
    }
}
