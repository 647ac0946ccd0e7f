// ⚙️ Configuration - TOML file, then environment overrides, then validation
//
// Every section is optional in the file; missing values take the defaults below.

use crate::classifier::PatternClassifier;
use crate::http::ClientSettings;
use crate::patterns::PatternTables;
use crate::pipeline::Hunter;
use crate::reconcile::ReconciliationEngine;
use crate::source::SearchFilters;
use crate::triage::Triage;
use crate::vin::VinDecoder;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {var}: {value:?}")]
    InvalidEnv { var: &'static str, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTIONS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub timeout_seconds: u64,
    pub rate_limit_requests: usize,
    pub rate_limit_window_seconds: u64,
    pub retry_max_attempts: u32,
    pub retry_delay_seconds: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        ApiConfig {
            api_key: None,
            base_url: "https://auto.dev/api".to_string(),
            timeout_seconds: 30,
            rate_limit_requests: 100,
            rate_limit_window_seconds: 60,
            retry_max_attempts: 3,
            retry_delay_seconds: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub make: String,
    pub model: String,
    pub per_page: u32,
    pub zip_code: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig {
            make: "Toyota".to_string(),
            model: "4Runner".to_string(),
            per_page: 20,
            zip_code: None,
            latitude: None,
            longitude: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VinConfig {
    pub manufacturer_prefix: String,
    pub min_year: i32,
    pub max_year: i32,
    pub first_gen_max_year: i32,
}

impl Default for VinConfig {
    fn default() -> Self {
        VinConfig {
            manufacturer_prefix: "JT3".to_string(),
            min_year: 1984,
            max_year: 2002,
            first_gen_max_year: 1989,
        }
    }
}

/// Confidence thresholds (0 - 100)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    /// Triage: manual candidates need at least this
    pub manual_candidate: u8,

    /// Classifier: below this, ask for an external decode
    pub verification: u8,

    /// Reconciliation: at or above this the pattern verdict is final
    pub lock_in: u8,

    /// Reconciliation without decode: manual at or above this
    pub pattern_only: u8,

    /// Reconciliation with a manual decode: agreement at or above this
    pub agreement: u8,

    /// Confidence given to model codes in neither table
    pub unknown_pattern: u8,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        ThresholdConfig {
            manual_candidate: 80,
            verification: 80,
            lock_in: 90,
            pattern_only: 70,
            agreement: 50,
            unknown_pattern: 25,
        }
    }
}

// ============================================================================
// HUNTER CONFIG
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HunterConfig {
    pub database_path: PathBuf,

    /// Optional JSON file replacing the built-in pattern tables
    pub pattern_tables: Option<PathBuf>,

    /// Pause between listing pages
    pub page_delay_ms: u64,

    pub api: ApiConfig,
    pub search: SearchConfig,
    pub vin: VinConfig,
    pub thresholds: ThresholdConfig,
}

impl Default for HunterConfig {
    fn default() -> Self {
        HunterConfig {
            database_path: PathBuf::from("4runner_tracker.db"),
            pattern_tables: None,
            page_delay_ms: 1000,
            api: ApiConfig::default(),
            search: SearchConfig::default(),
            vin: VinConfig::default(),
            thresholds: ThresholdConfig::default(),
        }
    }
}

fn parse_env<T: FromStr>(var: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnv { var, value })
}

impl HunterConfig {
    /// File (if any) → process environment → validation
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        config.apply_env_overrides_from(|var| std::env::var(var).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Apply overrides from a variable lookup (the process environment in production)
    pub fn apply_env_overrides_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &'static str| lookup(var).filter(|v| !v.trim().is_empty());

        if let Some(key) = get("AUTO_DEV_API_KEY") {
            self.api.api_key = Some(key);
        }
        if let Some(url) = get("HUNTER_API_BASE_URL") {
            self.api.base_url = url;
        }
        if let Some(path) = get("HUNTER_DATABASE_PATH") {
            self.database_path = PathBuf::from(path);
        }
        if let Some(v) = get("TARGET_YEAR_MIN") {
            self.vin.min_year = parse_env("TARGET_YEAR_MIN", v)?;
        }
        if let Some(v) = get("TARGET_YEAR_MAX") {
            self.vin.max_year = parse_env("TARGET_YEAR_MAX", v)?;
        }
        if let Some(v) = get("FIRST_GEN_MAX_YEAR") {
            self.vin.first_gen_max_year = parse_env("FIRST_GEN_MAX_YEAR", v)?;
        }
        if let Some(zip) = get("SEARCH_ZIP_CODE") {
            self.search.zip_code = Some(zip);
        }
        if let Some(v) = get("SEARCH_LATITUDE") {
            self.search.latitude = Some(parse_env("SEARCH_LATITUDE", v)?);
        }
        if let Some(v) = get("SEARCH_LONGITUDE") {
            self.search.longitude = Some(parse_env("SEARCH_LONGITUDE", v)?);
        }
        if let Some(v) = get("API_RATE_LIMIT_REQUESTS") {
            self.api.rate_limit_requests = parse_env("API_RATE_LIMIT_REQUESTS", v)?;
        }
        if let Some(v) = get("API_RATE_LIMIT_WINDOW_SECONDS") {
            self.api.rate_limit_window_seconds = parse_env("API_RATE_LIMIT_WINDOW_SECONDS", v)?;
        }
        if let Some(v) = get("API_RETRY_MAX_ATTEMPTS") {
            self.api.retry_max_attempts = parse_env("API_RETRY_MAX_ATTEMPTS", v)?;
        }
        if let Some(v) = get("API_RETRY_DELAY_SECONDS") {
            self.api.retry_delay_seconds = parse_env("API_RETRY_DELAY_SECONDS", v)?;
        }
        if let Some(v) = get("HUNTER_PAGE_DELAY_MS") {
            self.page_delay_ms = parse_env("HUNTER_PAGE_DELAY_MS", v)?;
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let vin = &self.vin;
        if vin.min_year > vin.max_year {
            return Err(ConfigError::Invalid(format!(
                "min_year {} is after max_year {}",
                vin.min_year, vin.max_year
            )));
        }
        // A cutoff below min_year means the window has no first generation
        if vin.first_gen_max_year > vin.max_year {
            return Err(ConfigError::Invalid(format!(
                "first_gen_max_year {} is after max_year {}",
                vin.first_gen_max_year, vin.max_year
            )));
        }
        if vin.manufacturer_prefix.chars().count() != 3 {
            return Err(ConfigError::Invalid(format!(
                "manufacturer_prefix '{}' must be 3 characters",
                vin.manufacturer_prefix
            )));
        }

        let t = &self.thresholds;
        for (name, value) in [
            ("manual_candidate", t.manual_candidate),
            ("verification", t.verification),
            ("lock_in", t.lock_in),
            ("pattern_only", t.pattern_only),
            ("agreement", t.agreement),
            ("unknown_pattern", t.unknown_pattern),
        ] {
            if value > 100 {
                return Err(ConfigError::Invalid(format!(
                    "threshold {} is {} (max 100)",
                    name, value
                )));
            }
        }

        if self.search.per_page == 0 {
            return Err(ConfigError::Invalid("search.per_page must be positive".to_string()));
        }
        if self.api.rate_limit_requests == 0 || self.api.retry_max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "api rate limit and retry attempts must be positive".to_string(),
            ));
        }

        Ok(())
    }

    // ========================================================================
    // BUILDERS
    // ========================================================================

    pub fn decoder(&self) -> VinDecoder {
        VinDecoder::with_window(
            &self.vin.manufacturer_prefix,
            self.vin.min_year,
            self.vin.max_year,
            self.vin.first_gen_max_year,
        )
    }

    pub fn pattern_tables(&self) -> anyhow::Result<PatternTables> {
        match &self.pattern_tables {
            Some(path) => PatternTables::from_file(path),
            None => Ok(PatternTables::standard()),
        }
    }

    pub fn classifier(&self) -> anyhow::Result<PatternClassifier> {
        Ok(PatternClassifier::with_thresholds(
            self.decoder(),
            self.pattern_tables()?,
            self.thresholds.unknown_pattern,
            self.thresholds.verification,
        ))
    }

    pub fn triage(&self) -> anyhow::Result<Triage> {
        Ok(Triage::with_threshold(
            self.classifier()?,
            self.thresholds.manual_candidate,
        ))
    }

    pub fn engine(&self) -> ReconciliationEngine {
        ReconciliationEngine::with_thresholds(
            self.thresholds.pattern_only,
            self.thresholds.agreement,
            self.thresholds.lock_in,
        )
    }

    pub fn filters(&self) -> SearchFilters {
        SearchFilters {
            make: self.search.make.clone(),
            model: self.search.model.clone(),
            year_min: self.vin.min_year,
            year_max: self.vin.max_year,
            per_page: self.search.per_page,
            zip_code: self.search.zip_code.clone(),
            latitude: self.search.latitude,
            longitude: self.search.longitude,
        }
    }

    pub fn page_delay(&self) -> Duration {
        Duration::from_millis(self.page_delay_ms)
    }

    pub fn hunter(&self) -> anyhow::Result<Hunter> {
        Ok(Hunter::new(self.triage()?, self.engine(), self.filters()).with_page_delay(self.page_delay()))
    }

    pub fn client_settings(&self) -> ClientSettings {
        ClientSettings {
            base_url: self.api.base_url.clone(),
            api_key: self.api.api_key.clone().unwrap_or_default(),
            timeout: Duration::from_secs(self.api.timeout_seconds),
            rate_limit_requests: self.api.rate_limit_requests,
            rate_limit_window: Duration::from_secs(self.api.rate_limit_window_seconds),
            max_attempts: self.api.retry_max_attempts,
            retry_delay: Duration::from_secs(self.api.retry_delay_seconds),
        }
    }

    pub fn has_api_key(&self) -> bool {
        self.api
            .api_key
            .as_deref()
            .map_or(false, |key| !key.trim().is_empty())
    }

    pub fn open_store(&self) -> anyhow::Result<rusqlite::Connection> {
        crate::store::open(&self.database_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var: &str| vars.get(var).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = HunterConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.thresholds.manual_candidate, 80);
        assert_eq!(config.thresholds.lock_in, 90);
        assert_eq!(config.page_delay(), Duration::from_secs(1));
        assert!(!config.has_api_key());
    }

    #[test]
    fn test_partial_toml() {
        let config = HunterConfig::from_toml(
            r#"
            database_path = "/tmp/hunter.db"

            [vin]
            max_year = 2000

            [thresholds]
            lock_in = 95
            "#,
        )
        .unwrap();

        assert_eq!(config.database_path, PathBuf::from("/tmp/hunter.db"));
        assert_eq!(config.vin.max_year, 2000);
        assert_eq!(config.vin.min_year, 1984);
        assert_eq!(config.thresholds.lock_in, 95);
        assert_eq!(config.thresholds.pattern_only, 70);
        assert_eq!(config.engine().lock_in_threshold, 95);
        assert_eq!(config.filters().year_max, 2000);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = HunterConfig::default();
        config
            .apply_env_overrides_from(env(&[
                ("AUTO_DEV_API_KEY", "secret"),
                ("TARGET_YEAR_MIN", "1990"),
                ("SEARCH_ZIP_CODE", "83702"),
                ("SEARCH_LATITUDE", "43.6"),
                ("API_RETRY_MAX_ATTEMPTS", "5"),
                ("HUNTER_PAGE_DELAY_MS", "0"),
                ("SEARCH_LONGITUDE", "  "),
            ]))
            .unwrap();

        assert!(config.has_api_key());
        assert_eq!(config.client_settings().api_key, "secret");
        assert_eq!(config.client_settings().max_attempts, 5);
        assert_eq!(config.vin.min_year, 1990);
        assert_eq!(config.filters().zip_code.as_deref(), Some("83702"));
        assert_eq!(config.search.latitude, Some(43.6));
        assert_eq!(config.search.longitude, None);
        assert_eq!(config.page_delay(), Duration::ZERO);

        // 1989 cutoff sits below the window: valid, just no first generation
        assert!(config.validate().is_ok());
        let classifier = config.classifier().unwrap();
        assert!(classifier.classify("JT3RN60L0F0123456").outside_target_range);
        let second_gen = classifier.classify("JT3LN130XL0012345");
        assert!(!second_gen.is_first_generation);
        assert!(second_gen.is_manual_candidate);
    }

    #[test]
    fn test_bad_env_value() {
        let mut config = HunterConfig::default();
        let err = config
            .apply_env_overrides_from(env(&[("TARGET_YEAR_MAX", "soon")]))
            .unwrap_err();

        assert!(matches!(
            err,
            ConfigError::InvalidEnv { var: "TARGET_YEAR_MAX", .. }
        ));
    }

    #[test]
    fn test_validation() {
        let mut config = HunterConfig::default();
        config.vin.min_year = 2005;
        assert!(config.validate().is_err());

        let mut config = HunterConfig::default();
        config.vin.first_gen_max_year = 2010;
        assert!(config.validate().unwrap_err().to_string().contains("first_gen_max_year"));

        let mut config = HunterConfig::default();
        config.thresholds.agreement = 101;
        assert!(config.validate().unwrap_err().to_string().contains("agreement"));

        let mut config = HunterConfig::default();
        config.search.per_page = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hunter.toml");
        fs::write(&path, "page_delay_ms = 250\n[search]\nper_page = 50\n").unwrap();

        let config = HunterConfig::from_file(&path).unwrap();
        assert_eq!(config.page_delay_ms, 250);
        assert_eq!(config.filters().per_page, 50);

        assert!(matches!(
            HunterConfig::from_file(&dir.path().join("missing.toml")),
            Err(ConfigError::Read { .. })
        ));

        fs::write(&path, "page_delay_ms = \"fast\"").unwrap();
        assert!(matches!(HunterConfig::from_file(&path), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_custom_pattern_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("patterns.json");
        fs::write(
            &path,
            r#"{"manual": [{"model_code": "GM84R", "years": [1999], "trans": "5-Speed Manual", "confidence": 85}], "automatic": []}"#,
        )
        .unwrap();

        let config = HunterConfig {
            pattern_tables: Some(path),
            ..HunterConfig::default()
        };
        let result = config.classifier().unwrap().classify("JT3GM84R7X0045803");
        assert!(result.is_manual_candidate);
        assert_eq!(result.confidence, 85);
    }
}
