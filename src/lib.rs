// Manual Hunter - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod vin;        // VIN structure + model-year table
pub mod patterns;   // Curated transmission pattern tables
pub mod classifier; // VIN → manual/automatic verdict
pub mod listing;    // Listing feed records
pub mod decode;     // External VIN-decode payload
pub mod vehicle;    // Durable per-VIN record + provenance
pub mod triage;     // Cheap local partition of a batch
pub mod reconcile;  // Pattern + decode → final verdict
pub mod source;     // Listing/decode seams, pagination
pub mod http;       // auto.dev client
pub mod store;      // SQLite persistence
pub mod pipeline;   // One batch run
pub mod config;     // TOML + environment configuration
pub mod export;     // CSV export

// Re-export commonly used types
pub use classifier::{ClassificationResult, PatternClassifier};
pub use config::{ConfigError, HunterConfig};
pub use decode::DecodeRecord;
pub use listing::Listing;
pub use patterns::{PatternEntry, PatternStatistics, PatternTable, PatternTables};
pub use pipeline::{Hunter, RunSummary};
pub use reconcile::{ReconciliationEngine, TransmissionVerdict};
pub use source::{
    collect_listings, DecodeSource, DisabledDecoder, JsonFileSource, ListingSource,
    SearchFilters, SourceError,
};
pub use store::{SortOrder, VehicleStore, VehicleView};
pub use triage::{Triage, TriageBucket, TriageOutcome, TriageSummary};
pub use vehicle::{ManualSource, Tracking, VehicleRecord};
pub use vin::{VinComponents, VinDecoder, VinError, YearTable};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
