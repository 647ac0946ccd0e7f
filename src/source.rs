// 📡 Sources - Where listings and decode records come from
// Trait seams for the paginated listing feed and the per-VIN decode service,
// plus offline implementations and the pagination loop

use crate::decode::DecodeRecord;
use crate::listing::Listing;
use anyhow::Context as AnyhowContext;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::thread;
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Unauthorized - check the API key")]
    Unauthorized,

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("Gave up after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    #[error("Invalid VIN for decode: {0}")]
    InvalidVin(String),

    #[error("Decode service disabled")]
    Disabled,
}

impl From<serde_json::Error> for SourceError {
    fn from(err: serde_json::Error) -> Self {
        SourceError::Parse(err.to_string())
    }
}

// ============================================================================
// FILTERS & PAGES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchFilters {
    pub make: String,
    pub model: String,
    pub year_min: i32,
    pub year_max: i32,
    pub per_page: u32,
    pub zip_code: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl Default for SearchFilters {
    fn default() -> Self {
        SearchFilters {
            make: "Toyota".to_string(),
            model: "4Runner".to_string(),
            year_min: 1984,
            year_max: 2002,
            per_page: 100,
            zip_code: None,
            latitude: None,
            longitude: None,
        }
    }
}

impl SearchFilters {
    /// Query pairs for the listing endpoint. A ZIP code wins over coordinates.
    pub fn query_pairs(&self, page: u32) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("make", self.make.clone()),
            ("model", self.model.clone()),
            ("page", page.to_string()),
            ("per_page", self.per_page.to_string()),
            ("year_min", self.year_min.to_string()),
            ("year_max", self.year_max.to_string()),
        ];

        if let Some(zip) = self.zip_code.as_ref().filter(|z| !z.is_empty()) {
            pairs.push(("zip", zip.clone()));
        } else if let (Some(lat), Some(lon)) = (self.latitude, self.longitude) {
            pairs.push(("lat", lat.to_string()));
            pairs.push(("lon", lon.to_string()));
        }

        pairs
    }
}

#[derive(Debug, Clone, Default)]
pub struct ListingPage {
    pub records: Vec<Listing>,
    pub total_count: Option<u64>,
}

impl ListingPage {
    /// Parse `{ "records" | "listings": [...], "totalCount": N }`
    pub fn from_value(value: serde_json::Value) -> Result<Self, SourceError> {
        let total_count = value.get("totalCount").and_then(|v| v.as_u64());

        let items = value
            .get("records")
            .or_else(|| value.get("listings"))
            .and_then(|v| v.as_array())
            .ok_or_else(|| SourceError::Parse("response has no records array".to_string()))?;

        Ok(ListingPage {
            records: items.iter().cloned().map(Listing::from_value).collect(),
            total_count,
        })
    }
}

// ============================================================================
// SOURCE TRAITS
// ============================================================================

pub trait ListingSource {
    /// Fetch one 1-indexed page
    fn fetch_page(&self, page: u32, filters: &SearchFilters) -> Result<ListingPage, SourceError>;
}

pub trait DecodeSource {
    fn decode(&self, vin: &str) -> Result<DecodeRecord, SourceError>;

    /// External calls made so far
    fn calls_made(&self) -> u64 {
        0
    }
}

// ============================================================================
// OFFLINE SOURCES
// ============================================================================

/// Replays a captured listing feed: a JSON array of records, or a response
/// object with a `records`/`listings` array.
pub struct JsonFileSource {
    records: Vec<serde_json::Value>,
}

impl JsonFileSource {
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read listing file: {:?}", path.as_ref()))?;
        let value: serde_json::Value =
            serde_json::from_str(&content).context("Failed to parse listing file JSON")?;

        Self::from_value(value).context("Listing file has no records array")
    }

    pub fn from_value(value: serde_json::Value) -> Option<Self> {
        let records = match value {
            serde_json::Value::Array(items) => items,
            other => other
                .get("records")
                .or_else(|| other.get("listings"))
                .and_then(|v| v.as_array())
                .cloned()?,
        };

        Some(JsonFileSource { records })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl ListingSource for JsonFileSource {
    fn fetch_page(&self, page: u32, filters: &SearchFilters) -> Result<ListingPage, SourceError> {
        let per_page = filters.per_page.max(1) as usize;
        let start = (page.max(1) as usize - 1) * per_page;

        let records = self
            .records
            .iter()
            .skip(start)
            .take(per_page)
            .cloned()
            .map(Listing::from_value)
            .collect();

        Ok(ListingPage {
            records,
            total_count: Some(self.records.len() as u64),
        })
    }
}

/// Decoder that is always unavailable; every listing falls back to pattern evidence
pub struct DisabledDecoder;

impl DecodeSource for DisabledDecoder {
    fn decode(&self, _vin: &str) -> Result<DecodeRecord, SourceError> {
        Err(SourceError::Disabled)
    }
}

// ============================================================================
// PAGINATION
// ============================================================================

#[derive(Debug, Default)]
pub struct CollectedListings {
    pub listings: Vec<Listing>,

    /// Set when a page fetch failed; `listings` still holds earlier pages
    pub failure: Option<SourceError>,

    pub pages_fetched: u32,
}

/// Walk pages until the last one, a short page, an empty page or a failure.
/// Sleeps `page_delay` between fetches, never before the first.
pub fn collect_listings(
    source: &dyn ListingSource,
    filters: &SearchFilters,
    page_delay: Duration,
) -> CollectedListings {
    let per_page = filters.per_page.max(1);
    let mut collected = CollectedListings::default();
    let mut page = 1u32;

    loop {
        if page > 1 && !page_delay.is_zero() {
            thread::sleep(page_delay);
        }

        let result = match source.fetch_page(page, filters) {
            Ok(result) => result,
            Err(err) => {
                tracing::warn!("Listing fetch failed on page {}: {}", page, err);
                collected.failure = Some(err);
                break;
            }
        };

        collected.pages_fetched += 1;
        let received = result.records.len();
        collected.listings.extend(result.records);

        tracing::info!(
            "Fetched page {} ({} listings, {} total)",
            page,
            received,
            collected.listings.len()
        );

        if received == 0 || received < per_page as usize {
            break;
        }

        if let Some(total) = result.total_count {
            let last_page = total.div_ceil(per_page as u64);
            if u64::from(page) >= last_page {
                break;
            }
        }

        page += 1;
    }

    collected
}

// ============================================================================
// TESTS
// ============================================================================
