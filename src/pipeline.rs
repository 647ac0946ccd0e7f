// 🏹 Hunter - One batch run, start to finish
// fetch pages → triage → skip known VINs → decode → reconcile → upsert → summary

use crate::listing::Listing;
use crate::reconcile::ReconciliationEngine;
use crate::source::{collect_listings, DecodeSource, ListingSource, SearchFilters};
use crate::store::VehicleStore;
use crate::triage::{Triage, TriageBucket, TriageOutcome, TriageSummary};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Out-of-range listings echoed to the log as a sample
const OUT_OF_RANGE_SAMPLE: usize = 3;

// ============================================================================
// RUN SUMMARY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,

    pub total_listings: usize,
    pub pages_fetched: u32,

    /// Set when pagination stopped on an error; earlier pages were still processed
    pub fetch_failure: Option<String>,

    /// Per-bucket counts from triage
    pub triage: TriageSummary,

    pub decode_calls: usize,
    pub decode_failures: usize,

    /// Automatic-confirmed plus out-of-range
    pub calls_saved: usize,

    pub skipped_existing: usize,
    pub new_records: usize,
    pub updated_records: usize,

    /// New records finalized as manual, first generation included
    pub new_manual_finds: usize,
    pub new_first_gen_finds: usize,

    /// New manual records outside the first generation
    pub confirmed_manuals: usize,

    #[serde(default)]
    pub errors: Vec<String>,
}

impl RunSummary {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        RunSummary {
            started_at,
            finished_at: None,
            total_listings: 0,
            pages_fetched: 0,
            fetch_failure: None,
            triage: TriageSummary::default(),
            decode_calls: 0,
            decode_failures: 0,
            calls_saved: 0,
            skipped_existing: 0,
            new_records: 0,
            updated_records: 0,
            new_manual_finds: 0,
            new_first_gen_finds: 0,
            confirmed_manuals: 0,
            errors: Vec::new(),
        }
    }

    pub fn log(&self) {
        tracing::info!("Search complete");
        tracing::info!("  Total listings: {}", self.total_listings);
        tracing::info!("  Outside target years: {}", self.triage.outside_target_years);
        tracing::info!("  1st gen collected: {}", self.triage.first_gen_collected);
        tracing::info!("  Manual candidates: {}", self.triage.manual_found);
        tracing::info!("  Decode calls: {} ({} failed)", self.decode_calls, self.decode_failures);
        tracing::info!("  Decode calls saved: {}", self.calls_saved);
        tracing::info!("  Skipped (already stored): {}", self.skipped_existing);
        tracing::info!(
            "  New finds: {} manual, {} first gen",
            self.new_manual_finds,
            self.new_first_gen_finds
        );
        if let Some(failure) = &self.fetch_failure {
            tracing::warn!("  Listing fetch stopped early: {}", failure);
        }
    }
}

// ============================================================================
// HUNTER
// ============================================================================

pub struct Hunter {
    triage: Triage,
    engine: ReconciliationEngine,
    pub filters: SearchFilters,

    /// Pause between listing page fetches (default: 1s)
    pub page_delay: Duration,
}

impl Hunter {
    pub fn new(triage: Triage, engine: ReconciliationEngine, filters: SearchFilters) -> Self {
        Hunter {
            triage,
            engine,
            filters,
            page_delay: Duration::from_secs(1),
        }
    }

    pub fn with_page_delay(mut self, page_delay: Duration) -> Self {
        self.page_delay = page_delay;
        self
    }

    pub fn triage(&self) -> &Triage {
        &self.triage
    }

    /// Fetch every page, process, persist the summary
    pub fn run(
        &self,
        source: &dyn ListingSource,
        decoder: &dyn DecodeSource,
        store: &dyn VehicleStore,
    ) -> Result<RunSummary> {
        let mut summary = RunSummary::new(Utc::now());
        tracing::info!(
            "Starting {} {} search ({}-{})",
            self.filters.make,
            self.filters.model,
            self.filters.year_min,
            self.filters.year_max
        );

        let collected = collect_listings(source, &self.filters, self.page_delay);
        summary.pages_fetched = collected.pages_fetched;
        if let Some(failure) = collected.failure {
            let message = failure.to_string();
            summary.errors.push(format!("listing fetch: {}", message));
            summary.fetch_failure = Some(message);
        }

        if collected.listings.is_empty() {
            tracing::warn!("No listings found");
        }

        self.process_listings(collected.listings, decoder, store, &mut summary)?;

        summary.finished_at = Some(Utc::now());
        store
            .record_run(&summary)
            .context("Failed to persist run summary")?;
        summary.log();

        Ok(summary)
    }

    /// Triage, decode and store an already-fetched batch
    pub fn process_listings(
        &self,
        listings: Vec<Listing>,
        decoder: &dyn DecodeSource,
        store: &dyn VehicleStore,
        summary: &mut RunSummary,
    ) -> Result<()> {
        let outcome = self.triage.triage(listings);
        log_triage(&outcome);

        summary.total_listings = outcome.summary.total_listings;
        summary.triage = outcome.summary.clone();
        summary.calls_saved = outcome.estimated_calls_saved();

        let mut processed = store
            .processed_vins()
            .context("Failed to load stored VINs")?;

        for (bucket, triaged) in outcome.decode_queue() {
            let vin = triaged.vin();
            let classification = &triaged.classification;

            if processed.contains(vin) {
                tracing::debug!("Skipping existing VIN: {}", vin);
                summary.skipped_existing += 1;
                if let Err(err) = store.refresh_sighting(&triaged.listing) {
                    tracing::warn!("Could not refresh sighting for {}: {:#}", vin, err);
                }
                continue;
            }
            processed.insert(vin.to_string());

            tracing::info!(
                "Processing new VIN: {} ({}) [{}] - {}",
                vin,
                classification.year.map_or_else(|| "?".to_string(), |y| y.to_string()),
                bucket.label(),
                classification.reason
            );

            summary.decode_calls += 1;
            let decode = match decoder.decode(vin) {
                Ok(decode) => Some(decode),
                Err(err) => {
                    tracing::warn!("VIN decode failed for {}, relying on pattern analysis: {}", vin, err);
                    summary.decode_failures += 1;
                    None
                }
            };

            let record = self
                .engine
                .finalize(&triaged.listing, classification, decode.as_ref());

            let is_new = match store.upsert(&record) {
                Ok(is_new) => is_new,
                Err(err) => {
                    tracing::error!("Failed to store {}: {:#}", vin, err);
                    summary.errors.push(format!("{}: {:#}", vin, err));
                    continue;
                }
            };

            if !is_new {
                summary.updated_records += 1;
                continue;
            }

            summary.new_records += 1;
            if record.is_manual {
                summary.new_manual_finds += 1;
                if !record.is_first_generation {
                    summary.confirmed_manuals += 1;
                }
            }
            if record.is_first_generation {
                summary.new_first_gen_finds += 1;
            }

            if classification.needs_api_check {
                tracing::info!(
                    "RESEARCH: Pattern {} for year {} = {} ({})",
                    classification.model_code.as_deref().unwrap_or("?"),
                    classification.year.map_or_else(|| "?".to_string(), |y| y.to_string()),
                    if record.is_manual { "MANUAL" } else { "AUTO" },
                    record.manual_source
                );
            }
        }

        Ok(())
    }
}

fn log_triage(outcome: &TriageOutcome) {
    let s = &outcome.summary;
    tracing::info!("VIN analysis results:");
    tracing::info!("  Total in target years: {}", s.total_processed - s.outside_target_years);
    tracing::info!("  Outside target years: {}", s.outside_target_years);
    tracing::info!("  1st gen collected: {}", s.first_gen_collected);
    tracing::info!("  Manual candidates (2nd/3rd gen): {}", outcome.manual_candidates.len());
    tracing::info!("  Auto confirmed: {}", s.automatic_found);
    tracing::info!("  Needs verification: {}", s.needs_verification);
    tracing::info!("  Invalid (no VIN): {}", s.invalid);
    tracing::info!("  Decode calls saved: {}", outcome.estimated_calls_saved());

    if !outcome.out_of_range.is_empty() {
        tracing::info!("Filtered out {} listings:", outcome.out_of_range.len());
        for triaged in outcome.out_of_range.iter().take(OUT_OF_RANGE_SAMPLE) {
            tracing::info!("  {} - {}", triaged.vin(), triaged.classification.reason);
        }
    }

    tracing::debug!(
        "Decode queue: {} listings ({} by weak evidence alone)",
        outcome.decode_queue().count(),
        outcome
            .decode_queue()
            .filter(|(bucket, _)| *bucket == TriageBucket::NeedsVerification)
            .count()
    );
}

// ============================================================================
// TESTS
// ============================================================================
