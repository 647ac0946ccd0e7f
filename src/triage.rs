// 🗂️ Batch Triage - Cheap, local-only first pass
// Partitions listings so external decode calls are spent only where they add information

use crate::classifier::{ClassificationResult, PatternClassifier};
use crate::listing::Listing;
use serde::{Deserialize, Serialize};

// ============================================================================
// BUCKETS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TriageBucket {
    /// Collected regardless of transmission
    FirstGeneration,

    /// High-confidence manual pattern
    ManualCandidate,

    /// Neither manual candidate nor weak evidence
    AutomaticConfirmed,

    /// Local evidence too weak to decide
    NeedsVerification,

    /// No VIN on the listing
    Invalid,

    /// Undecodable VIN or year outside the target window
    OutOfRange,
}

impl TriageBucket {
    pub fn label(&self) -> &'static str {
        match self {
            TriageBucket::FirstGeneration => "first-generation",
            TriageBucket::ManualCandidate => "manual candidate",
            TriageBucket::AutomaticConfirmed => "automatic confirmed",
            TriageBucket::NeedsVerification => "needs verification",
            TriageBucket::Invalid => "invalid",
            TriageBucket::OutOfRange => "outside target years",
        }
    }
}

/// A listing with the classification it was triaged on.
/// Downstream stages reuse this result instead of classifying again.
#[derive(Debug, Clone, PartialEq)]
pub struct TriagedListing {
    pub listing: Listing,
    pub classification: ClassificationResult,
}

impl TriagedListing {
    pub fn vin(&self) -> &str {
        self.listing.vin().unwrap_or_default()
    }
}

// ============================================================================
// OUTCOME
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TriageSummary {
    pub total_listings: usize,
    /// Listings that carried a VIN
    pub total_processed: usize,
    /// High-confidence manuals plus first generation
    pub manual_found: usize,
    pub first_gen_collected: usize,
    pub automatic_found: usize,
    pub needs_verification: usize,
    pub invalid: usize,
    pub outside_target_years: usize,
}

#[derive(Debug, Clone, Default)]
pub struct TriageOutcome {
    pub first_generation: Vec<TriagedListing>,
    pub manual_candidates: Vec<TriagedListing>,
    pub automatic_confirmed: Vec<TriagedListing>,
    pub needs_verification: Vec<TriagedListing>,
    pub out_of_range: Vec<TriagedListing>,
    pub invalid: Vec<Listing>,
    pub summary: TriageSummary,
}

impl TriageOutcome {
    /// File a classified listing under `bucket` and count it
    pub fn push(&mut self, bucket: TriageBucket, triaged: TriagedListing) {
        match bucket {
            TriageBucket::OutOfRange => {
                self.out_of_range.push(triaged);
                self.summary.outside_target_years += 1;
            }
            TriageBucket::FirstGeneration => {
                self.first_generation.push(triaged);
                self.summary.manual_found += 1;
                self.summary.first_gen_collected += 1;
            }
            TriageBucket::ManualCandidate => {
                self.manual_candidates.push(triaged);
                self.summary.manual_found += 1;
            }
            TriageBucket::NeedsVerification => {
                self.needs_verification.push(triaged);
                self.summary.needs_verification += 1;
            }
            TriageBucket::AutomaticConfirmed => {
                self.automatic_confirmed.push(triaged);
                self.summary.automatic_found += 1;
            }
            TriageBucket::Invalid => {
                self.invalid.push(triaged.listing);
                self.summary.invalid += 1;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.first_generation.len()
            + self.manual_candidates.len()
            + self.automatic_confirmed.len()
            + self.needs_verification.len()
            + self.out_of_range.len()
            + self.invalid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Manual candidates in the broad sense: first generation included
    pub fn all_manual_candidates(&self) -> impl Iterator<Item = &TriagedListing> {
        self.first_generation.iter().chain(self.manual_candidates.iter())
    }

    /// Listings eligible for an external decode, in processing order.
    /// Out-of-range and invalid listings never appear here.
    pub fn decode_queue(&self) -> impl Iterator<Item = (TriageBucket, &TriagedListing)> {
        self.manual_candidates
            .iter()
            .map(|l| (TriageBucket::ManualCandidate, l))
            .chain(self.first_generation.iter().map(|l| (TriageBucket::FirstGeneration, l)))
            .chain(self.needs_verification.iter().map(|l| (TriageBucket::NeedsVerification, l)))
            .chain(self.automatic_confirmed.iter().map(|l| (TriageBucket::AutomaticConfirmed, l)))
    }

    /// Decode calls the triage-only contract requires: weak evidence only
    pub fn minimum_decode_calls(&self) -> usize {
        self.needs_verification.len()
    }

    /// Calls avoided relative to decoding every listing
    pub fn estimated_calls_saved(&self) -> usize {
        self.automatic_confirmed.len() + self.out_of_range.len()
    }
}

// ============================================================================
// TRIAGE
// ============================================================================

pub struct Triage {
    classifier: PatternClassifier,

    /// Manual candidates need at least this confidence (default: 80)
    pub manual_threshold: u8,
}

impl Triage {
    pub fn new(classifier: PatternClassifier) -> Self {
        Triage {
            classifier,
            manual_threshold: 80,
        }
    }

    pub fn with_threshold(classifier: PatternClassifier, manual_threshold: u8) -> Self {
        Triage {
            classifier,
            manual_threshold,
        }
    }

    pub fn classifier(&self) -> &PatternClassifier {
        &self.classifier
    }

    /// Bucket for an already-classified listing
    pub fn bucket_for(&self, classification: &ClassificationResult) -> TriageBucket {
        if classification.outside_target_range {
            TriageBucket::OutOfRange
        } else if classification.is_first_generation {
            TriageBucket::FirstGeneration
        } else if classification.is_manual_candidate
            && classification.confidence >= self.manual_threshold
        {
            TriageBucket::ManualCandidate
        } else if classification.needs_api_check {
            TriageBucket::NeedsVerification
        } else {
            TriageBucket::AutomaticConfirmed
        }
    }

    /// Partition listings. Every input lands in exactly one bucket.
    pub fn triage(&self, listings: Vec<Listing>) -> TriageOutcome {
        let mut outcome = TriageOutcome::default();
        outcome.summary.total_listings = listings.len();

        for listing in listings {
            let Some(vin) = listing.vin() else {
                outcome.invalid.push(listing);
                outcome.summary.invalid += 1;
                continue;
            };

            let classification = self.classifier.classify(vin);
            outcome.summary.total_processed += 1;

            let bucket = self.bucket_for(&classification);
            let triaged = TriagedListing {
                listing,
                classification,
            };

            outcome.push(bucket, triaged);
        }

        tracing::debug!(
            total = outcome.summary.total_listings,
            manual = outcome.summary.manual_found,
            first_gen = outcome.summary.first_gen_collected,
            automatic = outcome.summary.automatic_found,
            verify = outcome.summary.needs_verification,
            invalid = outcome.summary.invalid,
            out_of_range = outcome.summary.outside_target_years,
            "Triage complete"
        );

        outcome
    }
}

impl Default for Triage {
    fn default() -> Self {
        Self::new(PatternClassifier::default())
    }
}

// ============================================================================
// TESTS
// ============================================================================
