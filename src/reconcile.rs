// ⚖️ Reconciliation Engine - Merge VIN-pattern confidence with external decode
//
// Decision table (evaluated in order):
//   no decode,   confidence >= 70        → manual, PATTERN_ONLY_UNVERIFIED
//   no decode,   confidence <  70        → auto,   DECODE_UNAVAILABLE
//   decode manual, confidence >= 50      → manual, PATTERN_AND_DECODE
//   decode manual, confidence <  50      → manual, DECODE_ONLY
//   decode not manual                    → auto,   DECODE_CONFIRMS_AUTO
//
// First-generation and >= 90 confidence results are locked in before the
// table is consulted (see `lock_in`).

use crate::classifier::ClassificationResult;
use crate::decode::DecodeRecord;
use crate::listing::Listing;
use crate::vehicle::{ManualSource, Tracking, VehicleRecord};
use serde::{Deserialize, Serialize};

// ============================================================================
// VERDICT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransmissionVerdict {
    pub is_manual: bool,
    pub source: ManualSource,
}

impl TransmissionVerdict {
    fn manual(source: ManualSource) -> Self {
        TransmissionVerdict { is_manual: true, source }
    }

    fn automatic(source: ManualSource) -> Self {
        TransmissionVerdict { is_manual: false, source }
    }
}

// ============================================================================
// RECONCILIATION ENGINE
// ============================================================================

#[derive(Debug, Clone)]
pub struct ReconciliationEngine {
    /// Without a decode, pattern confidence at or above this is called manual (default: 70)
    pub pattern_only_threshold: u8,

    /// Decode says manual and pattern confidence at or above this → agreement (default: 50)
    pub agreement_threshold: u8,

    /// Pattern confidence at or above this bypasses the table (default: 90).
    /// Distinct from the triage bucket threshold (80).
    pub lock_in_threshold: u8,
}

impl ReconciliationEngine {
    pub fn new() -> Self {
        ReconciliationEngine {
            pattern_only_threshold: 70,
            agreement_threshold: 50,
            lock_in_threshold: 90,
        }
    }

    pub fn with_thresholds(pattern_only: u8, agreement: u8, lock_in: u8) -> Self {
        ReconciliationEngine {
            pattern_only_threshold: pattern_only,
            agreement_threshold: agreement,
            lock_in_threshold: lock_in,
        }
    }

    /// The decision table, for the ambiguous middle ground
    pub fn decide(
        &self,
        classification: &ClassificationResult,
        decode: Option<&DecodeRecord>,
    ) -> TransmissionVerdict {
        match decode {
            None if classification.confidence >= self.pattern_only_threshold => {
                TransmissionVerdict::manual(ManualSource::PatternOnlyUnverified)
            }
            None => TransmissionVerdict::automatic(ManualSource::DecodeUnavailable),
            Some(record) if record.reports_manual() => {
                if classification.confidence >= self.agreement_threshold {
                    TransmissionVerdict::manual(ManualSource::PatternAndDecode)
                } else {
                    TransmissionVerdict::manual(ManualSource::DecodeOnly)
                }
            }
            Some(_) => TransmissionVerdict::automatic(ManualSource::DecodeConfirmsAuto),
        }
    }

    /// Verdicts settled by local evidence alone, whatever the decode says
    pub fn lock_in(&self, classification: &ClassificationResult) -> Option<TransmissionVerdict> {
        if classification.is_first_generation {
            return Some(TransmissionVerdict::manual(ManualSource::FirstGenCollection));
        }

        if classification.confidence >= self.lock_in_threshold {
            return Some(if classification.is_manual_candidate {
                TransmissionVerdict::manual(ManualSource::PatternLockedManual)
            } else {
                TransmissionVerdict::automatic(ManualSource::PatternLockedAuto)
            });
        }

        None
    }

    /// Build the normalized record using the decision table only
    pub fn reconcile(
        &self,
        listing: &Listing,
        classification: &ClassificationResult,
        decode: Option<&DecodeRecord>,
    ) -> VehicleRecord {
        let verdict = self.decide(classification, decode);
        self.build_record(listing, classification, decode, verdict)
    }

    /// Lock-in first, decision table otherwise. This is what a run stores.
    pub fn finalize(
        &self,
        listing: &Listing,
        classification: &ClassificationResult,
        decode: Option<&DecodeRecord>,
    ) -> VehicleRecord {
        let verdict = self
            .lock_in(classification)
            .unwrap_or_else(|| self.decide(classification, decode));
        self.build_record(listing, classification, decode, verdict)
    }

    fn build_record(
        &self,
        listing: &Listing,
        classification: &ClassificationResult,
        decode: Option<&DecodeRecord>,
        verdict: TransmissionVerdict,
    ) -> VehicleRecord {
        let locked = self.lock_in(classification).is_some();

        VehicleRecord {
            vin: listing.vin().unwrap_or_default().to_string(),
            year: classification.year.or_else(|| listing.year_value()),
            price: listing.price_value(),
            mileage: listing.mileage_value(),
            city: listing.city.clone(),
            state: listing.state.clone(),
            dealer_name: listing.dealer_name.clone(),
            trim: listing.trim.clone(),
            drivetrain: listing
                .drivetrain
                .clone()
                .or_else(|| decode.and_then(|d| d.driven_wheels.clone())),
            exterior_color: listing.exterior_color.clone(),
            interior_color: listing.interior_color.clone(),
            distance_from_origin: listing.distance_value(),
            listed_at: listing.created_at.clone(),

            model_code: classification.model_code.clone(),
            transmission_type: classification.transmission_type.clone(),
            decoded_transmission: decode.and_then(DecodeRecord::transmission_type),
            engine_info: decode.and_then(DecodeRecord::engine_info),
            color_options: decode.and_then(DecodeRecord::color_options),
            is_manual: verdict.is_manual,
            manual_source: verdict.source,
            confidence: classification.confidence,
            reason: classification.reason.clone(),
            is_first_generation: classification.is_first_generation,
            needs_research: decode.is_none() && classification.needs_api_check && !locked,

            raw_listing: listing.raw.clone(),
            raw_decode: decode.map(|d| d.raw.clone()),
            tracking: Tracking::default(),
        }
    }
}

impl Default for ReconciliationEngine {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================
