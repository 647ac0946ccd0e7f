// 📤 CSV Export - Stored vehicles as a flat spreadsheet

use crate::vehicle::VehicleRecord;
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// One CSV row; nested snapshots are left out
#[derive(Debug, Serialize)]
struct ExportRow<'a> {
    vin: &'a str,
    year: Option<i32>,
    price: i64,
    mileage: i64,
    location: String,
    dealer_name: Option<&'a str>,
    trim: Option<&'a str>,
    drivetrain: Option<&'a str>,
    exterior_color: Option<&'a str>,
    distance_from_origin: Option<f64>,
    model_code: Option<&'a str>,
    transmission_type: &'a str,
    decoded_transmission: Option<&'a str>,
    engine_info: Option<&'a str>,
    is_manual: bool,
    manual_source: &'static str,
    confidence: u8,
    reason: &'a str,
    is_first_generation: bool,
    needs_research: bool,
    first_seen: Option<String>,
    last_seen: Option<String>,
    is_watched: bool,
}

impl<'a> From<&'a VehicleRecord> for ExportRow<'a> {
    fn from(v: &'a VehicleRecord) -> Self {
        ExportRow {
            vin: &v.vin,
            year: v.year,
            price: v.price,
            mileage: v.mileage,
            location: v.location(),
            dealer_name: v.dealer_name.as_deref(),
            trim: v.trim.as_deref(),
            drivetrain: v.drivetrain.as_deref(),
            exterior_color: v.exterior_color.as_deref(),
            distance_from_origin: v.distance_from_origin,
            model_code: v.model_code.as_deref(),
            transmission_type: &v.transmission_type,
            decoded_transmission: v.decoded_transmission.as_deref(),
            engine_info: v.engine_info.as_deref(),
            is_manual: v.is_manual,
            manual_source: v.manual_source.as_str(),
            confidence: v.confidence,
            reason: &v.reason,
            is_first_generation: v.is_first_generation,
            needs_research: v.needs_research,
            first_seen: v.tracking.first_seen.map(|t| t.to_rfc3339()),
            last_seen: v.tracking.last_seen.map(|t| t.to_rfc3339()),
            is_watched: v.tracking.is_watched,
        }
    }
}

/// Write a header plus one row per vehicle; returns rows written
pub fn write_csv<W: Write>(vehicles: &[VehicleRecord], writer: W) -> Result<usize> {
    let mut wtr = csv::Writer::from_writer(writer);

    for vehicle in vehicles {
        wtr.serialize(ExportRow::from(vehicle))
            .with_context(|| format!("Failed to write row for {}", vehicle.vin))?;
    }
    wtr.flush().context("Failed to flush CSV output")?;

    Ok(vehicles.len())
}

pub fn export_to_path(vehicles: &[VehicleRecord], path: &Path) -> Result<usize> {
    let file = File::create(path).with_context(|| format!("Failed to create {:?}", path))?;
    write_csv(vehicles, file)
}
