// 💾 Vehicle Store - SQLite persistence keyed by VIN
// One row per VIN, audit events for every write, one row per search run

use crate::listing::Listing;
use crate::pipeline::RunSummary;
use crate::vehicle::{ManualSource, Tracking, VehicleRecord};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

// ============================================================================
// STORE SEAM
// ============================================================================

/// What a batch run needs from storage
pub trait VehicleStore {
    /// Every VIN already stored, loaded once per run
    fn processed_vins(&self) -> Result<HashSet<String>>;

    /// Insert or update by VIN. Returns true when the VIN is new.
    fn upsert(&self, record: &VehicleRecord) -> Result<bool>;

    /// Advance last_seen (and listing price/mileage) for a stored VIN
    fn refresh_sighting(&self, listing: &Listing) -> Result<bool>;

    fn record_run(&self, summary: &RunSummary) -> Result<i64>;
}

impl VehicleStore for Connection {
    fn processed_vins(&self) -> Result<HashSet<String>> {
        processed_vins(self)
    }

    fn upsert(&self, record: &VehicleRecord) -> Result<bool> {
        upsert_at(self, record, Utc::now())
    }

    fn refresh_sighting(&self, listing: &Listing) -> Result<bool> {
        refresh_sighting_at(self, listing, Utc::now())
    }

    fn record_run(&self, summary: &RunSummary) -> Result<i64> {
        record_run(self, summary)
    }
}

/// Open (creating if needed) a file-backed store
pub fn open<P: AsRef<Path>>(path: P) -> Result<Connection> {
    let conn = Connection::open(path.as_ref())
        .with_context(|| format!("Failed to open database: {:?}", path.as_ref()))?;
    setup_database(&conn)?;
    Ok(conn)
}

// ============================================================================
// SQL CONVERSIONS
// ============================================================================

impl ToSql for ManualSource {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for ManualSource {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: String| FromSqlError::Other(e.into()))
    }
}

fn to_timestamp(ts: Option<DateTime<Utc>>) -> Option<String> {
    ts.map(|dt| dt.to_rfc3339())
}

fn parse_timestamp(value: Option<String>) -> Option<DateTime<Utc>> {
    value
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

// ============================================================================
// SCHEMA
// ============================================================================

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS listings (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            vin TEXT UNIQUE NOT NULL,
            year INTEGER,
            price INTEGER NOT NULL DEFAULT 0,
            mileage INTEGER NOT NULL DEFAULT 0,
            city TEXT,
            state TEXT,
            dealer_name TEXT,
            trim TEXT,
            drivetrain TEXT,
            exterior_color TEXT,
            interior_color TEXT,
            distance_from_origin REAL,
            listed_at TEXT,
            model_code TEXT,
            transmission_type TEXT NOT NULL,
            decoded_transmission TEXT,
            engine_info TEXT,
            color_options TEXT,
            is_manual INTEGER NOT NULL,
            manual_source TEXT NOT NULL,
            confidence INTEGER NOT NULL,
            reason TEXT NOT NULL,
            is_first_gen INTEGER NOT NULL DEFAULT 0,
            needs_research INTEGER NOT NULL DEFAULT 0,
            raw_listing TEXT NOT NULL,
            raw_decode TEXT,
            first_seen TEXT NOT NULL,
            last_seen TEXT NOT NULL,
            is_seen INTEGER NOT NULL DEFAULT 0,
            seen_at TEXT,
            is_watched INTEGER NOT NULL DEFAULT 0,
            watched_at TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS search_runs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            run_timestamp TEXT NOT NULL,
            total_listings_found INTEGER NOT NULL,
            new_listings INTEGER NOT NULL,
            manual_listings_found INTEGER NOT NULL,
            manual_candidates INTEGER NOT NULL,
            api_calls_made INTEGER NOT NULL,
            api_calls_saved INTEGER NOT NULL,
            errors TEXT NOT NULL,
            summary TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Events Table (audit trail)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL
        )",
        [],
    )?;

    for index in [
        "CREATE INDEX IF NOT EXISTS idx_is_manual ON listings(is_manual)",
        "CREATE INDEX IF NOT EXISTS idx_manual_source ON listings(manual_source)",
        "CREATE INDEX IF NOT EXISTS idx_needs_research ON listings(needs_research)",
        "CREATE INDEX IF NOT EXISTS idx_year ON listings(year)",
        "CREATE INDEX IF NOT EXISTS idx_is_first_gen ON listings(is_first_gen)",
        "CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id)",
    ] {
        conn.execute(index, [])?;
    }

    Ok(())
}

// ============================================================================
// EVENTS
// ============================================================================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(event_type: &str, vin: &str, data: serde_json::Value, at: DateTime<Utc>) -> Self {
        Event {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: at,
            event_type: event_type.to_string(),
            entity_type: "vehicle".to_string(),
            entity_id: vin.to_string(),
            data,
            actor: "hunter".to_string(),
        }
    }
}

pub fn insert_event(conn: &Connection, event: &Event) -> Result<()> {
    conn.execute(
        "INSERT INTO events (
            event_id, timestamp, event_type, entity_type, entity_id, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            event.timestamp.to_rfc3339(),
            event.event_type,
            event.entity_type,
            event.entity_id,
            serde_json::to_string(&event.data)?,
            event.actor,
        ],
    )?;

    Ok(())
}

/// Events for one VIN, newest first
pub fn events_for_vehicle(conn: &Connection, vin: &str) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         WHERE entity_type = 'vehicle' AND entity_id = ?1
         ORDER BY id DESC",
    )?;

    let events = stmt
        .query_map(params![vin], |row| {
            let timestamp: Option<String> = row.get(1)?;
            let data: String = row.get(5)?;

            Ok(Event {
                event_id: row.get(0)?,
                timestamp: parse_timestamp(timestamp).unwrap_or_default(),
                event_type: row.get(2)?,
                entity_type: row.get(3)?,
                entity_id: row.get(4)?,
                data: serde_json::from_str(&data).unwrap_or(serde_json::Value::Null),
                actor: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(events)
}

/// SHA-256 over the serialized classification-relevant content of a record
pub fn fingerprint(record: &VehicleRecord) -> Result<String> {
    let mut content = record.clone();
    content.tracking = Tracking::default();

    let mut hasher = Sha256::new();
    hasher.update(serde_json::to_vec(&content)?);
    Ok(format!("{:x}", hasher.finalize()))
}

// ============================================================================
// WRITES
// ============================================================================

pub fn processed_vins(conn: &Connection) -> Result<HashSet<String>> {
    let mut stmt = conn.prepare("SELECT vin FROM listings")?;
    let vins = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<HashSet<_>, _>>()?;
    Ok(vins)
}

/// Insert → first_seen = last_seen = `now`, returns true.
/// Update → listing and classification fields replaced, last_seen advanced,
/// first_seen and seen/watched flags kept, returns false.
///
/// The row write and its audit event commit together or not at all.
pub fn upsert_at(conn: &Connection, record: &VehicleRecord, now: DateTime<Utc>) -> Result<bool> {
    let tx = conn.unchecked_transaction()?;
    let conn: &Connection = &tx;

    let existing: Option<i64> = conn
        .query_row("SELECT id FROM listings WHERE vin = ?1", params![record.vin], |row| row.get(0))
        .optional()?;

    let raw_listing = serde_json::to_string(&record.raw_listing)?;
    let raw_decode = record
        .raw_decode
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    let now_str = now.to_rfc3339();

    let is_new = existing.is_none();
    if is_new {
        conn.execute(
            "INSERT INTO listings (
                vin, year, price, mileage, city, state, dealer_name, trim, drivetrain,
                exterior_color, interior_color, distance_from_origin, listed_at,
                model_code, transmission_type, decoded_transmission, engine_info, color_options,
                is_manual, manual_source, confidence, reason, is_first_gen, needs_research,
                raw_listing, raw_decode, first_seen, last_seen
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17,
                      ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?27)",
            params![
                record.vin,
                record.year,
                record.price,
                record.mileage,
                record.city,
                record.state,
                record.dealer_name,
                record.trim,
                record.drivetrain,
                record.exterior_color,
                record.interior_color,
                record.distance_from_origin,
                record.listed_at,
                record.model_code,
                record.transmission_type,
                record.decoded_transmission,
                record.engine_info,
                record.color_options,
                record.is_manual,
                record.manual_source,
                record.confidence,
                record.reason,
                record.is_first_generation,
                record.needs_research,
                raw_listing,
                raw_decode,
                now_str,
            ],
        )
        .with_context(|| format!("Failed to insert vehicle {}", record.vin))?;
    } else {
        conn.execute(
            "UPDATE listings SET
                year = ?2, price = ?3, mileage = ?4, city = ?5, state = ?6, dealer_name = ?7,
                trim = ?8, drivetrain = ?9, exterior_color = ?10, interior_color = ?11,
                distance_from_origin = ?12, listed_at = ?13, model_code = ?14,
                transmission_type = ?15, decoded_transmission = ?16, engine_info = ?17,
                color_options = ?18, is_manual = ?19, manual_source = ?20, confidence = ?21,
                reason = ?22, is_first_gen = ?23, needs_research = ?24, raw_listing = ?25,
                raw_decode = ?26, last_seen = ?27
             WHERE vin = ?1",
            params![
                record.vin,
                record.year,
                record.price,
                record.mileage,
                record.city,
                record.state,
                record.dealer_name,
                record.trim,
                record.drivetrain,
                record.exterior_color,
                record.interior_color,
                record.distance_from_origin,
                record.listed_at,
                record.model_code,
                record.transmission_type,
                record.decoded_transmission,
                record.engine_info,
                record.color_options,
                record.is_manual,
                record.manual_source,
                record.confidence,
                record.reason,
                record.is_first_generation,
                record.needs_research,
                raw_listing,
                raw_decode,
                now_str,
            ],
        )
        .with_context(|| format!("Failed to update vehicle {}", record.vin))?;
    }

    let event = Event::new(
        if is_new { "vehicle_added" } else { "vehicle_updated" },
        &record.vin,
        serde_json::json!({
            "is_manual": record.is_manual,
            "manual_source": record.manual_source,
            "confidence": record.confidence,
            "fingerprint": fingerprint(record)?,
        }),
        now,
    );
    insert_event(conn, &event)?;

    tx.commit()
        .with_context(|| format!("Failed to commit upsert for {}", record.vin))?;
    Ok(is_new)
}

/// Returns false when the VIN is not stored
pub fn refresh_sighting_at(conn: &Connection, listing: &Listing, now: DateTime<Utc>) -> Result<bool> {
    let Some(vin) = listing.vin() else {
        return Ok(false);
    };

    let price = Some(listing.price_value()).filter(|p| *p > 0);
    let mileage = Some(listing.mileage_value()).filter(|m| *m > 0);

    let changed = conn.execute(
        "UPDATE listings SET
            last_seen = ?2,
            price = COALESCE(?3, price),
            mileage = COALESCE(?4, mileage)
         WHERE vin = ?1",
        params![vin, now.to_rfc3339(), price, mileage],
    )?;

    Ok(changed > 0)
}

pub fn mark_seen(conn: &Connection, vin: &str) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE listings SET is_seen = 1, seen_at = ?2 WHERE vin = ?1",
        params![vin, Utc::now().to_rfc3339()],
    )?;
    Ok(changed > 0)
}

pub fn set_watched(conn: &Connection, vin: &str, watched: bool) -> Result<bool> {
    let watched_at = if watched { Some(Utc::now().to_rfc3339()) } else { None };
    let changed = conn.execute(
        "UPDATE listings SET is_watched = ?2, watched_at = ?3 WHERE vin = ?1",
        params![vin, watched, watched_at],
    )?;
    Ok(changed > 0)
}

/// Flip the watch flag; returns the new state, `None` for an unknown VIN
pub fn toggle_watch(conn: &Connection, vin: &str) -> Result<Option<bool>> {
    let current: Option<bool> = conn
        .query_row("SELECT is_watched FROM listings WHERE vin = ?1", params![vin], |row| row.get(0))
        .optional()?;

    match current {
        Some(watched) => {
            set_watched(conn, vin, !watched)?;
            Ok(Some(!watched))
        }
        None => Ok(None),
    }
}

// ============================================================================
// VIEWS & SORTING
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VehicleView {
    #[default]
    All,
    /// Manual, first generation excluded
    Manual,
    FirstGen,
    Automatic,
    Watched,
    Unseen,
    NeedsResearch,
    Gen1,
    Gen2,
    Gen3,
    Under200k,
    Engine34,
    Within500,
}

impl VehicleView {
    pub const ALL: [VehicleView; 13] = [
        VehicleView::All,
        VehicleView::Manual,
        VehicleView::FirstGen,
        VehicleView::Automatic,
        VehicleView::Watched,
        VehicleView::Unseen,
        VehicleView::NeedsResearch,
        VehicleView::Gen1,
        VehicleView::Gen2,
        VehicleView::Gen3,
        VehicleView::Under200k,
        VehicleView::Engine34,
        VehicleView::Within500,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleView::All => "all",
            VehicleView::Manual => "manual",
            VehicleView::FirstGen => "first-gen",
            VehicleView::Automatic => "automatic",
            VehicleView::Watched => "watched",
            VehicleView::Unseen => "unseen",
            VehicleView::NeedsResearch => "needs-research",
            VehicleView::Gen1 => "gen1",
            VehicleView::Gen2 => "gen2",
            VehicleView::Gen3 => "gen3",
            VehicleView::Under200k => "under200k",
            VehicleView::Engine34 => "3.4l",
            VehicleView::Within500 => "within500",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            VehicleView::All => "All vehicles",
            VehicleView::Manual => "Manual (2nd/3rd gen)",
            VehicleView::FirstGen => "First generation (1984-89)",
            VehicleView::Automatic => "Automatic",
            VehicleView::Watched => "Watched",
            VehicleView::Unseen => "Not yet seen",
            VehicleView::NeedsResearch => "Needs research",
            VehicleView::Gen1 => "Gen 1 (1984-89)",
            VehicleView::Gen2 => "Gen 2 (1990-95)",
            VehicleView::Gen3 => "Gen 3 (1996-2002)",
            VehicleView::Under200k => "Under 200k miles",
            VehicleView::Engine34 => "3.4L V6",
            VehicleView::Within500 => "Within 500 miles",
        }
    }

    fn where_clause(&self) -> &'static str {
        match self {
            VehicleView::All => "1=1",
            VehicleView::Manual => "is_manual = 1 AND is_first_gen = 0",
            VehicleView::FirstGen => "is_first_gen = 1",
            VehicleView::Automatic => "is_manual = 0",
            VehicleView::Watched => "is_watched = 1",
            VehicleView::Unseen => "is_seen = 0",
            VehicleView::NeedsResearch => "needs_research = 1",
            VehicleView::Gen1 => "year >= 1984 AND year <= 1989",
            VehicleView::Gen2 => "year >= 1990 AND year <= 1995",
            VehicleView::Gen3 => "year >= 1996 AND year <= 2002",
            VehicleView::Under200k => "mileage > 0 AND mileage < 200000",
            VehicleView::Engine34 => "(engine_info LIKE '5VZ-FE%' OR engine_info LIKE '%3.4%')",
            VehicleView::Within500 => "distance_from_origin <= 500",
        }
    }
}

impl fmt::Display for VehicleView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VehicleView {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        match normalized.as_str() {
            "auto" => Ok(VehicleView::Automatic),
            "research" => Ok(VehicleView::NeedsResearch),
            other => VehicleView::ALL
                .iter()
                .find(|view| view.as_str() == other)
                .copied()
                .ok_or_else(|| format!("Unknown view: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortOrder {
    #[default]
    Price,
    Year,
    Mileage,
    /// Most recently first seen
    Newest,
    Distance,
}

impl SortOrder {
    pub const ALL: [SortOrder; 5] = [
        SortOrder::Price,
        SortOrder::Year,
        SortOrder::Mileage,
        SortOrder::Newest,
        SortOrder::Distance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Price => "price",
            SortOrder::Year => "year",
            SortOrder::Mileage => "mileage",
            SortOrder::Newest => "newest",
            SortOrder::Distance => "distance",
        }
    }

    fn order_clause(&self) -> &'static str {
        match self {
            SortOrder::Price => "price ASC, vin ASC",
            SortOrder::Year => "year ASC, price ASC, vin ASC",
            SortOrder::Mileage => "mileage ASC, vin ASC",
            SortOrder::Newest => "first_seen DESC, vin ASC",
            SortOrder::Distance => "distance_from_origin IS NULL, distance_from_origin ASC, vin ASC",
        }
    }
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "days" => Ok(SortOrder::Newest),
            other => SortOrder::ALL
                .iter()
                .find(|sort| sort.as_str() == other)
                .copied()
                .ok_or_else(|| format!("Unknown sort order: {}", s)),
        }
    }
}

// ============================================================================
// READS
// ============================================================================

fn vehicle_from_row(row: &Row) -> rusqlite::Result<VehicleRecord> {
    let raw_listing: String = row.get("raw_listing")?;
    let raw_decode: Option<String> = row.get("raw_decode")?;

    Ok(VehicleRecord {
        vin: row.get("vin")?,
        year: row.get("year")?,
        price: row.get("price")?,
        mileage: row.get("mileage")?,
        city: row.get("city")?,
        state: row.get("state")?,
        dealer_name: row.get("dealer_name")?,
        trim: row.get("trim")?,
        drivetrain: row.get("drivetrain")?,
        exterior_color: row.get("exterior_color")?,
        interior_color: row.get("interior_color")?,
        distance_from_origin: row.get("distance_from_origin")?,
        listed_at: row.get("listed_at")?,
        model_code: row.get("model_code")?,
        transmission_type: row.get("transmission_type")?,
        decoded_transmission: row.get("decoded_transmission")?,
        engine_info: row.get("engine_info")?,
        color_options: row.get("color_options")?,
        is_manual: row.get("is_manual")?,
        manual_source: row.get("manual_source")?,
        confidence: row.get("confidence")?,
        reason: row.get("reason")?,
        is_first_generation: row.get("is_first_gen")?,
        needs_research: row.get("needs_research")?,
        raw_listing: serde_json::from_str(&raw_listing).unwrap_or(serde_json::Value::Null),
        raw_decode: raw_decode.and_then(|s| serde_json::from_str(&s).ok()),
        tracking: Tracking {
            first_seen: parse_timestamp(row.get("first_seen")?),
            last_seen: parse_timestamp(row.get("last_seen")?),
            is_seen: row.get("is_seen")?,
            seen_at: parse_timestamp(row.get("seen_at")?),
            is_watched: row.get("is_watched")?,
            watched_at: parse_timestamp(row.get("watched_at")?),
        },
    })
}

pub fn get_vehicle(conn: &Connection, vin: &str) -> Result<Option<VehicleRecord>> {
    let record = conn
        .query_row("SELECT * FROM listings WHERE vin = ?1", params![vin], vehicle_from_row)
        .optional()?;
    Ok(record)
}

pub fn list_vehicles(conn: &Connection, view: VehicleView, sort: SortOrder) -> Result<Vec<VehicleRecord>> {
    let sql = format!(
        "SELECT * FROM listings WHERE {} ORDER BY {}",
        view.where_clause(),
        sort.order_clause()
    );
    let mut stmt = conn.prepare(&sql)?;
    let vehicles = stmt
        .query_map([], vehicle_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(vehicles)
}

/// Pattern-only listings that never got a decode, newest model year first
pub fn research_needed(conn: &Connection) -> Result<Vec<VehicleRecord>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM listings WHERE needs_research = 1 ORDER BY year DESC, vin ASC",
    )?;
    let vehicles = stmt
        .query_map([], vehicle_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(vehicles)
}

pub fn count(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM listings", [], |row| row.get(0))?;
    Ok(count)
}

// ============================================================================
// STATISTICS
// ============================================================================

/// Per-provenance breakdown
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceStat {
    pub manual_source: ManualSource,
    pub count: i64,
    pub manual_count: i64,
    pub avg_confidence: f64,
}

impl SourceStat {
    pub fn description(&self) -> &'static str {
        self.manual_source.description()
    }
}

pub fn stats_by_source(conn: &Connection) -> Result<Vec<SourceStat>> {
    let mut stmt = conn.prepare(
        "SELECT
            manual_source,
            COUNT(*) as count,
            SUM(is_manual) as manual_count,
            AVG(confidence) as avg_confidence
         FROM listings
         GROUP BY manual_source
         ORDER BY count DESC, manual_source ASC",
    )?;

    let stats = stmt
        .query_map([], |row| {
            Ok(SourceStat {
                manual_source: row.get(0)?,
                count: row.get(1)?,
                manual_count: row.get(2)?,
                avg_confidence: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(stats)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VehicleStats {
    pub total: i64,
    pub manual: i64,
    pub first_gen: i64,
    pub automatic: i64,
    pub needs_research: i64,
    pub watched: i64,
    pub unseen: i64,
}

pub fn vehicle_stats(conn: &Connection) -> Result<VehicleStats> {
    let stats = conn.query_row(
        "SELECT
            COUNT(*),
            COALESCE(SUM(CASE WHEN is_manual = 1 AND is_first_gen = 0 THEN 1 ELSE 0 END), 0),
            COALESCE(SUM(is_first_gen), 0),
            COALESCE(SUM(CASE WHEN is_manual = 0 THEN 1 ELSE 0 END), 0),
            COALESCE(SUM(needs_research), 0),
            COALESCE(SUM(is_watched), 0),
            COALESCE(SUM(CASE WHEN is_seen = 0 THEN 1 ELSE 0 END), 0)
         FROM listings",
        [],
        |row| {
            Ok(VehicleStats {
                total: row.get(0)?,
                manual: row.get(1)?,
                first_gen: row.get(2)?,
                automatic: row.get(3)?,
                needs_research: row.get(4)?,
                watched: row.get(5)?,
                unseen: row.get(6)?,
            })
        },
    )?;

    Ok(stats)
}

// ============================================================================
// SEARCH RUNS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredRun {
    pub id: i64,
    pub run_timestamp: Option<DateTime<Utc>>,
    pub summary: RunSummary,
}

pub fn record_run(conn: &Connection, summary: &RunSummary) -> Result<i64> {
    conn.execute(
        "INSERT INTO search_runs (
            run_timestamp, total_listings_found, new_listings, manual_listings_found,
            manual_candidates, api_calls_made, api_calls_saved, errors, summary
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            summary.started_at.to_rfc3339(),
            summary.total_listings as i64,
            summary.new_records as i64,
            summary.confirmed_manuals as i64,
            summary.triage.manual_found as i64,
            summary.decode_calls as i64,
            summary.calls_saved as i64,
            serde_json::to_string(&summary.errors)?,
            serde_json::to_string(summary)?,
        ],
    )
    .context("Failed to record search run")?;

    Ok(conn.last_insert_rowid())
}

/// Most recent runs first
pub fn recent_runs(conn: &Connection, limit: usize) -> Result<Vec<StoredRun>> {
    let mut stmt = conn.prepare(
        "SELECT id, run_timestamp, summary FROM search_runs ORDER BY id DESC LIMIT ?1",
    )?;

    let rows = stmt
        .query_map(params![limit as i64], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut runs = Vec::with_capacity(rows.len());
    for (id, timestamp, summary) in rows {
        let summary: RunSummary = serde_json::from_str(&summary)
            .with_context(|| format!("Corrupt summary for search run {}", id))?;
        runs.push(StoredRun {
            id,
            run_timestamp: parse_timestamp(timestamp),
            summary,
        });
    }

    Ok(runs)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::PatternClassifier;
    use crate::decode::DecodeRecord;
    use crate::reconcile::ReconciliationEngine;
    use chrono::TimeZone;
    use serde_json::json;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    fn listing(vin: &str, price: i64, mileage: i64) -> Listing {
        Listing::from_value(json!({
            "vin": vin,
            "price": price,
            "mileage": mileage,
            "city": "Boise",
            "state": "ID"
        }))
    }

    fn record(vin: &str, price: i64, decode: Option<&DecodeRecord>) -> VehicleRecord {
        let listing = listing(vin, price, 150_000);
        let classification = PatternClassifier::default().classify(vin);
        ReconciliationEngine::default().finalize(&listing, &classification, decode)
    }

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, day, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_upsert_insert_then_update() {
        let conn = setup();
        let first = record("JT3LN130XL0012345", 9000, None);

        assert!(upsert_at(&conn, &first, at(1)).unwrap());
        assert_eq!(count(&conn).unwrap(), 1);

        mark_seen(&conn, &first.vin).unwrap();
        set_watched(&conn, &first.vin, true).unwrap();

        let second = record("JT3LN130XL0012345", 8500, None);
        assert!(!upsert_at(&conn, &second, at(3)).unwrap());
        assert_eq!(count(&conn).unwrap(), 1);

        let stored = get_vehicle(&conn, &first.vin).unwrap().unwrap();
        assert_eq!(stored.price, 8500);
        assert_eq!(stored.tracking.first_seen, Some(at(1)));
        assert_eq!(stored.tracking.last_seen, Some(at(3)));
        assert!(stored.tracking.is_seen);
        assert!(stored.tracking.is_watched);
    }

    #[test]
    fn test_failed_event_write_rolls_back_upsert() {
        let conn = setup();
        let stored = record("JT3LN130XL0012345", 9000, None);
        upsert_at(&conn, &stored, at(1)).unwrap();

        conn.execute_batch("DROP TABLE events").unwrap();

        let fresh = record("JT3VN39W5R8012345", 7000, None);
        assert!(upsert_at(&conn, &fresh, at(2)).is_err());
        assert!(get_vehicle(&conn, &fresh.vin).unwrap().is_none());
        assert!(!processed_vins(&conn).unwrap().contains(&fresh.vin));

        let repriced = record("JT3LN130XL0012345", 6500, None);
        assert!(upsert_at(&conn, &repriced, at(3)).is_err());
        let kept = get_vehicle(&conn, &stored.vin).unwrap().unwrap();
        assert_eq!(kept.price, 9000);
        assert_eq!(kept.tracking.last_seen, Some(at(1)));
        assert_eq!(count(&conn).unwrap(), 1);
    }

    #[test]
    fn test_round_trip_preserves_record() {
        let conn = setup();
        let decode = DecodeRecord::from_value(json!({
            "transmission": {"transmissionType": "MANUAL"},
            "engine": {"cylinder": 6, "size": 3.4, "configuration": "V"},
            "drivenWheels": "four wheel drive"
        }))
        .unwrap();
        let original = record("JT3GM84R7X0045803", 7000, Some(&decode));
        upsert_at(&conn, &original, at(2)).unwrap();

        let mut stored = get_vehicle(&conn, &original.vin).unwrap().unwrap();
        assert_eq!(stored.tracking.first_seen, Some(at(2)));

        stored.tracking = Tracking::default();
        assert_eq!(stored, original);
        assert_eq!(stored.manual_source, ManualSource::DecodeOnly);
        assert_eq!(stored.engine_info.as_deref(), Some("5VZ-FE 3.4L V6"));
    }

    #[test]
    fn test_processed_vins_and_refresh() {
        let conn = setup();
        upsert_at(&conn, &record("JT3HN86R7W0175125", 5000, None), at(1)).unwrap();

        let vins = processed_vins(&conn).unwrap();
        assert!(vins.contains("JT3HN86R7W0175125"));
        assert_eq!(vins.len(), 1);

        assert!(refresh_sighting_at(&conn, &listing("JT3HN86R7W0175125", 4500, 0), at(4)).unwrap());
        let stored = get_vehicle(&conn, "JT3HN86R7W0175125").unwrap().unwrap();
        assert_eq!(stored.tracking.last_seen, Some(at(4)));
        assert_eq!(stored.tracking.first_seen, Some(at(1)));
        assert_eq!(stored.price, 4500);
        // Missing mileage does not wipe the stored value
        assert_eq!(stored.mileage, 150_000);

        assert!(!refresh_sighting_at(&conn, &listing("JT3HN87R3T0043862", 1, 1), at(4)).unwrap());
    }

    #[test]
    fn test_views_and_sorting() {
        let conn = setup();
        upsert_at(&conn, &record("JT3RN60L0F0123456", 12000, None), at(1)).unwrap(); // first gen
        upsert_at(&conn, &record("JT3LN130XL0012345", 9000, None), at(2)).unwrap(); // manual
        upsert_at(&conn, &record("JT3HN86R7W0175125", 6000, None), at(3)).unwrap(); // auto
        upsert_at(&conn, &record("JT3GM84R7X0045803", 3000, None), at(4)).unwrap(); // research

        let manual = list_vehicles(&conn, VehicleView::Manual, SortOrder::Price).unwrap();
        assert_eq!(manual.len(), 1);
        assert_eq!(manual[0].vin, "JT3LN130XL0012345");

        let first_gen = list_vehicles(&conn, VehicleView::FirstGen, SortOrder::Price).unwrap();
        assert_eq!(first_gen.len(), 1);

        let auto = list_vehicles(&conn, VehicleView::Automatic, SortOrder::Price).unwrap();
        assert_eq!(auto.len(), 2);
        assert_eq!(auto[0].price, 3000);

        let research = research_needed(&conn).unwrap();
        assert_eq!(research.len(), 1);
        assert_eq!(research[0].vin, "JT3GM84R7X0045803");

        let gen3 = list_vehicles(&conn, VehicleView::Gen3, SortOrder::Year).unwrap();
        assert_eq!(gen3.len(), 2);

        let newest = list_vehicles(&conn, VehicleView::All, SortOrder::Newest).unwrap();
        assert_eq!(newest[0].vin, "JT3GM84R7X0045803");
        assert_eq!(newest.len(), 4);
    }

    #[test]
    fn test_watch_toggle_and_unseen() {
        let conn = setup();
        upsert_at(&conn, &record("JT3LN130XL0012345", 9000, None), at(1)).unwrap();

        assert_eq!(toggle_watch(&conn, "JT3LN130XL0012345").unwrap(), Some(true));
        assert_eq!(list_vehicles(&conn, VehicleView::Watched, SortOrder::Price).unwrap().len(), 1);
        assert_eq!(toggle_watch(&conn, "JT3LN130XL0012345").unwrap(), Some(false));
        assert_eq!(toggle_watch(&conn, "NOPE").unwrap(), None);

        assert_eq!(list_vehicles(&conn, VehicleView::Unseen, SortOrder::Price).unwrap().len(), 1);
        assert!(mark_seen(&conn, "JT3LN130XL0012345").unwrap());
        assert!(list_vehicles(&conn, VehicleView::Unseen, SortOrder::Price).unwrap().is_empty());
        assert!(!mark_seen(&conn, "NOPE").unwrap());
    }

    #[test]
    fn test_stats() {
        let conn = setup();
        assert_eq!(vehicle_stats(&conn).unwrap(), VehicleStats::default());

        upsert_at(&conn, &record("JT3RN60L0F0123456", 12000, None), at(1)).unwrap();
        upsert_at(&conn, &record("JT3LN130XL0012345", 9000, None), at(1)).unwrap();
        upsert_at(&conn, &record("JT3VN39W4N8043298", 9000, None), at(1)).unwrap();
        upsert_at(&conn, &record("JT3HN86R7W0175125", 6000, None), at(1)).unwrap();

        let stats = vehicle_stats(&conn).unwrap();
        assert_eq!(stats.total, 4);
        assert_eq!(stats.manual, 2);
        assert_eq!(stats.first_gen, 1);
        assert_eq!(stats.automatic, 1);
        assert_eq!(stats.unseen, 4);

        let by_source = stats_by_source(&conn).unwrap();
        assert_eq!(by_source[0].manual_source, ManualSource::PatternLockedManual);
        assert_eq!(by_source[0].count, 2);
        assert_eq!(by_source[0].manual_count, 2);
        assert_eq!(by_source.iter().map(|s| s.count).sum::<i64>(), 4);
    }

    #[test]
    fn test_events_logged() {
        let conn = setup();
        let rec = record("JT3LN130XL0012345", 9000, None);
        upsert_at(&conn, &rec, at(1)).unwrap();
        upsert_at(&conn, &rec, at(2)).unwrap();

        let events = events_for_vehicle(&conn, &rec.vin).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, "vehicle_updated");
        assert_eq!(events[1].event_type, "vehicle_added");
        assert_eq!(events[0].data["manual_source"], json!("PATTERN_LOCKED_MANUAL"));
        // Same content → same fingerprint
        assert_eq!(events[0].data["fingerprint"], events[1].data["fingerprint"]);
        assert_eq!(fingerprint(&rec).unwrap().len(), 64);
    }

    #[test]
    fn test_record_and_list_runs() {
        let conn = setup();
        let mut summary = RunSummary::new(at(1));
        summary.total_listings = 40;
        summary.new_records = 3;
        summary.errors.push("page 3 failed".to_string());

        let first = record_run(&conn, &summary).unwrap();
        summary.total_listings = 41;
        let second = record_run(&conn, &summary).unwrap();
        assert!(second > first);

        let runs = recent_runs(&conn, 10).unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].summary.total_listings, 41);
        assert_eq!(runs[1].summary.errors, vec!["page 3 failed".to_string()]);
        assert_eq!(runs[1].run_timestamp, Some(at(1)));
    }

    #[test]
    fn test_view_and_sort_parsing() {
        for view in VehicleView::ALL {
            assert_eq!(view.as_str().parse::<VehicleView>(), Ok(view));
        }
        assert_eq!("first_gen".parse::<VehicleView>(), Ok(VehicleView::FirstGen));
        assert_eq!("auto".parse::<VehicleView>(), Ok(VehicleView::Automatic));
        assert!("sideways".parse::<VehicleView>().is_err());

        for sort in SortOrder::ALL {
            assert_eq!(sort.as_str().parse::<SortOrder>(), Ok(sort));
        }
        assert_eq!("days".parse::<SortOrder>(), Ok(SortOrder::Newest));
    }

    #[test]
    fn test_file_backed_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hunter.db");
        {
            let conn = open(&path).unwrap();
            VehicleStore::upsert(&conn, &record("JT3LN130XL0012345", 9000, None)).unwrap();
        }
        let conn = open(&path).unwrap();
        assert_eq!(count(&conn).unwrap(), 1);
    }
}
