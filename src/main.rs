// Only compile UI module when TUI feature is enabled
#[cfg(feature = "tui")]
mod ui;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use manual_hunter::http::AutoDevClient;
use manual_hunter::store;
use manual_hunter::{
    DecodeSource, DisabledDecoder, HunterConfig, JsonFileSource, ListingSource, SortOrder,
    VehicleView,
};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "manual-hunter", version, about = "Find manual-transmission 4Runners by VIN")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, env = "HUNTER_CONFIG")]
    config: Option<PathBuf>,

    /// SQLite database (overrides the configured path)
    #[arg(short, long)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch listings, triage, decode and store one batch
    Run {
        /// Read listings from a JSON file instead of the listings API
        #[arg(long)]
        replay: Option<PathBuf>,

        /// Skip external VIN decodes; verdicts come from patterns only
        #[arg(long)]
        no_decode: bool,
    },

    /// Classify VINs locally, without network or storage
    Classify {
        #[arg(required = true)]
        vins: Vec<String>,

        #[arg(long)]
        json: bool,
    },

    /// Summarise the active pattern tables
    Patterns,

    /// Write stored vehicles to CSV
    Export {
        path: PathBuf,

        #[arg(long, default_value = "all")]
        view: VehicleView,

        #[arg(long, default_value = "price")]
        sort: SortOrder,
    },

    /// List vehicles flagged for manual research
    Research,

    /// Show recent search runs
    Runs {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Interactive vehicle browser (default)
    Browse {
        #[arg(long, default_value = "manual")]
        view: VehicleView,

        #[arg(long, default_value = "price")]
        sort: SortOrder,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "manual_hunter=info,manual_hunter::http=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let mut config = HunterConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(database) = cli.database {
        config.database_path = database;
    }

    match cli.command.unwrap_or(Command::Browse {
        view: VehicleView::Manual,
        sort: SortOrder::Price,
    }) {
        Command::Run { replay, no_decode } => run_search(&config, replay, no_decode),
        Command::Classify { vins, json } => classify(&config, &vins, json),
        Command::Patterns => patterns(&config),
        Command::Export { path, view, sort } => export(&config, &path, view, sort),
        Command::Research => research(&config),
        Command::Runs { limit } => runs(&config, limit),
        Command::Browse { view, sort } => run_ui_mode(&config, view, sort),
    }
}

fn run_search(config: &HunterConfig, replay: Option<PathBuf>, no_decode: bool) -> Result<()> {
    if replay.is_none() && !config.has_api_key() {
        bail!("No API key configured. Set AUTO_DEV_API_KEY or pass --replay <file>.");
    }

    let replay_source = match &replay {
        Some(path) => Some(JsonFileSource::from_file(path)?),
        None => None,
    };

    let client = if config.has_api_key() {
        Some(AutoDevClient::new(config.client_settings())?)
    } else {
        None
    };

    let source: &dyn ListingSource = match (&replay_source, &client) {
        (Some(replayed), _) => replayed as &dyn ListingSource,
        (None, Some(client)) => client as &dyn ListingSource,
        (None, None) => bail!("No listing source available"),
    };

    let disabled = DisabledDecoder;
    let decoder: &dyn DecodeSource = match &client {
        Some(client) if !no_decode => client as &dyn DecodeSource,
        _ => {
            if !no_decode {
                tracing::warn!("No API key; VIN decodes disabled for this run");
            }
            &disabled
        }
    };

    let conn = config.open_store()?;
    let hunter = config.hunter()?;
    let summary = hunter.run(source, decoder, &conn)?;

    println!("\n🏁 Run complete");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("  Listings:             {}", summary.total_listings);
    println!("  Pages fetched:        {}", summary.pages_fetched);
    println!("  Outside target years: {}", summary.triage.outside_target_years);
    println!("  Manual candidates:    {}", summary.triage.manual_found);
    println!("  Decode calls:         {}", summary.decode_calls);
    println!("  Decode calls saved:   {}", summary.calls_saved);
    println!("  New records:          {}", summary.new_records);
    println!("  New manual finds:     {}", summary.new_manual_finds);
    println!("  New 1st gen finds:    {}", summary.new_first_gen_finds);
    if !summary.errors.is_empty() {
        println!("  ⚠ Errors:             {}", summary.errors.len());
    }

    Ok(())
}

fn classify(config: &HunterConfig, vins: &[String], json: bool) -> Result<()> {
    let classifier = config.classifier()?;

    for vin in vins {
        let result = classifier.classify(vin);
        if json {
            println!("{}", serde_json::to_string(&result)?);
        } else {
            let verdict = if result.is_first_generation {
                "1ST GEN"
            } else if result.is_manual_candidate {
                "MANUAL"
            } else if result.outside_target_range {
                "SKIP"
            } else {
                "AUTO?"
            };
            println!(
                "{:<18} {:<8} {:>3}%  {}",
                vin, verdict, result.confidence, result.reason
            );
        }
    }

    Ok(())
}

fn patterns(config: &HunterConfig) -> Result<()> {
    let tables = config.pattern_tables()?;
    let stats = tables.statistics(
        config.vin.min_year,
        config.vin.max_year,
        config.vin.first_gen_max_year,
    );
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

fn export(config: &HunterConfig, path: &std::path::Path, view: VehicleView, sort: SortOrder) -> Result<()> {
    let conn = config.open_store()?;
    let vehicles = store::list_vehicles(&conn, view, sort)?;
    let rows = manual_hunter::export::export_to_path(&vehicles, path)?;
    println!("✓ Exported {} vehicles ({}) to {}", rows, view.label(), path.display());
    Ok(())
}

fn research(config: &HunterConfig) -> Result<()> {
    let conn = config.open_store()?;
    let vehicles = store::research_needed(&conn)?;

    if vehicles.is_empty() {
        println!("Nothing needs research");
    }
    for vehicle in &vehicles {
        println!("{}", vehicle.summary());
    }
    Ok(())
}

fn runs(config: &HunterConfig, limit: usize) -> Result<()> {
    let conn = config.open_store()?;

    for run in store::recent_runs(&conn, limit)? {
        let s = &run.summary;
        println!(
            "#{:<4} {}  listings {:>4}  decoded {:>3}  saved {:>3}  new {:>3}  manual {:>2}  errors {}",
            run.id,
            s.started_at.format("%Y-%m-%d %H:%M"),
            s.total_listings,
            s.decode_calls,
            s.calls_saved,
            s.new_records,
            s.new_manual_finds,
            s.errors.len()
        );
    }
    Ok(())
}

#[cfg(feature = "tui")]
fn run_ui_mode(config: &HunterConfig, view: VehicleView, sort: SortOrder) -> Result<()> {
    if !config.database_path.exists() {
        eprintln!("❌ Database not found: {}", config.database_path.display());
        eprintln!("   Run: manual-hunter run");
        eprintln!("   to collect vehicles first.");
        std::process::exit(1);
    }

    let conn = config.open_store()?;
    let mut app = ui::App::load(&conn, view, sort)?;
    ui::run_ui(&mut app, &conn)
}

#[cfg(not(feature = "tui"))]
fn run_ui_mode(_config: &HunterConfig, _view: VehicleView, _sort: SortOrder) -> Result<()> {
    eprintln!("❌ TUI mode not available!");
    eprintln!("   Rebuild with: cargo build --features tui");
    eprintln!("   Or use the API: cargo run --bin hunter-server --features server");
    std::process::exit(1);
}
