use aquamapper_service::config::{self, Config, StateScope};
use aquamapper_service::db::{MemoryStore, PostgresStore};
use aquamapper_service::import::{ImportRun, ImportSummary, run_import};
use aquamapper_service::logging::{self, DataSource, LogLevel};
use aquamapper_service::model::ImportError;
use aquamapper_service::stations;
use clap::Parser;
use std::path::PathBuf;
use std::process;

/// Replace the sensor_readings collection with simulated water-quality
/// readings derived from a raw rainfall CSV export.
#[derive(Debug, Parser)]
#[command(name = "aquamapper-import", version, about)]
struct Args {
    /// Config file (default: ./aquamapper.toml if present)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Sensor CSV export to import
    #[arg(long, short = 'i')]
    input: Option<PathBuf>,

    /// Station table (TOML)
    #[arg(long)]
    stations: Option<PathBuf>,

    /// Seed for reproducible noise
    #[arg(long)]
    seed: Option<u64>,

    /// Scope of the carried water level
    #[arg(long, value_enum)]
    state_scope: Option<StateScope>,

    /// Simulate and validate without touching the database
    #[arg(long)]
    dry_run: bool,

    /// trace, debug, info, warn or error
    #[arg(long, env = "AQUAMAPPER_LOG")]
    log_level: Option<String>,

    /// Also append log output to this file
    #[arg(long)]
    log_file: Option<PathBuf>,
}

fn main() {
    let args = Args::parse();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    match run(&args, &config) {
        Ok(summary) => {
            println!(
                "Data successfully imported: {} documents ({} rows read, {} skipped, {} rejected)",
                summary.load.attempted,
                summary.rows_read,
                summary.rows_skipped,
                summary.load.failed()
            );
        }
        Err(e) if e.is_source_not_found() => {
            eprintln!(
                "File not found: please ensure {} exists ({})",
                config.import.input.display(),
                e
            );
            process::exit(1);
        }
        Err(e) => {
            eprintln!("Error during data import: {}", e);
            process::exit(1);
        }
    }
}

/// Config file first, then command-line overrides, then logger setup.
fn load_config(args: &Args) -> Result<Config, ImportError> {
    let mut config = Config::load(args.config.as_deref())?;

    if let Some(input) = &args.input {
        config.import.input = input.clone();
    }
    if let Some(stations) = &args.stations {
        config.import.stations_file = stations.clone();
    }
    if let Some(seed) = args.seed {
        config.import.seed = Some(seed);
    }
    if let Some(scope) = args.state_scope {
        config.import.state_scope = scope;
    }
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }
    if let Some(file) = &args.log_file {
        config.logging.file = Some(file.clone());
    }

    let level: LogLevel = config.logging.level.parse()?;
    logging::init_logger(level, config.logging.file.as_deref())?;
    Ok(config)
}

fn run(args: &Args, config: &Config) -> Result<ImportSummary, ImportError> {
    let registry = stations::load_stations(&config.import.stations_file)?;
    logging::info(
        DataSource::System,
        None,
        &format!(
            "Loaded {} stations from {}",
            registry.len(),
            config.import.stations_file.display()
        ),
    );

    let mut import = ImportRun::new();
    if args.dry_run {
        logging::info(DataSource::System, None, "Dry run: readings will not be persisted");
        run_import(&mut import, &config.import, &config.simulation, &registry, || {
            Ok(MemoryStore::new())
        })
    } else {
        let database_url = config::database_url()?;
        run_import(&mut import, &config.import, &config.simulation, &registry, || {
            PostgresStore::connect_and_verify(&database_url)
        })
    }
}
