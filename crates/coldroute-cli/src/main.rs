//! Cold-chain dispatch planner CLI.
//!
//! Operates on a local SQLite store: seed it with `import`, then run
//! `plan` to compute a dispatch plan and inspect it with `status`,
//! `report`, and `map`.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};

use coldroute_dispatch::{
    init_logging, job_status, map_data, violations, DispatchState, Dispatcher, LogFormat,
    LoggingConfig, PlanRequest,
};
use coldroute_lib::{GeoPoint, JobId, PlannerConfig, Store, Strategy};

mod fixtures;
mod output;

use output::OutputFormat;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Cold-chain dispatch planning utilities",
    long_about = None,
    propagate_version = true,
    arg_required_else_help = true
)]
struct Cli {
    #[command(flatten)]
    global: GlobalOptions,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug, Clone)]
struct GlobalOptions {
    /// Path to the planner store.
    #[arg(long, default_value = "coldroute.db")]
    db: PathBuf,

    /// Select the output format for CLI responses.
    #[arg(long, value_enum, default_value_t = OutputFormat::default())]
    format: OutputFormat,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load depot, vehicle, and shipment fixtures from a JSON file.
    Import {
        /// Fixture file path.
        file: PathBuf,
    },
    /// Compute a dispatch plan and wait for the result.
    Plan(PlanArgs),
    /// Show a job record.
    Status {
        /// Job identifier.
        job: String,
    },
    /// Print the violations report for a job.
    Report {
        /// Job identifier.
        job: String,
    },
    /// Print map data for a plan date.
    Map {
        /// Plan date (YYYY-MM-DD).
        #[arg(long)]
        date: NaiveDate,
        /// Specific job; defaults to the latest completed job for the date.
        #[arg(long)]
        job: Option<String>,
    },
}

#[derive(Args, Debug, Clone)]
struct PlanArgs {
    /// Plan date (YYYY-MM-DD).
    #[arg(long)]
    date: NaiveDate,

    /// Planned departure time (HH:MM).
    #[arg(long, default_value = "08:00")]
    departure: String,

    /// Stored depot id; defaults to the only configured depot.
    #[arg(long)]
    depot_id: Option<i64>,

    /// Ad-hoc depot latitude (requires --depot-lon).
    #[arg(long, requires = "depot_lon")]
    depot_lat: Option<f64>,

    /// Ad-hoc depot longitude (requires --depot-lat).
    #[arg(long, requires = "depot_lat")]
    depot_lon: Option<f64>,

    /// Ambient temperature in °C.
    #[arg(long)]
    ambient: Option<f64>,

    /// Initial cargo temperature in °C.
    #[arg(long)]
    initial_temp: Option<f64>,

    /// Solver time limit in seconds.
    #[arg(long)]
    time_limit: Option<u64>,

    /// Optimization strategy.
    #[arg(long, value_enum, default_value_t = StrategyArg::MinimizeVehicles)]
    strategy: StrategyArg,

    /// Worker pool size.
    #[arg(long, default_value_t = 1)]
    workers: usize,

    /// Exit without waiting for the job to finish.
    #[arg(long, action = ArgAction::SetTrue)]
    no_wait: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum StrategyArg {
    MinimizeVehicles,
    MinimizeDistance,
}

impl From<StrategyArg> for Strategy {
    fn from(value: StrategyArg) -> Self {
        match value {
            StrategyArg::MinimizeVehicles => Strategy::MinimizeVehicles,
            StrategyArg::MinimizeDistance => Strategy::MinimizeDistance,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Interactive defaults: text on stderr, warnings only. Environment
    // overrides (LOG_FORMAT, RUST_LOG) still win.
    let mut logging = LoggingConfig::from_env().with_service("coldroute");
    if std::env::var("LOG_FORMAT").is_err() {
        logging.format = LogFormat::Text;
    }
    if std::env::var("RUST_LOG").is_err() {
        logging.level = "warn".to_string();
    }
    init_logging(&logging);

    let cli = Cli::parse();
    let format = cli.global.format;

    match cli.command {
        Command::Import { file } => {
            let store = Store::open(&cli.global.db)?;
            let summary = fixtures::import(&store, &file)?;
            output::render_import(format, &summary)
        }
        Command::Plan(args) => run_plan(&cli.global, format, args).await,
        Command::Status { job } => {
            let state = open_state(&cli.global)?;
            let status = job_status(&state, parse_job_id(&job)?)?;
            output::render_status(format, &status)
        }
        Command::Report { job } => {
            let state = open_state(&cli.global)?;
            let report = violations(&state, parse_job_id(&job)?)?;
            output::render_report(format, &report)
        }
        Command::Map { date, job } => {
            let state = open_state(&cli.global)?;
            let job_id = job.as_deref().map(parse_job_id).transpose()?;
            let map = map_data(&state, date, job_id)?;
            output::render_map(format, &map)
        }
    }
}

fn open_state(global: &GlobalOptions) -> Result<DispatchState> {
    let config = PlannerConfig::from_env()?;
    Ok(DispatchState::open(&global.db, config)?)
}

fn parse_job_id(raw: &str) -> Result<JobId> {
    raw.parse()
        .with_context(|| format!("'{raw}' is not a valid job id"))
}

async fn run_plan(global: &GlobalOptions, format: OutputFormat, args: PlanArgs) -> Result<()> {
    let state = open_state(global)?;
    let dispatcher = Dispatcher::start(state.clone(), args.workers);

    let depot_location = match (args.depot_lat, args.depot_lon) {
        (Some(lat), Some(lon)) => Some(GeoPoint::new(lat, lon)?),
        _ => None,
    };

    let request = PlanRequest {
        plan_date: args.date,
        depot_id: args.depot_id,
        depot_location,
        departure_time: args.departure.clone(),
        ambient_temperature: args.ambient,
        initial_cargo_temperature: args.initial_temp,
        time_limit_seconds: args.time_limit,
        strategy: args.strategy.into(),
    };

    let accepted = dispatcher.submit(request).await?;
    tracing::info!(job_id = %accepted.job_id, "plan request accepted");
    if args.no_wait {
        println!("{}", serde_json::to_string_pretty(&accepted)?);
        return Ok(());
    }

    // Poll the job record until it reaches a terminal state; the worker
    // enforces its own deadline, the extra margin covers queue wait.
    let budget = Duration::from_secs(args.time_limit.unwrap_or(300) + 30);
    let started = std::time::Instant::now();
    loop {
        let status = job_status(&state, accepted.job_id)?;
        if status.job.state.is_terminal() {
            output::render_status(format, &status)?;
            return Ok(());
        }
        if started.elapsed() > budget {
            bail!("job {} did not finish within the wait budget", accepted.job_id);
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
    }
}
