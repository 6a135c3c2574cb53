//! Command line subcommands.
//!
//! Commands work against the in-memory provider, whose table is loaded from
//! and saved back to a JSON state file so runs can be chained.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use dialoguer::Confirm;
use serde::de::DeserializeOwned;
use serde::Serialize;

use tablesync_core::planning::{format_plan, Plan, Planner};
use tablesync_core::schema::{provisioned_sensor_events_table, sensor_events_table, TableSpec};
use tablesync_core::seed::{generate_sensor_events, SeedBatch, SensorSeedConfig};
use tablesync_core::state::ObservedState;

use crate::config::EngineConfig;
use crate::engine::{CancelHandle, ConvergenceEngine, EngineSettings, RunReport, UnitOutcome};
use crate::prelude::*;
use crate::provider::InMemoryProvider;
use crate::Global;

#[derive(Debug, clap::Subcommand)]
pub enum Commands {
    /// Show the changes needed to converge a table
    Plan(PlanCommand),

    /// Converge a table towards its declaration
    Apply(ApplyCommand),

    /// Generate environment sensor events as seed data
    Seed(SeedCommand),

    /// Write the sensor-event table declaration
    Init(InitCommand),
}

/// Overrides for values read from `TABLESYNC_*` variables.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct EngineArgs {
    /// Delay between convergence polls in milliseconds
    #[arg(long, value_name = "MS")]
    pub poll_interval_ms: Option<u64>,

    /// Maximum wait for one execution unit in seconds
    #[arg(long, value_name = "SECS")]
    pub convergence_timeout_secs: Option<u64>,

    /// Default target utilization for autoscaling policies
    #[arg(long, value_name = "PERCENT")]
    pub target_utilization: Option<u32>,

    /// Ignore autoscaled global index capacity that matches the last applied value
    #[arg(long)]
    pub suppress_index_capacity_drift: bool,

    /// Describe calls the simulated provider takes to settle each change
    #[arg(long, value_name = "N")]
    pub settle_after: Option<u32>,
}

impl EngineArgs {
    fn config(&self) -> EngineConfig {
        let mut config = EngineConfig::from_env();
        if let Some(ms) = self.poll_interval_ms {
            config.poll_interval_ms = ms;
        }
        if let Some(secs) = self.convergence_timeout_secs {
            config.convergence_timeout_secs = secs;
        }
        if let Some(percent) = self.target_utilization {
            config.target_utilization = percent;
        }
        config.suppress_index_capacity_drift |= self.suppress_index_capacity_drift;
        config
    }
}

#[derive(Debug, clap::Args)]
pub struct PlanCommand {
    /// Desired table declaration (JSON)
    #[arg(long, value_name = "FILE")]
    pub desired: PathBuf,

    /// Observed table state (JSON); absent or missing means no table exists
    #[arg(long, value_name = "FILE")]
    pub state: Option<PathBuf>,

    /// Print the plan as JSON
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub engine: EngineArgs,
}

#[derive(Debug, clap::Args)]
#[command(long_about = "Converge a table towards its declaration.

The plan is shown first and confirmation is asked before any change is
submitted. Units run in order and each is awaited until the table settles.
When the run creates the table, seed items are written afterwards.

Environment variables:
  TABLESYNC_POLL_INTERVAL_MS             - Poll delay (default 2000)
  TABLESYNC_CONVERGENCE_TIMEOUT_SECS     - Per-unit timeout (default 120)
  TABLESYNC_BILLING_MODE_COOLDOWN_SECS   - Billing mode cooldown (default 86400)
  TABLESYNC_TARGET_UTILIZATION           - Default policy utilization (default 70)
  TABLESYNC_SUPPRESS_INDEX_CAPACITY_DRIFT - Suppress index capacity drift")]
pub struct ApplyCommand {
    /// Desired table declaration (JSON)
    #[arg(long, value_name = "FILE")]
    pub desired: PathBuf,

    /// Observed table state (JSON), rewritten after the run
    #[arg(long, value_name = "FILE")]
    pub state: Option<PathBuf>,

    /// Seed items (JSON array) written after the table is created
    #[arg(long, value_name = "FILE", conflicts_with = "sensor_events")]
    pub seed: Option<PathBuf>,

    /// Seed freshly generated sensor events
    #[arg(long)]
    pub sensor_events: bool,

    /// Skip the confirmation prompt
    #[arg(long)]
    pub force: bool,

    /// Print the run report as JSON
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub engine: EngineArgs,
}

#[derive(Debug, clap::Args)]
pub struct SeedCommand {
    /// Number of users
    #[arg(long, default_value = "4")]
    pub users: usize,

    /// Devices per user
    #[arg(long, default_value = "2")]
    pub devices: usize,

    /// Events per device
    #[arg(long, default_value = "10")]
    pub events: usize,

    /// Write to a file instead of stdout
    #[arg(long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

#[derive(Debug, clap::Args)]
pub struct InitCommand {
    /// Declare provisioned capacity with autoscaling instead of on-demand
    #[arg(long, num_args = 2, value_names = ["READ", "WRITE"])]
    pub provisioned: Option<Vec<u64>>,

    /// Write to a file instead of stdout
    #[arg(long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

pub async fn run(command: Commands, global: &Global, cancel: CancelHandle) -> Result<()> {
    match command {
        Commands::Plan(cmd) => run_plan(cmd, global).await,
        Commands::Apply(cmd) => run_apply(cmd, global, cancel).await,
        Commands::Seed(cmd) => run_seed(cmd),
        Commands::Init(cmd) => run_init(cmd),
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))
}

fn write_json<T: Serialize>(value: &T, output: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    match output {
        Some(path) => std::fs::write(path, json + "\n")
            .with_context(|| format!("writing {}", path.display())),
        None => {
            aprintln!("{json}");
            Ok(())
        }
    }
}

fn read_state(path: Option<&Path>) -> Result<Option<ObservedState>> {
    match path {
        Some(path) if path.exists() => Ok(Some(read_json(path)?)),
        _ => Ok(None),
    }
}

fn engine_for(state: Option<&ObservedState>, args: &EngineArgs) -> ConvergenceEngine {
    let config = args.config();
    let mut provider = InMemoryProvider::with_tables(state.cloned());
    if let Some(describes) = args.settle_after {
        provider = provider.with_settle_after(describes);
    }
    ConvergenceEngine::new(
        Arc::new(provider),
        Planner::new(config.planner_config()),
        EngineSettings::from(&config),
    )
}

fn print_plan(plan: &Plan) {
    for line in format_plan(plan) {
        aprintln!("  {}", paint_plan_line(&line));
    }
    aprintln!();
}

fn print_report(report: &RunReport) {
    for unit in &report.units {
        let label = format!("Unit {}: {}", unit.index, unit.kind);
        match &unit.outcome {
            UnitOutcome::Applied => aprintln!("  {} {}", p_g("applied"), label),
            UnitOutcome::Failed { error } => {
                aprintln!("  {} {} ({})", p_r("failed"), label, error)
            }
            UnitOutcome::NotAttempted => aprintln!("  {} {}", p_y("not attempted"), label),
            UnitOutcome::Cancelled => aprintln!("  {} {}", p_y("cancelled"), label),
        }
    }
    if report.seeded_items > 0 {
        aprintln!("  {} {} item(s)", p_g("seeded"), report.seeded_items);
    }
    if let Some(state) = &report.final_state {
        aprintln!("{} {}", p_b("Table:"), state.name());
        aprintln!("{} {}", p_b("ARN:"), state.arn);
    }
}

async fn run_plan(cmd: PlanCommand, global: &Global) -> Result<()> {
    let desired: TableSpec = read_json(&cmd.desired)?;
    let state = read_state(cmd.state.as_deref())?;
    let engine = engine_for(state.as_ref(), &cmd.engine);

    let (_, plan) = engine
        .plan(&desired, state.as_ref().map(ObservedState::name))
        .await?;

    if cmd.json {
        return write_json(&plan, None);
    }
    if !global.is_silent() {
        aprintln!("{}", p_c("Convergence Plan:"));
        print_plan(&plan);
    }
    Ok(())
}

async fn run_apply(cmd: ApplyCommand, global: &Global, cancel: CancelHandle) -> Result<()> {
    let desired: TableSpec = read_json(&cmd.desired)?;
    let state = read_state(cmd.state.as_deref())?;
    let seed = match (&cmd.seed, cmd.sensor_events) {
        (Some(path), _) => Some(read_json::<SeedBatch>(path)?),
        (None, true) => Some(generate_sensor_events(
            &mut rand::rng(),
            &SensorSeedConfig::default(),
            chrono::Utc::now().timestamp(),
        )),
        (None, false) => None,
    };

    let engine = engine_for(state.as_ref(), &cmd.engine);
    let existing = state.as_ref().map(ObservedState::name);

    let (_, plan) = engine.plan(&desired, existing).await?;
    if !global.is_silent() && !cmd.json {
        aprintln!("{}", p_c("Convergence Plan:"));
        print_plan(&plan);
    }
    if plan.is_empty() {
        if !global.is_silent() && !cmd.json {
            aprintln!("{}", p_g("Table is up to date."));
        }
        return Ok(());
    }

    if !cmd.force {
        let confirmed = Confirm::new()
            .with_prompt("Apply these changes?")
            .default(true)
            .interact()?;
        if !confirmed {
            bail!("Cancelled by user");
        }
    }

    if !global.is_silent() && !cmd.json {
        aprintln!("{}", p_b("Applying changes..."));
    }
    let report = engine
        .apply(&desired, existing, seed.as_ref(), &cancel)
        .await?;

    if let (Some(path), Some(final_state)) = (&cmd.state, &report.final_state) {
        write_json(final_state, Some(path))?;
    }

    if cmd.json {
        write_json(&report, None)?;
    } else if !global.is_silent() {
        print_report(&report);
    }

    match &report.failure {
        Some(error) => Err(error.clone().into()),
        None => {
            if !global.is_silent() && !cmd.json {
                aprintln!("{}", p_g("Table converged successfully."));
            }
            Ok(())
        }
    }
}

fn run_seed(cmd: SeedCommand) -> Result<()> {
    let config = SensorSeedConfig {
        users: cmd.users,
        devices_per_user: cmd.devices,
        events_per_device: cmd.events,
    };
    let batch = generate_sensor_events(&mut rand::rng(), &config, chrono::Utc::now().timestamp());
    write_json(&batch, cmd.output.as_deref())
}

fn run_init(cmd: InitCommand) -> Result<()> {
    let spec = match cmd.provisioned.as_deref() {
        Some([read, write]) => provisioned_sensor_events_table(*read, *write),
        Some(_) => bail!("--provisioned takes READ and WRITE capacity"),
        None => sensor_events_table(),
    };
    write_json(&spec, cmd.output.as_deref())
}
