use std::{
    fs::File,
    io::{self, BufRead, BufReader, Write},
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use sentinel_mission_planning::{
    ChatCompletionsExplainer, ExplainerConfig, HttpTrackSource, MissionPlanner, MissionRequest,
    PolicySource, StoreTrackSource, TrackSource,
};
use sentinel_tasking::{
    HttpTaskingStore, OptimizerConfig, OptimizerDriver, TaskingState, TaskingStore, TickOutcome,
};
use sentinel_tracking::{
    FileTrackStore, FusionService, Observation, SensorSimulator, TrackStore, TrackingError,
};
use serde_json::json;
use shared_event_bus::{read_event_log, EventPublisher, FileEventPublisher};
use shared_logging::{LogLevel, Telemetry};
use tokio::runtime::Runtime;
use tracing_subscriber::{prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "sentinel", version, about = "Track fusion, sensor tasking and mission planning")]
struct Cli {
    #[command(flatten)]
    telemetry: TelemetryArgs,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct TelemetryArgs {
    /// JSON-lines log file.
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
    /// Minimum level written to the log file.
    #[arg(long, global = true, default_value_t = LogLevel::Info)]
    log_level: LogLevel,
    /// JSON-lines event log.
    #[arg(long, global = true)]
    event_log: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Emits simulated observations as JSON lines.
    Simulate {
        #[arg(long, default_value = "radar-1")]
        sensor_id: String,
        #[arg(long, default_value = "radar")]
        sensor_type: String,
        /// Size of the simulated object pool.
        #[arg(long, default_value_t = 25)]
        objects: u32,
        #[arg(long, default_value_t = 7)]
        seed: u64,
        #[arg(long, default_value_t = 10)]
        count: usize,
        /// Write here instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Fuses observations (JSON lines) into the track journal.
    Fuse {
        /// Observation file; `-` reads stdin.
        #[arg(long, default_value = "-")]
        input: PathBuf,
        #[arg(long, default_value = "data/tracks.jsonl")]
        store: PathBuf,
        /// Fuse observations even when they fail the sanity check.
        #[arg(long)]
        skip_validation: bool,
    },
    /// Computes and publishes a tasking plan.
    Tasking {
        #[arg(long, default_value = "data/tracks.jsonl")]
        store: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
        /// Keep ticking until Ctrl-C.
        #[arg(long)]
        watch: bool,
    },
    /// Builds a mission plan.
    Plan(PlanArgs),
    /// Prints the policy summary.
    Policy {
        #[arg(long, default_value = "config/policy.toml")]
        policy: PathBuf,
    },
    /// Replays an event log.
    Events {
        #[arg(long, default_value = "data/events.jsonl")]
        log: PathBuf,
        /// Only this event type (`track.fused`, `tasking.published`, ...).
        #[arg(long = "type")]
        event_type: Option<String>,
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
}

#[derive(Args, Debug)]
struct PlanArgs {
    #[arg(long)]
    mission_id: String,
    #[arg(long, default_value = "config/policy.toml")]
    policy: PathBuf,
    #[arg(long, default_value = "data/tracks.jsonl")]
    store: PathBuf,
    /// Read tracks from a track API instead of the local journal.
    #[arg(long)]
    tracks_url: Option<String>,
    #[arg(long)]
    tracks_token: Option<String>,
    #[arg(long)]
    horizon: Option<u32>,
    #[arg(long)]
    max_tasks: Option<usize>,
    #[arg(long)]
    intent: Option<String>,
    /// Comma-separated sensor ids.
    #[arg(long, value_delimiter = ',')]
    prefer: Vec<String>,
    /// Explainer settings (TOML).
    #[arg(long)]
    explainer: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn,sentinel=info"));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr).with_filter(env_filter))
        .init();

    let runtime = Runtime::new().context("starting tokio runtime")?;
    runtime.block_on(run(cli))
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Simulate {
            sensor_id,
            sensor_type,
            objects,
            seed,
            count,
            output,
        } => simulate(&sensor_id, &sensor_type, objects, seed, count, output.as_deref()),
        Commands::Fuse {
            input,
            store,
            skip_validation,
        } => fuse(&cli.telemetry, &input, &store, skip_validation).await,
        Commands::Tasking {
            store,
            config,
            watch,
        } => tasking(&cli.telemetry, &store, config.as_deref(), watch).await,
        Commands::Plan(args) => plan(&cli.telemetry, args).await,
        Commands::Policy { policy } => {
            let summary = PolicySource::File(policy).load()?.summary();
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
        Commands::Events {
            log,
            event_type,
            limit,
        } => {
            let events = read_event_log(&log, event_type.as_deref())
                .with_context(|| format!("reading event log {}", log.display()))?;
            let skip = events.len().saturating_sub(limit);
            for event in events.into_iter().skip(skip) {
                println!(
                    "{} | {} | {} | {}",
                    event.timestamp, event.source, event.event_type, event.payload
                );
            }
            Ok(())
        }
    }
}

fn telemetry(args: &TelemetryArgs, module: &str) -> Result<Telemetry> {
    let mut builder = Telemetry::builder(module).min_level(args.log_level);
    if let Some(path) = &args.log_file {
        builder = builder.log_path(path);
    }
    if let Some(path) = &args.event_log {
        let publisher: Arc<dyn EventPublisher> = Arc::new(FileEventPublisher::new(path)?);
        builder = builder.event_publisher(publisher);
    }
    builder.build()
}

fn simulate(
    sensor_id: &str,
    sensor_type: &str,
    objects: u32,
    seed: u64,
    count: usize,
    output: Option<&Path>,
) -> Result<()> {
    let mut simulator = SensorSimulator::new(sensor_id, sensor_type, objects, seed);
    let mut sink: Box<dyn Write> = match output {
        Some(path) => Box::new(
            File::create(path).with_context(|| format!("creating {}", path.display()))?,
        ),
        None => Box::new(io::stdout().lock()),
    };
    let start = Utc::now();
    let step = chrono::Duration::from_std(simulator.period())?;
    for idx in 0..count {
        let at = start + step * i32::try_from(idx)?;
        serde_json::to_writer(&mut sink, &simulator.next_observation(at))?;
        sink.write_all(b"\n")?;
    }
    sink.flush()?;
    Ok(())
}

fn read_observations(input: &Path) -> Result<Vec<Observation>> {
    let reader: Box<dyn BufRead> = if input == Path::new("-") {
        Box::new(BufReader::new(io::stdin()))
    } else {
        Box::new(BufReader::new(
            File::open(input).with_context(|| format!("opening {}", input.display()))?,
        ))
    };
    let mut observations = Vec::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let observation = serde_json::from_str(&line)
            .with_context(|| format!("observation on line {}", line_no + 1))?;
        observations.push(observation);
    }
    Ok(observations)
}

async fn fuse(args: &TelemetryArgs, input: &Path, store: &Path, skip_validation: bool) -> Result<()> {
    let observations = read_observations(input)?;
    let store = Arc::new(FileTrackStore::open(store)?);
    let mut service = FusionService::new(store).with_telemetry(telemetry(args, "tracking")?);
    if skip_validation {
        service = service.with_validator(None);
    }

    for observation in &observations {
        match service.ingest(observation).await {
            Ok(track) => println!("{}", serde_json::to_string(&track)?),
            Err(err @ TrackingError::Rejected { .. }) => tracing::warn!("{err}"),
            Err(err) => return Err(err.into()),
        }
    }
    let stats = service.stats();
    eprintln!(
        "fused {} observation(s), rejected {}, mean latency {:.2} ms",
        stats.fused,
        stats.rejected,
        stats.mean_latency_ms().unwrap_or_default()
    );
    Ok(())
}

async fn tasking(
    args: &TelemetryArgs,
    store: &Path,
    config: Option<&Path>,
    watch: bool,
) -> Result<()> {
    let config = match config {
        Some(path) => OptimizerConfig::load(path)?,
        None => OptimizerConfig::default(),
    };
    let tracks: Arc<dyn TrackStore> = Arc::new(FileTrackStore::open(store)?);
    let state = Arc::new(TaskingState::new());
    let publisher: Arc<dyn TaskingStore> = match &config.tasking_url {
        Some(url) => {
            let mut remote = HttpTaskingStore::new(url.as_str(), config.call_timeout())?;
            if let Some(token) = &config.auth_token {
                remote = remote.with_auth_token(token.as_str());
            }
            Arc::new(remote)
        }
        None => state.clone(),
    };
    let driver = OptimizerDriver::new(tracks, publisher, &config)
        .with_telemetry(telemetry(args, "tasking")?);

    if !watch {
        return match driver.tick().await {
            TickOutcome::Published(summary) => {
                if config.tasking_url.is_some() {
                    println!("{}", serde_json::to_string_pretty(&summary)?);
                } else {
                    println!("{}", serde_json::to_string_pretty(state.current().as_ref())?);
                }
                Ok(())
            }
            TickOutcome::Skipped(reason) => anyhow::bail!("tasking skipped: {reason}"),
        };
    }

    let handle = Arc::new(driver).spawn();
    tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;
    let stats = handle.stop().await?;
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

async fn plan(args: &TelemetryArgs, plan: PlanArgs) -> Result<()> {
    let tracks: Arc<dyn TrackSource> = match &plan.tracks_url {
        Some(url) => {
            let mut source = HttpTrackSource::new(url.as_str(), Duration::from_secs(10))?;
            if let Some(token) = &plan.tracks_token {
                source = source.with_auth_token(token.as_str());
            }
            Arc::new(source)
        }
        None => Arc::new(StoreTrackSource::new(Arc::new(FileTrackStore::open(&plan.store)?))),
    };
    let telemetry = telemetry(args, "planning")?;
    let mut planner = MissionPlanner::new(PolicySource::File(plan.policy), tracks)
        .with_telemetry(telemetry.clone());
    if let Some(path) = &plan.explainer {
        let config = ExplainerConfig::load(path)?;
        planner = planner.with_explain_timeout(config.timeout());
        let explainer = ChatCompletionsExplainer::new(config)?;
        if !explainer.is_active() {
            let _ = telemetry.log(
                LogLevel::Info,
                "planning.explainer.inactive",
                json!({ "config": path }),
            );
        }
        planner = planner.with_explainer(Arc::new(explainer));
    }

    let request = MissionRequest {
        mission_id: plan.mission_id,
        time_horizon_min: plan.horizon,
        max_tasks: plan.max_tasks,
        operator_intent: plan.intent,
        preferred_sensors: (!plan.prefer.is_empty()).then_some(plan.prefer),
    };
    let response = planner.build_plan(&request).await?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}
