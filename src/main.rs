//! Control core of an astronomical survey scheduler.
//!
//! Parses CLI flags, loads and validates configuration, builds the toy
//! in-process collaborators that stand in for the out-of-scope external
//! systems (script queue, time-series database, alert topic, object
//! store), and drives the CSC from OFFLINE through STANDBY, DISABLED,
//! and ENABLED so the configured production loop is running.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::info;

use scheduler_core::alerts::{InMemoryAlertTopic, TooClient};
use scheduler_core::api::{create_app, ApiState};
use scheduler_core::background;
use scheduler_core::clock::SystemClock;
use scheduler_core::coldstart::InMemoryObservationHistory;
use scheduler_core::config::{self, LoopMode};
use scheduler_core::driver::SurveyTopology;
use scheduler_core::events::EventBus;
use scheduler_core::loops;
use scheduler_core::model::Model;
use scheduler_core::persistence::{InMemoryRemoteStore, LocalFileStore, PersistenceRouter};
use scheduler_core::queue::InMemoryQueueClient;
use scheduler_core::state_machine::Csc;
use scheduler_core::telemetry::InMemoryTimeSeriesSource;

/// CLI flags per the External Interfaces spec.
#[derive(Parser, Debug)]
#[command(name = "scheduler-core")]
#[command(about = "Control core of an astronomical survey scheduler")]
#[command(version)]
struct CliArgs {
    /// Instance selector, for running more than one scheduler process
    /// side by side (included in every log record as a field).
    #[arg(long, default_value_t = 0)]
    index: u32,

    /// Verbosity; repeat for more detail (-v debug, -vv trace).
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    verbose: u8,

    /// Log format override ("json" or "text", default "text").
    #[arg(short = 'c', long = "log-format", default_value = "text")]
    log_format: String,

    /// Port the status/events/health HTTP surface binds to.
    #[arg(long = "log-port", default_value_t = 8080)]
    log_port: u16,

    /// Enable lightweight self-timing of each production cycle.
    #[arg(long)]
    profile: bool,

    /// Override `cmd_timeout_s` from the loaded configuration.
    #[arg(long)]
    timeout: Option<f64>,

    /// Directory holding `scheduler.toml` and the local persistence store.
    #[arg(short = 'p', long = "config-dir", default_value = "./config")]
    config_dir: PathBuf,
}

fn init_tracing(args: &CliArgs) {
    let default_level = match args.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    let subscriber = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    if args.log_format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_tracing(&args);

    info!(index = args.index, profile = args.profile, "scheduler-core starting");

    let (mut cfg, provenance) =
        config::load_with_provenance(Some(&args.config_dir)).context("loading scheduler configuration")?;
    if let Some(timeout) = args.timeout {
        cfg.cmd_timeout_s = timeout;
    }
    cfg.validate().context("validating scheduler configuration")?;
    info!(source = ?provenance.source, "configuration loaded");

    let events = Arc::new(EventBus::default());
    let clock = Arc::new(SystemClock::new());

    let too_client = Arc::new(TooClient::new());
    let queue = Arc::new(InMemoryQueueClient::new());
    let telemetry_source = Arc::new(InMemoryTimeSeriesSource::new());
    let alert_topic: Arc<dyn scheduler_core::alerts::AlertTopicSource> = Arc::new(InMemoryAlertTopic::new());

    std::fs::create_dir_all(&args.config_dir).context("creating config/persistence directory")?;
    let persistence = Arc::new(PersistenceRouter::new(vec![
        Box::new(LocalFileStore::new(args.config_dir.clone())),
        Box::new(InMemoryRemoteStore::new()),
    ]));
    let history = InMemoryObservationHistory::default();

    let (model, topology): (Model, SurveyTopology) =
        Model::configure(&cfg, too_client, queue, telemetry_source, &persistence, Some(&history))
            .await
            .context("configuring driver and model")?;

    let csc = Arc::new(Csc::new(events.clone(), clock.clone()));
    csc.enter_control().await.context("entering control")?;
    csc.start(model, topology).await.context("starting scheduler")?;
    csc.enable().await.context("enabling scheduler")?;

    let loop_mode = cfg
        .loop_mode()
        .ok_or_else(|| anyhow::anyhow!("unknown production loop mode {:?}", cfg.mode))?;
    let loop_sleep = Duration::from_secs_f64(cfg.loop_sleep_time_s);
    let n_targets = cfg.n_targets;
    let window_hours = cfg.predicted_scheduler_window_hours;
    let events_for_loop = events.clone();
    let clock_for_loop = clock.clone();

    let loop_is_advance = matches!(loop_mode, LoopMode::Advance);
    csc.clone().resume(
        move |model, token| match loop_mode {
            LoopMode::Simple => {
                tokio::spawn(loops::simple::run(model, token, events_for_loop, clock_for_loop, cfg.loop_sleep_time_s))
            }
            LoopMode::Advance => tokio::spawn(loops::advance::run(
                model,
                token,
                events_for_loop,
                clock_for_loop,
                loop_sleep.as_secs_f64(),
                n_targets,
                window_hours,
            )),
        },
        loop_is_advance,
    )
    .await
    .context("resuming production loop")?;

    let cancel = CancellationToken::new();

    let model_handle: Arc<Mutex<Model>> = csc.model_handle().await.expect("start() configured a model");
    let alert_task = tokio::spawn(background::alerts::run(
        model_handle.clone(),
        alert_topic,
        cancel.child_token(),
        loop_sleep,
    ));
    let heartbeat_task = tokio::spawn(background::heartbeat::run(csc.clone(), cancel.child_token(), loop_sleep));
    let checkpoint_task = cfg.checkpoint_uri.clone().map(|uri| {
        tokio::spawn(background::persistence::run(
            model_handle,
            persistence.clone(),
            uri,
            events.clone(),
            cancel.child_token(),
            Duration::from_secs_f64(cfg.checkpoint_interval_s),
        ))
    });

    let api_state = ApiState::new(csc.clone(), events.clone());
    let app = create_app(api_state);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", args.log_port))
        .await
        .with_context(|| format!("binding status/events server to port {}", args.log_port))?;
    info!(port = args.log_port, "status/events server listening");

    let shutdown_signal = cancel.clone();
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        shutdown_signal.cancelled().await;
    });

    tokio::select! {
        result = server => {
            result.context("status/events server exited unexpectedly")?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received Ctrl+C, shutting down");
            cancel.cancel();
        }
    }

    let _ = csc.stop().await;
    cancel.cancel();
    if let Some(checkpoint_task) = checkpoint_task {
        let _ = checkpoint_task.await;
    }
    alert_task.abort();
    heartbeat_task.abort();

    info!("scheduler-core shutdown complete");
    Ok(())
}
