// crates/server/src/main.rs
//! Station-view binary.
//!
//! Imports raw station documents, rolls them up into `<station>_graph.json`
//! artifacts (once or continuously) and serves the dashboard read API.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{NaiveDateTime, Utc};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use station_view_core::{parse_range_bound, Config, TimeRange, MAX_RANGE_DAYS};
use station_view_db::Database;
use station_view_jobs::{run_periodically, Coordinator, RollupOptions, RunReport, StationStatus};
use station_view_server::{create_app, AppState};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Parser)]
#[command(name = "station-view", version, about = "Hourly event rollups per station")]
struct Cli {
    /// Config file (default: <config_dir>/station-view/config.toml if present).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// SQLite record store.
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Directory for `<station>_graph.json` artifacts.
    #[arg(long, global = true)]
    artifact_dir: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset, e.g. "debug" or "station_view_jobs=debug".
    #[arg(long, global = true)]
    log_filter: Option<String>,

    /// Emit logs as JSON.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Load documents for a station from a JSON array or JSON-lines file.
    Import { station: String, file: PathBuf },

    /// Roll up the given stations once.
    Rollup {
        #[arg(required = true)]
        stations: Vec<String>,
        #[command(flatten)]
        range: RangeArgs,
        #[command(flatten)]
        run: RunArgs,
    },

    /// Roll up every station in the store once.
    RollupAll {
        #[command(flatten)]
        range: RangeArgs,
        #[command(flatten)]
        run: RunArgs,
    },

    /// Roll up every station repeatedly until interrupted.
    Watch {
        #[arg(long)]
        interval_secs: Option<u64>,
        #[arg(long)]
        max_parallel: Option<usize>,
    },

    /// Serve the dashboard API.
    Serve {
        #[arg(long)]
        port: Option<u16>,
        /// Also run the rollup loop in the background.
        #[arg(long)]
        watch: bool,
        #[arg(long)]
        interval_secs: Option<u64>,
    },

    /// List stations in the store with their last rollup.
    Stations,
}

#[derive(Debug, Args)]
struct RangeArgs {
    /// Range start, e.g. "2024-01-01" or "2024-01-01 06:00".
    #[arg(long)]
    start: Option<String>,
    /// Range end (inclusive). Defaults to now.
    #[arg(long)]
    end: Option<String>,
    /// Lookback used when --start is omitted.
    #[arg(long)]
    days: Option<u32>,
}

#[derive(Debug, Args)]
struct RunArgs {
    #[arg(long)]
    max_parallel: Option<usize>,
    /// Print the run report as JSON on stdout.
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(db) = &cli.db {
        config.db_path = db.clone();
    }
    if let Some(dir) = &cli.artifact_dir {
        config.artifact_dir = dir.clone();
    }
    if let Some(filter) = &cli.log_filter {
        config.log.filter = filter.clone();
    }
    if cli.log_json {
        config.log.json = true;
    }

    let _tracing = station_view_observability::init_tracing(&config.log)?;

    match cli.command {
        Command::Import { station, file } => import(&config, &station, &file).await,
        Command::Rollup { stations, range, run } => {
            let range = resolve_range(&config, &range, Utc::now().naive_utc())?;
            apply_run_args(&mut config, &run)?;
            let coordinator = coordinator(&config).await?;
            let report = coordinator.run(stations, range).await;
            finish_run(&report, run.json)
        }
        Command::RollupAll { range, run } => {
            let range = resolve_range(&config, &range, Utc::now().naive_utc())?;
            apply_run_args(&mut config, &run)?;
            let coordinator = coordinator(&config).await?;
            let report = rollup_all_with_progress(&coordinator, range).await?;
            finish_run(&report, run.json)
        }
        Command::Watch {
            interval_secs,
            max_parallel,
        } => {
            if let Some(secs) = interval_secs {
                config.interval_secs = secs;
            }
            if let Some(n) = max_parallel {
                config.max_parallel = n;
            }
            config.validate()?;
            let coordinator = coordinator(&config).await?;
            let cancel = CancellationToken::new();
            tokio::spawn(shutdown_signal(cancel.clone()));
            tracing::info!(
                interval_secs = config.interval_secs,
                lookback_days = config.lookback_days,
                "Rollup loop started"
            );
            run_periodically(
                &coordinator,
                config.lookback_days,
                Duration::from_secs(config.interval_secs),
                cancel,
            )
            .await;
            Ok(ExitCode::SUCCESS)
        }
        Command::Serve {
            port,
            watch,
            interval_secs,
        } => {
            if let Some(port) = port {
                config.port = port;
            }
            if let Some(secs) = interval_secs {
                config.interval_secs = secs;
            }
            config.validate()?;
            serve(&config, watch).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Stations => {
            list_stations(&config).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn apply_run_args(config: &mut Config, run: &RunArgs) -> Result<()> {
    if let Some(n) = run.max_parallel {
        config.max_parallel = n;
    }
    config.validate()?;
    Ok(())
}

/// Resolve `--start/--end/--days` against the configured lookback.
fn resolve_range(config: &Config, args: &RangeArgs, now: NaiveDateTime) -> Result<TimeRange> {
    let parse = |flag: &str, raw: &str| {
        parse_range_bound(raw).ok_or_else(|| anyhow!("invalid {flag} {raw:?}"))
    };
    let end = match &args.end {
        Some(raw) => parse("--end", raw)?,
        None => now,
    };
    let range = match (&args.start, args.days) {
        (Some(raw), _) => TimeRange::new(parse("--start", raw)?, end),
        (None, Some(days)) => TimeRange::last_days(end, days)
            .ok_or_else(|| anyhow!("--days {days} reaches past the earliest supported date"))?,
        (None, None) => config.default_range(end)?,
    };
    if range.is_empty() {
        bail!("range start {} is after end {}", range.start, range.end);
    }
    if range.exceeds_max_span() {
        bail!(
            "range {} to {} is wider than {MAX_RANGE_DAYS} days",
            range.start,
            range.end
        );
    }
    Ok(range)
}

async fn open_db(config: &Config) -> Result<Database> {
    Database::new(&config.db_path)
        .await
        .with_context(|| format!("opening record store {}", config.db_path.display()))
}

async fn coordinator(config: &Config) -> Result<Coordinator> {
    let db = open_db(config).await?;
    Ok(Coordinator::new(
        db,
        RollupOptions {
            artifact_dir: config.artifact_dir.clone(),
            batch_size: config.batch_size,
        },
        config.max_parallel,
    ))
}

async fn import(config: &Config, station: &str, file: &Path) -> Result<ExitCode> {
    let raw = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("reading {}", file.display()))?;
    let docs = parse_documents(&raw).with_context(|| format!("parsing {}", file.display()))?;

    let db = open_db(config).await?;
    let inserted = db.insert_documents(station, &docs).await?;
    tracing::info!(station, inserted, file = %file.display(), "Documents imported");
    eprintln!("  \u{2713} Imported {inserted} documents for {station}");
    Ok(ExitCode::SUCCESS)
}

/// Accept either one JSON array of documents or one document per line.
fn parse_documents(raw: &str) -> Result<Vec<Value>> {
    if raw.trim_start().starts_with('[') {
        return Ok(serde_json::from_str(raw)?);
    }
    raw.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line).with_context(|| format!("line {}", i + 1))
        })
        .collect()
}

async fn rollup_all_with_progress(coordinator: &Coordinator, range: TimeRange) -> Result<RunReport> {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("  {spinner} Rolling up [{bar:30}] {pos}/{len} stations {msg}")?,
    );
    pb.enable_steady_tick(Duration::from_millis(100));

    let mut progress = coordinator.subscribe_progress();
    let ui = {
        let pb = pb.clone();
        tokio::spawn(async move {
            while progress.changed().await.is_ok() {
                let p = *progress.borrow_and_update();
                pb.set_length(p.total as u64);
                pb.set_position(p.finished() as u64);
                if p.failed > 0 {
                    pb.set_message(format!("({} failed)", p.failed));
                }
            }
        })
    };

    let result = coordinator.run_all(range).await;
    ui.abort();
    pb.finish_and_clear();
    Ok(result?)
}

fn finish_run(report: &RunReport, json: bool) -> Result<ExitCode> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        for outcome in &report.stations {
            match (&outcome.status, &outcome.report, &outcome.error) {
                (StationStatus::Completed, Some(r), _) => eprintln!(
                    "  \u{2713} {}: {} records, {} skipped, {} hours ({} ms)",
                    outcome.station, r.records_in_range, r.records_skipped, r.hours, r.duration_ms
                ),
                (_, _, Some(error)) => eprintln!("  \u{2717} {}: {error}", outcome.station),
                (status, _, _) => eprintln!("  ? {}: {status:?}", outcome.station),
            }
        }
        eprintln!(
            "\n  {} succeeded, {} failed (run {})",
            report.succeeded, report.failed, report.run_id
        );
    }

    Ok(if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn serve(config: &Config, watch: bool) -> Result<()> {
    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_signal(cancel.clone()));

    let db = open_db(config).await?;
    let mut rollup_loop = None;
    let state = if watch {
        let coordinator = Coordinator::new(
            db.clone(),
            RollupOptions {
                artifact_dir: config.artifact_dir.clone(),
                batch_size: config.batch_size,
            },
            config.max_parallel,
        );
        let latest = coordinator.subscribe();
        let lookback_days = config.lookback_days;
        let interval = Duration::from_secs(config.interval_secs);
        let loop_cancel = cancel.clone();
        rollup_loop = Some(tokio::spawn(async move {
            run_periodically(&coordinator, lookback_days, interval, loop_cancel).await;
        }));
        AppState::with_runs(db, config.artifact_dir.clone(), latest)
    } else {
        AppState::new(db, config.artifact_dir.clone())
    };

    let app = create_app(state);
    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;

    eprintln!("\n  station-view v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("  \u{2192} http://localhost:{}\n", config.port);
    tracing::info!(
        %addr,
        artifact_dir = %config.artifact_dir.display(),
        rollup_loop = watch,
        "Server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(cancel.clone().cancelled_owned())
        .await?;

    if let Some(handle) = rollup_loop {
        cancel.cancel();
        if let Err(e) = handle.await {
            tracing::warn!(error = %e, "Rollup loop ended abnormally");
        }
    }
    tracing::info!("Server stopped");
    Ok(())
}

async fn list_stations(config: &Config) -> Result<()> {
    let db = open_db(config).await?;
    let stations = db.list_stations().await?;
    if stations.is_empty() {
        eprintln!("  No stations in {}", config.db_path.display());
        return Ok(());
    }
    for station in stations {
        let documents = db.count_documents(&station).await?;
        let state = match db.get_rollup_run(&station).await? {
            Some(run) if run.is_stale() => format!(
                "stale ({})",
                run.last_error.as_deref().unwrap_or("unknown error")
            ),
            Some(run) => match run.last_success_at {
                Some(at) => format!("rolled up at {at}"),
                None => "never rolled up".to_string(),
            },
            None => "never rolled up".to_string(),
        };
        println!("{station}\t{documents} documents\t{state}");
    }
    Ok(())
}

/// Cancel `cancel` on Ctrl-C or SIGTERM.
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to register SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT, shutting down"),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
    cancel.cancel();
}
