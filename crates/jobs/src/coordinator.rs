// crates/jobs/src/coordinator.rs
//! Runs many station rollups concurrently.
//!
//! Station tasks never touch shared state: they report [`StationEvent`]s over
//! a channel and the coordinator loop is the only owner of per-station
//! status. Finished reports are published on a `watch` channel.

use std::sync::Arc;
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use indexmap::IndexMap;
use station_view_core::TimeRange;
use station_view_db::{Database, DbResult};
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::pipeline::{run_station_rollup, RollupOptions};
use crate::types::{RunProgress, RunReport, StationEvent, StationOutcome, StationStatus};

pub struct Coordinator {
    db: Database,
    options: RollupOptions,
    max_parallel: usize,
    latest: watch::Sender<Option<RunReport>>,
    progress: watch::Sender<RunProgress>,
}

impl Coordinator {
    pub fn new(db: Database, options: RollupOptions, max_parallel: usize) -> Self {
        let (latest, _) = watch::channel(None);
        let (progress, _) = watch::channel(RunProgress::default());
        Self {
            db,
            options,
            max_parallel: max_parallel.max(1),
            latest,
            progress,
        }
    }

    /// Receiver for the most recent finished run.
    pub fn subscribe(&self) -> watch::Receiver<Option<RunReport>> {
        self.latest.subscribe()
    }

    /// Receiver for live counters of the current run.
    pub fn subscribe_progress(&self) -> watch::Receiver<RunProgress> {
        self.progress.subscribe()
    }

    pub fn latest(&self) -> Option<RunReport> {
        self.latest.borrow().clone()
    }

    /// Roll up every station the store knows about.
    pub async fn run_all(&self, range: TimeRange) -> DbResult<RunReport> {
        let stations = self.db.list_stations().await?;
        Ok(self.run(stations, range).await)
    }

    /// Roll up `stations` over `range`. One station's failure never affects
    /// the others.
    pub async fn run(&self, stations: Vec<String>, range: TimeRange) -> RunReport {
        let run_id = Uuid::new_v4();
        let started_at = timestamp();

        let mut outcomes: IndexMap<String, StationOutcome> = IndexMap::new();
        for station in stations {
            outcomes
                .entry(station.clone())
                .or_insert_with(|| StationOutcome::pending(station));
        }
        let mut progress = RunProgress {
            total: outcomes.len(),
            ..RunProgress::default()
        };
        self.progress.send_replace(progress);
        info!(%run_id, stations = progress.total, max_parallel = self.max_parallel, "Rollup run started");

        let (tx, mut rx) = mpsc::channel::<StationEvent>(64);
        let semaphore = Arc::new(Semaphore::new(self.max_parallel));
        let mut tasks = JoinSet::new();

        for station in outcomes.keys().cloned() {
            let tx = tx.clone();
            let semaphore = Arc::clone(&semaphore);
            let db = self.db.clone();
            let options = self.options.clone();
            tasks.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => {
                        let _ = tx
                            .send(StationEvent::Failed {
                                station,
                                error: e.to_string(),
                            })
                            .await;
                        return;
                    }
                };
                let _ = tx
                    .send(StationEvent::Started {
                        station: station.clone(),
                    })
                    .await;
                let event = match run_station_rollup(&db, &station, &range, &options).await {
                    Ok(report) => StationEvent::Finished { report },
                    Err(e) => StationEvent::Failed {
                        station,
                        error: e.to_string(),
                    },
                };
                let _ = tx.send(event).await;
            });
        }
        drop(tx);

        while let Some(event) = rx.recv().await {
            apply_event(&mut outcomes, &mut progress, event);
            self.progress.send_replace(progress);
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(%run_id, error = %e, "Station task aborted");
            }
        }

        // A task that panicked never reported a terminal event.
        for outcome in outcomes.values_mut() {
            if !outcome.status.is_terminal() {
                if outcome.status == StationStatus::Running {
                    progress.running -= 1;
                }
                outcome.status = StationStatus::Failed;
                outcome.error = Some("station task aborted".into());
                progress.failed += 1;
            }
        }
        self.progress.send_replace(progress);

        let report = RunReport {
            run_id,
            started_at,
            finished_at: timestamp(),
            range,
            succeeded: progress.completed,
            failed: progress.failed,
            stations: outcomes.into_values().collect(),
        };
        if report.is_success() {
            info!(%run_id, succeeded = report.succeeded, "Rollup run finished");
        } else {
            warn!(%run_id, succeeded = report.succeeded, failed = report.failed, "Rollup run finished with failures");
        }
        self.latest.send_replace(Some(report.clone()));
        report
    }
}

fn apply_event(
    outcomes: &mut IndexMap<String, StationOutcome>,
    progress: &mut RunProgress,
    event: StationEvent,
) {
    match event {
        StationEvent::Started { station } => {
            if let Some(outcome) = outcomes.get_mut(&station) {
                outcome.status = StationStatus::Running;
                progress.running += 1;
            }
        }
        StationEvent::Finished { report } => {
            if let Some(outcome) = outcomes.get_mut(&report.station) {
                if outcome.status == StationStatus::Running {
                    progress.running -= 1;
                }
                outcome.status = StationStatus::Completed;
                outcome.report = Some(report);
                progress.completed += 1;
            }
        }
        StationEvent::Failed { station, error } => {
            if let Some(outcome) = outcomes.get_mut(&station) {
                if outcome.status == StationStatus::Running {
                    progress.running -= 1;
                }
                outcome.status = StationStatus::Failed;
                outcome.error = Some(error);
                progress.failed += 1;
            }
        }
    }
}

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Re-run the full rollup every `interval` until `cancel` fires.
///
/// Each pass covers the trailing `lookback_days` ending at the time the pass
/// starts.
pub async fn run_periodically(
    coordinator: &Coordinator,
    lookback_days: u32,
    interval: Duration,
    cancel: CancellationToken,
) {
    loop {
        match TimeRange::last_days(Utc::now().naive_utc(), lookback_days) {
            Some(range) => {
                if let Err(e) = coordinator.run_all(range).await {
                    error!(error = %e, "Rollup pass failed to list stations");
                }
            }
            None => error!(lookback_days, "Lookback reaches past the earliest date, skipping pass"),
        }
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Rollup loop stopped");
                break;
            }
            _ = tokio::time::sleep(interval) => {}
        }
    }
}
