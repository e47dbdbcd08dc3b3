//! Tracing subscriber setup shared by every station-view entry point.
//!
//! `RUST_LOG` wins over the configured filter. Output goes to stderr (plain or
//! JSON); when a log directory is configured a daily rolling JSON file is
//! written as well.

use std::path::PathBuf;

use station_view_core::LogConfig;
use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

const LOG_FILE_PREFIX: &str = "station-view.log";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

#[derive(Debug, Error)]
pub enum TracingError {
    #[error("invalid log filter {filter:?}: {source}")]
    Filter {
        filter: String,
        #[source]
        source: ParseError,
    },

    #[error("creating log directory {path}: {source}")]
    LogDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("a global tracing subscriber is already installed")]
    AlreadyInstalled(#[from] TryInitError),
}

/// Keeps the background file writer alive. Drop it last, at shutdown.
#[must_use = "dropping the guard stops file logging"]
pub struct TracingGuard {
    _file: Option<WorkerGuard>,
}

/// Resolve the filter: `RUST_LOG` if set and valid, otherwise `fallback`.
pub fn env_filter(fallback: &str) -> Result<EnvFilter, TracingError> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(fallback).map_err(|source| TracingError::Filter {
            filter: fallback.to_owned(),
            source,
        }),
    }
}

fn build_layers(
    config: &LogConfig,
) -> Result<(Vec<BoxedLayer>, Option<WorkerGuard>), TracingError> {
    let mut layers: Vec<BoxedLayer> = Vec::new();

    let stderr = fmt::layer().with_writer(std::io::stderr).with_target(true);
    if config.json {
        layers.push(stderr.json().boxed());
    } else {
        layers.push(stderr.boxed());
    }

    let mut guard = None;
    if let Some(dir) = &config.dir {
        std::fs::create_dir_all(dir).map_err(|source| TracingError::LogDir {
            path: dir.clone(),
            source,
        })?;
        let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
        let (writer, file_guard) = tracing_appender::non_blocking(appender);
        layers.push(
            fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(writer)
                .boxed(),
        );
        guard = Some(file_guard);
    }

    Ok((layers, guard))
}

/// Install the global subscriber.
pub fn init_tracing(config: &LogConfig) -> Result<TracingGuard, TracingError> {
    let filter = env_filter(&config.filter)?;
    let (layers, guard) = build_layers(config)?;

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()?;

    tracing::debug!(
        json = config.json,
        log_dir = ?config.dir,
        "Tracing initialized"
    );
    Ok(TracingGuard { _file: guard })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_fallback_filter() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        assert!(env_filter("info").is_ok());
        let err = env_filter("station_view=loud").unwrap_err();
        assert!(matches!(err, TracingError::Filter { ref filter, .. } if filter == "station_view=loud"));
    }

    #[test]
    fn test_log_dir_error_names_path() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("not-a-dir");
        std::fs::write(&blocker, "file").unwrap();
        let config = LogConfig {
            dir: Some(blocker.join("logs")),
            ..LogConfig::default()
        };
        match build_layers(&config) {
            Err(TracingError::LogDir { path, .. }) => assert_eq!(path, blocker.join("logs")),
            Err(other) => panic!("unexpected {other}"),
            Ok(_) => panic!("log dir under a file must fail"),
        }
    }

    #[test]
    fn test_file_layer_creates_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let config = LogConfig {
            dir: Some(tmp.path().join("logs")),
            ..LogConfig::default()
        };
        let (layers, guard) = build_layers(&config).unwrap();
        assert_eq!(layers.len(), 2);
        assert!(guard.is_some());
        assert!(tmp.path().join("logs").is_dir());
    }

    #[test]
    fn test_stderr_only_by_default() {
        let (layers, guard) = build_layers(&LogConfig::default()).unwrap();
        assert_eq!(layers.len(), 1);
        assert!(guard.is_none());
    }
}
