//! Centralized path functions for all app storage locations.

use std::path::PathBuf;

const APP_DIR: &str = "station-view";

/// App data root: `~/.local/share/station-view/` (Linux) or
/// `~/Library/Application Support/station-view/` (macOS).
pub fn app_data_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join(APP_DIR))
}

/// SQLite record store: `<app_data_dir>/records.db`.
pub fn db_path() -> Option<PathBuf> {
    app_data_dir().map(|d| d.join("records.db"))
}

/// Directory holding `<station>_graph.json` artifacts.
pub fn artifact_dir() -> Option<PathBuf> {
    app_data_dir().map(|d| d.join("artifacts"))
}

/// Default config file: `<config_dir>/station-view/config.toml`.
pub fn config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_DIR).join("config.toml"))
}
