//! # Delve
//!
//! Headless driver for the Delve world engine.
//!
//! Loads `delve.toml` (or the path given as the first argument), sets up
//! logging and runs a scripted expedition through streamed levels.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

mod config;
mod driver;

use std::io;
use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::info;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use config::{DelveConfig, CONFIG_FILE, DEFAULT_LOG_FILTER};

/// Loads and validates the config under a temporary subscriber, so load
/// diagnostics are reported before the configured filter is known.
fn load_config<W>(path: &Path, make_writer: W) -> DelveConfig
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let bootstrap = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(make_writer))
        .with(EnvFilter::new(DEFAULT_LOG_FILTER));
    let mut config = tracing::subscriber::with_default(bootstrap, || DelveConfig::load_or_create(path));
    config.validate();
    config
}

/// Main entry point.
fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .map_or_else(|| PathBuf::from(CONFIG_FILE), PathBuf::from);
    let config = load_config(&config_path, io::stderr);

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(config.log_filter.parse()?))
        .init();

    info!("Delve starting...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let report = driver::run(&config)?;

    info!(
        "Delve finished at depth {} with {} gold",
        report.final_depth, report.gold
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().expect("lock")).into_owned()
        }
    }

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().expect("lock").extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_load_config_reports_broken_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "render_distance = [").expect("write");

        let captured = Captured::default();
        let writer = captured.clone();
        let config = load_config(&path, move || writer.clone());

        assert_eq!(config, DelveConfig::default());
        assert!(captured.text().contains("Failed to parse config file"));
    }

    #[test]
    fn test_load_config_creates_missing_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(CONFIG_FILE);

        let captured = Captured::default();
        let writer = captured.clone();
        let config = load_config(&path, move || writer.clone());

        assert_eq!(config, DelveConfig::default());
        assert!(path.exists());
        assert!(captured.text().contains("Saved config"));
    }
}
