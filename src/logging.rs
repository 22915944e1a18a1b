use anyhow::{anyhow, Context, Result};
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing::Level;

use crate::config::LoggingConfig;

/// Install the global log subscriber
///
/// Lines go to the configured file in append mode (the file is provisioned
/// externally and never truncated), or to stderr when no file is set.
pub fn init(cfg: &LoggingConfig) -> Result<()> {
    let level: Level = cfg
        .level
        .parse()
        .map_err(|_| anyhow!("Invalid log level '{}'", cfg.level))?;

    let builder = tracing_subscriber::fmt().with_max_level(level);

    let installed = match &cfg.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;

            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
        }
        None => builder.with_writer(std::io::stderr).try_init(),
    };

    installed.map_err(|e| anyhow!("Failed to install log subscriber: {}", e))
}
