use crate::error::Result;

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Harness configuration.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    /// The log level: error, warn, info, debug or trace.
    pub log_level: String,
    /// The maximum number of concurrently active worker threads.
    pub max_threads: usize,
    /// The interval at which sleeping operations check for cancellation.
    pub sleep_interval_ms: u64,
    /// The interval at which sync points check for cancellation.
    pub sync_timeout_ms: u64,
    /// The random seed for shuffled operations, if deterministic.
    pub seed: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            max_threads: 64,
            sleep_interval_ms: 200,
            sync_timeout_ms: 1000,
            seed: None,
        }
    }
}

impl Config {
    /// Loads the configuration from an optional file (YAML, TOML, etc. by
    /// extension), with overrides from TOYTEST_* environment variables.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let defaults = Self::default();
        let mut builder = ::config::Config::builder()
            .set_default("log_level", defaults.log_level)?
            .set_default("max_threads", defaults.max_threads as i64)?
            .set_default("sleep_interval_ms", defaults.sleep_interval_ms as i64)?
            .set_default("sync_timeout_ms", defaults.sync_timeout_ms as i64)?;
        if let Some(file) = file {
            builder = builder.add_source(::config::File::from(file));
        }
        let config = builder.add_source(::config::Environment::with_prefix("TOYTEST")).build()?;
        Ok(config.try_deserialize()?)
    }

    pub fn sleep_interval(&self) -> Duration {
        Duration::from_millis(self.sleep_interval_ms)
    }

    pub fn sync_timeout(&self) -> Duration {
        Duration::from_millis(self.sync_timeout_ms)
    }

    /// Initializes logging at the configured level. Unless debugging, only
    /// the harness' own log messages are emitted.
    pub fn init_logging(&self) -> Result<()> {
        let level = self.log_level.parse::<simplelog::LevelFilter>()?;
        let mut config = simplelog::ConfigBuilder::new();
        if level != simplelog::LevelFilter::Debug {
            config.add_filter_allow_str("toytest");
        }
        simplelog::SimpleLogger::init(level, config.build())?;
        Ok(())
    }
}
