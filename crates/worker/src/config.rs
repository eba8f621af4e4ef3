//! Worker configuration from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, bail};

use fleetpay_scheduler::SweeperConfig;

const DEFAULT_STORAGE_ROOT: &str = "./var/statements";
const DEFAULT_SWEEP_SECS: u64 = 60 * 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    pub redis_url: String,
    pub database_url: String,
    pub storage_root: PathBuf,
    /// `None` means `file://` URLs under `storage_root`.
    pub storage_base_url: Option<String>,
    pub sweep_interval: Duration,
    pub sweep_tolerance: Duration,
    pub handler_timeout: Option<Duration>,
}

impl WorkerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let required = |name: &str| -> anyhow::Result<String> {
            match lookup(name) {
                Some(v) if !v.trim().is_empty() => Ok(v),
                _ => bail!("{name} must be set"),
            }
        };
        let secs = |name: &str| -> anyhow::Result<Option<u64>> {
            lookup(name)
                .map(|raw| {
                    raw.trim()
                        .parse::<u64>()
                        .with_context(|| format!("{name}={raw:?} is not a whole number of seconds"))
                })
                .transpose()
        };

        let sweep_interval = secs("FLEETPAY_SWEEP_INTERVAL_SECS")?.unwrap_or(DEFAULT_SWEEP_SECS);
        if sweep_interval == 0 {
            bail!("FLEETPAY_SWEEP_INTERVAL_SECS must be positive");
        }

        Ok(Self {
            redis_url: required("REDIS_URL")?,
            database_url: required("DATABASE_URL")?,
            storage_root: lookup("FLEETPAY_STORAGE_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STORAGE_ROOT)),
            storage_base_url: lookup("FLEETPAY_STORAGE_BASE_URL"),
            sweep_interval: Duration::from_secs(sweep_interval),
            sweep_tolerance: Duration::from_secs(
                secs("FLEETPAY_SWEEP_TOLERANCE_SECS")?.unwrap_or(DEFAULT_SWEEP_SECS),
            ),
            handler_timeout: secs("FLEETPAY_HANDLER_TIMEOUT_SECS")?.map(Duration::from_secs),
        })
    }

    /// Sweeper settings shared by both queues.
    pub fn sweeper_config(&self, name: &str) -> SweeperConfig {
        let config = SweeperConfig::default()
            .with_name(name)
            .with_interval(self.sweep_interval)
            .with_tolerance(self.sweep_tolerance);
        match self.handler_timeout {
            Some(timeout) => config.with_handler_timeout(timeout),
            None => config,
        }
    }
}
