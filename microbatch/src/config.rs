//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable overrides. The
//! configuration file path defaults to `config.yaml` but can be specified via the `-f`
//! flag or the `MICROBATCH_CONFIG` environment variable.
//!
//! ## Loading Priority
//!
//! Sources are merged in order, later ones overriding earlier ones:
//!
//! 1. **YAML config file** - base configuration (a missing file is not an error)
//! 2. **Environment variables** - variables prefixed with `MICROBATCH_`
//!
//! For nested values use double underscores, e.g. `MICROBATCH_SCHEDULER__BATCH_DELAY=2s`
//! sets `scheduler.batch_delay`.
//!
//! ## Example
//!
//! ```yaml
//! host: 0.0.0.0
//! port: 8000
//! scheduler:
//!   batch_size: 3
//!   batch_delay: 5s
//!   call_timeout: 3s
//!   idempotency_window: 5m
//! external_call:
//!   type: http
//!   url: http://localhost:9000/process
//! ```

use std::time::Duration;

use clap::Parser;
use figment::{
    providers::{Env, Format, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::call::{ExternalCall, HttpCall, SimulatedCall};
use crate::dispatcher::DispatcherConfig;

/// Simple CLI args - just for specifying the config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "MICROBATCH_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to (e.g., "0.0.0.0" for all interfaces)
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// Batching and dispatch timing
    pub scheduler: SchedulerConfig,
    /// Where dispatched ids are sent
    pub external_call: ExternalCallConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            scheduler: SchedulerConfig::default(),
            external_call: ExternalCallConfig::default(),
        }
    }
}

/// Scheduler timing and sizing.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerConfig {
    /// Ids per batch
    pub batch_size: usize,
    /// Minimum interval between two ticks
    #[serde(with = "humantime_serde")]
    pub batch_delay: Duration,
    /// Per-id bound on an external call
    #[serde(with = "humantime_serde")]
    pub call_timeout: Duration,
    /// How long identical submissions resolve to the first request
    #[serde(with = "humantime_serde")]
    pub idempotency_window: Duration,
    /// Fallback wake-up for an idle dispatcher
    #[serde(with = "humantime_serde")]
    pub idle_poll_interval: Duration,
    /// Interval for debug-level status logs; unset to disable
    #[serde(default, with = "humantime_serde")]
    pub status_log_interval: Option<Duration>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            batch_size: 3,
            batch_delay: Duration::from_secs(5),
            call_timeout: Duration::from_secs(3),
            idempotency_window: Duration::from_secs(300),
            idle_poll_interval: Duration::from_secs(1),
            status_log_interval: Some(Duration::from_secs(5)),
        }
    }
}

impl From<&SchedulerConfig> for DispatcherConfig {
    fn from(config: &SchedulerConfig) -> Self {
        DispatcherConfig {
            batch_size: config.batch_size,
            batch_delay: config.batch_delay,
            call_timeout: config.call_timeout,
            idle_poll_interval: config.idle_poll_interval,
            status_log_interval: config.status_log_interval,
        }
    }
}

/// External call adapter selection.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ExternalCallConfig {
    /// In-process stand-in with random latency and failures
    Simulated {
        #[serde(default = "ExternalCallConfig::default_success_probability")]
        success_probability: f64,
        #[serde(default = "ExternalCallConfig::default_min_latency", with = "humantime_serde")]
        min_latency: Duration,
        #[serde(default = "ExternalCallConfig::default_max_latency", with = "humantime_serde")]
        max_latency: Duration,
    },
    /// POST each id to `url`
    Http { url: String },
}

impl Default for ExternalCallConfig {
    fn default() -> Self {
        ExternalCallConfig::Simulated {
            success_probability: Self::default_success_probability(),
            min_latency: Self::default_min_latency(),
            max_latency: Self::default_max_latency(),
        }
    }
}

impl ExternalCallConfig {
    fn default_success_probability() -> f64 {
        0.7
    }

    fn default_min_latency() -> Duration {
        Duration::from_millis(100)
    }

    fn default_max_latency() -> Duration {
        Duration::from_secs(1)
    }

    /// Build the configured adapter.
    pub fn build(&self) -> Box<dyn ExternalCall> {
        match self {
            ExternalCallConfig::Simulated {
                success_probability,
                min_latency,
                max_latency,
            } => Box::new(SimulatedCall::new(*success_probability, *min_latency, *max_latency)),
            ExternalCallConfig::Http { url } => Box::new(HttpCall::new(url.clone())),
        }
    }
}

impl Config {
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let config: Self = Self::figment(args).extract()?;
        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    /// Validate the configuration for consistency
    pub fn validate(&self) -> anyhow::Result<()> {
        let scheduler = &self.scheduler;
        if scheduler.batch_size == 0 {
            anyhow::bail!("Config validation: scheduler.batch_size must be at least 1");
        }
        for (name, value) in [
            ("batch_delay", scheduler.batch_delay),
            ("call_timeout", scheduler.call_timeout),
            ("idle_poll_interval", scheduler.idle_poll_interval),
        ] {
            if value.is_zero() {
                anyhow::bail!("Config validation: scheduler.{name} must be greater than zero");
            }
        }
        if scheduler.status_log_interval.is_some_and(|d| d.is_zero()) {
            anyhow::bail!("Config validation: scheduler.status_log_interval must be greater than zero when set");
        }

        match &self.external_call {
            ExternalCallConfig::Simulated {
                success_probability,
                min_latency,
                max_latency,
            } => {
                if !(0.0..=1.0).contains(success_probability) {
                    anyhow::bail!(
                        "Config validation: external_call.success_probability ({success_probability}) must be between 0 and 1"
                    );
                }
                if min_latency > max_latency {
                    anyhow::bail!(
                        "Config validation: external_call.min_latency ({:?}) cannot be greater than max_latency ({:?})",
                        min_latency,
                        max_latency
                    );
                }
            }
            ExternalCallConfig::Http { url } => {
                if !(url.starts_with("http://") || url.starts_with("https://")) {
                    anyhow::bail!("Config validation: external_call.url must be an http(s) URL, got '{url}'");
                }
            }
        }

        Ok(())
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            // Load base config file
            .merge(Yaml::file(&args.config))
            // Environment variables override specific values; MICROBATCH_CONFIG names the file
            .merge(Env::prefixed("MICROBATCH_").ignore(&["config"]).split("__"))
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
