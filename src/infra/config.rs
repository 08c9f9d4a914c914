//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml
//!
//! Every field has a default, so a partial file (or none at all) is valid.

use crate::domain::billing::DEFAULT_THRESHOLD;
use crate::domain::Calendar;
use anyhow::{ensure, Context};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// Unique site identifier, used as the metrics label
    #[serde(default = "default_site_id")]
    pub id: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self { id: default_site_id() }
    }
}

fn default_site_id() -> String {
    "checkin".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind_address: default_bind_address(), port: default_port() }
    }
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

#[derive(Debug, Clone, Deserialize)]
pub struct OccupancyConfig {
    /// Maximum occupancy shown to clients (advisory, not enforced)
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    /// Sessions older than this are treated as checked out
    #[serde(default = "default_session_timeout_secs")]
    pub session_timeout_secs: u64,
}

impl Default for OccupancyConfig {
    fn default() -> Self {
        Self { capacity: default_capacity(), session_timeout_secs: default_session_timeout_secs() }
    }
}

fn default_capacity() -> usize {
    10
}

fn default_session_timeout_secs() -> u64 {
    90 * 60
}

#[derive(Debug, Clone, Deserialize)]
pub struct BillingConfig {
    /// Visit number (per month) from which 1day members pay per visit
    #[serde(default = "default_threshold")]
    pub threshold: u32,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self { threshold: default_threshold() }
    }
}

fn default_threshold() -> u32 {
    DEFAULT_THRESHOLD
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: default_database_path() }
    }
}

fn default_database_path() -> String {
    "checkin.db".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct CalendarConfig {
    /// Venue's fixed offset from UTC in minutes (JST = 540)
    #[serde(default = "default_utc_offset_minutes")]
    pub utc_offset_minutes: i32,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self { utc_offset_minutes: default_utc_offset_minutes() }
    }
}

fn default_utc_offset_minutes() -> i32 {
    9 * 60
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Interval for the periodic metrics log line (0 to disable)
    #[serde(default = "default_metrics_interval")]
    pub interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval() }
    }
}

fn default_metrics_interval() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub occupancy: OccupancyConfig,
    #[serde(default)]
    pub billing: BillingConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub calendar: CalendarConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    site_id: String,
    bind_address: String,
    port: u16,
    capacity: usize,
    session_timeout: Duration,
    billing_threshold: u32,
    database_path: String,
    calendar: Calendar,
    metrics_interval_secs: u64,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            site_id: default_site_id(),
            bind_address: default_bind_address(),
            port: default_port(),
            capacity: default_capacity(),
            session_timeout: Duration::from_secs(default_session_timeout_secs()),
            billing_threshold: default_threshold(),
            database_path: default_database_path(),
            calendar: Calendar::from_offset_minutes(default_utc_offset_minutes())
                .unwrap_or_default(),
            metrics_interval_secs: default_metrics_interval(),
            config_file: "default".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Self::from_toml(toml_config, &path.display().to_string())
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    fn from_toml(toml_config: TomlConfig, config_file: &str) -> anyhow::Result<Self> {
        ensure!(toml_config.billing.threshold >= 1, "billing.threshold must be at least 1");
        ensure!(
            toml_config.occupancy.session_timeout_secs > 0,
            "occupancy.session_timeout_secs must be positive"
        );
        let calendar = Calendar::from_offset_minutes(toml_config.calendar.utc_offset_minutes)
            .with_context(|| {
                format!(
                    "calendar.utc_offset_minutes out of range: {}",
                    toml_config.calendar.utc_offset_minutes
                )
            })?;

        Ok(Self {
            site_id: toml_config.site.id,
            bind_address: toml_config.server.bind_address,
            port: toml_config.server.port,
            capacity: toml_config.occupancy.capacity,
            session_timeout: Duration::from_secs(toml_config.occupancy.session_timeout_secs),
            billing_threshold: toml_config.billing.threshold,
            database_path: toml_config.database.path,
            calendar,
            metrics_interval_secs: toml_config.metrics.interval_secs,
            config_file: config_file.to_string(),
        })
    }

    /// Load configuration - tries TOML file first, falls back to defaults
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %format!("{e:#}"), "config_load_failed_using_defaults");
                Self::default()
            }
        }
    }

    /// Override the listen port (PORT env var / --port)
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    // Getters for all config fields
    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    pub fn bind_address(&self) -> &str {
        &self.bind_address
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn session_timeout(&self) -> Duration {
        self.session_timeout
    }

    pub fn billing_threshold(&self) -> u32 {
        self.billing_threshold
    }

    pub fn database_path(&self) -> &str {
        &self.database_path
    }

    pub fn calendar(&self) -> Calendar {
        self.calendar
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }
}
