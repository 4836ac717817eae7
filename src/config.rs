//! Configuration system using Figment
//!
//! Configuration is layered from:
//! 1. Built-in defaults ([`AppConfig::default`])
//! 2. A TOML file (default `config/pulse_daq.toml`, optional)
//! 3. Environment variables prefixed with `PULSE_DAQ_`, nested with `__`
//!    (e.g. `PULSE_DAQ_AGGREGATION__WINDOW_WIDTH=500`)
//!
//! [`AggregationConfig`] is also the runtime-mutable part of the configuration: the
//! scheduler applies [`ConfigUpdate`] messages to it between ticks, rejecting any update
//! that fails [`AggregationConfig::validate`].
//!
//! # Example
//! ```no_run
//! use pulse_daq::config::AppConfig;
//!
//! let config = AppConfig::load()?;
//! config.validate()?;
//! println!("Logging to {}", config.storage.output_dir.display());
//! # Ok::<(), pulse_daq::error::DaqError>(())
//! ```

use crate::error::{AppResult, DaqError};
use crate::histogram::BinEdges;
use crate::store::DEFAULT_CAPACITY;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "config/pulse_daq.toml";

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "PULSE_DAQ_";

/// Upper bound for any histogram bin count.
pub const MAX_BINS: usize = 10_000;

/// Accepted tick period range in milliseconds.
pub const TICK_PERIOD_RANGE_MS: (u64, u64) = (10, 60_000);

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Application settings
    pub application: ApplicationConfig,
    /// Detector link settings
    pub source: SourceConfig,
    /// Event log settings
    pub storage: StorageConfig,
    /// In-memory retention settings
    pub store: StoreConfig,
    /// Histogram and scheduling settings
    pub aggregation: AggregationConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Application name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log output format (pretty, compact, json)
    pub log_format: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "Pulse DAQ".to_string(),
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

/// Where raw records come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Serial port to the detector.
    Serial,
    /// Replay of a raw record file.
    File,
    /// Standard input.
    Stdin,
}

/// Detector link configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Link type
    pub kind: SourceKind,
    /// Serial device path
    pub port: String,
    /// Serial baud rate
    pub baud_rate: u32,
    /// Raw record file for `kind = "file"`
    pub path: Option<PathBuf>,
    /// Records buffered between the link reader and the scheduler
    pub channel_capacity: usize,
    /// Upper bound on records drained in a single tick
    pub max_records_per_tick: usize,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::Serial,
            port: "/dev/ttyACM0".to_string(),
            baud_rate: 9600,
            path: None,
            channel_capacity: 65_536,
            max_records_per_tick: 100_000,
        }
    }
}

/// Event log configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory for event log files
    pub output_dir: PathBuf,
    /// File name prefix; the creation date is appended
    pub file_prefix: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("data"),
            file_prefix: "PulseDataset".to_string(),
        }
    }
}

/// In-memory retention configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Maximum number of retained events
    pub capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
        }
    }
}

/// Runtime-adjustable aggregation parameters.
///
/// Units are detector clock units for gaps and window width, ADC counts for amplitudes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    /// Inclusive lower bound of the gap histogram
    pub gap_min: u64,
    /// Exclusive upper bound of the gap histogram
    pub gap_max: u64,
    /// Number of gap bins
    pub gap_bins: usize,
    /// Width of each counting window
    pub window_width: u64,
    /// Scheduler tick period
    pub tick_period_ms: u64,
    /// Inclusive lower bound of the amplitude histogram
    pub amplitude_min: u64,
    /// Exclusive upper bound of the amplitude histogram
    pub amplitude_max: u64,
    /// Number of amplitude bins
    pub amplitude_bins: usize,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            gap_min: 0,
            gap_max: 2000,
            gap_bins: 100,
            window_width: 1000,
            tick_period_ms: 200,
            amplitude_min: 700,
            amplitude_max: 800,
            amplitude_bins: 20,
        }
    }
}

impl AggregationConfig {
    /// Bin edges of the gap view.
    pub fn gap_edges(&self) -> BinEdges {
        BinEdges::EqualWidth {
            min: self.gap_min,
            max: self.gap_max,
            bins: self.gap_bins,
        }
    }

    /// Bin edges of the amplitude view.
    pub fn amplitude_edges(&self) -> BinEdges {
        BinEdges::EqualWidth {
            min: self.amplitude_min,
            max: self.amplitude_max,
            bins: self.amplitude_bins,
        }
    }

    /// Scheduler tick period.
    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_period_ms)
    }

    /// Check every field against its bounds.
    pub fn validate(&self) -> AppResult<()> {
        validate_range("gap", self.gap_min, self.gap_max)?;
        validate_bins("gap_bins", self.gap_bins)?;
        validate_range("amplitude", self.amplitude_min, self.amplitude_max)?;
        validate_bins("amplitude_bins", self.amplitude_bins)?;

        if self.window_width == 0 {
            return Err(DaqError::InvalidConfiguration(
                "window_width must be greater than 0".to_string(),
            ));
        }

        let (lo, hi) = TICK_PERIOD_RANGE_MS;
        if !(lo..=hi).contains(&self.tick_period_ms) {
            return Err(DaqError::InvalidConfiguration(format!(
                "tick_period_ms {} must be within {}..={}",
                self.tick_period_ms, lo, hi
            )));
        }
        Ok(())
    }
}

fn validate_range(name: &str, min: u64, max: u64) -> AppResult<()> {
    if max <= min {
        return Err(DaqError::InvalidConfiguration(format!(
            "{name} range [{min}, {max}) is empty; max must exceed min"
        )));
    }
    Ok(())
}

fn validate_bins(name: &str, bins: usize) -> AppResult<()> {
    if bins == 0 || bins > MAX_BINS {
        return Err(DaqError::InvalidConfiguration(format!(
            "{name} {bins} must be within 1..={MAX_BINS}"
        )));
    }
    Ok(())
}

/// A runtime change to the aggregation parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ConfigUpdate {
    /// New gap histogram range `[min, max)`.
    GapRange {
        /// Inclusive lower bound
        min: u64,
        /// Exclusive upper bound
        max: u64,
    },
    /// New gap bin count.
    GapBinCount(usize),
    /// New counting window width.
    WindowWidth(u64),
    /// Derive the window width that gives this mean count per window at the current rate.
    FitWindowWidth {
        /// Desired mean events per window
        mean_count: f64,
    },
    /// New tick period in milliseconds.
    TickPeriod(u64),
    /// New amplitude histogram range `[min, max)`.
    AmplitudeRange {
        /// Inclusive lower bound
        min: u64,
        /// Exclusive upper bound
        max: u64,
    },
    /// New amplitude bin count.
    AmplitudeBinCount(usize),
}

impl ConfigUpdate {
    /// Return `current` with this update applied, or an error leaving `current` as is.
    ///
    /// [`ConfigUpdate::FitWindowWidth`] depends on the data and must be resolved to a
    /// [`ConfigUpdate::WindowWidth`] by the caller first.
    pub fn apply(&self, current: &AggregationConfig) -> AppResult<AggregationConfig> {
        let mut next = current.clone();
        match *self {
            ConfigUpdate::GapRange { min, max } => {
                next.gap_min = min;
                next.gap_max = max;
            }
            ConfigUpdate::GapBinCount(bins) => next.gap_bins = bins,
            ConfigUpdate::WindowWidth(width) => next.window_width = width,
            ConfigUpdate::FitWindowWidth { .. } => {
                return Err(DaqError::InvalidConfiguration(
                    "window width fit was not resolved against a snapshot".to_string(),
                ))
            }
            ConfigUpdate::TickPeriod(ms) => next.tick_period_ms = ms,
            ConfigUpdate::AmplitudeRange { min, max } => {
                next.amplitude_min = min;
                next.amplitude_max = max;
            }
            ConfigUpdate::AmplitudeBinCount(bins) => next.amplitude_bins = bins,
        }
        next.validate()?;
        Ok(next)
    }
}

impl AppConfig {
    /// Load configuration from the default file and environment variables
    pub fn load() -> AppResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    ///
    /// A missing file is not an error; defaults and environment still apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let config = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> AppResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(DaqError::InvalidConfiguration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        let valid_formats = ["pretty", "compact", "json"];
        if !valid_formats.contains(&self.application.log_format.as_str()) {
            return Err(DaqError::InvalidConfiguration(format!(
                "Invalid log_format '{}'. Must be one of: {}",
                self.application.log_format,
                valid_formats.join(", ")
            )));
        }

        match self.source.kind {
            SourceKind::Serial if self.source.port.trim().is_empty() => {
                return Err(DaqError::InvalidConfiguration(
                    "source.port is required for a serial source".to_string(),
                ))
            }
            SourceKind::Serial if self.source.baud_rate == 0 => {
                return Err(DaqError::InvalidConfiguration(
                    "source.baud_rate must be greater than 0".to_string(),
                ))
            }
            SourceKind::File if self.source.path.is_none() => {
                return Err(DaqError::InvalidConfiguration(
                    "source.path is required for a file source".to_string(),
                ))
            }
            _ => {}
        }
        if self.source.channel_capacity == 0 || self.source.max_records_per_tick == 0 {
            return Err(DaqError::InvalidConfiguration(
                "source.channel_capacity and source.max_records_per_tick must be at least 1"
                    .to_string(),
            ));
        }

        if self.storage.file_prefix.trim().is_empty() {
            return Err(DaqError::InvalidConfiguration(
                "storage.file_prefix must not be empty".to_string(),
            ));
        }

        if self.store.capacity == 0 {
            return Err(DaqError::InvalidConfiguration(
                "store.capacity must be at least 1".to_string(),
            ));
        }

        self.aggregation.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.aggregation.tick_period(), Duration::from_millis(200));
        assert_eq!(config.store.capacity, DEFAULT_CAPACITY);
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = AppConfig::default();
        config.application.log_level = "loud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn file_source_requires_path() {
        let mut config = AppConfig::default();
        config.source.kind = SourceKind::File;
        assert!(config.validate().is_err());
        config.source.path = Some(PathBuf::from("raw.txt"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn aggregation_bounds() {
        let base = AggregationConfig::default();
        let cases = [
            AggregationConfig { gap_bins: 0, ..base.clone() },
            AggregationConfig { gap_bins: MAX_BINS + 1, ..base.clone() },
            AggregationConfig { gap_min: 50, gap_max: 50, ..base.clone() },
            AggregationConfig { window_width: 0, ..base.clone() },
            AggregationConfig { tick_period_ms: 1, ..base.clone() },
            AggregationConfig { amplitude_min: 900, ..base.clone() },
        ];
        for case in cases {
            assert!(case.validate().is_err(), "accepted {:?}", case);
        }
    }

    #[test]
    fn update_applies_and_rejects() {
        let current = AggregationConfig::default();

        let next = ConfigUpdate::WindowWidth(250).apply(&current).unwrap();
        assert_eq!(next.window_width, 250);

        let next = ConfigUpdate::GapRange { min: 5, max: 500 }.apply(&current).unwrap();
        assert_eq!((next.gap_min, next.gap_max), (5, 500));

        assert!(ConfigUpdate::GapBinCount(0).apply(&current).is_err());
        assert!(ConfigUpdate::GapRange { min: 10, max: 5 }.apply(&current).is_err());
        assert!(ConfigUpdate::TickPeriod(0).apply(&current).is_err());
        assert!(ConfigUpdate::FitWindowWidth { mean_count: 1.5 }
            .apply(&current)
            .is_err());
    }

    #[test]
    fn loads_file_and_env_overrides() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "pulse_daq.toml",
                r#"
                [application]
                log_level = "debug"

                [source]
                kind = "file"
                path = "raw.txt"

                [aggregation]
                gap_max = 500
                gap_bins = 50
                "#,
            )?;
            jail.set_env("PULSE_DAQ_AGGREGATION__WINDOW_WIDTH", "250");
            jail.set_env("PULSE_DAQ_STORE__CAPACITY", "1000");

            let config = AppConfig::load_from("pulse_daq.toml").map_err(|e| e.to_string())?;
            assert_eq!(config.application.log_level, "debug");
            assert_eq!(config.source.kind, SourceKind::File);
            assert_eq!(config.source.path, Some(PathBuf::from("raw.txt")));
            assert_eq!(config.aggregation.gap_max, 500);
            assert_eq!(config.aggregation.gap_bins, 50);
            assert_eq!(config.aggregation.window_width, 250);
            assert_eq!(config.aggregation.amplitude_bins, 20);
            assert_eq!(config.store.capacity, 1000);
            assert!(config.validate().is_ok());
            Ok(())
        });
    }

    #[test]
    fn missing_file_uses_defaults() {
        figment::Jail::expect_with(|_jail| {
            let config = AppConfig::load_from("absent.toml").map_err(|e| e.to_string())?;
            assert_eq!(config, AppConfig::default());
            Ok(())
        });
    }
}
