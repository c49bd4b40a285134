//! Analysis defaults.
//!
//! The defaults ship embedded in the binary (`analysis.toml`). A user file
//! passed with `--config` replaces them wholesale; command-line flags then
//! override single values. Every value goes through the same validation
//! as the engine's parameter constructors.

use std::path::Path;

use chrono::{DateTime, TimeDelta, Utc};
use habitat_map_habitat_models::{
    HabitatMethod, HabitatParams, KdeParams, McpParams, ParamError, TrendWindow,
};
use serde::Deserialize;

use crate::CliError;

/// Embedded default configuration (compiled into the binary).
const DEFAULT_CONFIG_TOML: &str = include_str!("../analysis.toml");

/// Default days between trend steps.
pub const DEFAULT_TIME_STEP_DAYS: u32 = 7;

/// Default trend look-back window in days.
pub const DEFAULT_OBSERVATION_WINDOW_DAYS: u32 = 30;

/// Parsed analysis configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnalysisConfig {
    /// KDE defaults.
    #[serde(default)]
    pub kde: KdeParams,
    /// MCP defaults.
    #[serde(default)]
    pub mcp: McpParams,
    /// Trend stepping defaults.
    #[serde(default)]
    pub trend: TrendConfig,
}

/// Trend step and window lengths, in whole days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrendConfig {
    /// Days between steps.
    #[serde(default = "default_time_step_days")]
    pub time_step_days: u32,
    /// Days each step looks back over.
    #[serde(default = "default_observation_window_days")]
    pub observation_window_days: u32,
}

const fn default_time_step_days() -> u32 {
    DEFAULT_TIME_STEP_DAYS
}

const fn default_observation_window_days() -> u32 {
    DEFAULT_OBSERVATION_WINDOW_DAYS
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            time_step_days: DEFAULT_TIME_STEP_DAYS,
            observation_window_days: DEFAULT_OBSERVATION_WINDOW_DAYS,
        }
    }
}

impl AnalysisConfig {
    /// Parses a configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`CliError::Toml`] if the text is malformed or a parameter
    /// is out of range.
    pub fn parse(text: &str) -> Result<Self, CliError> {
        Ok(toml::from_str(text)?)
    }

    /// The configuration compiled into the binary.
    ///
    /// # Errors
    ///
    /// Returns [`CliError::Toml`] if the embedded file is invalid.
    pub fn embedded() -> Result<Self, CliError> {
        Self::parse(DEFAULT_CONFIG_TOML)
    }

    /// Loads `path` if given, otherwise the embedded defaults.
    ///
    /// # Errors
    ///
    /// Returns [`CliError::Io`] if the file cannot be read, or
    /// [`CliError::Toml`] if it does not parse.
    pub fn load(path: Option<&Path>) -> Result<Self, CliError> {
        match path {
            Some(path) => {
                log::info!("Loading analysis config from {}", path.display());
                Self::parse(&std::fs::read_to_string(path)?)
            }
            None => Self::embedded(),
        }
    }

    /// KDE parameters with any supplied values replacing the configured ones.
    ///
    /// # Errors
    ///
    /// Returns a [`ParamError`] if the merged values are out of range.
    pub fn kde_params(
        &self,
        bandwidth: Option<f64>,
        level_percent: Option<f64>,
        grid_size: Option<u32>,
    ) -> Result<KdeParams, ParamError> {
        KdeParams::new(
            bandwidth.or_else(|| self.kde.bandwidth()),
            level_percent.unwrap_or_else(|| self.kde.level_percent()),
            grid_size.unwrap_or_else(|| self.kde.grid_size()),
        )
    }

    /// MCP parameters with `percentage` replacing the configured one.
    ///
    /// # Errors
    ///
    /// Returns [`ParamError::Percentage`] if it is out of range.
    pub fn mcp_params(&self, percentage: Option<f64>) -> Result<McpParams, ParamError> {
        McpParams::new(percentage.or_else(|| self.mcp.percentage()))
    }

    /// Parameters for `method`, with command-line overrides applied.
    ///
    /// # Errors
    ///
    /// Returns a [`ParamError`] if a merged value is out of range.
    pub fn habitat_params(
        &self,
        method: HabitatMethod,
        percentage: Option<f64>,
        bandwidth: Option<f64>,
        level_percent: Option<f64>,
        grid_size: Option<u32>,
    ) -> Result<HabitatParams, ParamError> {
        Ok(match method {
            HabitatMethod::Mcp => HabitatParams::Mcp(self.mcp_params(percentage)?),
            HabitatMethod::Kde => {
                HabitatParams::Kde(self.kde_params(bandwidth, level_percent, grid_size)?)
            }
        })
    }

    /// Trend window over `[start, end]` using the configured step and
    /// look-back unless overridden.
    ///
    /// # Errors
    ///
    /// Returns a [`ParamError`] for a zero step or `start` after `end`.
    pub fn trend_window(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        time_step_days: Option<u32>,
        observation_window_days: Option<u32>,
    ) -> Result<TrendWindow, ParamError> {
        let step = time_step_days.unwrap_or(self.trend.time_step_days);
        let window = observation_window_days.unwrap_or(self.trend.observation_window_days);
        TrendWindow::new(
            start,
            end,
            TimeDelta::days(i64::from(step)),
            TimeDelta::days(i64::from(window)),
        )
    }
}
