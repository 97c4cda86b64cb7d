//! Configuration management
//!
//! Loads the JSON configuration file: pattern parameters, data locations, the
//! market-data provider and the optional fine-tuning grid. The Polygon API key
//! can come from the environment (or a `.env` file) instead of the file.

use anyhow::{Context, Result};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::pattern::PatternParams;
use crate::{grid, Money};

/// Number of parameter sets fine-tuning runs when the config names none
pub const DEFAULT_PARAM_SET_COUNT: usize = 10;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub params: PatternParams,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub polygon: PolygonConfig,
    /// Grid search values for fine-tuning
    /// Each key is a parameter name, value is the list of values to test
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grid: Option<BTreeMap<String, Vec<serde_json::Value>>>,
    /// Explicit parameter sets for fine-tuning (takes precedence over `grid`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub param_sets: Option<Vec<PatternParams>>,
}

impl Config {
    /// Load configuration from JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let mut config: Config =
            serde_json::from_str(&contents).context("Failed to parse config JSON")?;

        if let Ok(api_key) = std::env::var("POLYGON_API_KEY") {
            if !api_key.trim().is_empty() {
                config.polygon.api_key = Some(api_key);
            }
        }

        Ok(config)
    }

    /// Load from `path` if it exists, otherwise fall back to defaults
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            return Self::from_file(path);
        }

        tracing::warn!("Config file {} not found, using defaults", path.display());
        let mut config = Config::default();
        config.polygon.api_key = std::env::var("POLYGON_API_KEY").ok();
        Ok(config)
    }

    /// Parameter sets to evaluate when fine-tuning
    ///
    /// Explicit `param_sets` win over `grid`; with neither, the configured
    /// params are repeated `DEFAULT_PARAM_SET_COUNT` times, ready for editing.
    pub fn fine_tune_sets(&self) -> Result<Vec<PatternParams>> {
        if let Some(sets) = &self.param_sets {
            if sets.is_empty() {
                anyhow::bail!("'param_sets' is present but empty");
            }
            return Ok(sets.clone());
        }

        match &self.grid {
            Some(g) if !g.is_empty() => grid::expand(&self.params, g),
            _ => Ok(vec![self.params; DEFAULT_PARAM_SET_COUNT]),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            params: default_pattern_params(),
            data: DataConfig::default(),
            polygon: PolygonConfig::default(),
            grid: None,
            param_sets: None,
        }
    }
}

/// The parameter set the scanner is usually run with
pub fn default_pattern_params() -> PatternParams {
    PatternParams {
        max_price_increase_above_a0: Money::new(dec!(0.50)),
        price_increase_to_confirm_a0: Money::new(dec!(0.05)),
        max_decrease_below_a0: Money::new(dec!(0.20)),
        price_increase_to_confirm_higher_low: Money::new(dec!(0.05)),
        pattern_time_limit_ms: 30 * 60 * 1000,
        take_profit_offset: Money::new(dec!(0.50)),
        stop_loss_offset: Money::new(dec!(0.05)),
        time_to_wait_before_confirm_ax_ms: 5 * 60 * 1000,
        price_increase_from_a2_to_enter_trade: Money::new(dec!(0.02)),
        trade_timeout_ms: 45 * 60 * 1000,
    }
}

/// Local data configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    pub data_dir: String,
    /// SQLite file for archiving fetched candles (disabled when absent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive_db: Option<String>,
}

impl Default for DataConfig {
    fn default() -> Self {
        DataConfig {
            data_dir: "data".to_string(),
            archive_db: None,
        }
    }
}

/// Polygon.io market-data configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolygonConfig {
    #[serde(default = "default_polygon_url")]
    pub base_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

fn default_polygon_url() -> String {
    "https://api.polygon.io".to_string()
}

impl Default for PolygonConfig {
    fn default() -> Self {
        PolygonConfig {
            base_url: default_polygon_url(),
            api_key: None,
        }
    }
}
