//! Engine configuration.
//!
//! Loaded from an optional JSON file, then overridden by environment
//! variables (after `.env` has been read by the binary):
//!
//! | Variable                      | Field               |
//! |-------------------------------|---------------------|
//! | `SPEEDGRID_DATA_DIR`          | `data_dir`          |
//! | `SPEEDGRID_GRID_DECIMALS`     | `grid_decimals`     |
//! | `SPEEDGRID_MODE`              | `aggregation_mode`  |
//! | `SPEEDGRID_LOOKUP_TIMEOUT_MS` | `lookup_timeout_ms` |
//! | `IPAPI_KEY`                   | `ipapi_key`         |

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use crate::bucket::GridResolution;
use crate::infra::{ipapi, nominatim};

/// How query-time summaries are produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationMode {
    /// Full scan and fold of the measurement store on every query.
    #[default]
    Recompute,
    /// Summaries kept up to date by folding each ingested measurement.
    Incremental,
}

impl FromStr for AggregationMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "recompute" => Ok(AggregationMode::Recompute),
            "incremental" => Ok(AggregationMode::Incremental),
            other => bail!("unknown aggregation mode {other:?} (expected recompute or incremental)"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Root directory of the CSV measurement store.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Decimal places of the spatial grid. Default: 2 (about 1.1 km).
    #[serde(default = "default_grid_decimals")]
    pub grid_decimals: u8,

    #[serde(default)]
    pub aggregation_mode: AggregationMode,

    /// Upper bound on one location lookup. Default: 3000 ms.
    #[serde(default = "default_lookup_timeout_ms")]
    pub lookup_timeout_ms: u64,

    #[serde(default = "default_ipapi_base_url")]
    pub ipapi_base_url: String,

    #[serde(default)]
    pub ipapi_key: Option<String>,

    #[serde(default = "default_nominatim_base_url")]
    pub nominatim_base_url: String,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_grid_decimals() -> u8 {
    GridResolution::default().decimals()
}

fn default_lookup_timeout_ms() -> u64 {
    3000
}

fn default_ipapi_base_url() -> String {
    ipapi::DEFAULT_BASE_URL.to_string()
}

fn default_nominatim_base_url() -> String {
    nominatim::DEFAULT_BASE_URL.to_string()
}

fn default_user_agent() -> String {
    concat!("speedgrid/", env!("CARGO_PKG_VERSION")).to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            grid_decimals: default_grid_decimals(),
            aggregation_mode: AggregationMode::default(),
            lookup_timeout_ms: default_lookup_timeout_ms(),
            ipapi_base_url: default_ipapi_base_url(),
            ipapi_key: None,
            nominatim_base_url: default_nominatim_base_url(),
            user_agent: default_user_agent(),
        }
    }
}

impl EngineConfig {
    /// Reads the JSON file at `path`.
    pub fn load(path: &str) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).with_context(|| format!("reading config {path}"))?;
        let config: EngineConfig =
            serde_json::from_str(&content).with_context(|| format!("parsing config {path}"))?;
        config.validate()?;
        Ok(config)
    }

    /// File config (or defaults) with process environment overrides applied.
    pub fn from_env(path: Option<&str>) -> Result<Self> {
        let base = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        let vars: HashMap<String, String> = std::env::vars().collect();
        base.with_overrides(&vars)
    }

    /// Applies the overrides present in `vars`.
    pub fn with_overrides(mut self, vars: &HashMap<String, String>) -> Result<Self> {
        if let Some(dir) = vars.get("SPEEDGRID_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(decimals) = vars.get("SPEEDGRID_GRID_DECIMALS") {
            self.grid_decimals = decimals
                .parse()
                .with_context(|| format!("SPEEDGRID_GRID_DECIMALS={decimals:?}"))?;
        }
        if let Some(mode) = vars.get("SPEEDGRID_MODE") {
            self.aggregation_mode = mode.parse()?;
        }
        if let Some(ms) = vars.get("SPEEDGRID_LOOKUP_TIMEOUT_MS") {
            self.lookup_timeout_ms = ms
                .parse()
                .with_context(|| format!("SPEEDGRID_LOOKUP_TIMEOUT_MS={ms:?}"))?;
        }
        if let Some(key) = vars.get("IPAPI_KEY").filter(|k| !k.is_empty()) {
            self.ipapi_key = Some(key.clone());
        }
        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> Result<()> {
        GridResolution::new(self.grid_decimals)?;
        if self.lookup_timeout_ms == 0 {
            bail!("lookup_timeout_ms must be greater than zero");
        }
        Ok(())
    }

    pub fn resolution(&self) -> GridResolution {
        GridResolution::new(self.grid_decimals).unwrap_or_default()
    }

    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }
}
