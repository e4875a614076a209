// src/config.rs

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
};
use tracing::{debug, info};

pub const CONFIG_ENV: &str = "RANKPIVOT_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "rankpivot.yaml";

/// Run settings, read from YAML. Every field is optional in the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root of `<country>/<category>/*.csv`.
    pub data_root: PathBuf,
    /// Where tables, metadata and exports are written.
    pub output_dir: PathBuf,
    /// Category a new table is bootstrapped from; first by name if unset.
    pub anchor_category: Option<String>,
    /// Countries to process; empty means every country directory.
    pub countries: Vec<String>,
    pub write_parquet: bool,
    /// Worker threads for batch runs; rayon's default if unset.
    pub threads: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from("DATA"),
            output_dir: PathBuf::from("outputs"),
            anchor_category: None,
            countries: Vec::new(),
            write_parquet: false,
            threads: None,
        }
    }
}

impl Config {
    /// Load from `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("no config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let cfg: Config =
            serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
        info!("loaded config from {}", path.display());
        Ok(cfg)
    }

    /// Load from `$RANKPIVOT_CONFIG`, falling back to `rankpivot.yaml`.
    pub fn from_env() -> Result<Self> {
        let path = env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load(Path::new(&path))
    }
}
