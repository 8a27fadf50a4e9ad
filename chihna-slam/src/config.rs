//! Configuration for the map engine, loadable from a YAML file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::VarianceMode;
use crate::error::{MapError, Result};

/// Map engine configuration.
///
/// Every field has a default, so any subset of keys may be given:
///
/// ```yaml
/// map_file: /var/lib/chihna/map.txt
/// initial_map_file: /usr/share/chihna/site_map.txt
/// variance_mode: harmonic
/// bootstrap_frames: 10
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MapConfig {
    /// Where the map is persisted. Written on new-fiducial insertion,
    /// read at startup.
    #[serde(default = "default_map_file")]
    pub map_file: PathBuf,

    /// Optional map used only to seed the engine at startup. When set it
    /// takes precedence over `map_file` for the initial load.
    #[serde(default)]
    pub initial_map_file: Option<PathBuf>,

    /// Variance-combination strategy for map fusion.
    #[serde(default)]
    pub variance_mode: VarianceMode,

    /// Frame-count threshold for bootstrap: the origin is anchored and
    /// tracking begins once the frame number exceeds this value.
    #[serde(default = "default_bootstrap_frames")]
    pub bootstrap_frames: u64,
}

fn default_map_file() -> PathBuf {
    let home = std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    home.join(".chihna").join("map.txt")
}

fn default_bootstrap_frames() -> u64 {
    10
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            map_file: default_map_file(),
            initial_map_file: None,
            variance_mode: VarianceMode::default(),
            bootstrap_frames: default_bootstrap_frames(),
        }
    }
}

impl MapConfig {
    /// Load configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&content).map_err(|e| MapError::Config(e.to_string()))
    }
}
