//! Explicit overlay configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{OverlayError, Result};

/// Where the overlay keeps its two stores.
///
/// A `None` path keeps that store in memory.
///
/// ```toml
/// live_graph_path = "/var/lib/tempora/live"
/// annotation_path = "/var/lib/tempora/annotations.redb"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OverlayConfig {
    /// Directory of the on-disk live graph.
    pub live_graph_path: Option<PathBuf>,
    /// File of the on-disk annotation log.
    pub annotation_path: Option<PathBuf>,
}

impl OverlayConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| OverlayError::Config(e.to_string()))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            OverlayError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| OverlayError::Config(e.to_string()))
    }
}
