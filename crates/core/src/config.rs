use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::services::census::{CensusOptions, DEFAULT_SECTION};
use crate::services::scanner::SectionSelector;
use crate::target::TargetOptions;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config {path}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("Unsupported config extension for {0} (expected .yaml, .yml or .json)")]
    UnsupportedExtension(PathBuf),
}

fn default_section() -> String {
    DEFAULT_SECTION.to_string()
}

/// Serializable census configuration.
///
/// Every field is optional in the file; command-line values are merged on top.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CensusConfig {
    /// Target triple to disassemble for (e.g. `x86_64-unknown-linux-gnu`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub triple: Option<String>,
    /// Architecture override applied after the triple.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arch: Option<String>,
    /// Target attributes (`a1`, `+a2`, `-a3`).
    #[serde(default)]
    pub mattr: Vec<String>,
    /// Section (name or contained address) to scan for functions.
    #[serde(default = "default_section")]
    pub section: String,
    /// Include the dynamic symbol table when scanning ELF inputs.
    #[serde(default)]
    pub dynamic_symbols: bool,
}

impl Default for CensusConfig {
    fn default() -> Self {
        Self {
            triple: None,
            arch: None,
            mattr: Vec::new(),
            section: default_section(),
            dynamic_symbols: false,
        }
    }
}

impl CensusConfig {
    /// Load a YAML or JSON config, chosen by file extension.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default().to_lowercase();
        if !matches!(ext.as_str(), "yaml" | "yml" | "json") {
            return Err(ConfigError::UnsupportedExtension(path.to_path_buf()));
        }
        let body = fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        let parse_err =
            |message: String| ConfigError::Parse { path: path.to_path_buf(), message };
        if ext == "json" {
            serde_json::from_str(&body).map_err(|e| parse_err(e.to_string()))
        } else {
            serde_yaml::from_str(&body).map_err(|e| parse_err(e.to_string()))
        }
    }

    /// Split comma-separated attribute entries and drop empty ones.
    pub fn attributes(&self) -> Vec<String> {
        self.mattr
            .iter()
            .flat_map(|entry| entry.split(','))
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn to_options(&self) -> CensusOptions {
        CensusOptions {
            target: TargetOptions {
                triple: self.triple.clone(),
                arch: self.arch.clone(),
                attrs: self.attributes(),
            },
            section: self
                .section
                .parse::<SectionSelector>()
                .unwrap_or_else(|never| match never {}),
            include_dynamic_symbols: self.dynamic_symbols,
        }
    }
}
