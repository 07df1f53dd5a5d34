use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::ProjectLayout;
use crate::registry::ParseMode;
use crate::services::equivalence::{MaskConfig, DEFAULT_DIAGNOSTIC_WORDS};

/// Size in bytes of the reference image's `.text` section.
pub const DEFAULT_TEXT_SIZE: u64 = 1_279_344;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse YAML config {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("failed to parse JSON config {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("unsupported config format `{0}` (expected yaml, yml, or json)")]
    UnsupportedFormat(String),
}

/// Serializable configuration for a verification run.
///
/// Every field has a default, so an empty file (or no file at all) describes
/// the standard project layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifyConfig {
    /// Registry of functions to verify, relative to the project root.
    pub registry: PathBuf,
    /// Reference image the functions were carved out of.
    pub reference: PathBuf,
    /// Directory scanned for rebuilt objects.
    pub objects: PathBuf,
    /// Extension (without the dot) of rebuilt objects.
    pub object_extension: String,
    /// Extraction backend name (see `default_backend_registry`).
    pub backend: String,
    /// Explicit objdump path for the objdump backend.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub objdump: Option<PathBuf>,
    /// Section of the reference image that absolute ranges are read from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_section: Option<String>,
    /// Size of the reference code section, for progress ratios.
    pub text_size: u64,
    /// How malformed registry lines are handled.
    pub registry_mode: ParseMode,
    pub masking: MaskConfig,
    /// Words of each sequence shown when a function fails to match.
    pub diagnostic_words: usize,
    /// Worker threads; `None` uses the available parallelism.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jobs: Option<usize>,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            registry: PathBuf::from("config/decompiled.txt"),
            reference: PathBuf::from("elf/SLUS_204.69"),
            objects: PathBuf::from("build/src"),
            object_extension: "o".to_string(),
            backend: "elf".to_string(),
            objdump: None,
            reference_section: Some(".text".to_string()),
            text_size: DEFAULT_TEXT_SIZE,
            registry_mode: ParseMode::default(),
            masking: MaskConfig::default(),
            diagnostic_words: DEFAULT_DIAGNOSTIC_WORDS,
            jobs: None,
        }
    }
}

impl VerifyConfig {
    pub fn registry_path(&self, layout: &ProjectLayout) -> PathBuf {
        layout.resolve(&self.registry)
    }

    pub fn reference_path(&self, layout: &ProjectLayout) -> PathBuf {
        layout.resolve(&self.reference)
    }

    pub fn objects_dir(&self, layout: &ProjectLayout) -> PathBuf {
        layout.resolve(&self.objects)
    }
}

/// Load a config file, picking the parser from the file extension.
pub fn load_config(path: &Path) -> Result<VerifyConfig, ConfigError> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default().to_lowercase();
    let body = fs::read_to_string(path)
        .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;

    match ext.as_str() {
        "yaml" | "yml" => {
            // serde_yaml rejects an empty document; treat it as all defaults.
            if body.trim().is_empty() {
                return Ok(VerifyConfig::default());
            }
            serde_yaml::from_str(&body)
                .map_err(|source| ConfigError::Yaml { path: path.to_path_buf(), source })
        }
        "json" => serde_json::from_str(&body)
            .map_err(|source| ConfigError::Json { path: path.to_path_buf(), source }),
        other => Err(ConfigError::UnsupportedFormat(other.to_string())),
    }
}

/// Load the project's config file if one exists, otherwise the defaults.
pub fn load_project_config(layout: &ProjectLayout) -> Result<VerifyConfig, ConfigError> {
    match layout.find_config() {
        Some(path) => load_config(&path),
        None => Ok(VerifyConfig::default()),
    }
}
