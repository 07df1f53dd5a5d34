use std::path::Path;

use anyhow::{Context, Result};
use matchcheck_core::project::{load_config, load_project_config, ProjectLayout, VerifyConfig};
use matchcheck_core::services::extract::{default_backend_registry, BackendRegistry};

use crate::canonicalize_or_current;

/// Resolve the project root and load its config, or `config` when given.
pub fn load_settings(root: &str, config: Option<&Path>) -> Result<(ProjectLayout, VerifyConfig)> {
    let root_path = canonicalize_or_current(root)?;
    let layout = ProjectLayout::new(&root_path);
    let config = match config {
        Some(path) => load_config(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => load_project_config(&layout).with_context(|| {
            format!("Failed to load project config under {}", layout.root.display())
        })?,
    };
    Ok((layout, config))
}

/// Backends compiled into this binary, with the objdump tool taken from
/// config when one is set there.
pub fn backend_registry(config: &VerifyConfig) -> BackendRegistry {
    #[allow(unused_mut)]
    let mut registry = default_backend_registry();
    if let Some(tool) = &config.objdump {
        #[cfg(feature = "objdump-backend")]
        registry.register(matchcheck_core::services::backends::ObjdumpBackend::new(tool));
        #[cfg(not(feature = "objdump-backend"))]
        log::warn!("objdump backend not compiled in; ignoring {}", tool.display());
    }
    registry
}

/// `bytes` as a percentage of `total`, or zero when `total` is zero.
pub fn percent(bytes: u64, total: u64) -> f64 {
    matchcheck_core::services::verify::ratio(bytes, total) * 100.0
}
