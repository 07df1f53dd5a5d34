use anyhow::Result;
use serde::Serialize;

use matchcheck_core::project::VerifyConfig;

use crate::commands::backend_registry;

#[derive(Debug, Serialize)]
pub struct BackendInfo {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Serialize)]
pub struct BackendListing {
    pub backends: Vec<BackendInfo>,
    /// Capstone version used for failure mnemonics, when compiled in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disassembler: Option<String>,
}

/// Collect the extraction backends known to this binary.
pub fn backend_listing() -> BackendListing {
    let registry = backend_registry(&VerifyConfig::default());
    let backends = registry
        .names()
        .into_iter()
        .filter_map(|name| {
            let backend = registry.get(&name)?;
            Some(BackendInfo { description: backend.description(), name })
        })
        .collect();

    #[cfg(feature = "capstone-backend")]
    let disassembler =
        Some(format!("capstone {}", matchcheck_core::services::backends::capstone_version()));
    #[cfg(not(feature = "capstone-backend"))]
    let disassembler = None;

    BackendListing { backends, disassembler }
}

/// List available extraction backends.
pub fn list_backends_command(json: bool) -> Result<()> {
    let listing = backend_listing();

    if json {
        println!("{}", serde_json::to_string_pretty(&listing)?);
        return Ok(());
    }

    if listing.backends.is_empty() {
        println!("Backends: (none)");
    } else {
        println!("Backends:");
        for entry in &listing.backends {
            println!("- {}: {}", entry.name, entry.description);
        }
    }
    if let Some(disassembler) = &listing.disassembler {
        println!("Diagnostics: {disassembler}");
    }
    Ok(())
}
