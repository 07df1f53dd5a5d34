use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use matchcheck_core::registry::{ParseMode, Registry};
use serde::Serialize;

use crate::commands::{load_settings, percent};

#[derive(Args, Debug, Clone, Default)]
pub struct ProgressArgs {
    /// Project root directory. Defaults to the current working directory.
    #[arg(long, default_value = ".")]
    pub root: String,

    /// Config file to use instead of `matchcheck.{yaml,yml,json}` under the root.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Function registry (relative paths resolve against the root).
    #[arg(long)]
    pub registry: Option<PathBuf>,

    /// Size of the reference code section.
    #[arg(long)]
    pub text_size: Option<u64>,

    /// Skip malformed registry lines instead of failing.
    #[arg(long, default_value_t = false)]
    pub lenient: bool,

    /// Emit JSON instead of human-readable text.
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

/// Registry-only progress: every normal entry counts as decompiled.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressSummary {
    pub text_size: u64,
    pub matched_count: usize,
    pub matched_bytes: u64,
    pub hardware_count: usize,
    pub hardware_bytes: u64,
    pub total_count: usize,
    pub total_bytes: u64,
    pub matched_percent: f64,
    pub hardware_percent: f64,
    pub total_percent: f64,
}

impl ProgressSummary {
    pub fn from_registry(registry: &Registry, text_size: u64) -> Self {
        let (hardware, matched): (Vec<_>, Vec<_>) =
            registry.iter().partition(|record| record.is_hardware());
        let matched_bytes: u64 = matched.iter().map(|r| r.size).sum();
        let hardware_bytes: u64 = hardware.iter().map(|r| r.size).sum();
        let total_bytes = matched_bytes + hardware_bytes;
        Self {
            text_size,
            matched_count: matched.len(),
            matched_bytes,
            hardware_count: hardware.len(),
            hardware_bytes,
            total_count: registry.len(),
            total_bytes,
            matched_percent: percent(matched_bytes, text_size),
            hardware_percent: percent(hardware_bytes, text_size),
            total_percent: percent(total_bytes, text_size),
        }
    }
}

/// Summarize decompilation progress from the registry alone.
pub fn progress_command(args: &ProgressArgs) -> Result<ProgressSummary> {
    let (layout, mut config) = load_settings(&args.root, args.config.as_deref())?;
    if let Some(registry) = &args.registry {
        config.registry = registry.clone();
    }
    if let Some(text_size) = args.text_size {
        config.text_size = text_size;
    }
    let mode = if args.lenient { ParseMode::Lenient } else { config.registry_mode };

    let registry_path = config.registry_path(&layout);
    let registry = Registry::load(&registry_path, mode)
        .with_context(|| format!("Failed to load registry {}", registry_path.display()))?;
    let summary = ProgressSummary::from_registry(&registry, config.text_size);

    if args.json {
        let serialized = serde_json::to_string_pretty(&summary)
            .context("Failed to serialize progress to JSON")?;
        println!("{serialized}");
    } else {
        let stdout = io::stdout();
        render_progress(&summary, &mut stdout.lock()).context("Failed to write progress")?;
    }
    Ok(summary)
}

pub fn render_progress(summary: &ProgressSummary, out: &mut impl Write) -> io::Result<()> {
    writeln!(
        out,
        "Decompilation progress: {}/{} bytes ({:.3}%)",
        summary.total_bytes, summary.text_size, summary.total_percent
    )?;
    writeln!(
        out,
        "  Matched:  {} functions ({} bytes, {:.3}%)",
        summary.matched_count, summary.matched_bytes, summary.matched_percent
    )?;
    writeln!(
        out,
        "  Hardware: {} functions ({} bytes, {:.3}%)",
        summary.hardware_count, summary.hardware_bytes, summary.hardware_percent
    )?;
    writeln!(
        out,
        "  Total:    {} functions ({} bytes)",
        summary.total_count, summary.total_bytes
    )
}
