use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use matchcheck_core::project::{ProjectContext, VerifyConfig};
use matchcheck_core::registry::ParseMode;
use matchcheck_core::services::equivalence::{DiagnosticWord, Divergence, MaskPolicy};
use matchcheck_core::services::verify::{Outcome, Report, VerificationResult};

use crate::commands::{backend_registry, load_settings, percent};

/// Flags for `matchcheck verify`. Anything left unset falls back to the
/// project config.
#[derive(Args, Debug, Clone, Default)]
pub struct VerifyArgs {
    /// Project root directory. Defaults to the current working directory.
    #[arg(long, default_value = ".")]
    pub root: String,

    /// Config file to use instead of `matchcheck.{yaml,yml,json}` under the root.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Function registry (relative paths resolve against the root).
    #[arg(long)]
    pub registry: Option<PathBuf>,

    /// Reference image the functions are checked against.
    #[arg(long)]
    pub reference: Option<PathBuf>,

    /// Directory holding the rebuilt objects.
    #[arg(long)]
    pub objects: Option<PathBuf>,

    /// Extraction backend (see `matchcheck backends`).
    #[arg(long)]
    pub backend: Option<String>,

    /// objdump executable for the objdump backend.
    #[arg(long)]
    pub objdump: Option<PathBuf>,

    /// Size of the reference code section, for the progress line.
    #[arg(long)]
    pub text_size: Option<u64>,

    /// Compare raw bits without masking call targets or break codes.
    #[arg(long, default_value_t = false)]
    pub raw: bool,

    /// Skip malformed registry lines instead of failing.
    #[arg(long, default_value_t = false)]
    pub lenient: bool,

    /// Worker threads (defaults to the available parallelism).
    #[arg(long)]
    pub jobs: Option<usize>,

    /// Emit the full report as JSON instead of human-readable text.
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

impl VerifyArgs {
    /// Overlay the flags that were given onto `config`.
    pub fn apply(&self, config: &mut VerifyConfig) {
        if let Some(registry) = &self.registry {
            config.registry = registry.clone();
        }
        if let Some(reference) = &self.reference {
            config.reference = reference.clone();
        }
        if let Some(objects) = &self.objects {
            config.objects = objects.clone();
        }
        if let Some(backend) = &self.backend {
            config.backend = backend.clone();
        }
        if let Some(objdump) = &self.objdump {
            config.objdump = Some(objdump.clone());
        }
        if let Some(text_size) = self.text_size {
            config.text_size = text_size;
        }
        if self.raw {
            config.masking.policy = MaskPolicy::Raw;
        }
        if self.lenient {
            config.registry_mode = ParseMode::Lenient;
        }
        if self.jobs.is_some() {
            config.jobs = self.jobs;
        }
    }
}

/// Verify every registered function and print the outcome.
///
/// Returns the report so the caller can pick the exit status.
pub fn verify_command(args: &VerifyArgs) -> Result<Report> {
    let (layout, mut config) = load_settings(&args.root, args.config.as_deref())?;
    args.apply(&mut config);

    let backends = backend_registry(&config);
    let ctx = ProjectContext::open(layout, config, &backends)
        .context("Failed to prepare verification run")?;
    let report = ctx.run().context("Verification run failed")?;

    if args.json {
        let serialized =
            serde_json::to_string_pretty(&report).context("Failed to serialize report to JSON")?;
        println!("{serialized}");
    } else {
        let stdout = io::stdout();
        render_report(&report, &mut stdout.lock()).context("Failed to write report")?;
    }
    Ok(report)
}

/// Human-readable report: one line per function, then the totals.
pub fn render_report(report: &Report, out: &mut impl Write) -> io::Result<()> {
    let annotator = Annotator::new();
    for result in &report.results {
        render_result(result, &annotator, out)?;
    }

    writeln!(out)?;
    writeln!(out, "{}", report.summary_line())?;
    writeln!(
        out,
        "Matched {}/{} bytes ({:.3}%), {:.3}% including hardware",
        report.totals.matched_bytes,
        report.text_size,
        report.match_ratio * 100.0,
        report.covered_ratio * 100.0
    )?;
    if report.totals.skipped > 0 {
        writeln!(
            out,
            "Skipped {} functions ({} bytes, {:.3}%)",
            report.totals.skipped,
            report.totals.skipped_bytes,
            percent(report.totals.skipped_bytes, report.text_size)
        )?;
    }
    Ok(())
}

fn render_result(
    result: &VerificationResult,
    annotator: &Annotator,
    out: &mut impl Write,
) -> io::Result<()> {
    match &result.outcome {
        Outcome::Matched => writeln!(out, "  OK   {}", result.name),
        Outcome::Hardware => writeln!(out, "  HW   {}", result.name),
        Outcome::Skipped(reason) => writeln!(out, "  SKIP {} - {reason}", result.name),
        Outcome::Failed => {
            writeln!(out, "  FAIL {}", result.name)?;
            match &result.diagnostics {
                Some(divergence) => render_divergence(divergence, annotator, out),
                None => Ok(()),
            }
        }
    }
}

fn render_divergence(
    divergence: &Divergence,
    annotator: &Annotator,
    out: &mut impl Write,
) -> io::Result<()> {
    writeln!(out, "    orig:  {}", join_words(&divergence.original))?;
    writeln!(out, "    built: {}", join_words(&divergence.rebuilt))?;
    if divergence.length_mismatch() {
        writeln!(
            out,
            "    length: {} words vs {} words",
            divergence.original_len, divergence.rebuilt_len
        )?;
    }
    match (&divergence.original_at, &divergence.rebuilt_at) {
        (Some(orig), Some(built)) => writeln!(
            out,
            "    word {} @ 0x{:X}: {} != {}",
            divergence.index,
            orig.address,
            annotator.describe(orig),
            annotator.describe(built)
        ),
        (Some(orig), None) => writeln!(
            out,
            "    word {} @ 0x{:X}: {} missing from rebuilt",
            divergence.index,
            orig.address,
            annotator.describe(orig)
        ),
        (None, Some(built)) => writeln!(
            out,
            "    word {}: extra rebuilt {}",
            divergence.index,
            annotator.describe(built)
        ),
        (None, None) => Ok(()),
    }
}

fn join_words(words: &[DiagnosticWord]) -> String {
    words.iter().map(|w| w.canonical.to_string()).collect::<Vec<_>>().join(" ")
}

/// Renders diagnostic words, with mnemonics when capstone is compiled in.
struct Annotator {
    #[cfg(feature = "capstone-backend")]
    disasm: Option<matchcheck_core::services::backends::MipsDisassembler>,
}

impl Annotator {
    fn new() -> Self {
        Self {
            #[cfg(feature = "capstone-backend")]
            disasm: matchcheck_core::services::backends::MipsDisassembler::new()
                .map_err(|err| log::warn!("mnemonics unavailable: {err}"))
                .ok(),
        }
    }

    fn describe(&self, word: &DiagnosticWord) -> String {
        #[cfg(feature = "capstone-backend")]
        let text = self.disasm.as_ref().and_then(|d| d.describe_word(word));
        #[cfg(not(feature = "capstone-backend"))]
        let text: Option<String> = None;

        match text {
            Some(text) => format!("{:08x} ({text})", word.raw),
            None => format!("{:08x}", word.raw),
        }
    }
}
