//! Per-function verification and the aggregate report.
//!
//! Each registry entry is attributed, extracted from both sides, and compared
//! independently; nothing one entry does can change another entry's outcome.

use std::fmt;

use rayon::prelude::*;
use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::model::{FunctionRecord, InstructionWord};
use crate::registry::Registry;
use crate::services::equivalence::{Comparison, Divergence, EquivalenceEngine};
use crate::services::extract::{AddressRange, InstructionSource};
use crate::services::resolve::{AttributionResolver, ResolveError};

/// Failures of the run itself. Per-function problems never surface here;
/// they become `Outcome::Skipped` instead.
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Why a function could not be compared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    NoObjectFile,
    NoSymbolOffset,
    NoOriginalBytes,
    /// The image produced fewer words than the declared size covers.
    IncompleteOriginal,
    NoRebuiltBytes,
}

impl SkipReason {
    /// Fixed reason text used in reports and JSON output.
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::NoObjectFile => "no object file found",
            SkipReason::NoSymbolOffset => "can't find symbol offset",
            SkipReason::NoOriginalBytes => "no original bytes found",
            SkipReason::IncompleteOriginal => "original bytes incomplete",
            SkipReason::NoRebuiltBytes => "no rebuilt bytes found",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for SkipReason {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl From<ResolveError> for SkipReason {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::NoObjectFile => SkipReason::NoObjectFile,
            ResolveError::NoSymbolOffset { .. } => SkipReason::NoSymbolOffset,
        }
    }
}

/// Final state of one registry entry.
///
/// Serialized as `{"status": "...", "reason": "..."}`, where `reason` only
/// appears for skipped entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum Outcome {
    /// Original and rebuilt sequences are equivalent under the masking rules.
    Matched,
    /// The sequences differ in some word or in length.
    Failed,
    /// Comparison was not possible.
    Skipped(SkipReason),
    /// Marked as hand-written hardware code; never extracted.
    Hardware,
}

/// Verdict for one registry entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationResult {
    pub name: String,
    /// Start address in the reference image.
    pub address: u64,
    pub size: u64,
    pub outcome: Outcome,
    /// `size` when matched, otherwise zero.
    pub matched_bytes: u64,
    /// Artifact the function was attributed to, when attribution succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object: Option<String>,
    /// Where the sequences diverged, for failed entries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<Divergence>,
}

impl VerificationResult {
    fn new(record: &FunctionRecord, outcome: Outcome) -> Self {
        let matched_bytes = if outcome == Outcome::Matched { record.size } else { 0 };
        Self {
            name: record.name.clone(),
            address: record.address,
            size: record.size,
            outcome,
            matched_bytes,
            object: None,
            diagnostics: None,
        }
    }

    fn with_object(mut self, object: &str) -> Self {
        self.object = Some(object.to_string());
        self
    }
}

/// Counts and byte totals per outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Totals {
    pub total: u64,
    pub matched: u64,
    pub failed: u64,
    pub skipped: u64,
    pub hardware: u64,
    pub total_bytes: u64,
    pub matched_bytes: u64,
    pub failed_bytes: u64,
    pub skipped_bytes: u64,
    pub hardware_bytes: u64,
}

impl Totals {
    /// Totals contributed by a single result.
    pub fn of(result: &VerificationResult) -> Self {
        let mut totals = Totals { total: 1, total_bytes: result.size, ..Totals::default() };
        match result.outcome {
            Outcome::Matched => {
                totals.matched = 1;
                totals.matched_bytes = result.matched_bytes;
            }
            Outcome::Failed => {
                totals.failed = 1;
                totals.failed_bytes = result.size;
            }
            Outcome::Skipped(_) => {
                totals.skipped = 1;
                totals.skipped_bytes = result.size;
            }
            Outcome::Hardware => {
                totals.hardware = 1;
                totals.hardware_bytes = result.size;
            }
        }
        totals
    }

    /// Field-wise sum. Associative, so results fold in any order.
    pub fn merge(self, other: Totals) -> Totals {
        Totals {
            total: self.total + other.total,
            matched: self.matched + other.matched,
            failed: self.failed + other.failed,
            skipped: self.skipped + other.skipped,
            hardware: self.hardware + other.hardware,
            total_bytes: self.total_bytes + other.total_bytes,
            matched_bytes: self.matched_bytes + other.matched_bytes,
            failed_bytes: self.failed_bytes + other.failed_bytes,
            skipped_bytes: self.skipped_bytes + other.skipped_bytes,
            hardware_bytes: self.hardware_bytes + other.hardware_bytes,
        }
    }
}

/// Aggregate of a verification run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    /// Per-function results, sorted by name.
    pub results: Vec<VerificationResult>,
    pub totals: Totals,
    /// Size of the reference code section the ratios are relative to.
    pub text_size: u64,
    /// Matched bytes over `text_size`.
    pub match_ratio: f64,
    /// Matched plus hardware bytes over `text_size`.
    pub covered_ratio: f64,
}

impl Report {
    /// Sort `results` by name and fold their totals.
    pub fn from_results(mut results: Vec<VerificationResult>, text_size: u64) -> Self {
        results.sort_by(|a, b| a.name.cmp(&b.name));
        let totals = results.iter().map(Totals::of).fold(Totals::default(), Totals::merge);
        Self {
            match_ratio: ratio(totals.matched_bytes, text_size),
            covered_ratio: ratio(totals.matched_bytes + totals.hardware_bytes, text_size),
            results,
            totals,
            text_size,
        }
    }

    /// Whether any entry failed; drives the non-zero exit status.
    pub fn has_failures(&self) -> bool {
        self.totals.failed > 0
    }

    /// Look up a result by function name.
    pub fn get(&self, name: &str) -> Option<&VerificationResult> {
        self.results
            .binary_search_by(|r| r.name.as_str().cmp(name))
            .ok()
            .map(|idx| &self.results[idx])
    }

    /// `"<passed> passed, <failed> failed, <hardware> hardware, <total> total"`.
    pub fn summary_line(&self) -> String {
        format!(
            "{} passed, {} failed, {} hardware, {} total",
            self.totals.matched, self.totals.failed, self.totals.hardware, self.totals.total
        )
    }
}

/// `bytes / text_size`, or zero for an empty text section.
pub fn ratio(bytes: u64, text_size: u64) -> f64 {
    if text_size == 0 {
        0.0
    } else {
        bytes as f64 / text_size as f64
    }
}

/// Tuning for a verification run.
#[derive(Debug, Clone, Default)]
pub struct VerifyOptions {
    /// Worker threads; `None` uses rayon's global pool.
    pub jobs: Option<usize>,
    /// Size of the reference code section; the denominator of the ratios.
    pub text_size: u64,
}

/// Drives attribution, extraction, and comparison for every registry entry.
pub struct Verifier<'a> {
    pub image: &'a dyn InstructionSource,
    pub resolver: &'a AttributionResolver,
    pub engine: &'a EquivalenceEngine,
}

impl<'a> Verifier<'a> {
    pub fn new(
        image: &'a dyn InstructionSource,
        resolver: &'a AttributionResolver,
        engine: &'a EquivalenceEngine,
    ) -> Self {
        Self { image, resolver, engine }
    }

    /// Verify a single record. Never fails: every problem becomes an outcome.
    pub fn verify(&self, record: &FunctionRecord) -> VerificationResult {
        let result = self.verify_inner(record);
        log::debug!("{}: {:?}", record.name, result.outcome);
        result
    }

    fn verify_inner(&self, record: &FunctionRecord) -> VerificationResult {
        if record.is_hardware() {
            return VerificationResult::new(record, Outcome::Hardware);
        }

        let attribution = match self.resolver.resolve(&record.name) {
            Ok(attribution) => attribution,
            Err(err) => return VerificationResult::new(record, Outcome::Skipped(err.into())),
        };
        let object = attribution.artifact.label();

        let skipped = |reason| {
            VerificationResult::new(record, Outcome::Skipped(reason)).with_object(object)
        };

        let image_range = AddressRange::absolute(record.address, record.end());
        let Some(original) = self.read(self.image, &image_range) else {
            return skipped(SkipReason::NoOriginalBytes);
        };
        if original.len() != record.word_count() {
            return skipped(SkipReason::IncompleteOriginal);
        }
        let Some(rebuilt) = self.read(attribution.artifact, &attribution.address.range(record.size))
        else {
            return skipped(SkipReason::NoRebuiltBytes);
        };

        match self.engine.compare(&original, &rebuilt) {
            Comparison::Equivalent => {
                VerificationResult::new(record, Outcome::Matched).with_object(object)
            }
            Comparison::Divergent(divergence) => {
                let mut result =
                    VerificationResult::new(record, Outcome::Failed).with_object(object);
                result.diagnostics = Some(divergence);
                result
            }
        }
    }

    fn read<S: InstructionSource + ?Sized>(
        &self,
        source: &S,
        range: &AddressRange,
    ) -> Option<Vec<InstructionWord>> {
        match source.extract(range) {
            Ok(words) if !words.is_empty() => Some(words),
            Ok(_) => None,
            Err(err) => {
                log::debug!("{err}");
                None
            }
        }
    }

    /// Verify every record on a worker pool and fold the results.
    ///
    /// `options.jobs` sizes a dedicated pool for this run; the report does
    /// not depend on it. Only pool construction can fail.
    pub fn run(&self, registry: &Registry, options: &VerifyOptions) -> Result<Report, VerifyError> {
        log::info!(
            "verifying {} functions against {} ({} objects)",
            registry.len(),
            self.image.label(),
            self.resolver.len()
        );

        let verify_all = || -> Vec<VerificationResult> {
            registry.records().par_iter().map(|record| self.verify(record)).collect()
        };
        let results = match options.jobs {
            Some(jobs) => {
                rayon::ThreadPoolBuilder::new().num_threads(jobs).build()?.install(verify_all)
            }
            None => verify_all(),
        };

        let report = Report::from_results(results, options.text_size);
        log::info!("{}", report.summary_line());
        Ok(report)
    }
}
