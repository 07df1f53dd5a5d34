//! Reading instruction words out of binaries.
//!
//! The verifier only sees two kinds of artifact: the reference image, which
//! answers absolute address ranges, and rebuilt objects, which also answer
//! symbol lookups with section-relative addresses. Each binary format or
//! external tool provides both through an `ExtractionBackend`.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::InstructionWord;

/// Why an artifact could not produce instruction words.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    /// The artifact itself could not be opened or parsed.
    #[error("artifact {artifact} unavailable: {reason}")]
    ArtifactUnavailable { artifact: String, reason: String },

    /// The artifact is readable but cannot produce words for the range.
    #[error("range 0x{start:X}..0x{end:X} unavailable in {artifact}: {reason}")]
    RangeUnavailable { artifact: String, start: u64, end: u64, reason: String },
}

impl ExtractError {
    /// `RangeUnavailable` for `range` in `artifact`.
    pub fn range(artifact: &str, range: &AddressRange, reason: impl Into<String>) -> Self {
        ExtractError::RangeUnavailable {
            artifact: artifact.to_string(),
            start: range.start,
            end: range.end,
            reason: reason.into(),
        }
    }

    /// `ArtifactUnavailable` for the file at `path`.
    pub fn artifact(path: &Path, reason: impl Into<String>) -> Self {
        ExtractError::ArtifactUnavailable {
            artifact: path.display().to_string(),
            reason: reason.into(),
        }
    }
}

/// Half-open address range `[start, end)`, optionally pinned to a section.
///
/// Without a section the range is absolute in the artifact's address space.
/// When `section_index` is set it takes precedence over `section`, since
/// relocatable objects may carry several sections with the same name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_index: Option<usize>,
    pub start: u64,
    pub end: u64,
}

impl AddressRange {
    pub fn absolute(start: u64, end: u64) -> Self {
        Self { section: None, section_index: None, start, end }
    }

    /// A range relative to the section called `section`.
    pub fn in_section(section: impl Into<String>, start: u64, end: u64) -> Self {
        Self { section: Some(section.into()), section_index: None, start, end }
    }

    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

/// Where a symbol lives inside an object artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalAddress {
    /// Name of the containing section, for reports.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    /// Header index of the containing section, when the format has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_index: Option<usize>,
    /// Offset of the first byte, relative to the section when one is named.
    pub offset: u64,
}

impl LocalAddress {
    /// An address with neither section name nor index.
    pub fn absolute(offset: u64) -> Self {
        Self { section: None, section_index: None, offset }
    }

    /// An address inside the section called `section`.
    pub fn in_section(section: impl Into<String>, offset: u64) -> Self {
        Self { section: Some(section.into()), section_index: None, offset }
    }

    /// The range of `size` bytes starting at this address.
    pub fn range(&self, size: u64) -> AddressRange {
        AddressRange {
            section: self.section.clone(),
            section_index: self.section_index,
            start: self.offset,
            end: self.offset.saturating_add(size),
        }
    }
}

/// Outcome of looking a name up in one artifact's symbol table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymbolLookup {
    /// The artifact does not define the name.
    Absent,
    /// The name is defined but its row carries no usable address.
    Unlocated,
    Found(LocalAddress),
}

/// Symbol table keyed by exact symbol name.
///
/// Backends fill it once when an artifact is opened; lookups afterwards never
/// touch the file again.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymbolTable {
    entries: HashMap<String, Option<LocalAddress>>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a symbol. The first definition of a name wins unless `replace`.
    pub fn insert(&mut self, name: impl Into<String>, address: Option<LocalAddress>, replace: bool) {
        let name = name.into();
        if replace || !self.entries.contains_key(&name) {
            self.entries.insert(name, address);
        }
    }

    pub fn lookup(&self, name: &str) -> SymbolLookup {
        match self.entries.get(name) {
            None => SymbolLookup::Absent,
            Some(None) => SymbolLookup::Unlocated,
            Some(Some(addr)) => SymbolLookup::Found(addr.clone()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Anything that can hand out instruction words for an address range.
pub trait InstructionSource: Send + Sync {
    /// Human-readable label (usually the file path) for reports and logs.
    fn label(&self) -> &str;

    /// Words covering `range`, in address order.
    ///
    /// A range that starts inside the artifact but runs past the end of its
    /// section yields the words that exist, so callers see a short sequence
    /// rather than an error. An error means not a single word was available.
    fn extract(&self, range: &AddressRange) -> Result<Vec<InstructionWord>, ExtractError>;
}

/// A rebuilt object: an instruction source with a symbol table.
pub trait ObjectArtifact: InstructionSource {
    /// Where `name` is defined in this artifact, if anywhere.
    fn lookup(&self, name: &str) -> SymbolLookup;
}

/// Opens reference images and rebuilt objects for one binary format or tool.
pub trait ExtractionBackend: Send + Sync {
    /// Stable identifier used in `matchcheck.yaml` and on the command line.
    fn name(&self) -> &'static str;

    /// Short description for `matchcheck backends`.
    fn description(&self) -> String;

    /// Open the reference image. Absolute ranges are served from `section`
    /// when given, otherwise from any executable section containing them.
    fn open_image(
        &self,
        path: &Path,
        section: Option<&str>,
    ) -> Result<Box<dyn InstructionSource>, ExtractError>;

    /// Open a rebuilt object and read its symbol table.
    fn open_object(&self, path: &Path) -> Result<Box<dyn ObjectArtifact>, ExtractError>;
}

/// Registry for extraction backends; callers select by name.
#[derive(Default)]
pub struct BackendRegistry {
    backends: HashMap<String, Box<dyn ExtractionBackend>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self { backends: HashMap::new() }
    }

    pub fn register<B: ExtractionBackend + 'static>(&mut self, backend: B) -> &mut Self {
        self.backends.insert(backend.name().to_string(), Box::new(backend));
        self
    }

    pub fn get(&self, name: &str) -> Option<&dyn ExtractionBackend> {
        self.backends.get(name).map(|b| &**b)
    }

    /// Return a sorted list of registered backend names for error messages/help.
    pub fn names(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.backends.keys().cloned().collect();
        keys.sort();
        keys
    }
}

/// Registry populated with every backend compiled into this build.
pub fn default_backend_registry() -> BackendRegistry {
    let mut registry = BackendRegistry::new();
    registry.register(crate::services::backends::ElfBackend);
    #[cfg(feature = "objdump-backend")]
    {
        registry.register(crate::services::backends::ObjdumpBackend::default());
    }
    registry
}
