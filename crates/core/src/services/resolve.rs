//! Attribution of registry functions to rebuilt objects.
//!
//! A function name is looked up in every opened object's symbol table, in
//! discovery order. The first exact match decides both the artifact and the
//! address the rebuilt bytes are read from.

use std::path::Path;

use thiserror::Error;

use crate::services::extract::{
    ExtractError, ExtractionBackend, LocalAddress, ObjectArtifact, SymbolLookup,
};

/// Why a function could not be attributed to a rebuilt object.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// No opened object defines the name.
    #[error("no object file found")]
    NoObjectFile,
    /// `artifact` defines the name but gives it no readable address
    /// (absolute or common symbols, or a dangling section index).
    #[error("can't find symbol offset")]
    NoSymbolOffset { artifact: String },
}

/// An object artifact that defines a function, and where.
pub struct Attribution<'a> {
    pub artifact: &'a dyn ObjectArtifact,
    /// Start of the function inside `artifact`, as reported by its symbol table.
    pub address: LocalAddress,
}

/// Finds the rebuilt object that defines a function.
///
/// Artifacts are consulted in discovery order and the first one whose symbol
/// table has the exact name wins. Symbol tables are read when the artifact is
/// opened, so repeated lookups never rescan a file.
#[derive(Default)]
pub struct AttributionResolver {
    artifacts: Vec<Box<dyn ObjectArtifact>>,
}

impl AttributionResolver {
    pub fn new(artifacts: Vec<Box<dyn ObjectArtifact>>) -> Self {
        Self { artifacts }
    }

    /// Open every path through `backend`. Artifacts that fail to open are
    /// logged and left out of the candidate set; their errors are returned
    /// for reporting and never abort the run.
    pub fn open_all(
        backend: &dyn ExtractionBackend,
        paths: &[impl AsRef<Path>],
    ) -> (Self, Vec<ExtractError>) {
        let mut artifacts = Vec::with_capacity(paths.len());
        let mut errors = Vec::new();
        for path in paths {
            match backend.open_object(path.as_ref()) {
                Ok(artifact) => artifacts.push(artifact),
                Err(err) => {
                    log::warn!("skipping object: {err}");
                    errors.push(err);
                }
            }
        }
        (Self { artifacts }, errors)
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    /// Labels of the opened artifacts, in lookup order.
    pub fn labels(&self) -> Vec<&str> {
        self.artifacts.iter().map(|a| a.label()).collect()
    }

    /// Attribute `name` to the first artifact defining it. An artifact that
    /// defines the name without an address ends the search.
    pub fn resolve(&self, name: &str) -> Result<Attribution<'_>, ResolveError> {
        for artifact in &self.artifacts {
            match artifact.lookup(name) {
                SymbolLookup::Absent => continue,
                SymbolLookup::Unlocated => {
                    return Err(ResolveError::NoSymbolOffset {
                        artifact: artifact.label().to_string(),
                    })
                }
                SymbolLookup::Found(address) => {
                    return Ok(Attribution { artifact: artifact.as_ref(), address })
                }
            }
        }
        Err(ResolveError::NoObjectFile)
    }
}
