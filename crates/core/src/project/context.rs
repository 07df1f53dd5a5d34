use std::path::PathBuf;

use thiserror::Error;

use super::{discover_objects, ProjectLayout, VerifyConfig};
use crate::registry::{Registry, RegistryError};
use crate::services::equivalence::EquivalenceEngine;
use crate::services::extract::{BackendRegistry, ExtractError, InstructionSource};
use crate::services::resolve::AttributionResolver;
use crate::services::verify::{Report, Verifier, VerifyError, VerifyOptions};

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("unknown backend `{name}` (available: {})", .available.join(", "))]
    UnknownBackend { name: String, available: Vec<String> },

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("failed to open reference image: {0}")]
    Image(#[source] ExtractError),

    #[error("failed to scan objects directory {path}: {source}")]
    ObjectsDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Everything a verification run reads, loaded once up front.
pub struct ProjectContext {
    pub layout: ProjectLayout,
    pub config: VerifyConfig,
    pub registry: Registry,
    pub image: Box<dyn InstructionSource>,
    pub resolver: AttributionResolver,
    pub engine: EquivalenceEngine,
    /// Objects that could not be opened and were left out of attribution.
    pub object_errors: Vec<ExtractError>,
}

impl ProjectContext {
    /// Load the registry, open the reference image, and open every object.
    pub fn open(
        layout: ProjectLayout,
        config: VerifyConfig,
        backends: &BackendRegistry,
    ) -> Result<Self, ContextError> {
        let backend = backends.get(&config.backend).ok_or_else(|| ContextError::UnknownBackend {
            name: config.backend.clone(),
            available: backends.names(),
        })?;

        let registry = Registry::load(&config.registry_path(&layout), config.registry_mode)?;
        let image = backend
            .open_image(&config.reference_path(&layout), config.reference_section.as_deref())
            .map_err(ContextError::Image)?;

        let objects_dir = config.objects_dir(&layout);
        let paths = discover_objects(&objects_dir, &config.object_extension)
            .map_err(|source| ContextError::ObjectsDir { path: objects_dir.clone(), source })?;
        let (resolver, object_errors) = AttributionResolver::open_all(backend, &paths);
        log::debug!(
            "{} of {} objects under {} usable",
            resolver.len(),
            paths.len(),
            objects_dir.display()
        );

        let engine = EquivalenceEngine::new(config.masking.clone(), config.diagnostic_words);

        Ok(Self { layout, config, registry, image, resolver, engine, object_errors })
    }

    pub fn verifier(&self) -> Verifier<'_> {
        Verifier::new(self.image.as_ref(), &self.resolver, &self.engine)
    }

    pub fn options(&self) -> VerifyOptions {
        VerifyOptions { jobs: self.config.jobs, text_size: self.config.text_size }
    }

    pub fn run(&self) -> Result<Report, VerifyError> {
        self.verifier().run(&self.registry, &self.options())
    }
}
