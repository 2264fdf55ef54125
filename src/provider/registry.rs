//! Adapter registry: identifier → factory.
//!
//! A registry is built once at start-up, then shared read-only (usually
//! behind an `Arc`) by every recognition call. Registration needs `&mut self`,
//! so there is no lock on the lookup path.

use super::{MistralAdapter, MistralConfig, ProviderAdapter, ReductoAdapter, ReductoConfig};
use crate::error::OcrError;
use once_cell::sync::OnceCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Builds a fresh adapter instance for each resolution.
pub type AdapterFactory = Arc<dyn Fn() -> Arc<dyn ProviderAdapter> + Send + Sync>;

static GLOBAL: OnceCell<Arc<ProviderRegistry>> = OnceCell::new();

/// Maps provider identifiers to adapter factories.
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    factories: HashMap<String, AdapterFactory>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the built-in adapters whose configuration
    /// is supplied. A `None` config leaves that adapter unregistered.
    pub fn with_builtin(
        mistral: Option<MistralConfig>,
        reducto: Option<ReductoConfig>,
    ) -> Result<Self, OcrError> {
        let mut registry = Self::new();
        if let Some(config) = mistral {
            let adapter: Arc<dyn ProviderAdapter> = Arc::new(MistralAdapter::new(config)?);
            registry.register(super::MISTRAL, move || Arc::clone(&adapter))?;
        }
        if let Some(config) = reducto {
            let adapter: Arc<dyn ProviderAdapter> = Arc::new(ReductoAdapter::new(config)?);
            registry.register(super::REDUCTO, move || Arc::clone(&adapter))?;
        }
        Ok(registry)
    }

    /// Register `factory` under `id`.
    ///
    /// Fails with [`OcrError::DuplicateProvider`] if `id` is taken; the
    /// existing registration is left untouched.
    pub fn register<F>(&mut self, id: impl Into<String>, factory: F) -> Result<(), OcrError>
    where
        F: Fn() -> Arc<dyn ProviderAdapter> + Send + Sync + 'static,
    {
        let id = id.into();
        if self.factories.contains_key(&id) {
            return Err(OcrError::DuplicateProvider { id });
        }
        debug!("Registered OCR provider '{}'", id);
        self.factories.insert(id, Arc::new(factory));
        Ok(())
    }

    /// Build the adapter registered under `id`.
    pub fn resolve(&self, id: &str) -> Result<Arc<dyn ProviderAdapter>, OcrError> {
        match self.factories.get(id) {
            Some(factory) => Ok(factory()),
            None => Err(OcrError::UnknownProvider {
                id: id.to_string(),
                known: self.ids(),
            }),
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.factories.contains_key(id)
    }

    /// Registered identifiers, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.factories.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Install this registry as the process-wide default. Only the first
    /// call succeeds.
    pub fn install_global(self) -> Result<Arc<ProviderRegistry>, OcrError> {
        let registry = Arc::new(self);
        GLOBAL
            .set(Arc::clone(&registry))
            .map_err(|_| OcrError::RegistryAlreadyInstalled)?;
        Ok(registry)
    }

    /// The process-wide registry, if one was installed.
    pub fn global() -> Option<Arc<ProviderRegistry>> {
        GLOBAL.get().cloned()
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.ids())
            .finish()
    }
}
