//! Provider registry mapping identifiers to provider constructors.
//!
//! The registry is an explicit value: build one at startup, register the
//! providers the application supports, then hand it to whoever needs to turn
//! a model id into a provider. Tests build their own isolated registries.

use crate::ModelCallError;
use std::fmt;
use std::sync::Arc;
use textanchor_domain::ModelProvider;
use thiserror::Error;
use tracing::debug;

/// A provider shared between pipeline workers
pub type SharedProvider = Arc<dyn ModelProvider<Error = ModelCallError> + Send + Sync>;

/// Constructor invoked with the requested model id
pub type ProviderFactory =
    Arc<dyn Fn(&str) -> Result<SharedProvider, ModelCallError> + Send + Sync>;

/// Registry error
#[derive(Debug, Error)]
pub enum RegistryError {
    /// No registered provider handles the model id
    #[error("No provider registered for model: {0}")]
    NoProvider(String),

    /// Provider id not registered
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    /// The provider constructor failed
    #[error("Provider '{provider_id}' failed to initialize: {source}")]
    Construction {
        /// Provider whose constructor failed
        provider_id: String,
        /// Underlying failure
        #[source]
        source: ModelCallError,
    },
}

/// Registered provider information
#[derive(Clone)]
struct Registration {
    provider_id: String,
    prefixes: Vec<String>,
    priority: i32,
    factory: ProviderFactory,
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("provider_id", &self.provider_id)
            .field("prefixes", &self.prefixes)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

/// Registry for resolving model ids to providers
///
/// Resolution order for [`ProviderRegistry::create`]:
/// 1. a provider whose id equals the model id
/// 2. providers with a matching model-id prefix, highest priority first,
///    then longest prefix, then earliest registration
#[derive(Debug, Default, Clone)]
pub struct ProviderRegistry {
    registrations: Vec<Registration>,
}

impl ProviderRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider, replacing any registration with the same id
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::Arc;
    /// use textanchor_domain::ModelProvider;
    /// use textanchor_llm::{MockProvider, ProviderRegistry, SharedProvider};
    ///
    /// let mut registry = ProviderRegistry::new();
    /// registry.register("mock", &["mock-"], 0, |model_id: &str| {
    ///     let provider: SharedProvider = Arc::new(MockProvider::new("[]").with_model_id(model_id));
    ///     Ok(provider)
    /// });
    ///
    /// let provider = registry.create("mock-large").unwrap();
    /// assert_eq!(provider.model_id(), "mock-large");
    /// ```
    pub fn register<F>(&mut self, provider_id: impl Into<String>, prefixes: &[&str], priority: i32, factory: F)
    where
        F: Fn(&str) -> Result<SharedProvider, ModelCallError> + Send + Sync + 'static,
    {
        let provider_id = provider_id.into();

        // Remove existing registration with same ID
        self.registrations.retain(|r| r.provider_id != provider_id);

        self.registrations.push(Registration {
            provider_id,
            prefixes: prefixes.iter().map(|p| p.to_string()).collect(),
            priority,
            factory: Arc::new(factory),
        });
    }

    /// Remove a provider; returns whether it was registered
    pub fn unregister(&mut self, provider_id: &str) -> bool {
        let before = self.registrations.len();
        self.registrations.retain(|r| r.provider_id != provider_id);
        before != self.registrations.len()
    }

    /// Resolve the provider id that would handle `model_id`
    pub fn resolve(&self, model_id: &str) -> Option<&str> {
        self.select(model_id).map(|r| r.provider_id.as_str())
    }

    /// Construct a provider for `model_id`
    pub fn create(&self, model_id: &str) -> Result<SharedProvider, RegistryError> {
        let registration = self
            .select(model_id)
            .ok_or_else(|| RegistryError::NoProvider(model_id.to_string()))?;
        Self::construct(registration, model_id)
    }

    /// Construct a specific provider, bypassing model-id resolution
    pub fn create_with(&self, provider_id: &str, model_id: &str) -> Result<SharedProvider, RegistryError> {
        let registration = self
            .registrations
            .iter()
            .find(|r| r.provider_id == provider_id)
            .ok_or_else(|| RegistryError::UnknownProvider(provider_id.to_string()))?;
        Self::construct(registration, model_id)
    }

    /// Registered provider ids, in registration order
    pub fn provider_ids(&self) -> Vec<&str> {
        self.registrations
            .iter()
            .map(|r| r.provider_id.as_str())
            .collect()
    }

    /// Get registration count
    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    /// Whether nothing is registered
    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    fn select(&self, model_id: &str) -> Option<&Registration> {
        if let Some(exact) = self.registrations.iter().find(|r| r.provider_id == model_id) {
            return Some(exact);
        }

        self.registrations
            .iter()
            .enumerate()
            .filter_map(|(order, r)| {
                r.prefixes
                    .iter()
                    .filter(|p| model_id.starts_with(p.as_str()))
                    .map(|p| p.len())
                    .max()
                    .map(|prefix_len| (r.priority, prefix_len, std::cmp::Reverse(order), r))
            })
            .max_by_key(|(priority, prefix_len, order, _)| (*priority, *prefix_len, *order))
            .map(|(_, _, _, r)| r)
    }

    fn construct(registration: &Registration, model_id: &str) -> Result<SharedProvider, RegistryError> {
        debug!(
            "Creating provider '{}' for model '{}'",
            registration.provider_id, model_id
        );
        (registration.factory)(model_id).map_err(|source| RegistryError::Construction {
            provider_id: registration.provider_id.clone(),
            source,
        })
    }
}
