//! textanchor Model Provider Layer
//!
//! Pluggable model provider implementations and the registry that selects them.
//!
//! # Architecture
//!
//! This crate provides implementations of the `ModelProvider` trait from
//! `textanchor-domain`, plus an explicit [`ProviderRegistry`] that maps provider
//! identifiers and model-id prefixes to constructors. Real transports are
//! registered by the embedding application; this crate ships a deterministic
//! mock for tests and development.
//!
//! # Providers
//!
//! - `MockProvider`: Deterministic mock for testing
//!
//! # Examples
//!
//! ```
//! use textanchor_llm::MockProvider;
//! use textanchor_domain::{ModelProvider, ResponseFormatHint};
//!
//! let provider = MockProvider::new("[]");
//! let result = provider.generate("test prompt", &ResponseFormatHint::default()).unwrap();
//! assert_eq!(result, "[]");
//! ```

#![warn(missing_docs)]

pub mod registry;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use textanchor_domain::{ModelProvider, ResponseFormatHint};
use thiserror::Error;

pub use registry::{ProviderFactory, ProviderRegistry, RegistryError, SharedProvider};

/// Errors that can occur during a model call
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelCallError {
    /// Network or API communication error
    #[error("Communication error: {0}")]
    Communication(String),

    /// Invalid response from the model
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Rate limit exceeded
    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    /// Model not available
    #[error("Model not available: {0}")]
    ModelNotAvailable(String),

    /// Provider misconfigured (missing credentials, bad endpoint, ...)
    #[error("Provider configuration error: {0}")]
    Configuration(String),

    /// Generic error
    #[error("Model error: {0}")]
    Other(String),
}

/// Scripted outcome for prompts containing a given needle
#[derive(Debug, Clone)]
enum Scripted {
    Respond(String),
    Fail(String),
}

/// Mock model provider for deterministic testing
///
/// This provider returns pre-configured responses without making any network
/// calls. A response is chosen by the first registered needle contained in the
/// prompt; otherwise the default response is returned.
///
/// # Examples
///
/// ```
/// use textanchor_llm::MockProvider;
/// use textanchor_domain::{ModelProvider, ResponseFormatHint};
///
/// let hint = ResponseFormatHint::default();
///
/// // Simple fixed response
/// let provider = MockProvider::new("Fixed response");
/// assert_eq!(provider.generate("any prompt", &hint).unwrap(), "Fixed response");
///
/// // Responses chosen by prompt content
/// let mut provider = MockProvider::default();
/// provider.add_response("Romeo", "response1");
/// provider.add_response("Juliet", "response2");
/// assert_eq!(provider.generate("Text: Romeo speaks", &hint).unwrap(), "response1");
/// assert_eq!(provider.generate("Text: Juliet answers", &hint).unwrap(), "response2");
/// ```
#[derive(Debug, Clone)]
pub struct MockProvider {
    model_id: String,
    default_response: String,
    scripted: Arc<Mutex<Vec<(String, Scripted)>>>,
    prompts: Arc<Mutex<Vec<String>>>,
    hints: Arc<Mutex<Vec<ResponseFormatHint>>>,
    latency: Option<Duration>,
    call_count: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl MockProvider {
    /// Create a new MockProvider with a fixed response for all prompts
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            model_id: "mock".to_string(),
            default_response: response.into(),
            scripted: Arc::new(Mutex::new(Vec::new())),
            prompts: Arc::new(Mutex::new(Vec::new())),
            hints: Arc::new(Mutex::new(Vec::new())),
            latency: None,
            call_count: Arc::new(AtomicUsize::new(0)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Report a different model identifier
    pub fn with_model_id(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = model_id.into();
        self
    }

    /// Sleep for `latency` on every call (simulates a slow backend)
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Respond with `response` to any prompt containing `needle`
    pub fn add_response(&mut self, needle: impl Into<String>, response: impl Into<String>) {
        lock(&self.scripted).push((needle.into(), Scripted::Respond(response.into())));
    }

    /// Fail any prompt containing `needle`
    pub fn add_error(&mut self, needle: impl Into<String>) {
        let needle = needle.into();
        let message = format!("Mock error for prompt containing '{}'", needle);
        lock(&self.scripted).push((needle, Scripted::Fail(message)));
    }

    /// Get the number of times generate was called
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Reset the call count
    pub fn reset_call_count(&self) {
        self.call_count.store(0, Ordering::SeqCst);
    }

    /// Highest number of calls observed running at the same time
    pub fn max_concurrency(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Prompts received so far, in call order
    pub fn prompts(&self) -> Vec<String> {
        lock(&self.prompts).clone()
    }

    /// Format hints received so far, in call order
    pub fn hints(&self) -> Vec<ResponseFormatHint> {
        lock(&self.hints).clone()
    }

    fn lookup(&self, prompt: &str) -> Option<Scripted> {
        lock(&self.scripted)
            .iter()
            .find(|(needle, _)| prompt.contains(needle.as_str()))
            .map(|(_, outcome)| outcome.clone())
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new("Default mock response")
    }
}

impl ModelProvider for MockProvider {
    type Error = ModelCallError;

    fn generate(&self, prompt: &str, hint: &ResponseFormatHint) -> Result<String, Self::Error> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        lock(&self.prompts).push(prompt.to_string());
        lock(&self.hints).push(hint.clone());

        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);

        if let Some(latency) = self.latency {
            std::thread::sleep(latency);
        }

        let outcome = match self.lookup(prompt) {
            Some(Scripted::Respond(response)) => Ok(response),
            Some(Scripted::Fail(message)) => Err(ModelCallError::Other(message)),
            None => Ok(self.default_response.clone()),
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        outcome
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hint() -> ResponseFormatHint {
        ResponseFormatHint::default()
    }

    #[test]
    fn test_mock_provider_default() {
        let provider = MockProvider::new("Test response");
        let result = provider.generate("any prompt", &hint());
        assert_eq!(result.unwrap(), "Test response");
        assert_eq!(provider.model_id(), "mock");
    }

    #[test]
    fn test_mock_provider_specific_responses() {
        let mut provider = MockProvider::default();
        provider.add_response("hello", "world");
        provider.add_response("foo", "bar");

        assert_eq!(provider.generate("say hello", &hint()).unwrap(), "world");
        assert_eq!(provider.generate("foo!", &hint()).unwrap(), "bar");
        assert_eq!(provider.generate("unknown", &hint()).unwrap(), "Default mock response");
    }

    #[test]
    fn test_mock_provider_first_needle_wins() {
        let mut provider = MockProvider::default();
        provider.add_response("soft", "first");
        provider.add_response("But soft", "second");

        assert_eq!(provider.generate("But soft!", &hint()).unwrap(), "first");
    }

    #[test]
    fn test_mock_provider_call_count() {
        let provider = MockProvider::new("test");

        assert_eq!(provider.call_count(), 0);

        provider.generate("prompt1", &hint()).unwrap();
        assert_eq!(provider.call_count(), 1);

        provider.generate("prompt2", &hint()).unwrap();
        assert_eq!(provider.call_count(), 2);
        assert_eq!(provider.prompts(), vec!["prompt1", "prompt2"]);

        provider.reset_call_count();
        assert_eq!(provider.call_count(), 0);
    }

    #[test]
    fn test_mock_provider_error() {
        let mut provider = MockProvider::default();
        provider.add_error("bad prompt");

        let result = provider.generate("a bad prompt", &hint());
        assert!(matches!(result, Err(ModelCallError::Other(_))));
    }

    #[test]
    fn test_mock_provider_records_hints() {
        let provider = MockProvider::new("[]");
        let hint = ResponseFormatHint {
            schema: Some("{\"type\":\"array\"}".to_string()),
            fenced: true,
            ..ResponseFormatHint::default()
        };

        provider.generate("prompt", &hint).unwrap();
        assert_eq!(provider.hints(), vec![hint]);
    }

    #[test]
    fn test_mock_provider_clone_shares_state() {
        let provider1 = MockProvider::new("test");
        let provider2 = provider1.clone();

        provider1.generate("test", &hint()).unwrap();

        // Both should share the same call count due to Arc
        assert_eq!(provider1.call_count(), 1);
        assert_eq!(provider2.call_count(), 1);
    }

    #[test]
    fn test_mock_provider_tracks_concurrency() {
        let provider = MockProvider::new("ok").with_latency(Duration::from_millis(50));

        let handles: Vec<_> = (0..3)
            .map(|_| {
                let p = provider.clone();
                std::thread::spawn(move || p.generate("x", &ResponseFormatHint::default()))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap().unwrap();
        }

        assert!(provider.max_concurrency() >= 2);
        assert!(provider.max_concurrency() <= 3);
    }

    #[test]
    fn test_model_call_error_display() {
        let err = ModelCallError::ModelNotAvailable("gemini-x".to_string());
        assert_eq!(err.to_string(), "Model not available: gemini-x");
    }
}
