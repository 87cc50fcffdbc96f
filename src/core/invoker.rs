//! Model invoker: one prompt, one backend call, no retries.

use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tracing::{debug, instrument};

use crate::adapters::{BackendError, ModelBackend, Prompt};

/// Default per-call timeout
pub const DEFAULT_MODEL_TIMEOUT: Duration = Duration::from_secs(60);

/// Sends rendered prompts to a backend
#[derive(Clone)]
pub struct ModelInvoker {
    backend: Arc<dyn ModelBackend>,
    timeout: Duration,
    max_response_bytes: u64,
}

impl ModelInvoker {
    pub fn new(backend: Arc<dyn ModelBackend>) -> Self {
        Self {
            backend,
            timeout: DEFAULT_MODEL_TIMEOUT,
            max_response_bytes: u64::MAX,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_response_bytes(mut self, limit: u64) -> Self {
        self.max_response_bytes = limit;
        self
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Send a prompt and return the raw response text.
    ///
    /// Every failure here is a `BackendError`; the caller decides what is fatal.
    #[instrument(
        skip_all,
        fields(backend = %self.backend.name(), prompt = %prompt_digest(&prompt.to_string()))
    )]
    pub async fn invoke(&self, prompt: &Prompt) -> Result<String, BackendError> {
        let raw = tokio::time::timeout(self.timeout, self.backend.complete(prompt))
            .await
            .map_err(|_| BackendError::Timeout {
                after_ms: self.timeout.as_millis() as u64,
            })??;

        let size = raw.len() as u64;
        if size > self.max_response_bytes {
            return Err(BackendError::ResponseTooLarge {
                actual: size,
                limit: self.max_response_bytes,
            });
        }

        debug!(bytes = size, "Model responded");
        Ok(raw)
    }
}

/// Short stable fingerprint of a prompt (first 16 hex chars of SHA-256).
///
/// Logged in place of the prompt, which embeds medical history.
pub fn prompt_digest(prompt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    let result = hasher.finalize();
    hex::encode(&result[..8])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::ScriptedBackend;
    use async_trait::async_trait;

    struct SlowBackend;

    #[async_trait]
    impl ModelBackend for SlowBackend {
        fn name(&self) -> &str {
            "slow"
        }

        async fn complete(&self, _prompt: &Prompt) -> Result<String, BackendError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("{}".to_string())
        }
    }

    #[tokio::test]
    async fn test_invoke_passes_text_through() {
        let backend = Arc::new(ScriptedBackend::with_texts(["not even json"]));
        let invoker = ModelInvoker::new(backend.clone());

        let prompt = Prompt::new("system", "user");

        assert_eq!(invoker.invoke(&prompt).await.unwrap(), "not even json");
        assert_eq!(backend.prompts(), vec!["system\n\nuser"]);
    }

    #[tokio::test]
    async fn test_invoke_timeout() {
        let invoker = ModelInvoker::new(Arc::new(SlowBackend)).with_timeout(Duration::from_millis(10));
        assert_eq!(
            invoker.invoke(&Prompt::user("prompt")).await,
            Err(BackendError::Timeout { after_ms: 10 })
        );
    }

    #[tokio::test]
    async fn test_invoke_response_too_large() {
        let backend = Arc::new(ScriptedBackend::with_texts(["0123456789"]));
        let invoker = ModelInvoker::new(backend).with_max_response_bytes(4);

        assert!(matches!(
            invoker.invoke(&Prompt::user("prompt")).await,
            Err(BackendError::ResponseTooLarge { actual: 10, limit: 4 })
        ));
    }

    #[test]
    fn test_prompt_digest_is_stable() {
        assert_eq!(prompt_digest("a"), prompt_digest("a"));
        assert_ne!(prompt_digest("a"), prompt_digest("b"));
        assert_eq!(prompt_digest("a").len(), 16);
    }
}
