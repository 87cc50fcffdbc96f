//! Scripted model backend.
//!
//! Replays a fixed queue of replies and records every prompt it receives.
//! Used for offline runs (`fitplan run --replay`) and for tests.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use super::{BackendError, ModelBackend, Prompt};

/// One queued reply
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptedReply {
    /// Raw text returned as the model output
    Text(String),

    /// Backend failure returned instead of output
    #[serde(skip)]
    Error(BackendError),

    /// Shorthand for a transport failure in replay files
    Unavailable(String),
}

/// Replay file layout
///
/// ```yaml
/// replies:
///   - text: '{"risk_level": "low", ...}'
///   - unavailable: connection reset
/// ```
#[derive(Debug, Deserialize)]
struct ReplayFile {
    // One-key maps (`- text: ...`) instead of YAML tags (`- !text ...`)
    #[serde(with = "serde_yaml::with::singleton_map_recursive")]
    replies: Vec<ScriptedReply>,
}

/// Backend that answers from a script
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<ScriptedReply>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    pub fn new(replies: impl IntoIterator<Item = ScriptedReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Backend replying with the given texts in order
    pub fn with_texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(texts.into_iter().map(|t| ScriptedReply::Text(t.into())))
    }

    /// Parse a YAML replay script
    pub fn from_yaml(content: &str) -> Result<Self> {
        let file: ReplayFile =
            serde_yaml::from_str(content).context("Failed to parse replay script")?;
        Ok(Self::new(file.replies))
    }

    /// Load a YAML replay script from disk
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read replay script: {}", path.display()))?;
        Self::from_yaml(&content)
    }

    /// Prompts received so far as plain text, in call order
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .map(|prompts| prompts.clone())
            .unwrap_or_default()
    }

    /// Number of `complete` calls made
    pub fn calls(&self) -> usize {
        self.prompts.lock().map(|p| p.len()).unwrap_or(0)
    }

    /// Replies not yet consumed
    pub fn remaining(&self) -> usize {
        self.replies.lock().map(|r| r.len()).unwrap_or(0)
    }
}

#[async_trait]
impl ModelBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, prompt: &Prompt) -> Result<String, BackendError> {
        self.prompts
            .lock()
            .map_err(|_| BackendError::unavailable("prompt log poisoned"))?
            .push(prompt.to_string());

        let reply = self
            .replies
            .lock()
            .map_err(|_| BackendError::unavailable("reply queue poisoned"))?
            .pop_front();

        match reply {
            Some(ScriptedReply::Text(text)) => Ok(text),
            Some(ScriptedReply::Error(err)) => Err(err),
            Some(ScriptedReply::Unavailable(detail)) => Err(BackendError::Unavailable { detail }),
            None => Err(BackendError::unavailable("replay script exhausted")),
        }
    }
}
