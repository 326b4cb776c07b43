//! Conversation sessions
//!
//! A [`ConversationHandle`] owns one user's bounded transcript; the
//! [`SessionRegistry`] maps user keys to handles for the adapter's lifetime.
//! Handles are never evicted, only cleared.

use crate::config::{HISTORY_MAX_TURNS, HISTORY_TRIM_STEP};
use crate::llm::{Content, GenerativeModel, LlmError, ModelSpec};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

/// Stateful chat session with a bounded transcript
#[derive(Debug, Clone)]
pub struct ConversationHandle {
    model: ModelSpec,
    history: Vec<Content>,
}

impl ConversationHandle {
    /// Start an empty conversation with `model`
    #[must_use]
    pub const fn new(model: ModelSpec) -> Self {
        Self {
            model,
            history: Vec::new(),
        }
    }

    /// Resume a conversation from an existing transcript
    #[must_use]
    pub const fn with_history(model: ModelSpec, history: Vec<Content>) -> Self {
        Self { model, history }
    }

    /// Model options used for every turn of this conversation
    #[must_use]
    pub const fn model(&self) -> &ModelSpec {
        &self.model
    }

    /// Prior turns, oldest first
    #[must_use]
    pub fn history(&self) -> &[Content] {
        &self.history
    }

    /// Drop every prior turn
    pub fn clear(&mut self) {
        self.history.clear();
    }

    /// Drops the oldest turns once the transcript exceeds the window.
    ///
    /// Returns the number of dropped turns.
    pub fn trim_history(&mut self) -> usize {
        if self.history.len() <= HISTORY_MAX_TURNS {
            return 0;
        }
        let dropped = HISTORY_TRIM_STEP.min(self.history.len());
        self.history.drain(..dropped);
        debug!(dropped, remaining = self.history.len(), "Trimmed conversation history");
        dropped
    }

    /// Sends `text` with the current transcript as context.
    ///
    /// The user turn and the model reply are appended only on success.
    ///
    /// # Errors
    ///
    /// Returns the backend error unchanged; the transcript is left untouched.
    pub async fn send_message(
        &mut self,
        backend: &dyn GenerativeModel,
        text: &str,
    ) -> Result<String, LlmError> {
        let reply = backend
            .chat_completion(&self.model, &self.history, text)
            .await?;
        self.history.push(Content::user(text));
        self.history.push(Content::model(&reply));
        Ok(reply)
    }
}

/// Registry of conversation handles keyed by user
///
/// Each handle sits behind its own mutex so a user's turns are serialized
/// while different users proceed independently.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<Mutex<ConversationHandle>>>>,
}

impl SessionRegistry {
    /// Create a new empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the handle for `key`, creating it with `factory` on first contact
    pub async fn get_or_create<F>(&self, key: &str, factory: F) -> Arc<Mutex<ConversationHandle>>
    where
        F: FnOnce() -> ConversationHandle,
    {
        {
            let sessions = self.sessions.read().await;
            if let Some(handle) = sessions.get(key) {
                return handle.clone();
            }
        }

        let mut sessions = self.sessions.write().await;
        sessions
            .entry(key.to_string())
            .or_insert_with(|| {
                debug!(user = key, "Creating conversation handle");
                Arc::new(Mutex::new(factory()))
            })
            .clone()
    }

    /// Get the handle for `key` if one exists
    pub async fn get(&self, key: &str) -> Option<Arc<Mutex<ConversationHandle>>> {
        self.sessions.read().await.get(key).cloned()
    }

    /// Number of known users
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Whether no user has been seen yet
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockGenerativeModel;

    fn turns(n: usize) -> Vec<Content> {
        (0..n)
            .map(|i| {
                if i % 2 == 0 {
                    Content::user(&format!("q{i}"))
                } else {
                    Content::model(&format!("a{i}"))
                }
            })
            .collect()
    }

    #[test]
    fn trim_is_noop_within_window() {
        let mut handle = ConversationHandle::with_history(ModelSpec::chat("m"), turns(10));
        assert_eq!(handle.trim_history(), 0);
        assert_eq!(handle.history().len(), 10);
    }

    #[test]
    fn trim_drops_oldest_two() {
        let mut handle = ConversationHandle::with_history(ModelSpec::chat("m"), turns(12));
        assert_eq!(handle.trim_history(), 2);
        assert_eq!(handle.history().len(), 10);
        assert_eq!(handle.history()[0], Content::user("q2"));
    }

    #[test]
    fn trim_with_eleven_leaves_nine() {
        let mut handle = ConversationHandle::with_history(ModelSpec::chat("m"), turns(11));
        handle.trim_history();
        assert_eq!(handle.history().len(), 9);
    }

    #[tokio::test]
    async fn send_appends_user_and_model_turns() {
        let mut mock = MockGenerativeModel::new();
        mock.expect_chat_completion()
            .withf(|_, history, text| history.is_empty() && text == "hi")
            .times(1)
            .returning(|_, _, _| Ok("hello".to_string()));

        let mut handle = ConversationHandle::new(ModelSpec::chat("m"));
        let reply = handle.send_message(&mock, "hi").await.expect("reply");

        assert_eq!(reply, "hello");
        assert_eq!(
            handle.history(),
            &[Content::user("hi"), Content::model("hello")]
        );
    }

    #[tokio::test]
    async fn failed_send_leaves_history_untouched() {
        let mut mock = MockGenerativeModel::new();
        mock.expect_chat_completion()
            .withf(|_, _, text| text == "boom")
            .returning(|_, _, _| Err(LlmError::NetworkError("down".to_string())));

        let mut handle = ConversationHandle::with_history(ModelSpec::chat("m"), turns(2));
        assert!(handle.send_message(&mock, "boom").await.is_err());
        assert_eq!(handle.history().len(), 2);
    }

    #[tokio::test]
    async fn registry_reuses_handles_per_key() {
        let registry = SessionRegistry::new();
        assert!(registry.is_empty().await);

        let first = registry
            .get_or_create("42", || ConversationHandle::new(ModelSpec::chat("m")))
            .await;
        first.lock().await.clear();
        let again = registry
            .get_or_create("42", || panic!("factory must not run twice"))
            .await;

        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(registry.len().await, 1);

        registry
            .get_or_create("43", || ConversationHandle::new(ModelSpec::chat("m")))
            .await;
        assert_eq!(registry.len().await, 2);
        assert!(registry.get("44").await.is_none());
    }
}
