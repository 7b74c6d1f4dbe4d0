//! Conversation persistence between agent invocations.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::conversation::Conversation;

/// Stores conversations keyed by thread id.
///
/// The agent loads the thread at the start of a turn and saves it once
/// the turn has completed. A turn that fails leaves the stored
/// conversation untouched.
#[async_trait]
pub trait Checkpointer: Send + Sync + 'static {
    /// Returns the saved conversation of `thread_id`, if any.
    async fn load(&self, thread_id: &str) -> Option<Conversation>;

    /// Replaces the saved conversation of `thread_id`.
    async fn save(&self, thread_id: &str, conversation: Conversation);

    /// Forgets `thread_id`.
    async fn clear(&self, thread_id: &str);
}

/// A process-local checkpointer. Clones share the same storage.
#[derive(Clone, Default)]
pub struct InMemoryCheckpointer {
    threads: Arc<Mutex<HashMap<String, Conversation>>>,
}

impl InMemoryCheckpointer {
    /// Creates an empty checkpointer.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored threads.
    pub fn thread_count(&self) -> usize {
        self.threads.lock().map(|t| t.len()).unwrap_or_default()
    }
}

#[async_trait]
impl Checkpointer for InMemoryCheckpointer {
    async fn load(&self, thread_id: &str) -> Option<Conversation> {
        let threads = self.threads.lock().ok()?;
        threads.get(thread_id).cloned()
    }

    async fn save(&self, thread_id: &str, conversation: Conversation) {
        match self.threads.lock() {
            Ok(mut threads) => {
                threads.insert(thread_id.to_owned(), conversation);
            }
            Err(_) => error!("checkpoint storage is poisoned"),
        }
    }

    async fn clear(&self, thread_id: &str) {
        if let Ok(mut threads) = self.threads.lock() {
            threads.remove(thread_id);
        }
    }
}
