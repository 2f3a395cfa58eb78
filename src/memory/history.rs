//! Bounded per-role chat histories.
//!
//! Histories are trimmed oldest-first once they exceed their bound, since
//! a role's conversation is never meant to grow unbounded across a long
//! session.

use crate::model_client::Message;
use std::collections::HashMap;

/// Default bound on the number of messages kept per role's history.
pub const DEFAULT_HISTORY_BOUND: usize = 40;

#[derive(Debug, Clone, Default)]
pub struct RoleHistory {
    messages: Vec<Message>,
    bound: usize,
}

impl RoleHistory {
    pub fn new(bound: usize) -> Self {
        Self { messages: Vec::new(), bound }
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
        while self.messages.len() > self.bound {
            self.messages.remove(0);
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// All role histories for a session, keyed by role label.
#[derive(Debug, Clone, Default)]
pub struct HistoryStore {
    histories: HashMap<String, RoleHistory>,
    bound: usize,
}

impl HistoryStore {
    pub fn new(bound: usize) -> Self {
        Self { histories: HashMap::new(), bound }
    }

    pub fn push(&mut self, role: &str, message: Message) {
        self.histories
            .entry(role.to_string())
            .or_insert_with(|| RoleHistory::new(self.bound))
            .push(message);
    }

    pub fn get(&self, role: &str) -> &[Message] {
        self.histories.get(role).map(|h| h.messages()).unwrap_or(&[])
    }

    /// Snapshot of every role's history, for session persistence.
    pub fn snapshot(&self) -> HashMap<String, Vec<Message>> {
        self.histories.iter().map(|(role, h)| (role.clone(), h.messages().to_vec())).collect()
    }

    /// Rebuilds a store from a persisted snapshot, preserving the bound.
    pub fn from_snapshot(bound: usize, snapshot: HashMap<String, Vec<Message>>) -> Self {
        let mut store = Self::new(bound);
        for (role, messages) in snapshot {
            for message in messages {
                store.push(&role, message);
            }
        }
        store
    }
}
