//! Bounded conversation history shared by the router and specialists
//!
//! A FIFO sliding window of role-tagged messages. When the window is full the
//! oldest message is evicted before the new one is appended.

use std::collections::VecDeque;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of messages kept when no capacity is configured
pub const DEFAULT_HISTORY_CAPACITY: usize = 10;

/// Who authored a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Raised when a message is added with a role the history does not know
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unhandled message role: '{0}'")]
pub struct InvalidRoleError(pub String);

impl FromStr for Role {
    type Err = InvalidRoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            other => Err(InvalidRoleError(other.to_string())),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

/// A single conversation turn. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    role: Role,
    content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }
}

/// Capacity-bounded, insertion-ordered message log.
///
/// Not synchronized: one session owns one history, and concurrent access has
/// to be serialized by the owner.
#[derive(Debug, Clone)]
pub struct ConversationHistory {
    messages: VecDeque<Message>,
    capacity: usize,
}

impl ConversationHistory {
    /// Create an empty history that keeps at most `capacity` messages
    pub fn new(capacity: usize) -> Self {
        Self {
            messages: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a message by role name ("user" or "assistant").
    ///
    /// Unknown roles fail with [`InvalidRoleError`] and leave the history
    /// untouched.
    pub fn add(&mut self, role: &str, content: impl Into<String>) -> Result<(), InvalidRoleError> {
        let role: Role = role.parse()?;
        self.push(role, content);
        Ok(())
    }

    /// Append a message, evicting the oldest one first when full
    pub fn push(&mut self, role: Role, content: impl Into<String>) {
        if self.capacity == 0 {
            return;
        }
        while self.messages.len() >= self.capacity {
            self.messages.pop_front();
        }
        self.messages.push_back(Message::new(role, content));
    }

    /// Owned copy of the current window, oldest first
    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.iter().cloned().collect()
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = &Message> {
        self.messages.iter()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.back()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for ConversationHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}
