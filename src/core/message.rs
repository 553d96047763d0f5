use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::api::{ChatMessage, ROLE_ASSISTANT, ROLE_USER};

static NEXT_MESSAGE_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque, process-unique message identifier. Later messages get larger ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct MessageId(u64);

impl MessageId {
    fn next() -> Self {
        MessageId(NEXT_MESSAGE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    /// Finalized; content no longer changes.
    Complete,
    /// The active streaming target.
    Streaming,
    /// Placeholder shown while a request is in flight.
    Loading,
    /// Terminal error bubble. Never sent back to the API.
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    id: MessageId,
    content: String,
    is_user: bool,
    timestamp: i64,
    status: MessageStatus,
}

impl Message {
    fn new(content: impl Into<String>, is_user: bool, status: MessageStatus) -> Self {
        Self {
            id: MessageId::next(),
            content: content.into(),
            is_user,
            timestamp: chrono::Utc::now().timestamp_millis(),
            status,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(content, true, MessageStatus::Complete)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(content, false, MessageStatus::Complete)
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self::new(content, false, MessageStatus::Error)
    }

    pub(crate) fn loading(content: impl Into<String>) -> Self {
        Self::new(content, false, MessageStatus::Loading)
    }

    pub(crate) fn streaming() -> Self {
        Self::new(String::new(), false, MessageStatus::Streaming)
    }

    pub fn id(&self) -> MessageId {
        self.id
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn is_user(&self) -> bool {
        self.is_user
    }

    /// Epoch milliseconds at creation.
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn status(&self) -> MessageStatus {
        self.status
    }

    pub fn api_role(&self) -> &'static str {
        if self.is_user {
            ROLE_USER
        } else {
            ROLE_ASSISTANT
        }
    }

    pub fn to_api_message(&self) -> ChatMessage {
        ChatMessage {
            role: self.api_role().to_string(),
            content: self.content.clone(),
        }
    }

    pub(crate) fn extend_content(&mut self, fragment: &str) {
        self.content.push_str(fragment);
    }

    pub(crate) fn set_status(&mut self, status: MessageStatus) {
        self.status = status;
    }
}
