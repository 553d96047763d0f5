//! Failure taxonomy for the chat request pipeline.
//!
//! Every variant renders a short message suitable for showing directly in the
//! conversation as an error bubble.

use std::error::Error as StdError;
use std::fmt;

use crate::api::error_summary_from_body;

/// Field-less discriminant of [`ChatError`], for matching in callers and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChatErrorKind {
    NoChannelConfigured,
    NoChannelSelected,
    ChannelNotFound,
    MissingApiKey,
    MissingApiUrl,
    InvalidApiKey,
    InvalidApiUrl,
    RateLimited,
    RequestFailed,
    NetworkUnreachable,
    Timeout,
    InvalidResponse,
    /// Tags frames the stream parser skips. No [`ChatError`] has this kind.
    MalformedStreamFrame,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatError {
    NoChannelConfigured,
    NoChannelSelected,
    ChannelNotFound(String),
    MissingApiKey,
    MissingApiUrl,
    InvalidApiKey,
    InvalidApiUrl,
    RateLimited,
    RequestFailed {
        status: u16,
        server_message: Option<String>,
    },
    NetworkUnreachable(String),
    Timeout,
    InvalidResponse(String),
}

impl ChatError {
    pub fn kind(&self) -> ChatErrorKind {
        match self {
            ChatError::NoChannelConfigured => ChatErrorKind::NoChannelConfigured,
            ChatError::NoChannelSelected => ChatErrorKind::NoChannelSelected,
            ChatError::ChannelNotFound(_) => ChatErrorKind::ChannelNotFound,
            ChatError::MissingApiKey => ChatErrorKind::MissingApiKey,
            ChatError::MissingApiUrl => ChatErrorKind::MissingApiUrl,
            ChatError::InvalidApiKey => ChatErrorKind::InvalidApiKey,
            ChatError::InvalidApiUrl => ChatErrorKind::InvalidApiUrl,
            ChatError::RateLimited => ChatErrorKind::RateLimited,
            ChatError::RequestFailed { .. } => ChatErrorKind::RequestFailed,
            ChatError::NetworkUnreachable(_) => ChatErrorKind::NetworkUnreachable,
            ChatError::Timeout => ChatErrorKind::Timeout,
            ChatError::InvalidResponse(_) => ChatErrorKind::InvalidResponse,
        }
    }

    /// Map a non-success HTTP status and its body to an error.
    pub fn from_status(status: u16, body: &str) -> Self {
        match status {
            401 => ChatError::InvalidApiKey,
            404 => ChatError::InvalidApiUrl,
            429 => ChatError::RateLimited,
            _ => ChatError::RequestFailed {
                status,
                server_message: error_summary_from_body(body),
            },
        }
    }

    /// True for failures detected before any network activity.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            ChatError::NoChannelConfigured
                | ChatError::NoChannelSelected
                | ChatError::ChannelNotFound(_)
                | ChatError::MissingApiKey
                | ChatError::MissingApiUrl
        )
    }
}

impl fmt::Display for ChatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatError::NoChannelConfigured => write!(f, "Add a chat channel first"),
            ChatError::NoChannelSelected => write!(f, "Select a chat channel first"),
            ChatError::ChannelNotFound(id) => {
                write!(f, "The selected channel '{id}' does not exist")
            }
            ChatError::MissingApiKey => write!(f, "Set an API key for this channel first"),
            ChatError::MissingApiUrl => write!(f, "Set an API URL for this channel first"),
            ChatError::InvalidApiKey => write!(f, "Invalid API key, check the channel settings"),
            ChatError::InvalidApiUrl => write!(f, "Invalid API URL, check the channel settings"),
            ChatError::RateLimited => write!(f, "Too many requests, try again later"),
            ChatError::RequestFailed {
                server_message: Some(message),
                ..
            } => write!(f, "{message}"),
            ChatError::RequestFailed { status, .. } => write!(f, "Request failed ({status})"),
            ChatError::NetworkUnreachable(_) => write!(
                f,
                "Network connection failed, check your network or the API URL"
            ),
            ChatError::Timeout => write!(f, "The request timed out, try again later"),
            ChatError::InvalidResponse(_) => {
                write!(f, "The server sent a response that could not be read")
            }
        }
    }
}

impl StdError for ChatError {}

impl From<reqwest::Error> for ChatError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ChatError::Timeout
        } else if err.is_decode() {
            ChatError::InvalidResponse(err.to_string())
        } else {
            ChatError::NetworkUnreachable(err.to_string())
        }
    }
}
