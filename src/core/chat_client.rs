//! Sending a conversation to the current channel.
//!
//! Validation runs before any network activity. A successful response comes
//! back as a [`ChatReply`], either a live delta stream or a whole completion.

use bytes::Bytes;
use futures_util::stream::{self, BoxStream};
use futures_util::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::api::{ChatCompletion, ChatRequest};
use crate::core::chat_error::ChatError;
use crate::core::chat_stream::{is_event_stream_body, DeltaStream, ResponseDeltaStream};
use crate::core::config::{Channel, Config};
use crate::core::message::Message;

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientSettings {
    /// Limit for establishing the connection.
    pub connect_timeout: Duration,
    /// Limit for each read, including waiting for response headers and every body chunk.
    pub read_timeout: Duration,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

/// Resolve the channel a request would go to, failing in a fixed order.
pub fn validate_channel(config: &Config) -> Result<&Channel, ChatError> {
    if config.channels.is_empty() {
        return Err(ChatError::NoChannelConfigured);
    }
    if config.current_channel_id.trim().is_empty() {
        return Err(ChatError::NoChannelSelected);
    }
    let channel = config
        .find_channel(&config.current_channel_id)
        .ok_or_else(|| ChatError::ChannelNotFound(config.current_channel_id.clone()))?;
    if !channel.has_api_key() {
        return Err(ChatError::MissingApiKey);
    }
    if channel.api_url.trim().is_empty() {
        return Err(ChatError::MissingApiUrl);
    }
    Ok(channel)
}

/// Startup hint for a config that cannot send yet.
pub fn readiness_notice(config: &Config) -> Option<String> {
    let err = validate_channel(config).err()?;
    let hint = match err {
        ChatError::NoChannelConfigured => "chitter channel add --name <NAME> --url <URL>",
        ChatError::NoChannelSelected | ChatError::ChannelNotFound(_) => {
            "chitter channel select <ID>"
        }
        ChatError::MissingApiKey => "chitter channel set-key <ID> <KEY>",
        _ => "chitter channel edit <ID> --url <URL>",
    };
    Some(format!("{err}: {hint}"))
}

/// A validated request, ready to send.
#[derive(Clone)]
pub struct PreparedRequest {
    pub url: String,
    api_key: String,
    pub body: ChatRequest,
}

impl fmt::Debug for PreparedRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreparedRequest")
            .field("url", &self.url)
            .field("api_key", &"<redacted>")
            .field("body", &self.body)
            .finish()
    }
}

pub fn prepare(config: &Config, history: &[Message]) -> Result<PreparedRequest, ChatError> {
    let channel = validate_channel(config)?;
    let body = ChatRequest {
        messages: history.iter().map(Message::to_api_message).collect(),
        model: config.effective_model(channel),
        stream: true,
    };
    Ok(PreparedRequest {
        url: channel.api_url.trim().to_string(),
        api_key: channel.api_key.trim().to_string(),
        body,
    })
}

/// What a successful send produced.
pub enum ChatReply {
    Streaming(ResponseDeltaStream),
    /// The server answered with a single JSON completion instead of a stream.
    Complete(String),
}

impl fmt::Debug for ChatReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatReply::Streaming(_) => f.write_str("ChatReply::Streaming(..)"),
            ChatReply::Complete(content) => {
                f.debug_tuple("ChatReply::Complete").field(content).finish()
            }
        }
    }
}

impl ChatReply {
    /// Text fragments in arrival order, whichever shape the reply has.
    pub fn into_fragments(self) -> BoxStream<'static, Result<String, ChatError>> {
        match self {
            ChatReply::Streaming(stream) => stream.boxed(),
            ChatReply::Complete(content) if content.is_empty() => stream::empty().boxed(),
            ChatReply::Complete(content) => stream::once(async move { Ok(content) }).boxed(),
        }
    }
}

#[derive(Clone)]
pub struct ChatClient {
    http: reqwest::Client,
}

impl ChatClient {
    pub fn new(settings: ClientSettings) -> Result<Self, ChatError> {
        let http = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .read_timeout(settings.read_timeout)
            .build()
            .map_err(|err| ChatError::NetworkUnreachable(err.to_string()))?;
        Ok(Self { http })
    }

    /// Use an already-configured HTTP client.
    pub fn with_http_client(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// Send the conversation to the current channel.
    ///
    /// Configuration problems are reported before any network activity. Every
    /// failure comes back as a [`ChatError`]; nothing here panics on bad input.
    pub async fn send(
        &self,
        config: &Config,
        history: &[Message],
    ) -> Result<ChatReply, ChatError> {
        let prepared = prepare(config, history)?;
        self.send_prepared(prepared).await
    }

    pub async fn send_prepared(&self, prepared: PreparedRequest) -> Result<ChatReply, ChatError> {
        info!(
            url = %prepared.url,
            model = %prepared.body.model,
            messages = prepared.body.messages.len(),
            "sending chat completion request"
        );

        let response = self
            .http
            .post(&prepared.url)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .bearer_auth(&prepared.api_key)
            .json(&prepared.body)
            .send()
            .await
            .map_err(|err| {
                warn!(error = %err, "chat request did not reach the server");
                ChatError::from(err)
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let err = ChatError::from_status(status.as_u16(), &body);
            warn!(status = status.as_u16(), kind = ?err.kind(), "chat request rejected");
            return Err(err);
        }

        if is_json_response(&response) {
            let body = response.bytes().await.map_err(ChatError::from)?;
            return decode_json_reply(body);
        }

        debug!(status = status.as_u16(), "streaming chat completion");
        Ok(ChatReply::Streaming(DeltaStream::new(
            response.bytes_stream().boxed(),
        )))
    }
}

/// A body labelled JSON is normally one completion, but some relays send
/// the event stream under that content type.
fn decode_json_reply(body: Bytes) -> Result<ChatReply, ChatError> {
    match serde_json::from_slice::<ChatCompletion>(&body) {
        Ok(completion) => {
            debug!("server returned a single JSON completion");
            Ok(ChatReply::Complete(completion.into_content()))
        }
        Err(_) if is_event_stream_body(&body) => {
            debug!("JSON-labelled response carries an event stream");
            let chunks: Vec<reqwest::Result<Bytes>> = vec![Ok(body)];
            Ok(ChatReply::Streaming(DeltaStream::new(
                stream::iter(chunks).boxed(),
            )))
        }
        Err(err) => Err(ChatError::InvalidResponse(err.to_string())),
    }
}

fn is_json_response(response: &reqwest::Response) -> bool {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_ascii_lowercase().starts_with("application/json"))
        .unwrap_or(false)
}
