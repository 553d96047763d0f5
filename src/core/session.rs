use futures_util::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::chat_client::{ChatClient, ChatReply};
use crate::core::chat_error::{ChatError, ChatErrorKind};
use crate::core::config::{ConfigError, ConfigOrchestrator, ConfigStore};
use crate::core::conversation::Conversation;

/// How a call to [`ChatSession::send_user_message`] ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// The input was blank; nothing was sent.
    Ignored,
    Completed { reply: String },
    /// The caller cancelled; `reply` holds whatever arrived before that.
    Cancelled { reply: String },
    Failed(ChatErrorKind),
}

enum Drain {
    Finished,
    Cancelled,
    Broken(ChatError),
}

pub struct ChatSession<S> {
    config: ConfigOrchestrator<S>,
    client: ChatClient,
    conversation: Conversation,
}

impl<S: ConfigStore> ChatSession<S> {
    pub fn new(
        config: ConfigOrchestrator<S>,
        client: ChatClient,
        conversation: Conversation,
    ) -> Self {
        Self {
            config,
            client,
            conversation,
        }
    }

    pub fn config(&self) -> &ConfigOrchestrator<S> {
        &self.config
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn conversation_mut(&mut self) -> &mut Conversation {
        &mut self.conversation
    }

    /// Send `text` and fold the reply into the conversation.
    ///
    /// `on_delta` sees every fragment right after it has been applied.
    /// Request failures end up in the log as an error message; only a
    /// config store failure is returned as `Err`, before anything is
    /// appended.
    pub async fn send_user_message<F>(
        &mut self,
        text: &str,
        cancel: &CancellationToken,
        mut on_delta: F,
    ) -> Result<SendOutcome, ConfigError>
    where
        F: FnMut(&str),
    {
        let text = text.trim();
        if text.is_empty() {
            return Ok(SendOutcome::Ignored);
        }

        let config = self.config.current().await?;
        self.conversation.push_user(text);
        self.conversation.show_loading();
        let history = self.conversation.api_history();

        let reply = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("chat request cancelled before a response arrived");
                self.conversation.dismiss_loading();
                return Ok(SendOutcome::Cancelled { reply: String::new() });
            }
            reply = self.client.send(&config, &history) => reply,
        };

        let reply = match reply {
            Ok(reply) => reply,
            Err(err) => {
                if err.is_configuration_error() {
                    info!(kind = ?err.kind(), "current channel is not ready to send");
                }
                self.conversation.replace_loading_with_error(err.to_string());
                return Ok(SendOutcome::Failed(err.kind()));
            }
        };

        let target = self.conversation.begin_streaming_reply();
        let drain = match reply {
            ChatReply::Streaming(mut stream) => {
                let drain = self.drain(&mut stream, cancel, &mut on_delta).await;
                if stream.dropped_frames() > 0 {
                    warn!(
                        dropped = stream.dropped_frames(),
                        "skipped malformed frames while streaming"
                    );
                }
                drain
            }
            complete @ ChatReply::Complete(_) => {
                let mut fragments = complete.into_fragments();
                self.drain(&mut fragments, cancel, &mut on_delta).await
            }
        };

        self.conversation.finish_streaming();
        let reply = self
            .conversation
            .get(target)
            .map(|message| message.content().to_string())
            .unwrap_or_default();

        Ok(match drain {
            Drain::Finished => {
                debug!(chars = reply.len(), "reply complete");
                SendOutcome::Completed { reply }
            }
            Drain::Cancelled => {
                info!(chars = reply.len(), "reply cancelled");
                SendOutcome::Cancelled { reply }
            }
            Drain::Broken(err) => {
                warn!(error = %err, "reply stream broke off");
                let kind = err.kind();
                self.conversation.replace_loading_with_error(err.to_string());
                SendOutcome::Failed(kind)
            }
        })
    }

    async fn drain<St, F>(
        &mut self,
        fragments: &mut St,
        cancel: &CancellationToken,
        on_delta: &mut F,
    ) -> Drain
    where
        St: Stream<Item = Result<String, ChatError>> + Unpin,
        F: FnMut(&str),
    {
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Drain::Cancelled,
                next = fragments.next() => next,
            };
            match next {
                Some(Ok(fragment)) => {
                    if self.conversation.apply_delta(&fragment) {
                        on_delta(&fragment);
                    }
                }
                Some(Err(err)) => return Drain::Broken(err),
                None => return Drain::Finished,
            }
        }
    }
}
