//! The ordered message log behind a chat screen.
//!
//! The log only grows. The loading placeholder is removed once a reply
//! starts or fails, and a reply that finishes without any text is dropped.
//! The content of the active streaming target is extended in place while it
//! is still the tail.

use tokio::sync::watch;
use tracing::trace;

use crate::core::message::{Message, MessageId, MessageStatus};

pub const LOADING_TEXT: &str = "Thinking...";

pub struct Conversation {
    messages: Vec<Message>,
    streaming_target: Option<MessageId>,
    revision: watch::Sender<u64>,
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

impl Conversation {
    pub fn new() -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            messages: Vec::new(),
            streaming_target: None,
            revision,
        }
    }

    /// Start with an assistant greeting already in the log.
    pub fn with_greeting(greeting: impl Into<String>) -> Self {
        let mut conversation = Self::new();
        conversation.append(Message::assistant(greeting));
        conversation
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

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn get(&self, id: MessageId) -> Option<&Message> {
        self.messages.iter().find(|message| message.id() == id)
    }

    pub fn streaming_target(&self) -> Option<MessageId> {
        self.streaming_target
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming_target.is_some()
    }

    /// Receives the revision number after every change to the log.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }

    fn notify(&self) {
        self.revision.send_modify(|revision| *revision += 1);
    }

    pub fn append(&mut self, message: Message) -> MessageId {
        let id = message.id();
        self.messages.push(message);
        self.notify();
        id
    }

    pub fn push_user(&mut self, content: impl Into<String>) -> MessageId {
        self.append(Message::user(content))
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) -> MessageId {
        self.append(Message::assistant(content))
    }

    /// Append the placeholder shown while a request is in flight.
    pub fn show_loading(&mut self) -> MessageId {
        self.append(Message::loading(LOADING_TEXT))
    }

    /// Drop the loading placeholder, if any.
    pub fn dismiss_loading(&mut self) -> bool {
        let before = self.messages.len();
        self.messages
            .retain(|message| message.status() != MessageStatus::Loading);
        let removed = before != self.messages.len();
        if removed {
            self.notify();
        }
        removed
    }

    /// Swap the loading placeholder for an empty reply that receives deltas.
    pub fn begin_streaming_reply(&mut self) -> MessageId {
        self.finish_streaming();
        self.dismiss_loading();
        let id = self.append(Message::streaming());
        self.streaming_target = Some(id);
        id
    }

    /// Extend the streaming target with `fragment`.
    ///
    /// Only applies while the target is still the last message; returns
    /// whether anything changed.
    pub fn apply_delta(&mut self, fragment: &str) -> bool {
        let Some(target) = self.streaming_target else {
            return false;
        };
        match self.messages.last_mut() {
            Some(last) if last.id() == target => {
                last.extend_content(fragment);
                self.notify();
                true
            }
            _ => {
                trace!(%target, "dropping delta for superseded streaming target");
                false
            }
        }
    }

    /// Freeze the streaming target's content, or remove it if it never
    /// received any text.
    pub fn finish_streaming(&mut self) -> Option<MessageId> {
        let target = self.streaming_target.take()?;
        let Some(index) = self.messages.iter().position(|m| m.id() == target) else {
            return Some(target);
        };
        if self.messages[index].content().is_empty() {
            trace!(%target, "removing empty reply");
            self.messages.remove(index);
        } else {
            self.messages[index].set_status(MessageStatus::Complete);
        }
        self.notify();
        Some(target)
    }

    /// Remove the loading placeholder and append a terminal error bubble.
    pub fn replace_loading_with_error(&mut self, content: impl Into<String>) -> MessageId {
        self.finish_streaming();
        self.dismiss_loading();
        self.append(Message::error(content))
    }

    /// Messages that make up the conversation history sent to the API.
    pub fn api_history(&self) -> Vec<Message> {
        self.messages
            .iter()
            .filter(|message| match message.status() {
                MessageStatus::Complete => true,
                MessageStatus::Streaming => !message.content().is_empty(),
                MessageStatus::Loading | MessageStatus::Error => false,
            })
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deltas_fold_into_streaming_target() {
        let mut conversation = Conversation::new();
        conversation.push_user("Hi");
        conversation.show_loading();

        let target = conversation.begin_streaming_reply();
        for fragment in ["Hel", "lo", " world"] {
            assert!(conversation.apply_delta(fragment));
        }

        let reply = conversation.get(target).expect("target present");
        assert_eq!(reply.content(), "Hello world");
        assert!(!reply.is_user());
        assert_eq!(conversation.len(), 2, "loading placeholder removed");
    }

    #[test]
    fn delta_after_superseding_append_is_ignored() {
        let mut conversation = Conversation::new();
        conversation.begin_streaming_reply();
        let user = conversation.push_user("interrupting");

        assert!(!conversation.apply_delta("late"));
        assert_eq!(
            conversation.get(user).map(Message::content),
            Some("interrupting")
        );
    }

    #[test]
    fn delta_without_target_is_ignored() {
        let mut conversation = Conversation::with_greeting("Hello");
        assert!(!conversation.apply_delta("x"));
        assert_eq!(conversation.messages()[0].content(), "Hello");
    }

    #[test]
    fn finished_message_no_longer_accepts_deltas() {
        let mut conversation = Conversation::new();
        let target = conversation.begin_streaming_reply();
        conversation.apply_delta("done");

        assert_eq!(conversation.finish_streaming(), Some(target));
        assert!(!conversation.apply_delta(" more"));
        let message = conversation.get(target).expect("present");
        assert_eq!(message.content(), "done");
        assert_eq!(message.status(), MessageStatus::Complete);
        assert_eq!(conversation.finish_streaming(), None);
    }

    #[test]
    fn error_replaces_loading_placeholder() {
        let mut conversation = Conversation::with_greeting("Hello");
        conversation.push_user("Hi");
        conversation.show_loading();

        conversation.replace_loading_with_error("Invalid API key");

        let statuses: Vec<MessageStatus> =
            conversation.messages().iter().map(Message::status).collect();
        assert_eq!(
            statuses,
            vec![
                MessageStatus::Complete,
                MessageStatus::Complete,
                MessageStatus::Error
            ]
        );
        assert_eq!(
            conversation.last().map(Message::content),
            Some("Invalid API key")
        );
    }

    #[test]
    fn api_history_skips_placeholders_and_errors() {
        let mut conversation = Conversation::with_greeting("Hello");
        conversation.push_user("first");
        conversation.show_loading();
        conversation.replace_loading_with_error("oops");
        conversation.push_user("second");
        conversation.begin_streaming_reply();

        let history: Vec<String> = conversation
            .api_history()
            .iter()
            .map(|m| m.content().to_string())
            .collect();
        assert_eq!(history, vec!["Hello", "first", "second"]);
    }

    #[test]
    fn every_change_bumps_revision() {
        let mut conversation = Conversation::new();
        let mut rx = conversation.subscribe();
        assert!(!rx.has_changed().expect("sender alive"));

        conversation.push_user("Hi");
        assert!(rx.has_changed().expect("sender alive"));
        assert_eq!(*rx.borrow_and_update(), 1);

        conversation.begin_streaming_reply();
        conversation.apply_delta("a");
        assert!(conversation.revision() >= 3);
        assert!(rx.has_changed().expect("sender alive"));
    }

    #[test]
    fn empty_reply_is_removed_when_finished() {
        let mut conversation = Conversation::with_greeting("Hello");
        conversation.push_user("Hi");
        conversation.show_loading();
        let target = conversation.begin_streaming_reply();

        assert_eq!(conversation.finish_streaming(), Some(target));
        assert!(conversation.get(target).is_none());
        let api_history = conversation.api_history();
        let history: Vec<&str> = api_history.iter().map(|m| m.content()).collect();
        assert_eq!(history, vec!["Hello", "Hi"]);
    }

    #[test]
    fn new_reply_finalizes_previous_target() {
        let mut conversation = Conversation::new();
        let first = conversation.begin_streaming_reply();
        conversation.apply_delta("one");
        let second = conversation.begin_streaming_reply();

        assert_ne!(first, second);
        assert_eq!(
            conversation.get(first).map(Message::status),
            Some(MessageStatus::Complete)
        );
        assert_eq!(conversation.streaming_target(), Some(second));
    }
}
