use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use super::io::ConfigError;
use crate::core::builtin_models::{default_channel, DEFAULT_CHANNEL_ID, DEFAULT_MODEL};

pub const CONFIG_SCHEMA_VERSION: u32 = 1;

fn schema_version() -> u32 {
    CONFIG_SCHEMA_VERSION
}

/// A named endpoint configuration the user can switch between.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    pub id: String,
    pub name: String,
    pub api_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub is_default: bool,
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("api_url", &self.api_url)
            .field("api_key", &mask_api_key(&self.api_key))
            .field("model", &self.model)
            .field("is_default", &self.is_default)
            .finish()
    }
}

impl Channel {
    pub fn has_api_key(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

/// Show only whether a key is set and its last four characters.
pub fn mask_api_key(key: &str) -> String {
    let key = key.trim();
    if key.is_empty() {
        return "(unset)".to_string();
    }
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "****".to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("****{tail}")
}

/// Fields for a channel created through [`Config::add_channel`].
#[derive(Debug, Clone, Default)]
pub struct ChannelDraft {
    pub id: Option<String>,
    pub name: String,
    pub api_url: String,
    pub api_key: String,
    pub model: Option<String>,
}

/// Partial update applied by [`Config::edit_channel`]. `None` leaves a field alone.
#[derive(Debug, Clone, Default)]
pub struct ChannelEdit {
    pub name: Option<String>,
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub model: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default = "schema_version")]
    pub version: u32,
    #[serde(default)]
    pub channels: Vec<Channel>,
    /// May be empty or point at a channel that no longer exists.
    #[serde(default)]
    pub current_channel_id: String,
    /// Global fallback model used when the channel names none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_SCHEMA_VERSION,
            channels: vec![default_channel()],
            current_channel_id: DEFAULT_CHANNEL_ID.to_string(),
            model: Some(DEFAULT_MODEL.to_string()),
        }
    }
}

/// Get a user-friendly display string for a path
/// Converts absolute paths to use ~ notation on Unix-like systems when possible
pub fn path_display<P: AsRef<Path>>(path: P) -> String {
    let path = path.as_ref();

    #[cfg(unix)]
    {
        if let Some(home) = std::env::var_os("HOME") {
            let home_path = PathBuf::from(home);
            if let Ok(relative) = path.strip_prefix(&home_path) {
                return format!("~/{}", relative.display());
            }
        }
    }

    path.display().to_string()
}

fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

impl Config {
    /// A config with no channels at all, as a freshly cleared settings screen has.
    pub fn empty() -> Self {
        Self {
            version: CONFIG_SCHEMA_VERSION,
            channels: Vec::new(),
            current_channel_id: String::new(),
            model: None,
        }
    }

    pub fn find_channel(&self, id: &str) -> Option<&Channel> {
        self.channels.iter().find(|c| c.id == id)
    }

    fn find_channel_mut(&mut self, id: &str) -> Option<&mut Channel> {
        self.channels.iter_mut().find(|c| c.id == id)
    }

    pub fn current_channel(&self) -> Option<&Channel> {
        if self.current_channel_id.is_empty() {
            return None;
        }
        self.find_channel(&self.current_channel_id)
    }

    /// Channel model, then the global model, then [`DEFAULT_MODEL`].
    pub fn effective_model(&self, channel: &Channel) -> String {
        non_empty(&channel.model)
            .or_else(|| self.model.as_deref().and_then(non_empty))
            .unwrap_or(DEFAULT_MODEL)
            .to_string()
    }

    pub fn add_channel(&mut self, draft: ChannelDraft) -> Result<&Channel, ConfigError> {
        let name = non_empty(&draft.name)
            .ok_or(ConfigError::MissingField("name"))?
            .to_string();
        let api_url = non_empty(&draft.api_url)
            .ok_or(ConfigError::MissingField("apiUrl"))?
            .to_string();
        let id = match draft.id.as_deref().and_then(non_empty) {
            Some(id) => id.to_string(),
            None => self.fresh_channel_id(),
        };
        if self.find_channel(&id).is_some() {
            return Err(ConfigError::DuplicateChannel(id));
        }

        let model = draft
            .model
            .as_deref()
            .and_then(non_empty)
            .unwrap_or(DEFAULT_MODEL)
            .to_string();

        self.channels.push(Channel {
            id,
            name,
            api_url,
            api_key: draft.api_key.trim().to_string(),
            model,
            is_default: false,
        });
        Ok(&self.channels[self.channels.len() - 1])
    }

    /// Apply an edit to an existing channel. The default channel only accepts key changes.
    pub fn edit_channel(&mut self, id: &str, edit: ChannelEdit) -> Result<(), ConfigError> {
        let channel = self
            .find_channel_mut(id)
            .ok_or_else(|| ConfigError::UnknownChannel(id.to_string()))?;

        if channel.is_default {
            let locked = [
                ("name", edit.name.is_some()),
                ("apiUrl", edit.api_url.is_some()),
                ("model", edit.model.is_some()),
            ];
            if let Some(&(field, _)) = locked.iter().find(|(_, touched)| *touched) {
                return Err(ConfigError::DefaultChannelLocked(field));
            }
        }

        if let Some(name) = edit.name {
            channel.name = non_empty(&name)
                .ok_or(ConfigError::MissingField("name"))?
                .to_string();
        }
        if let Some(api_url) = edit.api_url {
            channel.api_url = non_empty(&api_url)
                .ok_or(ConfigError::MissingField("apiUrl"))?
                .to_string();
        }
        if let Some(api_key) = edit.api_key {
            channel.api_key = api_key.trim().to_string();
        }
        if let Some(model) = edit.model {
            channel.model = model.trim().to_string();
        }
        Ok(())
    }

    pub fn set_channel_api_key(&mut self, id: &str, api_key: &str) -> Result<(), ConfigError> {
        self.edit_channel(
            id,
            ChannelEdit {
                api_key: Some(api_key.to_string()),
                ..ChannelEdit::default()
            },
        )
    }

    /// Make `id` the current channel; the global model follows the channel's model.
    pub fn select_channel(&mut self, id: &str) -> Result<(), ConfigError> {
        let channel = self
            .find_channel(id)
            .ok_or_else(|| ConfigError::UnknownChannel(id.to_string()))?;
        let model = self.effective_model(channel);
        self.current_channel_id = id.to_string();
        self.model = Some(model);
        Ok(())
    }

    /// Point the current channel and the global fallback at `model`.
    pub fn select_model(&mut self, model: &str) -> Result<(), ConfigError> {
        let model = non_empty(model)
            .ok_or(ConfigError::MissingField("model"))?
            .to_string();
        let current = self.current_channel_id.clone();
        if let Some(channel) = self.find_channel_mut(&current) {
            channel.model = model.clone();
        }
        self.model = Some(model);
        Ok(())
    }

    fn fresh_channel_id(&self) -> String {
        let mut stamp = chrono::Utc::now().timestamp_millis();
        while self.find_channel(&stamp.to_string()).is_some() {
            stamp += 1;
        }
        stamp.to_string()
    }
}
