//! Built-in model choices and the seeded default channel.

use crate::core::config::data::Channel;

/// Used when neither the channel nor the config names a model.
pub const DEFAULT_MODEL: &str = "gpt-4o";

pub const DEFAULT_CHANNEL_ID: &str = "openai";
pub const DEFAULT_CHANNEL_NAME: &str = "OpenAI";
pub const DEFAULT_CHANNEL_URL: &str = "https://api.openai.com/v1/chat/completions";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuiltinModel {
    pub id: &'static str,
    pub display_name: &'static str,
    pub description: &'static str,
}

pub const BUILTIN_MODELS: &[BuiltinModel] = &[
    BuiltinModel {
        id: "gpt-4o",
        display_name: "GPT-4o",
        description: "Capable general-purpose model",
    },
    BuiltinModel {
        id: "gpt-4o-mini",
        display_name: "GPT-4o mini",
        description: "Faster, lighter model",
    },
];

/// Find a built-in model by ID (case-insensitive)
pub fn find_builtin_model(id: &str) -> Option<&'static BuiltinModel> {
    BUILTIN_MODELS
        .iter()
        .find(|model| model.id.eq_ignore_ascii_case(id))
}

/// The channel every fresh configuration starts with.
pub fn default_channel() -> Channel {
    Channel {
        id: DEFAULT_CHANNEL_ID.to_string(),
        name: DEFAULT_CHANNEL_NAME.to_string(),
        api_url: DEFAULT_CHANNEL_URL.to_string(),
        api_key: String::new(),
        model: DEFAULT_MODEL.to_string(),
        is_default: true,
    }
}
