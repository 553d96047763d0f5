//! Channel and model management commands.

use std::error::Error;

use crate::core::builtin_models::{find_builtin_model, BUILTIN_MODELS};
use crate::core::config::data::mask_api_key;
use crate::core::config::{ChannelDraft, ChannelEdit, Config, ConfigOrchestrator, ConfigStore};

pub fn format_channel_list(config: &Config) -> String {
    if config.channels.is_empty() {
        return "No channels configured.\n".to_string();
    }

    let mut out = String::from("Channels:\n\n");
    for channel in &config.channels {
        let marker = if channel.id == config.current_channel_id {
            "*"
        } else {
            " "
        };
        out.push_str(&format!(
            "{marker} {} ({})\n    url:   {}\n    model: {}\n    key:   {}\n",
            channel.id,
            channel.name,
            channel.api_url,
            config.effective_model(channel),
            mask_api_key(&channel.api_key),
        ));
    }
    out.push_str("\n* = current channel\n");
    out
}

pub fn format_model_list(config: &Config) -> String {
    let current = config
        .current_channel()
        .map(|channel| config.effective_model(channel));

    let mut out = String::from("Built-in models:\n\n");
    for model in BUILTIN_MODELS {
        let marker = if current.as_deref() == Some(model.id) {
            "*"
        } else {
            " "
        };
        out.push_str(&format!(
            "{marker} {:<12} {} - {}\n",
            model.id, model.display_name, model.description
        ));
    }
    if let Some(current) = current {
        match find_builtin_model(&current) {
            Some(model) => {
                out.push_str(&format!("\nCurrent model: {current} ({})\n", model.display_name))
            }
            None => out.push_str(&format!("\nCurrent model: {current} (custom)\n")),
        }
    }
    out
}

pub async fn list_channels<S: ConfigStore>(
    orchestrator: &ConfigOrchestrator<S>,
) -> Result<(), Box<dyn Error>> {
    let config = orchestrator.current().await?;
    print!("{}", format_channel_list(&config));
    Ok(())
}

pub async fn add_channel<S: ConfigStore>(
    orchestrator: &ConfigOrchestrator<S>,
    draft: ChannelDraft,
) -> Result<(), Box<dyn Error>> {
    let id = orchestrator
        .mutate(|config| config.add_channel(draft).map(|channel| channel.id.clone()))
        .await?;
    println!("✅ Added channel: {id}");
    println!("Select it with: chitter channel select {id}");
    Ok(())
}

pub async fn select_channel<S: ConfigStore>(
    orchestrator: &ConfigOrchestrator<S>,
    id: &str,
) -> Result<(), Box<dyn Error>> {
    orchestrator
        .mutate(|config| config.select_channel(id))
        .await?;
    println!("✅ Current channel: {id}");
    Ok(())
}

pub async fn set_channel_key<S: ConfigStore>(
    orchestrator: &ConfigOrchestrator<S>,
    id: &str,
    key: &str,
) -> Result<(), Box<dyn Error>> {
    orchestrator
        .mutate(|config| config.set_channel_api_key(id, key))
        .await?;
    println!("✅ Updated API key for channel: {id}");
    Ok(())
}

pub async fn edit_channel<S: ConfigStore>(
    orchestrator: &ConfigOrchestrator<S>,
    id: &str,
    edit: ChannelEdit,
) -> Result<(), Box<dyn Error>> {
    orchestrator
        .mutate(|config| config.edit_channel(id, edit))
        .await?;
    println!("✅ Updated channel: {id}");
    Ok(())
}

/// Without an id, list the built-in models; with one, select it.
pub async fn select_model<S: ConfigStore>(
    orchestrator: &ConfigOrchestrator<S>,
    id: Option<&str>,
) -> Result<(), Box<dyn Error>> {
    match id {
        None => {
            let config = orchestrator.current().await?;
            print!("{}", format_model_list(&config));
        }
        Some(model) => {
            orchestrator
                .mutate(|config| config.select_model(model))
                .await?;
            let model = model.trim();
            println!("✅ Model set to: {model}");
            if find_builtin_model(model).is_none() {
                println!("Note: {model} is not a built-in model; the channel must support it");
            }
        }
    }
    Ok(())
}
