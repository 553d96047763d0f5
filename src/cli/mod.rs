//! Command-line interface parsing and handling
//!
//! This module handles parsing command-line arguments and executing the appropriate commands.

pub mod channels;
pub mod chat;
pub mod say;

use std::error::Error;
use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser, Subcommand};

use crate::cli::channels::{
    add_channel, edit_channel, list_channels, select_channel, select_model, set_channel_key,
};
use crate::cli::chat::run_chat;
use crate::cli::say::run_say;
use crate::core::chat_client::{
    ChatClient, ClientSettings, DEFAULT_CONNECT_TIMEOUT, DEFAULT_READ_TIMEOUT,
};
use crate::core::config::{ChannelDraft, ChannelEdit, ConfigOrchestrator, FileConfigStore};
use crate::utils::logging::init_tracing;

#[derive(Parser)]
#[command(name = "chitter", version)]
#[command(about = "A streaming chat client for OpenAI-compatible APIs")]
#[command(
    long_about = "Chitter talks to any OpenAI-compatible chat-completion endpoint and streams \
replies to the terminal as they arrive.\n\n\
Endpoints are configured as channels; a fresh configuration starts with an OpenAI \
channel that only needs an API key:\n\
  chitter channel set-key openai sk-...\n\n\
Controls (chat):\n\
  Enter             Send the message\n\
  Ctrl+C            Cancel the reply in progress, or quit when idle\n\
  /quit             Quit the application\n\n\
Environment Variables:\n\
  RUST_LOG          Override the diagnostic log filter (logs go to stderr)"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to the configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Increase diagnostic output (-v info, -vv debug)
    #[arg(short = 'v', long = "verbose", global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Seconds allowed for establishing a connection
    #[arg(
        long,
        global = true,
        value_name = "SECS",
        default_value_t = DEFAULT_CONNECT_TIMEOUT.as_secs()
    )]
    pub connect_timeout: u64,

    /// Seconds allowed between reads of the response
    #[arg(
        long,
        global = true,
        value_name = "SECS",
        default_value_t = DEFAULT_READ_TIMEOUT.as_secs()
    )]
    pub read_timeout: u64,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start an interactive chat (default)
    Chat,
    /// Send a single prompt and print the reply
    Say {
        /// Prompt text (multiple words are joined with spaces)
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        prompt: Vec<String>,
    },
    /// List configured channels
    Channels,
    /// Add, select or edit a channel
    Channel {
        #[command(subcommand)]
        action: ChannelCommand,
    },
    /// List built-in models, or select one for the current channel
    Model {
        /// Model to select
        id: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum ChannelCommand {
    /// Add a custom channel
    Add {
        #[arg(long)]
        name: String,
        /// Full chat-completions endpoint URL
        #[arg(long)]
        url: String,
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        key: Option<String>,
        /// Explicit channel id (defaults to a timestamp)
        #[arg(long)]
        id: Option<String>,
    },
    /// Make a channel the current one
    Select { id: String },
    /// Set the API key of a channel
    SetKey { id: String, key: String },
    /// Change a custom channel's settings
    Edit {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        url: Option<String>,
        #[arg(long)]
        model: Option<String>,
    },
}

impl Args {
    fn client_settings(&self) -> ClientSettings {
        ClientSettings {
            connect_timeout: Duration::from_secs(self.connect_timeout),
            read_timeout: Duration::from_secs(self.read_timeout),
        }
    }

    fn config_store(&self) -> Result<FileConfigStore, Box<dyn Error>> {
        Ok(match &self.config {
            Some(path) => FileConfigStore::new(path),
            None => FileConfigStore::at_default_location()?,
        })
    }
}

pub fn main() -> Result<(), Box<dyn Error>> {
    let runtime = tokio::runtime::Runtime::new()?;
    let result = runtime.block_on(async_main());
    // A pending stdin read would otherwise keep shutdown waiting for input.
    runtime.shutdown_background();
    result
}

async fn async_main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let orchestrator = ConfigOrchestrator::new(args.config_store()?);
    let settings = args.client_settings();

    match args.command.unwrap_or(Commands::Chat) {
        Commands::Chat => {
            let client = ChatClient::new(settings)?;
            run_chat(orchestrator, client).await
        }
        Commands::Say { prompt } => {
            let client = ChatClient::new(settings)?;
            run_say(orchestrator, client, prompt).await
        }
        Commands::Channels => list_channels(&orchestrator).await,
        Commands::Channel { action } => match action {
            ChannelCommand::Add {
                name,
                url,
                model,
                key,
                id,
            } => {
                let draft = ChannelDraft {
                    id,
                    name,
                    api_url: url,
                    api_key: key.unwrap_or_default(),
                    model,
                };
                add_channel(&orchestrator, draft).await
            }
            ChannelCommand::Select { id } => select_channel(&orchestrator, &id).await,
            ChannelCommand::SetKey { id, key } => set_channel_key(&orchestrator, &id, &key).await,
            ChannelCommand::Edit {
                id,
                name,
                url,
                model,
            } => {
                let edit = ChannelEdit {
                    name,
                    api_url: url,
                    model,
                    ..ChannelEdit::default()
                };
                edit_channel(&orchestrator, &id, edit).await
            }
        },
        Commands::Model { id } => select_model(&orchestrator, id.as_deref()).await,
    }
}
