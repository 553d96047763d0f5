//! One-shot "say" command

use std::error::Error;
use std::io::{self, Write};

use tokio_util::sync::CancellationToken;

use crate::core::chat_client::ChatClient;
use crate::core::config::{ConfigOrchestrator, ConfigStore};
use crate::core::conversation::Conversation;
use crate::core::session::{ChatSession, SendOutcome};

pub async fn run_say<S: ConfigStore>(
    orchestrator: ConfigOrchestrator<S>,
    client: ChatClient,
    prompt: Vec<String>,
) -> Result<(), Box<dyn Error>> {
    let prompt = prompt.join(" ");
    if prompt.trim().is_empty() {
        eprintln!("Usage: chitter say <prompt>");
        std::process::exit(1);
    }

    let mut session = ChatSession::new(orchestrator, client, Conversation::new());
    let mut stdout = io::stdout();
    match say(&mut session, &prompt, &mut stdout).await? {
        SendOutcome::Failed(_) => {
            if let Some(message) = session.conversation().last() {
                eprintln!("❌ Error: {}", message.content());
            }
            std::process::exit(1);
        }
        SendOutcome::Cancelled { .. } => std::process::exit(130),
        SendOutcome::Completed { .. } | SendOutcome::Ignored => Ok(()),
    }
}

/// Stream the reply to `prompt` into `out`; Ctrl+C cancels it.
pub async fn say<S, W>(
    session: &mut ChatSession<S>,
    prompt: &str,
    out: &mut W,
) -> Result<SendOutcome, Box<dyn Error>>
where
    S: ConfigStore,
    W: Write,
{
    let cancel = CancellationToken::new();
    let watcher = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        }
    });

    let mut printed = false;
    let outcome = session
        .send_user_message(prompt, &cancel, |fragment| {
            printed = true;
            let _ = write!(out, "{fragment}");
            let _ = out.flush();
        })
        .await;
    watcher.abort();

    let outcome = outcome?;
    if printed || !matches!(outcome, SendOutcome::Failed(_)) {
        writeln!(out)?;
    }
    Ok(outcome)
}
