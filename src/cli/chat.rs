//! Line-oriented interactive chat

use std::error::Error;
use std::io::{self, Write};

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::core::chat_client::{readiness_notice, ChatClient};
use crate::core::config::{ConfigOrchestrator, ConfigStore};
use crate::core::conversation::Conversation;
use crate::core::session::{ChatSession, SendOutcome};

pub const GREETING: &str = "How can I help you?";
const QUIT_COMMAND: &str = "/quit";

pub async fn run_chat<S: ConfigStore>(
    orchestrator: ConfigOrchestrator<S>,
    client: ChatClient,
) -> Result<(), Box<dyn Error>> {
    let mut session = ChatSession::new(orchestrator, client, Conversation::with_greeting(GREETING));
    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = io::stdout();
    chat_loop(&mut session, stdin, &mut stdout).await
}

/// Read prompts from `input` until EOF, `/quit` or Ctrl+C while idle.
pub async fn chat_loop<S, R, W>(
    session: &mut ChatSession<S>,
    input: R,
    out: &mut W,
) -> Result<(), Box<dyn Error>>
where
    S: ConfigStore,
    R: AsyncBufRead + Unpin,
    W: Write,
{
    if let Some(greeting) = session.conversation().last() {
        writeln!(out, "{}", greeting.content())?;
    }
    let config = session.config().current().await?;
    if let Some(notice) = readiness_notice(&config) {
        writeln!(out, "⚠️  {notice}")?;
    }

    let mut lines = input.lines();
    loop {
        write!(out, "> ")?;
        out.flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                writeln!(out)?;
                break;
            }
        };
        let Some(line) = line else {
            writeln!(out)?;
            break;
        };
        let prompt = line.trim();
        if prompt == QUIT_COMMAND {
            break;
        }
        if prompt.is_empty() {
            continue;
        }

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

        match outcome? {
            SendOutcome::Completed { .. } => writeln!(out)?,
            SendOutcome::Cancelled { .. } => writeln!(out, "\n[cancelled]")?,
            SendOutcome::Failed(kind) => {
                debug!(?kind, "reply failed");
                if printed {
                    writeln!(out)?;
                }
                if let Some(message) = session.conversation().last() {
                    writeln!(out, "❌ {}", message.content())?;
                }
            }
            SendOutcome::Ignored => {}
        }
    }
    Ok(())
}
