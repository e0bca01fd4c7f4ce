//! Inbound chat listener.
//!
//! Long-polls `getUpdates` and answers chat commands:
//! - `/start`, `/help`: usage text
//! - `/roll [variant]`: an animated roll in the same chat, only when the worker
//!   runs with the inline-trigger request source

use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;

use dicebot_common::types::{DiceVariant, RequestSource, UnknownVariant};

use crate::channel::ChannelError;
use crate::telegram::{Message, TelegramClient, Update};

/// Long-poll timeout passed to `getUpdates`, in seconds.
const LONG_POLL_SECS: u64 = 25;

/// Pause after a failed `getUpdates` before polling again.
const ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// A recognised chat command.
#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    Help,
    Roll(Result<DiceVariant, UnknownVariant>),
}

/// Parse a message text into a command.
///
/// Accepts the `/command@botname` form Telegram uses in group chats.
pub fn parse_command(text: &str) -> Option<Command> {
    let mut parts = text.split_whitespace();
    let head = parts.next()?.strip_prefix('/')?;
    let name = head.split('@').next().unwrap_or(head);

    match name.to_ascii_lowercase().as_str() {
        "start" | "help" => Some(Command::Help),
        "roll" => Some(Command::Roll(DiceVariant::resolve(parts.next()))),
        _ => None,
    }
}

/// Usage text rendered for `/help`.
pub fn help_text(source: RequestSource) -> String {
    let variants = DiceVariant::ALL
        .iter()
        .map(|v| format!("{} {}", v.emoji(), v))
        .collect::<Vec<_>>()
        .join(", ");

    match source {
        RequestSource::InlineTrigger => format!(
            "Send /roll to throw a die, or /roll <variant> for another animation.\nVariants: {variants}"
        ),
        RequestSource::QueuePoll => format!(
            "Rolls are requested by your game and delivered here automatically.\nVariants: {variants}"
        ),
    }
}

/// Inbound listener over a [`TelegramClient`].
pub struct TelegramListener {
    client: TelegramClient,
    source: RequestSource,
}

impl TelegramListener {
    pub fn new(client: TelegramClient, source: RequestSource) -> Self {
        Self { client, source }
    }

    /// Start polling on a background task.
    pub fn spawn(self) -> ListenerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(shutdown_rx));
        ListenerHandle {
            shutdown: shutdown_tx,
            task: Mutex::new(Some(task)),
        }
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(source = %self.source, "Chat listener started");
        let mut offset: Option<i64> = None;

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                result = self.client.get_updates(offset, LONG_POLL_SECS) => match result {
                    Ok(updates) => {
                        for update in updates {
                            offset = Some(update.update_id + 1);
                            self.handle_update(update).await;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "getUpdates failed, backing off");
                        tokio::select! {
                            _ = shutdown.changed() => break,
                            _ = tokio::time::sleep(ERROR_BACKOFF) => {}
                        }
                    }
                },
            }
        }

        tracing::info!("Chat listener stopped");
    }

    async fn handle_update(&self, update: Update) {
        let Some(message) = update.message else {
            return;
        };
        if message.from.as_ref().is_some_and(|u| u.is_bot) {
            return;
        }
        let Some(command) = message.text.as_deref().and_then(parse_command) else {
            return;
        };

        if let Err(e) = self.respond(&message, command).await {
            tracing::warn!(
                chat_id = message.chat.id,
                error = %e,
                "Failed to answer chat command"
            );
        }
    }

    async fn respond(
        &self,
        message: &Message,
        command: Command,
    ) -> Result<(), ChannelError> {
        let chat_id = message.chat.id.to_string();
        let reply_to = Some(message.message_id);

        match (command, self.source) {
            (Command::Roll(Ok(variant)), RequestSource::InlineTrigger) => {
                let sent = self.client.send_dice(&chat_id, variant, reply_to).await?;
                tracing::info!(
                    chat_id = message.chat.id,
                    variant = %variant,
                    value = sent.dice.map(|d| d.value),
                    "Inline roll sent"
                );
            }
            (Command::Roll(Err(unknown)), RequestSource::InlineTrigger) => {
                let text = format!("{unknown}\n\n{}", help_text(self.source));
                self.client.send_message(&chat_id, &text, reply_to).await?;
            }
            (Command::Help, _) | (Command::Roll(_), RequestSource::QueuePoll) => {
                self.client
                    .send_message(&chat_id, &help_text(self.source), reply_to)
                    .await?;
            }
        }

        Ok(())
    }
}

/// Stop handle for a spawned [`TelegramListener`].
pub struct ListenerHandle {
    shutdown: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ListenerHandle {
    /// Whether the polling task has exited.
    pub fn is_finished(&self) -> bool {
        match self.task.try_lock() {
            Ok(task) => task.as_ref().is_none_or(|t| t.is_finished()),
            Err(_) => false,
        }
    }

    /// Stop polling and wait for the task to exit. Later calls are no-ops.
    pub async fn stop(&self) {
        let Some(task) = self.task.lock().await.take() else {
            return;
        };
        let _ = self.shutdown.send(true);
        if let Err(e) = task.await {
            tracing::error!(error = %e, "Chat listener task failed");
        }
    }
}
