//! Scripted notification channel for worker tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use dicebot_common::types::DiceVariant;
use dicebot_notifier::{BotIdentity, ChannelError, NotificationChannel};

/// What the channel does when a given chat is targeted.
#[derive(Clone)]
pub(crate) enum Script {
    Value(i64),
    Forbidden,
    Unauthorized,
    /// HTTP 429 with the given `retry_after` seconds.
    RateLimited(u64),
    Hang,
}

type Hook = Box<dyn Fn(&str) + Send + Sync>;

/// Channel answering per chat from a script; unscripted chats roll `default_value`.
pub(crate) struct ScriptedChannel {
    scripts: HashMap<String, Script>,
    default_value: i64,
    delay: Option<Duration>,
    on_send: Option<Hook>,
    identify_fails: bool,
    sent: Mutex<Vec<(String, DiceVariant)>>,
}

impl ScriptedChannel {
    pub(crate) fn rolling(value: i64) -> Self {
        Self {
            scripts: HashMap::new(),
            default_value: value,
            delay: None,
            on_send: None,
            identify_fails: false,
            sent: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn with_script(mut self, chat: &str, script: Script) -> Self {
        self.scripts.insert(chat.to_string(), script);
        self
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Run `hook` with the chat id before each send resolves.
    pub(crate) fn on_send(mut self, hook: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_send = Some(Box::new(hook));
        self
    }

    pub(crate) fn failing_identify(mut self) -> Self {
        self.identify_fails = true;
        self
    }

    pub(crate) fn sent(&self) -> Vec<(String, DiceVariant)> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl NotificationChannel for ScriptedChannel {
    async fn identify(&self) -> Result<BotIdentity, ChannelError> {
        if self.identify_fails {
            return Err(ChannelError::Unauthorized("Unauthorized".to_string()));
        }
        Ok(BotIdentity {
            id: 1,
            username: Some("scripted_bot".to_string()),
        })
    }

    async fn send_random_event(
        &self,
        chat_ref: &str,
        variant: DiceVariant,
    ) -> Result<i64, ChannelError> {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push((chat_ref.to_string(), variant));
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(hook) = &self.on_send {
            hook(chat_ref);
        }

        match self.scripts.get(chat_ref) {
            None => Ok(self.default_value),
            Some(Script::Value(v)) => Ok(*v),
            Some(Script::Forbidden) => Err(ChannelError::Rejected {
                code: 403,
                description: "Forbidden: bot was kicked from the group chat".to_string(),
            }),
            Some(Script::Unauthorized) => {
                Err(ChannelError::Unauthorized("Unauthorized".to_string()))
            }
            Some(Script::RateLimited(secs)) => Err(ChannelError::RateLimited {
                retry_after: Some(*secs),
            }),
            Some(Script::Hang) => std::future::pending().await,
        }
    }
}
