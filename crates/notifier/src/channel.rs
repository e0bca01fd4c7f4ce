use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use dicebot_common::types::DiceVariant;

/// Errors raised by a notification channel.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// HTTP-level failure. Built through `From`, which strips the request URL.
    #[error("Transport error: {0}")]
    Transport(#[source] reqwest::Error),

    /// The platform refused this particular delivery (bad chat, bot blocked, ...).
    #[error("Delivery rejected ({code}): {description}")]
    Rejected { code: i64, description: String },

    /// The bot credentials were refused. Not specific to any chat.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Rate limited (retry after {retry_after:?}s)")]
    RateLimited { retry_after: Option<u64> },

    /// The call succeeded but carried no randomized value.
    #[error("No usable outcome: {0}")]
    NoOutcome(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),
}

impl From<reqwest::Error> for ChannelError {
    /// Bot API URLs embed the bot token, so it never reaches the error text.
    fn from(e: reqwest::Error) -> Self {
        ChannelError::Transport(e.without_url())
    }
}

impl ChannelError {
    /// Whether the failure belongs to the single delivery that raised it.
    ///
    /// Delivery failures are recorded on the row. A revoked token or rate
    /// limiting affects every row alike and is handled at the batch level.
    pub fn is_delivery_failure(&self) -> bool {
        !matches!(
            self,
            ChannelError::Unauthorized(_) | ChannelError::RateLimited { .. }
        )
    }
}

/// Identity reported by the channel's handshake call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotIdentity {
    pub id: i64,
    pub username: Option<String>,
}

impl std::fmt::Display for BotIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.username {
            Some(name) => write!(f, "@{} ({})", name, self.id),
            None => write!(f, "{}", self.id),
        }
    }
}

/// The side-effecting randomized action consumed by the worker.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Handshake used as a startup connectivity check.
    async fn identify(&self) -> Result<BotIdentity, ChannelError>;

    /// Send an animated random event to `chat_ref` and return the value it landed on.
    async fn send_random_event(
        &self,
        chat_ref: &str,
        variant: DiceVariant,
    ) -> Result<i64, ChannelError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delivery_failure_classification() {
        assert!(
            ChannelError::Rejected {
                code: 403,
                description: "Forbidden: bot was blocked by the user".into(),
            }
            .is_delivery_failure()
        );
        assert!(ChannelError::NoOutcome("missing dice".into()).is_delivery_failure());
        assert!(ChannelError::Timeout(Duration::from_secs(10)).is_delivery_failure());
        assert!(!ChannelError::Unauthorized("Unauthorized".into()).is_delivery_failure());
        assert!(!ChannelError::RateLimited { retry_after: Some(3) }.is_delivery_failure());
    }

    #[test]
    fn test_identity_display() {
        let named = BotIdentity {
            id: 42,
            username: Some("roll_bot".into()),
        };
        assert_eq!(named.to_string(), "@roll_bot (42)");
        let anonymous = BotIdentity { id: 7, username: None };
        assert_eq!(anonymous.to_string(), "7");
    }
}
