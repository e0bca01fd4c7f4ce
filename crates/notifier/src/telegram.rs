//! Telegram Bot API client.
//!
//! Only the handful of methods the worker needs: `getMe`, `sendDice`,
//! `sendMessage` and `getUpdates`. Every call is a JSON `POST` to
//! `{api_url}/bot{token}/{method}`; the Bot API answers with an envelope
//! `{ ok, result | error_code, description }` even on non-2xx statuses.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use dicebot_common::types::DiceVariant;

use crate::channel::{BotIdentity, ChannelError, NotificationChannel};

/// HTTP timeout for a single request; must exceed the long-poll timeout.
const HTTP_TIMEOUT: Duration = Duration::from_secs(60);

/// Response envelope returned by every Bot API method.
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    error_code: Option<i64>,
    description: Option<String>,
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
struct ResponseParameters {
    retry_after: Option<u64>,
}

impl<T> ApiResponse<T> {
    /// Unwrap the envelope, classifying failures by their Bot API error code.
    fn into_result(self) -> Result<T, ChannelError> {
        let description = self
            .description
            .unwrap_or_else(|| "no description".to_string());

        if !self.ok {
            return Err(match self.error_code {
                Some(401) => ChannelError::Unauthorized(description),
                Some(429) => ChannelError::RateLimited {
                    retry_after: self.parameters.and_then(|p| p.retry_after),
                },
                code => ChannelError::Rejected {
                    code: code.unwrap_or_default(),
                    description,
                },
            });
        }

        self.result
            .ok_or_else(|| ChannelError::NoOutcome(format!("empty result: {description}")))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Dice {
    pub emoji: String,
    pub value: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    pub from: Option<User>,
    pub text: Option<String>,
    pub dice: Option<Dice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
}

#[derive(Serialize)]
struct SendDice<'a> {
    chat_id: &'a str,
    emoji: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to_message_id: Option<i64>,
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to_message_id: Option<i64>,
}

#[derive(Serialize)]
struct GetUpdates {
    #[serde(skip_serializing_if = "Option::is_none")]
    offset: Option<i64>,
    timeout: u64,
    allowed_updates: [&'static str; 1],
}

/// Thin async client over the Telegram Bot API.
#[derive(Clone)]
pub struct TelegramClient {
    http: reqwest::Client,
    base_url: String,
}

impl TelegramClient {
    pub fn new(api_url: &str, token: &str) -> Result<Self, ChannelError> {
        let http = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;
        Ok(Self {
            http,
            base_url: format!("{}/bot{}", api_url.trim_end_matches('/'), token),
        })
    }

    async fn call<P, T>(&self, method: &str, params: &P) -> Result<T, ChannelError>
    where
        P: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response: ApiResponse<T> = self
            .http
            .post(format!("{}/{}", self.base_url, method))
            .json(params)
            .send()
            .await?
            .json()
            .await?;

        response.into_result()
    }

    pub async fn get_me(&self) -> Result<User, ChannelError> {
        self.call("getMe", &serde_json::json!({})).await
    }

    pub async fn send_dice(
        &self,
        chat_id: &str,
        variant: DiceVariant,
        reply_to_message_id: Option<i64>,
    ) -> Result<Message, ChannelError> {
        let params = SendDice {
            chat_id,
            emoji: variant.emoji(),
            reply_to_message_id,
        };
        self.call("sendDice", &params).await
    }

    pub async fn send_message(
        &self,
        chat_id: &str,
        text: &str,
        reply_to_message_id: Option<i64>,
    ) -> Result<Message, ChannelError> {
        let params = SendMessage {
            chat_id,
            text,
            reply_to_message_id,
        };
        self.call("sendMessage", &params).await
    }

    /// Long-poll for new messages starting at `offset`.
    pub async fn get_updates(
        &self,
        offset: Option<i64>,
        timeout_secs: u64,
    ) -> Result<Vec<Update>, ChannelError> {
        let params = GetUpdates {
            offset,
            timeout: timeout_secs,
            allowed_updates: ["message"],
        };
        self.call("getUpdates", &params).await
    }
}

/// Extract the landed value from a `sendDice` reply.
fn dice_value(message: &Message) -> Result<i64, ChannelError> {
    message
        .dice
        .as_ref()
        .map(|d| d.value)
        .ok_or_else(|| {
            ChannelError::NoOutcome(format!("message {} carries no dice", message.message_id))
        })
}

#[async_trait]
impl NotificationChannel for TelegramClient {
    async fn identify(&self) -> Result<BotIdentity, ChannelError> {
        let me = self.get_me().await?;
        Ok(BotIdentity {
            id: me.id,
            username: me.username,
        })
    }

    async fn send_random_event(
        &self,
        chat_ref: &str,
        variant: DiceVariant,
    ) -> Result<i64, ChannelError> {
        let message = self.send_dice(chat_ref, variant, None).await?;
        dice_value(&message)
    }
}
