//! Notification channel for the dice worker.
//!
//! - [`channel`]: the `NotificationChannel` boundary consumed by the worker
//! - [`telegram`]: Telegram Bot API client implementing it (`getMe`, `sendDice`)
//! - [`listener`]: long-polling inbound listener for help text and inline `/roll`

pub mod channel;
pub mod listener;
pub mod telegram;

pub use channel::{BotIdentity, ChannelError, NotificationChannel};
