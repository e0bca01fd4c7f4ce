use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lowest value a randomized action can produce.
pub const MIN_ROLL_VALUE: i16 = 1;

/// Highest value a randomized action can produce.
pub const MAX_ROLL_VALUE: i16 = 6;

/// Lifecycle status of a roll request.
///
/// A row starts `Pending` and moves exactly once to `Completed` or `Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Completed,
    Error,
}

impl RequestStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, RequestStatus::Pending)
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestStatus::Pending => write!(f, "pending"),
            RequestStatus::Completed => write!(f, "completed"),
            RequestStatus::Error => write!(f, "error"),
        }
    }
}

/// Animated randomized action dispatched to a chat.
///
/// Every variant yields a value within `[MIN_ROLL_VALUE, MAX_ROLL_VALUE]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiceVariant {
    #[default]
    Dice,
    Darts,
    Bowling,
    Basketball,
    Football,
}

impl DiceVariant {
    pub const ALL: [DiceVariant; 5] = [
        DiceVariant::Dice,
        DiceVariant::Darts,
        DiceVariant::Bowling,
        DiceVariant::Basketball,
        DiceVariant::Football,
    ];

    /// Emoji the chat platform animates for this variant.
    pub fn emoji(self) -> &'static str {
        match self {
            DiceVariant::Dice => "🎲",
            DiceVariant::Darts => "🎯",
            DiceVariant::Bowling => "🎳",
            DiceVariant::Basketball => "🏀",
            DiceVariant::Football => "⚽",
        }
    }

    /// Resolve the optional `variant` column of a request.
    ///
    /// `None` and blank tags select the default die; unknown tags are rejected.
    pub fn resolve(tag: Option<&str>) -> Result<Self, UnknownVariant> {
        match tag.map(str::trim) {
            None | Some("") => Ok(DiceVariant::default()),
            Some(tag) => tag.parse(),
        }
    }
}

impl std::fmt::Display for DiceVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiceVariant::Dice => write!(f, "dice"),
            DiceVariant::Darts => write!(f, "darts"),
            DiceVariant::Bowling => write!(f, "bowling"),
            DiceVariant::Basketball => write!(f, "basketball"),
            DiceVariant::Football => write!(f, "football"),
        }
    }
}

/// A variant tag that names no known action.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown variant: {0}")]
pub struct UnknownVariant(pub String);

impl std::str::FromStr for DiceVariant {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.to_ascii_lowercase();
        DiceVariant::ALL
            .into_iter()
            .find(|v| v.to_string() == lowered || v.emoji() == s)
            .ok_or_else(|| UnknownVariant(s.to_string()))
    }
}

/// Where roll requests come from, selected once at startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestSource {
    /// Claim pending rows from the shared `roll_requests` table.
    #[default]
    QueuePoll,
    /// Answer `/roll` chat commands directly, without the table.
    InlineTrigger,
}

impl std::str::FromStr for RequestSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "queue_poll" | "queue-poll" | "poll" => Ok(RequestSource::QueuePoll),
            "inline_trigger" | "inline-trigger" | "inline" => Ok(RequestSource::InlineTrigger),
            other => Err(format!("unknown request source: {other}")),
        }
    }
}

impl std::fmt::Display for RequestSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestSource::QueuePoll => write!(f, "queue_poll"),
            RequestSource::InlineTrigger => write!(f, "inline_trigger"),
        }
    }
}

/// A persisted randomization request, inserted by the producer application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct RollRequest {
    pub request_id: Uuid,
    pub game_id: String,
    pub chat_id: String,
    pub user_id: String,
    pub variant: Option<String>,
    pub status: RequestStatus,
    pub roll_value: Option<i16>,
    pub requested_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// Terminal `(status, roll_value)` pair recorded for a request.
///
/// Construction guarantees `roll_value` is set iff the status is `Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    status: RequestStatus,
    roll_value: Option<i16>,
}

impl Outcome {
    /// Map a value reported by the channel. Out-of-range values are not usable.
    pub fn from_roll(value: i64) -> Self {
        match i16::try_from(value) {
            Ok(v) if (MIN_ROLL_VALUE..=MAX_ROLL_VALUE).contains(&v) => Self {
                status: RequestStatus::Completed,
                roll_value: Some(v),
            },
            _ => Self::error(),
        }
    }

    pub fn error() -> Self {
        Self {
            status: RequestStatus::Error,
            roll_value: None,
        }
    }

    pub fn status(&self) -> RequestStatus {
        self.status
    }

    pub fn roll_value(&self) -> Option<i16> {
        self.roll_value
    }

    pub fn is_completed(&self) -> bool {
        self.status == RequestStatus::Completed
    }
}
