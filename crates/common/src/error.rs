use thiserror::Error;

/// Process-level error types shared by the worker binary and its crates.
#[derive(Debug, Error)]
pub enum AppError {
    /// A required setting is missing or unparsable. Fatal at startup.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The store or the notification channel could not be reached at startup.
    #[error("Connectivity error: {0}")]
    Connectivity(String),
}
