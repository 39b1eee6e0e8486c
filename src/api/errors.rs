//! Error types for the stats API client.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP error: {status_code} - {message}")]
    Http { status_code: u16, message: String },

    #[error("Rate limited (retry after {retry_after}s)")]
    RateLimited { retry_after: u64 },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Unknown team id in response: {0}")]
    UnknownTeam(u32),

    #[error("Game {0} not found in schedule response")]
    GameNotFound(i64),

    #[error("Request failed after {attempts} attempts: {last_error}")]
    MaxRetriesExceeded { attempts: u32, last_error: String },
}

impl ApiError {
    /// Whether this error is worth retrying within the same request.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. }
                | Self::Network(_)
                | Self::Timeout(_)
                | Self::Http {
                    status_code: 500..=599,
                    ..
                }
        )
    }
}
