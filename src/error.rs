//! Error taxonomy for the webhook pipeline

use axum::http::StatusCode;

/// Errors raised while verifying, decoding or answering webhook events
#[derive(Debug, thiserror::Error)]
pub enum BotError {
    #[error("Signature verification failed")]
    Authentication,

    #[error("Failed to decode {context}: {source}")]
    Decode {
        context: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("Unknown event type: {0}")]
    UnknownEventType(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Too many messages in one batch: {0} (max: {max})", max = crate::types::MAX_BATCH_MESSAGES)]
    TooManyMessages(usize),

    #[error("LINE API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Timed out while dispatching events")]
    Timeout,
}

/// Result type for pipeline operations
pub type BotResult<T> = Result<T, BotError>;

impl BotError {
    pub fn decode(context: &'static str, source: serde_json::Error) -> Self {
        Self::Decode { context, source }
    }

    /// HTTP status reported to the platform when this error ends a request
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Authentication => StatusCode::UNAUTHORIZED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            BotError::Authentication.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            BotError::UnknownEventType("beacon".to_string()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            BotError::Api {
                status: 400,
                body: "{}".to_string()
            }
            .status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_api_error_display_carries_body() {
        let err = BotError::Api {
            status: 400,
            body: r#"{"message":"Invalid reply token"}"#.to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("400"));
        assert!(text.contains("Invalid reply token"));
    }

    #[test]
    fn test_too_many_messages_display() {
        let text = BotError::TooManyMessages(7).to_string();
        assert!(text.contains('7'));
        assert!(text.contains('5'));
    }
}
