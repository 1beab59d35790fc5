//! Error type shared by every external-service client.

use thiserror::Error;

/// Errors that can occur while talking to an external service.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// A required credential is empty.  Raised before any request is sent.
    #[error("{0} API key is missing")]
    MissingCredential(&'static str),

    /// HTTP transport or connection error.
    #[error("HTTP request failed: {0}")]
    Request(String),

    /// The request did not complete within the configured timeout.
    #[error("request timed out")]
    Timeout,

    /// The service answered with an error status.
    #[error("{service} API failed ({status}): {message}")]
    Api {
        service: &'static str,
        status: u16,
        message: String,
    },

    /// The response did not have the expected structure.
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl From<reqwest::Error> for ServiceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ServiceError::Timeout
        } else {
            ServiceError::Request(e.to_string())
        }
    }
}

impl ServiceError {
    /// Build an [`ServiceError::Api`] from an error response body.
    ///
    /// Understands `{"error": {"message": ...}}` and
    /// `{"detail": {"message": ...}}` / `{"detail": "..."}`; anything else
    /// yields a generic message.
    pub fn from_response(service: &'static str, status: u16, body: &str) -> Self {
        let message = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|json| {
                json["error"]["message"]
                    .as_str()
                    .or_else(|| json["detail"]["message"].as_str())
                    .or_else(|| json["detail"].as_str())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| format!("{service} API failed"));

        ServiceError::Api {
            service,
            status,
            message,
        }
    }
}
