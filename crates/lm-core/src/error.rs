use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("API error: {message} (status: {status})")]
    Api { status: u16, message: String },

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Timeout: {0}")]
    Timeout(String),
}

impl Error {
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth(message.into())
    }

    pub fn rate_limit(message: impl Into<String>) -> Self {
        Self::RateLimit(message.into())
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }

    pub fn stream(message: impl Into<String>) -> Self {
        Self::Stream(message.into())
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout(message.into())
    }

    /// Build the error for a non-2xx backend response.
    ///
    /// The backend reports failures as `{"detail": "..."}`; anything else is
    /// kept verbatim.
    pub fn from_status(status: u16, body: &str) -> Self {
        #[derive(serde::Deserialize)]
        struct ErrorBody {
            detail: serde_json::Value,
        }

        let message = match serde_json::from_str::<ErrorBody>(body) {
            Ok(ErrorBody {
                detail: serde_json::Value::String(detail),
            }) => detail,
            Ok(ErrorBody { detail }) => detail.to_string(),
            Err(_) if body.trim().is_empty() => format!("HTTP error! status: {}", status),
            Err(_) => body.to_string(),
        };

        match status {
            401 | 403 => Error::auth(message),
            429 => Error::rate_limit(message),
            400 | 422 => Error::invalid_request(message),
            _ => Error::api(status, message),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Network(_) | Error::RateLimit(_) | Error::Timeout(_) | Error::Stream(_)
        )
    }

    pub fn is_auth_error(&self) -> bool {
        matches!(self, Error::Auth(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::api(500, "Internal failure");
        assert!(err.to_string().contains("500"));
        assert!(err.to_string().contains("Internal failure"));
    }

    #[test]
    fn test_is_retryable() {
        assert!(Error::network("connection reset").is_retryable());
        assert!(Error::rate_limit("too many requests").is_retryable());
        assert!(Error::stream("body ended early").is_retryable());
        assert!(!Error::auth("invalid token").is_retryable());
        assert!(Error::timeout("no response").is_retryable());
        assert!(!Error::invalid_request("bad body").is_retryable());
    }

    #[test]
    fn test_from_status_detail() {
        let err = Error::from_status(401, r#"{"detail": "Session not found"}"#);
        assert!(err.is_auth_error());
        assert_eq!(err.to_string(), "Authentication error: Session not found");

        let err = Error::from_status(429, r#"{"detail": "slow down"}"#);
        assert!(matches!(err, Error::RateLimit(ref m) if m == "slow down"));
    }

    #[test]
    fn test_from_status_structured_detail() {
        let err = Error::from_status(422, r#"{"detail": [{"msg": "field required"}]}"#);
        match err {
            Error::InvalidRequest(message) => assert!(message.contains("field required")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_from_status_plain_body() {
        let err = Error::from_status(502, "Bad Gateway");
        assert!(matches!(err, Error::Api { status: 502, ref message } if message == "Bad Gateway"));

        let err = Error::from_status(500, "");
        assert!(err.to_string().contains("status: 500"));
    }
}
