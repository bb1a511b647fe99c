use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    /// The server answered with a non-success status.
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// The request failed below HTTP. `connect` is set when it never reached
    /// the server.
    #[error("Transport error: {message}")]
    Transport { message: String, connect: bool },

    #[error("Decode error: {0}")]
    Decode(String),

    /// A success status with `success: false` in the envelope.
    #[error("API error: {0}")]
    Api(String),

    #[error("No session: call init_session first")]
    NoSession,

    #[error("Invalid URL: {0}")]
    Url(String),

    #[error("Cancelled")]
    Cancelled,
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return ClientError::Decode(err.to_string());
        }
        if let Some(status) = err.status() {
            return ClientError::Http {
                status: status.as_u16(),
                message: err.to_string(),
            };
        }
        ClientError::Transport {
            connect: err.is_connect(),
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Decode(err.to_string())
    }
}

impl From<url::ParseError> for ClientError {
    fn from(err: url::ParseError) -> Self {
        ClientError::Url(err.to_string())
    }
}
