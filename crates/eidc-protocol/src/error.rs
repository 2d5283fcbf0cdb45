use thiserror::Error;

/// Errors from parsing, typing, or marshalling protocol messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Input is neither a request nor a response.
    #[error("data is neither an HTTP request nor a response")]
    NotHttp,

    /// The HTTP head could not be parsed.
    #[error("malformed HTTP head: {0}")]
    Head(#[from] httparse::Error),

    /// A frame ended before its head was complete.
    #[error("incomplete HTTP head")]
    IncompleteHead,

    /// A JSON body did not match the expected shape.
    #[error("body decode failed: {0}")]
    Body(#[from] serde_json::Error),

    /// A message wrapper carried an unexpected command echo.
    #[error("unexpected cmd value: expected {expected}, got {got}")]
    UnexpectedCmd { expected: String, got: String },

    /// The message cannot be marshalled (no request or response head).
    #[error("message has neither request nor response populated")]
    EmptyMessage,

    /// A builder was given invalid input.
    #[error("invalid builder input: {0}")]
    Builder(String),

    /// The login request did not look like a controller login.
    #[error("initial message is not a controller login: {0}")]
    NotLogin(String),

    /// A named header was not found in a raw message.
    #[error("header {0:?} not present in raw message")]
    HeaderNotFound(String),
}
