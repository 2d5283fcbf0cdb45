use thiserror::Error;

/// Errors produced while framing or rewriting raw HTTP bytes.
#[derive(Debug, Error)]
pub enum WireError {
    /// `Content-Length` header found but its value could not be read.
    #[error("malformed Content-Length header: {0:?}")]
    ContentLength(String),

    /// The stream ended in the middle of a message.
    #[error("stream ended inside a partial HTTP message ({buffered} bytes buffered)")]
    Truncated { buffered: usize },

    /// Input is neither an HTTP request nor an HTTP response.
    #[error("data is neither an HTTP request nor a response")]
    NotHttp,

    /// The header block of a message could not be located.
    #[error("no header terminator in {0} bytes")]
    MissingHeaderEnd(usize),
}
