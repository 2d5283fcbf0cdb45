use thiserror::Error;

/// Errors fanned out to session error subscribers.
///
/// These cross task and subscriber boundaries, so every variant carries
/// its detail as a string and the whole enum is `Clone`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("framing error: {message}")]
    Framing { message: String },

    #[error("parse error: {message}")]
    Parse { message: String },

    #[error("transformer error: {message}")]
    Transformer { message: String },

    #[error("marshal error: {message}")]
    Marshal { message: String },

    #[error("impersonation error: {message}")]
    Impersonate { message: String },

    #[error("injection error: {message}")]
    Inject { message: String },

    #[error("read error: {message}")]
    Read { message: String },

    #[error("write error: {message}")]
    Write { message: String },
}
