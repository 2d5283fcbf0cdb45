use thiserror::Error;

/// Listener-level errors, surfaced on the server's error channel.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind listener: {0}")]
    Bind(std::io::Error),

    #[error("accept failed: {0}")]
    Accept(std::io::Error),

    #[error("TLS setup failed: {0}")]
    Tls(#[from] openssl::error::ErrorStack),

    #[error("TLS handshake failed: {0}")]
    Handshake(String),

    #[error("could not reach manager {host}: {message}")]
    Dial { host: String, message: String },

    #[error("login peek failed: {0}")]
    Login(String),

    #[error("initial exchange timed out")]
    Timeout,

    #[error("key log file unavailable: {0}")]
    KeyLog(std::io::Error),

    #[error("listener closed")]
    Closed,
}
