//! Listener, TLS plumbing, and the accept loop that births sessions.
//!
//! The [`Server`] accepts controller connections (optionally TLS with the
//! ancient cipher the devices insist on), peeks the login request to
//! learn which manager the controller wants, dials that manager, and
//! hands both sockets to a new [`mitm_session::Session`]. New sessions
//! are announced to every registered subscriber; the embedder installs
//! its transformers and releases the relay lock.

pub mod dial;
pub mod login;
pub mod server;
pub mod tls;

mod error;

pub use dial::{canonicalize_host, connect_manager, DialMode};
pub use error::ServerError;
pub use login::peek_login;
pub use server::{Server, ServerConfig};
pub use tls::TlsIdentity;
