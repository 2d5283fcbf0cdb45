//! The per-connection session engine.
//!
//! A [`Session`] owns one proxied connection: the controller-side socket,
//! the manager-side socket, and the four long-lived tasks that move
//! messages between them (an inbound read+transform half and an outbound
//! resequence+write half per direction). Messages pass through the
//! registered [`Transformer`] chain, the mandatory [`Resequencer`], and
//! are published to the session's [`message_pager::Pager`] whether they
//! are relayed, dropped, or injected.
//!
//! ```text
//! controller -> framer -> parse -> state -> transformers -+-> reseq -> impersonate -> manager
//!                                                         |
//!                                                       pager
//! ```
//!
//! Sessions start with the relay lock held so the embedder can install
//! transformers and pager subscriptions before the first message moves;
//! call [`Session::begin_relaying`] to start traffic.

pub mod builtin;
pub mod session;
pub mod state;
pub mod transform;

mod error;
mod latch;

pub use builtin::{DropByType, DropEvent, DropPointStatus, DropResponseByType, Resequencer};
pub use error::SessionError;
pub use latch::Latch;
pub use session::{ConnectionDetail, MitmEndpoints, Session, SessionHandle};
pub use state::{Credentials, SessionState};
pub use transform::{Registry, TransformFlags, Transformer, Verdict};
