//! Parsed message model for the controller/manager access-control protocol.
//!
//! A [`Message`] is one framed HTTP message, classified as request or
//! response, tagged with a [`MsgType`], and carrying both its parsed head
//! and its original bytes. The proxy's transformers mutate messages in
//! this form; [`Message::marshal`] turns them back into wire bytes that
//! the impersonation layer then fingerprints.
//!
//! Module layout mirrors the two endpoints:
//!
//! - [`controller`]: northbound payload shapes and typing (what the
//!   door controller sends, and how its web server answers commands).
//! - [`manager`]: southbound payload shapes, the command URI tables, and
//!   southbound typing.
//! - [`event`]: the controller's 16-bit event-type space.
//! - [`builder`]: synthetic messages for injection.

pub mod builder;
pub mod controller;
pub mod event;
pub mod manager;
pub mod message;
pub mod types;

mod error;

pub use error::ProtocolError;
pub use event::EventType;
pub use http_wire::Direction;
pub use message::{HeaderList, Message, RequestHead, ResponseHead};
pub use types::MsgType;

/// MIME type used for every JSON body in the protocol.
pub const APPLICATION_JSON: &str = "application/json";
