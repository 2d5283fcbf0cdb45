//! Raw HTTP/1.x wire handling for the eidc-mitm proxy.
//!
//! This crate owns everything that operates on unparsed bytes:
//!
//! - [`framer`]: splits a byte stream into whole HTTP messages using the
//!   `Content-Length` header, tolerating the controller's stray trailing
//!   whitespace.
//! - [`classify`]: cheap request/response detection and header-block
//!   utilities shared by the framer, the impersonator, and the login peek.
//! - [`impersonate`]: reshapes a re-serialized message so it is
//!   byte-for-byte indistinguishable from the endpoint being impersonated
//!   (header order, casing, whitespace quirks, query-parameter order).
//!
//! Parsing bytes into structured messages lives one layer up, in
//! `eidc-protocol`. Nothing here allocates per byte; frames are handed out
//! as cheap [`bytes::Bytes`] slices of the receive buffer.

pub mod classify;
pub mod framer;
pub mod impersonate;

mod error;

pub use classify::{content_length, header_end, is_request, is_response, Direction};
pub use error::WireError;
pub use framer::HttpFramer;
pub use impersonate::{
    impersonate, impersonate_controller_request, impersonate_controller_response,
    impersonate_manager_request, impersonate_manager_response,
};

/// `User-Agent` the manager's listener process presents on southbound
/// requests. Also the trigger for its empty-`GET` extra-CRLF bug.
pub const MANAGER_USER_AGENT: &str = "eIDCListener";

/// `Server` header value of the controller's embedded web server.
pub const CONTROLLER_SERVER_NAME: &str = "eIDC32 WebServer";
