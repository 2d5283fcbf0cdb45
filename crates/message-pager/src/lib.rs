//! Pub-sub fan-out of parsed messages to session observers.
//!
//! Subscribers register either a set of [`MsgType`]s or a single
//! [`Category`]; compound categories expand into the atomic
//! request/response x direction categories at subscribe time. Each
//! subscriber record owns a bounded queue; delivery is a timed send that
//! silently skips a subscriber who does not accept in time, so one stuck
//! observer can delay a message by at most the timeout rather than wedge
//! the relay.
//!
//! ```text
//! relay halves --> Pager::distribute --> [subscriber queues] --> observers
//! ```

pub mod category;
pub mod pager;

pub use category::Category;
pub use pager::{Pager, Subscription};
