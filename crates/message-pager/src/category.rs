//! Subscription categories.

use std::fmt;

use eidc_protocol::{Direction, Message};

/// Broad message class a subscriber may register for.
///
/// The four `*Request`/`*Response` per-direction values are atomic; a
/// message belongs to exactly one of them. The rest are compound and
/// expand to a set of atomic categories when the subscription is made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Any,
    AnyNorthbound,
    AnyNorthboundRequest,
    AnyNorthboundResponse,
    AnySouthbound,
    AnySouthboundRequest,
    AnySouthboundResponse,
    AnyRequest,
    AnyResponse,
}

impl Category {
    /// The atomic category a message belongs to.
    pub fn of(msg: &Message) -> Category {
        match (msg.direction(), msg.is_request()) {
            (Direction::Northbound, true) => Category::AnyNorthboundRequest,
            (Direction::Northbound, false) => Category::AnyNorthboundResponse,
            (Direction::Southbound, true) => Category::AnySouthboundRequest,
            (Direction::Southbound, false) => Category::AnySouthboundResponse,
        }
    }

    /// Expand a possibly-compound category into atomic ones.
    pub fn expand(self) -> Vec<Category> {
        use Category::*;
        match self {
            Any => vec![
                AnyNorthboundRequest,
                AnyNorthboundResponse,
                AnySouthboundRequest,
                AnySouthboundResponse,
            ],
            AnyNorthbound => vec![AnyNorthboundRequest, AnyNorthboundResponse],
            AnySouthbound => vec![AnySouthboundRequest, AnySouthboundResponse],
            AnyRequest => vec![AnyNorthboundRequest, AnySouthboundRequest],
            AnyResponse => vec![AnyNorthboundResponse, AnySouthboundResponse],
            atomic => vec![atomic],
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Category::Any => "Any",
            Category::AnyNorthbound => "Any Northbound",
            Category::AnyNorthboundRequest => "Any Northbound Request",
            Category::AnyNorthboundResponse => "Any Northbound Response",
            Category::AnySouthbound => "Any Southbound",
            Category::AnySouthboundRequest => "Any Southbound Request",
            Category::AnySouthboundResponse => "Any Southbound Response",
            Category::AnyRequest => "Any Request",
            Category::AnyResponse => "Any Response",
        };
        write!(f, "Message Category '{name}'")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compound_expansion() {
        assert_eq!(Category::Any.expand().len(), 4);
        assert_eq!(
            Category::AnyNorthbound.expand(),
            vec![Category::AnyNorthboundRequest, Category::AnyNorthboundResponse]
        );
        assert_eq!(
            Category::AnyRequest.expand(),
            vec![Category::AnyNorthboundRequest, Category::AnySouthboundRequest]
        );
    }

    #[test]
    fn atomic_expansion_is_identity() {
        assert_eq!(
            Category::AnySouthboundResponse.expand(),
            vec![Category::AnySouthboundResponse]
        );
    }

    #[test]
    fn category_of_message() {
        let msg = Message::parse(
            &b"GET /eidc/heartbeat HTTP/1.1\r\nHost: h\r\n\r\n"[..],
            Direction::Southbound,
        )
        .unwrap();
        assert_eq!(Category::of(&msg), Category::AnySouthboundRequest);
    }
}
