//! Built-in transformers.

use eidc_protocol::builder::event_ack_msg;
use eidc_protocol::controller::EventRequest;
use eidc_protocol::manager::QUERY_SEQ;
use eidc_protocol::{Direction, EventType, Message, MsgType};
use tracing::{debug, trace};

use crate::error::SessionError;
use crate::session::SessionHandle;
use crate::transform::{TransformFlags, Transformer, Verdict};

/// The mandatory sequence normalizer.
///
/// The controller rejects southbound requests whose `seq` is not exactly
/// one past the last one it saw, so every sequenced request leaving the
/// proxy gets `last_seq + 1`, whatever the manager (or an injector)
/// supplied. Runs in the outbound half of the southbound relay, outside
/// the regular registry.
#[derive(Debug, Default)]
pub struct Resequencer {
    last_seq: u64,
}

impl Resequencer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_seq(&self) -> u64 {
        self.last_seq
    }
}

impl Transformer for Resequencer {
    fn transform(&mut self, msg: &mut Message, _session: &SessionHandle) -> Verdict {
        if msg.direction() != Direction::Southbound {
            return Verdict::noop();
        }
        let Some(req) = msg.request.as_mut() else {
            return Verdict::noop();
        };
        let Some(query) = req.query() else {
            return Verdict::noop();
        };

        let pairs: Vec<(String, String)> = url::form_urlencoded::parse(query.as_bytes())
            .into_owned()
            .collect();
        let Some(seq_index) = pairs.iter().position(|(k, _)| k == QUERY_SEQ) else {
            return Verdict::noop();
        };
        if pairs[seq_index].1.is_empty() {
            return Verdict::noop();
        }
        let incoming: u64 = match pairs[seq_index].1.parse() {
            Ok(value) => value,
            Err(err) => {
                return Verdict::error(
                    TransformFlags::ERR,
                    SessionError::Transformer {
                        message: format!("unparsable seq value {:?}: {err}", pairs[seq_index].1),
                    },
                );
            }
        };

        // A sequenced command is definitely going out, so the counter
        // advances whether or not the value needs fixing.
        self.last_seq += 1;

        if incoming == self.last_seq {
            trace!(seq = incoming, "sequence okay");
            return Verdict::noop();
        }

        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (index, (key, value)) in pairs.iter().enumerate() {
            if index == seq_index {
                serializer.append_pair(key, &self.last_seq.to_string());
            } else {
                serializer.append_pair(key, value);
            }
        }
        req.set_query(&serializer.finish());
        debug!(from = incoming, to = self.last_seq, "sequence rewritten");

        Verdict::success()
    }
}

/// One-shot drop of the next northbound response of a given type.
///
/// Attached alongside injected southbound requests so the provoked
/// response never reaches the manager, which did not ask for it.
#[derive(Debug)]
pub struct DropResponseByType {
    msg_type: MsgType,
}

impl DropResponseByType {
    pub fn new(msg_type: MsgType) -> Self {
        Self { msg_type }
    }
}

impl Transformer for DropResponseByType {
    fn transform(&mut self, msg: &mut Message, _session: &SessionHandle) -> Verdict {
        if msg.direction() != Direction::Northbound {
            return Verdict::noop();
        }
        if !msg.is_response() {
            return Verdict::noop();
        }
        if msg.msg_type() != self.msg_type {
            return Verdict::noop();
        }
        debug!(msg_type = %self.msg_type, "dropping response; transformer is done");
        Verdict::flags(TransformFlags::DROP | TransformFlags::DONE)
    }
}

/// Drop the next `remaining` messages of a given type, then retire.
#[derive(Debug)]
pub struct DropByType {
    pub drop_type: MsgType,
    pub remaining: usize,
}

impl DropByType {
    pub fn new(drop_type: MsgType, remaining: usize) -> Self {
        Self {
            drop_type,
            remaining,
        }
    }
}

impl Transformer for DropByType {
    fn transform(&mut self, msg: &mut Message, _session: &SessionHandle) -> Verdict {
        if msg.msg_type() != self.drop_type {
            return Verdict::noop();
        }
        self.remaining = self.remaining.saturating_sub(1);
        debug!(msg_type = %self.drop_type, remaining = self.remaining, "dropping message");
        let mut flags = TransformFlags::DROP | TransformFlags::SUCCESS;
        if self.remaining == 0 {
            flags |= TransformFlags::DONE;
        }
        Verdict::flags(flags)
    }
}

/// Suppress northbound event notifications, acknowledging them to the
/// controller on the manager's behalf.
///
/// Matching an event takes three coordinated steps: drop the event so it
/// never reaches the manager, inject a southbound `eventack` for it, and
/// attach a [`DropResponseByType`] so the controller's 200 to that ack is
/// swallowed too.
pub struct DropEvent {
    /// Event type to match after stripping the buffered flag;
    /// [`EventType::ANY`] matches every event.
    pub event_type: EventType,
    /// Only match buffered (replayed) events.
    pub only_buffered: bool,
    /// Only match live events.
    pub only_live: bool,
    /// Retire after the first match.
    pub one_shot: bool,
    /// Extra predicate consulted after the type filters; return `true`
    /// to suppress the event.
    pub filter: Option<Box<dyn Fn(&EventRequest) -> bool + Send>>,
    /// Invoked after a match has been dropped and its ack injected.
    pub post: Option<Box<dyn Fn(&SessionHandle) -> Result<(), SessionError> + Send>>,
}

impl DropEvent {
    /// A one-shot suppressor for a single event type.
    pub fn one_shot(event_type: EventType) -> Self {
        Self {
            event_type,
            only_buffered: false,
            only_live: false,
            one_shot: true,
            filter: None,
            post: None,
        }
    }
}

impl Transformer for DropEvent {
    fn transform(&mut self, msg: &mut Message, session: &SessionHandle) -> Verdict {
        if msg.direction() != Direction::Northbound {
            return Verdict::noop();
        }
        if msg.msg_type() != MsgType::EventRequest {
            return Verdict::noop();
        }

        let mut event = match msg.parse_event_request() {
            Ok(event) => event,
            Err(err) => {
                return Verdict::error(
                    TransformFlags::NOOP | TransformFlags::ERR,
                    SessionError::Parse {
                        message: err.to_string(),
                    },
                );
            }
        };

        if self.only_buffered && !event.event_type.is_buffered() {
            return Verdict::noop();
        }
        if self.only_live && event.event_type.is_buffered() {
            return Verdict::noop();
        }
        event.event_type = event.event_type.without_buffered_flag();

        if self.event_type != EventType::ANY && event.event_type != self.event_type {
            return Verdict::noop();
        }
        if let Some(filter) = &self.filter {
            if !filter(&event) {
                return Verdict::noop();
            }
        }

        // Ack the event toward the controller as the manager would have,
        // and swallow the 200 that ack provokes.
        let creds = session.api_credentials();
        let ack = match event_ack_msg(&creds.username, &creds.password, event.event_id) {
            Ok(ack) => ack,
            Err(err) => {
                return Verdict::error(
                    TransformFlags::NOOP,
                    SessionError::Inject {
                        message: err.to_string(),
                    },
                );
            }
        };
        session.inject_detached(
            ack,
            vec![Box::new(DropResponseByType::new(MsgType::EventAckResponse))],
        );
        debug!(event = %event.event_type, id = event.event_id, "suppressing event");

        let mut flags = TransformFlags::DROP;
        if self.one_shot {
            flags |= TransformFlags::DONE;
        }

        let mut verdict = Verdict::flags(flags);
        if let Some(post) = &self.post {
            if let Err(err) = post(session) {
                verdict.error = Some(err);
            }
        }
        verdict
    }
}

/// Drop the next northbound `pointStatus` request that mentions a given
/// point, then retire.
#[derive(Debug)]
pub struct DropPointStatus {
    point_id: i64,
}

impl DropPointStatus {
    pub fn new(point_id: i64) -> Self {
        Self { point_id }
    }
}

impl Transformer for DropPointStatus {
    fn transform(&mut self, msg: &mut Message, _session: &SessionHandle) -> Verdict {
        if msg.direction() != Direction::Northbound {
            return Verdict::noop();
        }
        if msg.msg_type() != MsgType::PointStatusRequest {
            return Verdict::noop();
        }
        let status = match msg.parse_point_status_request() {
            Ok(status) => status,
            Err(err) => {
                return Verdict::error(
                    TransformFlags::NOOP,
                    SessionError::Parse {
                        message: err.to_string(),
                    },
                );
            }
        };
        if status.points.iter().any(|p| p.point_id == self.point_id) {
            debug!(point = self.point_id, "dropping pointStatus");
            return Verdict::flags(TransformFlags::DROP | TransformFlags::DONE);
        }
        Verdict::noop()
    }
}
