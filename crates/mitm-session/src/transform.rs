//! The transformer capability and its per-session registry.

use std::collections::BTreeMap;
use std::ops::{BitOr, BitOrAssign};

use eidc_protocol::Message;

use crate::error::SessionError;
use crate::session::SessionHandle;

/// Bitset a transformer returns to steer the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransformFlags(u8);

impl TransformFlags {
    /// Remove this transformer after the current invocation.
    pub const DONE: TransformFlags = TransformFlags(1 << 0);
    /// Do not relay the message; deliver it to the pager as dropped.
    pub const DROP: TransformFlags = TransformFlags(1 << 1);
    /// An error occurred; report it but keep the pipeline running.
    pub const ERR: TransformFlags = TransformFlags(1 << 2);
    /// The message was mutated.
    pub const SUCCESS: TransformFlags = TransformFlags(1 << 3);
    /// The message was left untouched.
    pub const NOOP: TransformFlags = TransformFlags(1 << 4);

    pub fn contains(self, other: TransformFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for TransformFlags {
    type Output = TransformFlags;

    fn bitor(self, rhs: TransformFlags) -> TransformFlags {
        TransformFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for TransformFlags {
    fn bitor_assign(&mut self, rhs: TransformFlags) {
        self.0 |= rhs.0;
    }
}

/// Result of one transformer invocation: the steering flags plus an
/// optional error to put on the session's error hub.
#[derive(Debug)]
pub struct Verdict {
    pub flags: TransformFlags,
    pub error: Option<SessionError>,
}

impl Verdict {
    pub fn noop() -> Verdict {
        Verdict {
            flags: TransformFlags::NOOP,
            error: None,
        }
    }

    pub fn success() -> Verdict {
        Verdict {
            flags: TransformFlags::SUCCESS,
            error: None,
        }
    }

    pub fn flags(flags: TransformFlags) -> Verdict {
        Verdict { flags, error: None }
    }

    pub fn error(flags: TransformFlags, error: SessionError) -> Verdict {
        Verdict {
            flags,
            error: Some(error),
        }
    }
}

/// A pluggable per-session message hook.
///
/// Transformers see every inbound message of both directions, in
/// registration order, and may mutate it in place. Implementations run on
/// the relay task and must not block; anything asynchronous (such as
/// injecting a follow-up message) goes through
/// [`SessionHandle::inject_detached`].
pub trait Transformer: Send {
    fn transform(&mut self, msg: &mut Message, session: &SessionHandle) -> Verdict;
}

/// Registry of transformers keyed by a monotonically increasing id.
///
/// Iteration is in id order. The next id is one past the current maximum,
/// so ids stay stable for the lifetime of their transformer but may be
/// reused after the highest entry retires.
#[derive(Default)]
pub struct Registry {
    entries: BTreeMap<u64, Box<dyn Transformer>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, transformer: Box<dyn Transformer>) -> u64 {
        let id = self
            .entries
            .keys()
            .next_back()
            .map(|max| max + 1)
            .unwrap_or(0);
        self.entries.insert(id, transformer);
        id
    }

    pub fn remove(&mut self, id: u64) {
        self.entries.remove(&id);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Run the chain over `msg`. Returns whether the message was dropped;
    /// errors are pushed into `errors` in invocation order.
    ///
    /// A `DROP` halts iteration. `DONE` removes the transformer after its
    /// invocation, including when combined with `DROP`.
    pub fn run(
        &mut self,
        msg: &mut Message,
        session: &SessionHandle,
        errors: &mut Vec<SessionError>,
    ) -> bool {
        let ids: Vec<u64> = self.entries.keys().copied().collect();
        for id in ids {
            let Some(transformer) = self.entries.get_mut(&id) else {
                continue;
            };
            let verdict = transformer.transform(msg, session);

            if verdict.flags.contains(TransformFlags::ERR) || verdict.error.is_some() {
                errors.push(verdict.error.unwrap_or_else(|| SessionError::Transformer {
                    message: "unspecified transformer error".into(),
                }));
            }
            if verdict.flags.contains(TransformFlags::DONE) {
                self.entries.remove(&id);
            }
            if verdict.flags.contains(TransformFlags::DROP) {
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_combine() {
        let flags = TransformFlags::DROP | TransformFlags::DONE;
        assert!(flags.contains(TransformFlags::DROP));
        assert!(flags.contains(TransformFlags::DONE));
        assert!(!flags.contains(TransformFlags::ERR));
    }

    #[test]
    fn registry_ids_are_max_plus_one() {
        struct Nop;
        impl Transformer for Nop {
            fn transform(&mut self, _: &mut Message, _: &SessionHandle) -> Verdict {
                Verdict::noop()
            }
        }

        let mut reg = Registry::new();
        assert_eq!(reg.add(Box::new(Nop)), 0);
        assert_eq!(reg.add(Box::new(Nop)), 1);
        reg.remove(0);
        // Highest id still present governs the next id.
        assert_eq!(reg.add(Box::new(Nop)), 2);
        reg.remove(2);
        reg.remove(1);
        assert_eq!(reg.add(Box::new(Nop)), 0);
    }
}
