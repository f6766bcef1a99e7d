//! Per-descriptor handle owned by the reactor (§3 `EventData`).

use mio::Token;
use std::ops::{BitAnd, BitOr};

/// `ctx.type` tag (§3): what kind of thing a `Token` refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleType {
    Listener,
    Peer,
    Client,
    Timer,
    Event,
    Custom,
}

/// Normalized event bits (§6.4). Only `IN`/`OUT` are ever handed to
/// `mio::Interest` — `PRI`/`ERR`/`HUP`/`RDHUP` are readiness the OS reports
/// unconditionally once a descriptor is registered and are never armed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EventMask(u8);

impl EventMask {
    pub const NONE: EventMask = EventMask(0);
    pub const IN: EventMask = EventMask(1 << 0);
    pub const OUT: EventMask = EventMask(1 << 1);
    pub const PRI: EventMask = EventMask(1 << 2);
    pub const ERR: EventMask = EventMask(1 << 3);
    pub const HUP: EventMask = EventMask(1 << 4);
    pub const RDHUP: EventMask = EventMask(1 << 5);

    pub fn contains(self, other: EventMask) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Maps the armable subset of this mask onto `mio::Interest`. Panics if
    /// neither `IN` nor `OUT` is set, matching mio's own non-empty-interest
    /// requirement; callers should always request at least one direction.
    pub fn to_interest(self) -> mio::Interest {
        let mut interest = if self.contains(EventMask::IN) {
            Some(mio::Interest::READABLE)
        } else {
            None
        };

        if self.contains(EventMask::OUT) {
            interest = Some(match interest {
                Some(existing) => existing | mio::Interest::WRITABLE,
                None => mio::Interest::WRITABLE,
            });
        }

        interest.unwrap_or(mio::Interest::READABLE)
    }
}

impl BitOr for EventMask {
    type Output = EventMask;
    fn bitor(self, rhs: EventMask) -> EventMask {
        EventMask(self.0 | rhs.0)
    }
}

impl BitAnd for EventMask {
    type Output = EventMask;
    fn bitand(self, rhs: EventMask) -> EventMask {
        EventMask(self.0 & rhs.0)
    }
}

/// §3 `EventData`: owning reactor is implicit (the arena it lives in); the
/// opaque user context is the generic `T` rather than a `void*` (§9 redesign
/// note).
pub struct EventData<T> {
    pub token: Token,
    pub handle_type: HandleType,
    pub mask: EventMask,
    pub open: bool,
    pub context: T,
}

impl<T> EventData<T> {
    pub fn new(token: Token, handle_type: HandleType, mask: EventMask, context: T) -> EventData<T> {
        EventData {
            token,
            handle_type,
            mask,
            open: true,
            context,
        }
    }
}
