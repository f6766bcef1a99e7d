//! §3 `APIData`: per-connection state owned by the API facade, wrapping a
//! socket and a protocol handle.

use crate::containers::Buffer;
use crate::http::HttpMessage;
use crate::reactor::EventMask;
use crate::sock::Socket;
use crate::ws::WsFrame;
use std::time::Duration;

/// `data.role` (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Server,
    Client,
    Peer,
    Manual,
}

/// `data.type` — protocol carried over this connection (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Raw,
    Http,
    Ws,
    /// Named in §3's data model but never elaborated in the spec body; the
    /// facade treats it as a raw pass-through channel (see `DESIGN.md`).
    Mdtp,
}

/// `data.protocol_handle` (§3): the codec state attached to this
/// connection, if any.
pub enum ProtoHandle {
    None,
    Http(HttpMessage),
    Ws(WsFrame),
}

impl ProtoHandle {
    pub fn as_http_mut(&mut self) -> Option<&mut HttpMessage> {
        match self {
            ProtoHandle::Http(msg) => Some(msg),
            _ => None,
        }
    }

    pub fn as_ws_mut(&mut self) -> Option<&mut WsFrame> {
        match self {
            ProtoHandle::Ws(frame) => Some(frame),
            _ => None,
        }
    }
}

/// §3 `APIData`. `U` is the user session payload (§9 redesign note: a
/// generic parameter rather than a `void*` user session pointer).
pub struct ConnData<U> {
    pub address: String,
    pub port: u16,
    pub uri: String,
    pub events: EventMask,
    pub socket: Socket,
    pub rx: Buffer,
    pub tx: Buffer,
    pub protocol: Protocol,
    pub role: Role,
    pub cancel: bool,
    pub read_on_write: bool,
    pub write_on_read: bool,
    pub ws_handshake_done: bool,
    pub proto: ProtoHandle,
    /// True once a `Role::Client` connection's non-blocking connect has
    /// completed (first writable event); always true for `Server`/`Peer`,
    /// which are already established at `accept` time.
    pub connected: bool,
    session: Option<U>,

    pub(crate) pending_events: Option<EventMask>,
    pub(crate) pending_timer: Option<Duration>,
    pub(crate) want_disconnect: bool,
}

impl<U> ConnData<U> {
    pub fn new(socket: Socket, role: Role, protocol: Protocol) -> ConnData<U> {
        let connected = !matches!(role, Role::Client);

        ConnData {
            address: String::new(),
            port: 0,
            uri: String::new(),
            events: EventMask::IN,
            socket,
            rx: Buffer::new(),
            tx: Buffer::new(),
            protocol,
            role,
            cancel: false,
            read_on_write: false,
            write_on_read: false,
            ws_handshake_done: false,
            proto: ProtoHandle::None,
            connected,
            session: None,
            pending_events: None,
            pending_timer: None,
            want_disconnect: false,
        }
    }

    pub fn session(&self) -> Option<&U> {
        self.session.as_ref()
    }

    pub fn session_mut(&mut self) -> Option<&mut U> {
        self.session.as_mut()
    }

    pub fn set_session(&mut self, session: U) {
        self.session = Some(session);
    }

    /// Requests the reactor re-arm this connection's event mask once the
    /// callback returns. By convention callbacks arm `POLLIN` on
    /// `Accepted`; nothing is armed automatically beyond the facade's own
    /// bookkeeping (Read/Write dispatch), matching §5's "arming is the
    /// callback's responsibility".
    pub fn arm(&mut self, mask: EventMask) {
        self.pending_events = Some(mask);
    }

    /// Arms (or idempotently extends) this connection's inactivity timer.
    pub fn set_timer(&mut self, timeout: Duration) {
        self.pending_timer = Some(timeout);
    }

    /// §5: "Setting `data.cancel = true` causes the next I/O dispatch to
    /// disconnect rather than invoke a codec."
    pub fn disconnect(&mut self) {
        self.cancel = true;
        self.want_disconnect = true;
    }

    pub(crate) fn take_pending_events(&mut self) -> Option<EventMask> {
        self.pending_events.take()
    }

    pub(crate) fn take_pending_timer(&mut self) -> Option<Duration> {
        self.pending_timer.take()
    }

    pub(crate) fn wants_disconnect(&self) -> bool {
        self.want_disconnect
    }
}
