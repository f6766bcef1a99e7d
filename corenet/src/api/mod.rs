//! §3/§4.5 API facade: a `Reactor<ConnData<U>>` plus the translation layer
//! that turns raw reactor `Reason`s into the protocol-aware `ApiContext`
//! callback contract (§4.6), dispatching HTTP/WS codecs and TLS handshakes
//! along the way.

pub mod auth;
pub mod connection;
pub mod context;
pub mod endpoint;

pub use auth::{authorize_http, respond_http};
pub use connection::{ConnData, ProtoHandle, Protocol, Role};
pub use context::{ApiContext, CbResult, CbType, StatusDomain};
pub use endpoint::{Endpoint, EndpointRole};

use crate::error::{CoreError, CoreResult, HttpStatus, SockStatus};
use crate::http::{HttpMessage, HttpMethod};
use crate::reactor::{EventData, EventMask, HandleType, Reactor, Reason};
use crate::sock::{Socket, SockFlags};
use crate::ws::{WsFrame, WsFrameType};
use mio::Token;
use std::io::Read as _;
use std::marker::PhantomData;
use std::time::Duration;

/// §4.4 `CbAction` lives in `reactor`; this is the API layer's own
/// translation of the four legal `CbResult` values onto it.
use crate::reactor::CbAction;

/// Bound on how many times one `service()` call will re-poll with a
/// zero timeout to drain a batch that keeps handing back listener accepts
/// (§4.4's "Accept breaks the descriptor loop" applied repeatedly). Without
/// this, a sufficiently bursty `accept` backlog could starve the caller's
/// own event loop turn indefinitely.
const MAX_ACCEPT_DRAIN: usize = 64;

/// §3 `Api`: the facade applications are expected to hold onto. `U` is the
/// per-connection user session payload threaded through `ConnData::session`.
pub struct Api<U> {
    reactor: Reactor<ConnData<U>>,
    logger: slog::Logger,
}

pub struct ApiBuilder<U> {
    max_connections: usize,
    logger: Option<slog::Logger>,
    _marker: PhantomData<U>,
}

impl<U> Default for ApiBuilder<U> {
    fn default() -> ApiBuilder<U> {
        ApiBuilder {
            max_connections: 1024,
            logger: None,
            _marker: PhantomData,
        }
    }
}

impl<U> ApiBuilder<U> {
    pub fn max_connections(mut self, n: usize) -> ApiBuilder<U> {
        self.max_connections = n;
        self
    }

    pub fn logger(mut self, logger: slog::Logger) -> ApiBuilder<U> {
        self.logger = Some(logger);
        self
    }

    pub fn build(self) -> CoreResult<Api<U>> {
        let logger = self
            .logger
            .unwrap_or_else(|| crate::logging::terminal(sloggers::types::Severity::Info));

        let reactor = Reactor::create(self.max_connections, false, logger.clone())?;
        Ok(Api { reactor, logger })
    }
}

impl<U> Api<U> {
    pub fn builder() -> ApiBuilder<U> {
        ApiBuilder::default()
    }

    pub fn logger(&self) -> &slog::Logger {
        &self.logger
    }

    pub fn len(&self) -> usize {
        self.reactor.len()
    }

    /// Actual bound address of a listener/peer/client token, queried from
    /// the OS. Needed after `add_endpoint` binds `addr:0` (an ephemeral
    /// port, as in §8 S1) to learn which port the OS assigned.
    pub fn local_addr(&self, token: Token) -> Option<crate::sock::SocketAddress> {
        self.reactor.get(token)?.context.socket.local_addr()
    }

    pub fn session(&self, token: Token) -> Option<&U> {
        self.reactor.get(token).and_then(|data| data.context.session())
    }

    pub fn session_mut(&mut self, token: Token) -> Option<&mut U> {
        self.reactor.get_mut(token).and_then(|data| data.context.session_mut())
    }

    pub fn set_session(&mut self, token: Token, session: U) {
        if let Some(data) = self.reactor.get_mut(token) {
            data.context.set_session(session);
        }
    }

    /// Tears a connection down immediately, outside the regular dispatch
    /// path (e.g. an admin command closing a session).
    pub fn disconnect(&mut self, token: Token) {
        self.reactor.delete_with(token, |conn: &mut ConnData<U>| &mut conn.socket);
    }

    /// **AddEndpoint** (§4.5): binds a listener or dials a client, installs
    /// TLS when requested, and registers it with the reactor.
    pub fn add_endpoint(&mut self, endpoint: Endpoint) -> CoreResult<Token> {
        let flags = endpoint_flags(&endpoint);

        let bind_addr = endpoint
            .unix_path
            .as_ref()
            .map(|path| path.to_string_lossy().into_owned())
            .unwrap_or_else(|| endpoint.address.clone());

        let mut socket = Socket::create(flags, &bind_addr, endpoint.port, endpoint.backlog)?;

        if endpoint.tls && endpoint.role == EndpointRole::Server {
            if let Some(cert) = &endpoint.cert {
                socket.set_ssl_cert(cert)?;
            }
        }

        socket.set_non_blocking(true)?;

        let role = match endpoint.role {
            EndpointRole::Server => Role::Server,
            EndpointRole::Client => Role::Client,
        };

        let mut conn = ConnData::new(socket, role, endpoint.protocol);
        conn.address = endpoint.address.clone();
        conn.port = endpoint.port;
        conn.uri = endpoint.uri.clone();

        let (mask, handle_type) = match endpoint.role {
            EndpointRole::Server => (EventMask::IN, HandleType::Listener),
            EndpointRole::Client => (EventMask::OUT, HandleType::Client),
        };

        let token = self
            .reactor
            .register_owned(mask, handle_type, conn, |c: &mut ConnData<U>| &mut c.socket)?;

        Ok(token)
    }

    /// **Service(timeout_ms)** (§4.4/§4.6): polls once, translating every
    /// fired descriptor through the protocol dispatch below, then drains any
    /// listener accepts the reactor reported (bounded by `MAX_ACCEPT_DRAIN`)
    /// before returning.
    pub fn service<F>(&mut self, timeout: Option<Duration>, mut callback: F) -> CoreResult<crate::error::EventStatus>
    where
        F: FnMut(ApiContext, &mut ConnData<U>) -> CbResult,
    {
        let mut remaining_timeout = timeout;

        for _ in 0..MAX_ACCEPT_DRAIN {
            let outcome = self.reactor.service(
                remaining_timeout,
                &mut |conn: &mut ConnData<U>| -> &mut Socket { &mut conn.socket },
                &mut |data, reason| dispatch_event(data, reason, &mut callback),
            )?;

            self.apply_pending();

            match outcome.accept_token {
                Some(listener_token) => {
                    self.accept_one(listener_token, &mut callback);
                    self.apply_pending();
                    remaining_timeout = Some(Duration::from_millis(0));
                }
                None => return Ok(outcome.status),
            }
        }

        slog::warn!(self.logger, "service: accept backlog exceeded drain bound"; "bound" => MAX_ACCEPT_DRAIN);
        Ok(crate::error::EventStatus::Success)
    }

    /// Drains every pending connection queued on `listener_token`, firing
    /// `CbType::Accepted` for each. A listener socket can report more than
    /// one ready peer per wakeup; accepting in a loop until `WantRead`
    /// avoids leaving connections queued in the OS backlog unnecessarily.
    fn accept_one<F>(&mut self, listener_token: Token, callback: &mut F)
    where
        F: FnMut(ApiContext, &mut ConnData<U>) -> CbResult,
    {
        let protocol = match self.reactor.get(listener_token) {
            Some(data) if data.handle_type == HandleType::Listener => data.context.protocol,
            _ => return,
        };

        loop {
            let accepted = match self.reactor.get_mut(listener_token) {
                Some(data) => data.context.socket.accept(),
                None => return,
            };

            let mut peer = match accepted {
                Ok(peer) => peer,
                Err(SockStatus::WantRead) | Err(SockStatus::WantWrite) => return,
                Err(err) => {
                    slog::warn!(self.logger, "accept failed"; "error" => %err);
                    return;
                }
            };

            if peer.set_non_blocking(true).is_err() {
                continue;
            }

            let mut conn = ConnData::new(peer, Role::Peer, protocol);
            conn.connected = true;

            let token = match self
                .reactor
                .register_owned(EventMask::IN, HandleType::Peer, conn, |c: &mut ConnData<U>| &mut c.socket)
            {
                Ok(token) => token,
                Err(err) => {
                    slog::warn!(self.logger, "failed to register accepted peer"; "error" => %err);
                    continue;
                }
            };

            if let Some(data) = self.reactor.get_mut(token) {
                let ctx = ApiContext::new(CbType::Accepted, StatusDomain::Sock, 0, token);
                if translate_result(callback(ctx, &mut data.context)) == CbAction::Disconnect {
                    self.reactor.delete_with(token, |c: &mut ConnData<U>| &mut c.socket);
                }
            }
        }
    }

    /// Applies every `arm`/`set_timer`/`disconnect` call a user callback
    /// made against its `ConnData` this round (§4.6: these are requests the
    /// callback records, not actions it can take directly — see
    /// `ConnData`'s doc comment). A full sweep rather than per-token
    /// tracking: simpler, and one `service()` round only ever touches a
    /// handful of live connections.
    fn apply_pending(&mut self) {
        let mut rearm = Vec::new();
        let mut retime = Vec::new();
        let mut disconnect = Vec::new();

        for data in self.reactor.iter_mut() {
            let conn = &mut data.context;

            if let Some(mask) = conn.take_pending_events() {
                rearm.push((data.token, mask));
            }
            if let Some(timeout) = conn.take_pending_timer() {
                retime.push((data.token, timeout));
            }
            if conn.wants_disconnect() {
                disconnect.push(data.token);
            }
        }

        for (token, mask) in rearm {
            let _ = self.reactor.modify_with(token, mask, |c: &mut ConnData<U>| &mut c.socket);
        }
        for (token, timeout) in retime {
            self.reactor.extend_timer(token, timeout);
        }
        for token in disconnect {
            self.reactor.delete_with(token, |c: &mut ConnData<U>| &mut c.socket);
        }
    }
}

fn endpoint_flags(endpoint: &Endpoint) -> SockFlags {
    let mut flags = match (endpoint.role, endpoint.unix_path.is_some()) {
        (EndpointRole::Server, true) => SockFlags::UNIX_SERVER,
        (EndpointRole::Server, false) => SockFlags::TCP_SERVER,
        (EndpointRole::Client, true) => SockFlags::UNIX_CLIENT,
        (EndpointRole::Client, false) => SockFlags::TCP_CLIENT,
    };

    if endpoint.tls {
        flags = flags | SockFlags::SSL;
    }
    if endpoint.force_bind {
        flags = flags | SockFlags::FORCE;
    }

    flags
}

fn translate_result(result: CbResult) -> CbAction {
    match result {
        CbResult::Continue | CbResult::NoAction => CbAction::Continue,
        CbResult::UserCall => CbAction::UserCall,
        CbResult::Disconnect => CbAction::Disconnect,
    }
}

/// The per-event translator handed to `Reactor::service`: turns a raw
/// `Reason` into zero or more `ApiContext` callback invocations.
fn dispatch_event<U>(
    data: &mut EventData<ConnData<U>>,
    reason: Reason,
    callback: &mut dyn FnMut(ApiContext, &mut ConnData<U>) -> CbResult,
) -> CbAction {
    let token = data.token;

    if data.handle_type == HandleType::Listener {
        return match reason {
            Reason::Read => CbAction::Accept,
            _ => CbAction::Continue,
        };
    }

    let conn = &mut data.context;

    match reason {
        Reason::Clear => {
            let ctx = ApiContext::new(CbType::Closed, StatusDomain::Event, 0, token);
            let _ = callback(ctx, conn);
            CbAction::Continue
        }
        Reason::Closed | Reason::Hanged => {
            let ctx = ApiContext::new(CbType::Closed, StatusDomain::Sock, 0, token);
            let _ = callback(ctx, conn);
            CbAction::Disconnect
        }
        Reason::Error => {
            let ctx = ApiContext::new(CbType::Error, StatusDomain::Sock, 0, token);
            let _ = callback(ctx, conn);
            CbAction::Disconnect
        }
        Reason::Exception => {
            let ctx = ApiContext::new(CbType::Status, StatusDomain::Sock, 0, token);
            translate_result(callback(ctx, conn))
        }
        Reason::Timeout => {
            let ctx = ApiContext::new(CbType::Timeout, StatusDomain::Event, 0, token);
            translate_result(callback(ctx, conn))
        }
        Reason::Write => dispatch_write(token, conn, callback),
        Reason::Read => dispatch_read(token, conn, callback),
    }
}

/// §4.4 "write handlers run before read handlers": drives any in-progress
/// TLS handshake, fires `Connected` once for a client socket's first
/// writable event, flushes `conn.tx`, and fires `Complete` once it drains.
fn dispatch_write<U>(
    token: Token,
    conn: &mut ConnData<U>,
    callback: &mut dyn FnMut(ApiContext, &mut ConnData<U>) -> CbResult,
) -> CbAction {
    if conn.cancel {
        return CbAction::Disconnect;
    }

    if conn.socket.is_tls() && !conn.socket.is_tls_connected() {
        match conn.socket.drive_tls_handshake() {
            Ok(true) => {}
            Ok(false) => return CbAction::Continue,
            Err(_) => {
                let ctx = ApiContext::new(CbType::Error, StatusDomain::Sock, 0, token);
                let _ = callback(ctx, conn);
                return CbAction::Disconnect;
            }
        }
    }

    if !conn.connected {
        conn.connected = true;
        let ctx = ApiContext::new(CbType::Connected, StatusDomain::Sock, 0, token);
        if translate_result(callback(ctx, conn)) == CbAction::Disconnect {
            return CbAction::Disconnect;
        }
    }

    match conn.tx.egress(&mut conn.socket) {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
        Err(_) => {
            let ctx = ApiContext::new(CbType::Error, StatusDomain::Sock, 0, token);
            let _ = callback(ctx, conn);
            return CbAction::Disconnect;
        }
    }

    if !conn.tx.is_empty() {
        return CbAction::Continue;
    }

    let ctx = ApiContext::new(CbType::Complete, StatusDomain::Sock, 0, token);
    let action = translate_result(callback(ctx, conn));

    if action != CbAction::Disconnect && conn.read_on_write {
        return dispatch_read(token, conn, callback);
    }

    action
}

/// Reads what's available into `conn.rx`, then hands it to the protocol
/// codec selected by `conn.protocol`.
fn dispatch_read<U>(
    token: Token,
    conn: &mut ConnData<U>,
    callback: &mut dyn FnMut(ApiContext, &mut ConnData<U>) -> CbResult,
) -> CbAction {
    if conn.cancel {
        return CbAction::Disconnect;
    }

    if conn.socket.is_tls() && !conn.socket.is_tls_connected() {
        match conn.socket.drive_tls_handshake() {
            Ok(true) => {}
            Ok(false) => return CbAction::Continue,
            Err(_) => {
                let ctx = ApiContext::new(CbType::Error, StatusDomain::Sock, 0, token);
                let _ = callback(ctx, conn);
                return CbAction::Disconnect;
            }
        }
    }

    match conn.rx.ingress(&mut conn.socket) {
        Ok(0) if conn.rx.is_empty() => {
            let ctx = ApiContext::new(CbType::Closed, StatusDomain::Sock, 0, token);
            let _ = callback(ctx, conn);
            return CbAction::Disconnect;
        }
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
        Err(_) => {
            let ctx = ApiContext::new(CbType::Error, StatusDomain::Sock, 0, token);
            let _ = callback(ctx, conn);
            return CbAction::Disconnect;
        }
    }

    match conn.protocol {
        Protocol::Raw | Protocol::Mdtp => {
            let ctx = ApiContext::new(CbType::Read, StatusDomain::Sock, 0, token);
            let action = translate_result(callback(ctx, conn));
            if action != CbAction::Disconnect && conn.write_on_read {
                return dispatch_write(token, conn, callback);
            }
            action
        }
        Protocol::Http => dispatch_http(token, conn, callback),
        Protocol::Ws => dispatch_ws(token, conn, callback),
    }
}

/// §4.2 integration: feeds `conn.rx` into the connection's `HttpMessage`
/// and fires `Complete`/`Error` off `parse()`'s own state machine. Pipelined
/// requests are out of scope (§ Non-goals: chunked transfer-encoding) —
/// bytes past one completed message wait for the next read event.
fn dispatch_http<U>(
    token: Token,
    conn: &mut ConnData<U>,
    callback: &mut dyn FnMut(ApiContext, &mut ConnData<U>) -> CbResult,
) -> CbAction {
    if matches!(conn.proto, ProtoHandle::None) {
        conn.proto = ProtoHandle::Http(HttpMessage::init_request(HttpMethod::Dummy, "", "1.1"));
    }

    let mut buf = [0u8; 8192];
    loop {
        let n = match conn.rx.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(_) => break,
        };
        if let Some(msg) = conn.proto.as_http_mut() {
            msg.feed(&buf[..n]);
        }
    }

    let status = match conn.proto.as_http_mut() {
        Some(msg) => msg.parse(),
        None => return CbAction::Continue,
    };

    match status {
        Ok(HttpStatus::Complete) => {
            let ctx = ApiContext::new(CbType::Complete, StatusDomain::Http, HttpStatus::Complete as i32, token);
            let action = translate_result(callback(ctx, conn));
            if let Some(msg) = conn.proto.as_http_mut() {
                msg.recycle();
            }
            action
        }
        Ok(_) => CbAction::Continue,
        Err(status) => {
            let ctx = ApiContext::new(CbType::Error, StatusDomain::Http, status as i32, token);
            let _ = callback(ctx, conn);
            CbAction::Disconnect
        }
    }
}

/// §4.3 integration: feeds `conn.rx` into the connection's `WsFrame`,
/// auto-replies `Pong` to an incoming `Ping` (RFC6455 §5.5.2), and keeps
/// parsing pipelined frames off `extra_data()` until none remain.
fn dispatch_ws<U>(
    token: Token,
    conn: &mut ConnData<U>,
    callback: &mut dyn FnMut(ApiContext, &mut ConnData<U>) -> CbResult,
) -> CbAction {
    if matches!(conn.proto, ProtoHandle::None) {
        conn.proto = ProtoHandle::Ws(WsFrame::new());
    }

    let mut buf = [0u8; 8192];
    loop {
        let n = match conn.rx.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(_) => break,
        };
        if let Some(frame) = conn.proto.as_ws_mut() {
            frame.append_data(&buf[..n]);
        }
    }

    loop {
        let status = match conn.proto.as_ws_mut() {
            Some(frame) => frame.parse(),
            None => return CbAction::Continue,
        };

        let status = match status {
            Ok(status) => status,
            Err(_) => {
                let ctx = ApiContext::new(CbType::Error, StatusDomain::Ws, 0, token);
                let _ = callback(ctx, conn);
                return CbAction::Disconnect;
            }
        };

        if status != crate::error::WsStatus::FrameComplete {
            return CbAction::Continue;
        }

        let (frame_type, payload, extra) = {
            let frame = conn.proto.as_ws_mut().expect("just parsed");
            (frame.frame_type, frame.payload().to_vec(), frame.extra_data().to_vec())
        };

        let cb_type = match frame_type {
            WsFrameType::Ping => CbType::Ping,
            WsFrameType::Pong => CbType::Pong,
            WsFrameType::Close => CbType::Closed,
            _ => CbType::Complete,
        };

        let ctx = ApiContext::new(cb_type, StatusDomain::Ws, 0, token);
        let action = translate_result(callback(ctx, conn));

        if cb_type == CbType::Ping && action != CbAction::Disconnect {
            if let Ok(pong) = WsFrame::pong(&payload) {
                conn.tx.push(pong.bytes());
                conn.arm(EventMask::IN | EventMask::OUT);
            }
        }

        conn.proto = ProtoHandle::Ws(WsFrame::new());
        if !extra.is_empty() {
            if let Some(frame) = conn.proto.as_ws_mut() {
                frame.append_data(&extra);
            }
        }

        if cb_type == CbType::Closed || action == CbAction::Disconnect {
            return CbAction::Disconnect;
        }

        if extra.is_empty() {
            return CbAction::Continue;
        }
    }
}
