//! §3 `APIContext`: a stack value, live only for the duration of one user
//! callback invocation (§4.6).

use mio::Token;

/// `ctx.cb_type` (§4.6 event taxonomy).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CbType {
    Error,
    Status,
    Listening,
    Accepted,
    Read,
    Write,
    Complete,
    Closed,
    Timeout,
    Interrupt,
    User,
    HandshakeRequest,
    HandshakeResponse,
    HandshakeAnswer,
    Ping,
    Pong,
    Connected,
}

/// `ctx.st_type`: disambiguates `status_code` across layers (§3, §6.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusDomain {
    Api,
    Http,
    Ws,
    Sock,
    Event,
}

/// §3 `APIContext`. The original also carries "a back-reference to the
/// API"; here that capability is expressed through the connection's own
/// `arm`/`set_timer`/`disconnect` methods (see `connection.rs`) instead of
/// an aliased handle back into the facade, which would otherwise alias the
/// very connection slot the callback is already holding `&mut` — see
/// `DESIGN.md`'s Open Question resolutions.
#[derive(Debug, Clone, Copy)]
pub struct ApiContext {
    pub cb_type: CbType,
    pub st_type: StatusDomain,
    pub status_code: i32,
    pub token: Token,
}

impl ApiContext {
    pub fn new(cb_type: CbType, st_type: StatusDomain, status_code: i32, token: Token) -> ApiContext {
        ApiContext {
            cb_type,
            st_type,
            status_code,
            token,
        }
    }
}

/// §4.6 callback contract: the only four legal return values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CbResult {
    Continue,
    NoAction,
    UserCall,
    Disconnect,
}
