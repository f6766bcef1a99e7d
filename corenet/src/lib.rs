//! `corenet` — single-threaded, non-blocking TCP/UNIX networking core with
//! first-class TLS, HTTP/1.x and WebSocket framing (see `SPEC_FULL.md` for
//! the full module list).
//!
//! Layering, leaves first: [`containers`] (byte buffer, chunk pool, header
//! map) underlies [`sock`] (the uniform socket handle plus TLS), [`http`]
//! and [`ws`] (the two wire codecs), [`reactor`] (the poll dispatcher these
//! codecs are driven from) and finally [`api`], which binds all of the
//! above into one connection-oriented facade driven by a single user
//! callback.

pub mod api;
pub mod containers;
pub mod error;
pub mod http;
pub mod logging;
pub mod reactor;
pub mod sock;
pub mod ws;

pub use api::{Api, ApiBuilder, ApiContext, CbResult, CbType, ConnData, Endpoint, EndpointRole, Protocol, Role, StatusDomain};
pub use error::{ApiStatus, CoreError, CoreResult, EventStatus, HttpStatus, SockStatus, WsStatus};
pub use http::{HttpCode, HttpMessage, HttpMethod};
pub use reactor::{EventMask, HandleType, Reactor};
pub use sock::{Link, Socket, SockFlags, SocketAddress};
pub use ws::{WsFrame, WsFrameType};
