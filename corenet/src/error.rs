//! Per-domain error taxonomies (§6.5) plus an umbrella `CoreError`/`CoreResult`
//! used at crate seams, following the teacher's `NetworkError`/`ErrorUtils`
//! split between "would block" and "fatal" outcomes.

use std::fmt;
use std::io;

/// Event-reactor status (§6.5 Event domain).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventStatus {
    ECtl,
    EMax,
    ENoCb,
    EOMax,
    EWait,
    EIntr,
    EAlloc,
    ETimer,
    EExtend,
    ECreate,
    EInsert,
    EInvalid,
    Success,
    Break,
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Socket-layer status (§6.5 Socket domain).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SockStatus {
    None,
    Alloc,
    Args,
    Invalid,
    Support,
    Connect,
    Create,
    Accept,
    Listen,
    Write,
    Read,
    Send,
    Recv,
    Join,
    Bind,
    Addr,
    SetFl,
    GetFl,
    SetOpt,
    Pkcs12,
    SslInit,
    SslCert,
    SslKey,
    SslConnect,
    SslAccept,
    NoSsl,
    Flags,
    InvSsl,
    Syscall,
    WantRead,
    WantWrite,
    Eof,
}

impl fmt::Display for SockStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl From<io::Error> for SockStatus {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::WouldBlock => SockStatus::WantRead,
            io::ErrorKind::UnexpectedEof => SockStatus::Eof,
            io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted => SockStatus::Recv,
            _ => SockStatus::Syscall,
        }
    }
}

/// HTTP codec status (§6.5 HTTP domain).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpStatus {
    Invalid,
    ErrInit,
    ErrLink,
    ErrAuth,
    ErrRead,
    ErrWrite,
    ErrProto,
    ErrTimeo,
    ErrAlloc,
    ErrSetHdr,
    ErrFdMode,
    ErrExists,
    ErrConnect,
    ErrResolve,
    ErrAssemble,
    Terminated,
    Incomplete,
    Connected,
    Resolved,
    Complete,
    BigCnt,
    BigHdr,
    Parsed,
}

impl fmt::Display for HttpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// WebSocket frame codec status (§6.5 WS domain).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WsStatus {
    ErrNone,
    ErrAlloc,
    ErrSize,
    InvalidArgs,
    InvalidType,
    InvalidRequest,
    FrameTooBig,
    FrameParsed,
    FrameInvalid,
    FrameComplete,
    FrameIncomplete,
}

impl fmt::Display for WsStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// API-facade status (§6.5 API domain).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiStatus {
    None,
    MissingKey,
    InvalidKey,
    InvalidArgs,
    InvalidRole,
    InvalidToken,
    MissingToken,
    AuthFailure,
    ErrAssemble,
    ErrRegister,
    ErrResolve,
    ErrCrypt,
    ErrAlloc,
    Status,
    Destroy,
    Hanged,
    Closed,
}

impl fmt::Display for ApiStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Umbrella error used where callers cross domain boundaries.
#[derive(Debug)]
pub enum CoreError {
    Event(EventStatus),
    Sock(SockStatus),
    Http(HttpStatus),
    Ws(WsStatus),
    Api(ApiStatus),
    Io(io::Error),
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoreError::Event(e) => write!(f, "event error: {}", e),
            CoreError::Sock(e) => write!(f, "socket error: {}", e),
            CoreError::Http(e) => write!(f, "http error: {}", e),
            CoreError::Ws(e) => write!(f, "ws error: {}", e),
            CoreError::Api(e) => write!(f, "api error: {}", e),
            CoreError::Io(e) => write!(f, "io error: {}", e),
        }
    }
}

impl std::error::Error for CoreError {}

impl From<io::Error> for CoreError {
    fn from(err: io::Error) -> Self {
        CoreError::Io(err)
    }
}

impl From<SockStatus> for CoreError {
    fn from(status: SockStatus) -> Self {
        CoreError::Sock(status)
    }
}

impl From<HttpStatus> for CoreError {
    fn from(status: HttpStatus) -> Self {
        CoreError::Http(status)
    }
}

impl From<WsStatus> for CoreError {
    fn from(status: WsStatus) -> Self {
        CoreError::Ws(status)
    }
}

impl From<ApiStatus> for CoreError {
    fn from(status: ApiStatus) -> Self {
        CoreError::Api(status)
    }
}

impl From<EventStatus> for CoreError {
    fn from(status: EventStatus) -> Self {
        CoreError::Event(status)
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

/// Mirrors the teacher's `ErrorUtils`: distinguishes a transient "would
/// block"/"incomplete" outcome (not worth tearing a connection down over)
/// from a genuinely fatal one.
pub trait ErrorUtils {
    fn has_failed(&self) -> bool;
}

impl<T> ErrorUtils for CoreResult<T> {
    fn has_failed(&self) -> bool {
        match self {
            Ok(_) => false,
            Err(CoreError::Sock(SockStatus::WantRead))
            | Err(CoreError::Sock(SockStatus::WantWrite))
            | Err(CoreError::Http(HttpStatus::Incomplete))
            | Err(CoreError::Ws(WsStatus::FrameIncomplete)) => false,
            Err(_) => true,
        }
    }
}
