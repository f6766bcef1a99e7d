//! Cross-platform poll dispatcher (§4.4), built on `mio` rather than
//! re-deriving raw `epoll_event`/`pollfd` tables: `mio::Poll` already wraps
//! epoll/kqueue/IOCP behind one `Registry`/`Token`/`Events` API, which is
//! exactly the portability layer §4.4 asks the port to provide.
//!
//! `EventData` lives in a `Vec<Option<EventData<T>>>` arena indexed by a
//! stable `Token`, with a free list recycling slots (§9 redesign note:
//! replace cyclic owning pointers with an arena + stable indices), mirroring
//! `neutronium::net::Endpoint`'s `channels: Vec<Channel>` + `free: Vec<_>`.

pub mod data;
pub mod timer;

pub use data::{EventData, EventMask, HandleType};
pub use timer::TimerList;

use crate::error::EventStatus;
use hashbrown::HashMap;
use mio::event::Source;
use mio::{Events, Poll, Token};
use std::time::{Duration, Instant};

/// Reason a callback is invoked with (§4.4's per-bit dispatch table, plus
/// `Clear` for `Delete`/teardown and `Timeout` for expired timers).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reason {
    Read,
    Write,
    Closed,
    Hanged,
    Error,
    Exception,
    Timeout,
    Clear,
}

/// §4.4 "Return values from the user callback are translated by the
/// reactor".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CbAction {
    Continue,
    Disconnect,
    Accept,
    UserCall,
    Break,
}

/// What one `service()` call accomplished. `accept_token` is set when a
/// callback returned `Accept`: the original design breaks out of the
/// current descriptor loop because a new fd may be about to be added and
/// iteration invariants would otherwise be disturbed. In this port that
/// translates directly to a borrow-checker fact: registering a new
/// connection needs `&mut Reactor`, which `service()` cannot hand out while
/// it still holds the loop open, so it stops and reports which listener
/// fired; the caller (the API facade) performs the accept + register with
/// its own `&mut Reactor` access restored, then resumes polling.
pub struct ServiceOutcome {
    pub status: EventStatus,
    pub accept_token: Option<Token>,
}

/// §3 `Reactor`. Generic over the per-connection user context `T` (§9
/// redesign note: replace `void*` user contexts with a generic parameter).
pub struct Reactor<T> {
    poll: Poll,
    events: Events,
    arena: Vec<Option<EventData<T>>>,
    free: Vec<usize>,
    count: usize,
    max_fd: usize,
    timers: TimerList,
    fd_index: Option<HashMap<i32, Token>>,
    logger: slog::Logger,
}

impl<T> Reactor<T> {
    /// **Create(max_fd, user, callback, use_hash)** (§4.4). The callback
    /// itself is not stored here (see `service`'s doc comment for why);
    /// `use_hash` still gates an auxiliary fd→Token index, used by callers
    /// that register raw fds via `SourceFd` and need to resolve a fd back
    /// to a handle without mio's own `Token` round-trip (mio already makes
    /// this unnecessary for every other transport).
    pub fn create(max_fd: usize, use_hash: bool, logger: slog::Logger) -> Result<Reactor<T>, EventStatus> {
        let poll = Poll::new().map_err(|_| EventStatus::ECreate)?;
        let event_max = system_open_max().min(max_fd.max(1));

        Ok(Reactor {
            poll,
            events: Events::with_capacity(event_max),
            arena: Vec::new(),
            free: Vec::new(),
            count: 0,
            max_fd,
            timers: TimerList::new(),
            fd_index: if use_hash { Some(HashMap::new()) } else { None },
            logger,
        })
    }

    pub fn logger(&self) -> &slog::Logger {
        &self.logger
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn get(&self, token: Token) -> Option<&EventData<T>> {
        self.arena.get(token.0).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, token: Token) -> Option<&mut EventData<T>> {
        self.arena.get_mut(token.0).and_then(Option::as_mut)
    }

    /// All live slots, for callers that need to sweep every connection for
    /// per-connection bookkeeping (the API facade's pending arm/timer/
    /// disconnect flags) rather than reacting to one token at a time.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut EventData<T>> {
        self.arena.iter_mut().filter_map(Option::as_mut)
    }

    /// **Register(ctx, fd, event_mask, type)** (§4.4).
    pub fn register<S: Source>(
        &mut self,
        source: &mut S,
        mask: EventMask,
        handle_type: HandleType,
        context: T,
    ) -> Result<Token, EventStatus> {
        if self.count >= self.max_fd {
            return Err(EventStatus::EMax);
        }

        let idx = self.free.pop().unwrap_or(self.arena.len());
        let token = Token(idx);

        if let Err(err) = self.poll.registry().register(source, token, mask.to_interest()) {
            slog::warn!(self.logger, "reactor register failed"; "error" => %err);
            return Err(EventStatus::ECtl);
        }

        let data = EventData::new(token, handle_type, mask, context);

        if idx == self.arena.len() {
            self.arena.push(Some(data));
        } else {
            self.arena[idx] = Some(data);
        }

        self.count += 1;
        Ok(token)
    }

    /// Same registration as `register`, but for callers whose `Source`
    /// lives inside the context they're about to hand over (the API
    /// facade's `ConnData::socket`): borrowing that field out and moving
    /// the whole context into the same call isn't something the borrow
    /// checker allows, so `extract` runs inside this method instead, before
    /// `context` is moved into the arena.
    pub fn register_owned<S: Source>(
        &mut self,
        mask: EventMask,
        handle_type: HandleType,
        mut context: T,
        extract: impl FnOnce(&mut T) -> &mut S,
    ) -> Result<Token, EventStatus> {
        if self.count >= self.max_fd {
            return Err(EventStatus::EMax);
        }

        let idx = self.free.pop().unwrap_or(self.arena.len());
        let token = Token(idx);

        {
            let source = extract(&mut context);
            if let Err(err) = self.poll.registry().register(source, token, mask.to_interest()) {
                slog::warn!(self.logger, "reactor register failed"; "error" => %err);
                return Err(EventStatus::ECtl);
            }
        }

        let data = EventData::new(token, handle_type, mask, context);

        if idx == self.arena.len() {
            self.arena.push(Some(data));
        } else {
            self.arena[idx] = Some(data);
        }

        self.count += 1;
        Ok(token)
    }

    /// Registers an already-open raw fd via `SourceFd`, recording it in the
    /// auxiliary fd index when `use_hash` was requested at `create`.
    #[cfg(unix)]
    pub fn register_raw_fd(
        &mut self,
        fd: std::os::unix::io::RawFd,
        mask: EventMask,
        handle_type: HandleType,
        context: T,
    ) -> Result<Token, EventStatus> {
        let mut source = mio::unix::SourceFd(&fd);
        let token = self.register(&mut source, mask, handle_type, context)?;

        if let Some(index) = &mut self.fd_index {
            index.insert(fd, token);
        }

        Ok(token)
    }

    #[cfg(unix)]
    pub fn token_for_fd(&self, fd: i32) -> Option<Token> {
        self.fd_index.as_ref().and_then(|index| index.get(&fd).copied())
    }

    /// **Modify(event_data, new_mask)** (§4.4).
    pub fn modify<S: Source>(&mut self, source: &mut S, token: Token, new_mask: EventMask) -> Result<(), EventStatus> {
        self.poll
            .registry()
            .reregister(source, token, new_mask.to_interest())
            .map_err(|_| EventStatus::ECtl)?;

        if let Some(data) = self.get_mut(token) {
            data.mask = new_mask;
        }

        Ok(())
    }

    /// Re-arms a registered descriptor's mask without the caller needing to
    /// hold the `Source` itself: `extract` pulls it out of the context
    /// already owned by the arena slot, avoiding the aliasing that would
    /// otherwise come from holding `&mut Reactor` and `&mut T`'s socket at
    /// the same time (see `DESIGN.md`'s note on the API facade's dispatch
    /// loop, which is this method's only real caller).
    pub fn modify_with<S: Source>(
        &mut self,
        token: Token,
        new_mask: EventMask,
        extract: impl FnOnce(&mut T) -> &mut S,
    ) -> Result<(), EventStatus> {
        let data = self.arena.get_mut(token.0).and_then(Option::as_mut).ok_or(EventStatus::EInvalid)?;
        let source = extract(&mut data.context);

        self.poll
            .registry()
            .reregister(source, token, new_mask.to_interest())
            .map_err(|_| EventStatus::ECtl)?;

        data.mask = new_mask;
        Ok(())
    }

    /// **Delete(event_data)** (§4.4): deregisters, invokes `callback` once
    /// with `Reason::Clear` while the slot is still fully populated (§9
    /// Open Question: the teardown view is live, not partially freed — see
    /// `DESIGN.md`), then frees it.
    pub fn delete<S: Source>(
        &mut self,
        source: &mut S,
        token: Token,
        callback: &mut dyn FnMut(&mut EventData<T>, Reason) -> CbAction,
    ) -> Result<T, EventStatus> {
        let _ = self.poll.registry().deregister(source);
        self.timers.remove(token);

        let idx = token.0;
        let mut data = self
            .arena
            .get_mut(idx)
            .and_then(Option::take)
            .ok_or(EventStatus::EInvalid)?;

        callback(&mut data, Reason::Clear);

        self.free.push(idx);
        self.count -= 1;
        Ok(data.context)
    }

    /// Same teardown as `delete`, but pulls the `Source` out of the arena
    /// slot's own context via `extract` rather than requiring the caller to
    /// hold it — the counterpart `modify_with` needs for the same reason.
    /// Used internally by `service` when a callback returns
    /// `CbAction::Disconnect`.
    pub(crate) fn delete_with<S: Source>(&mut self, token: Token, extract: impl FnOnce(&mut T) -> &mut S) {
        let idx = token.0;

        if let Some(data) = self.arena.get_mut(idx).and_then(Option::as_mut) {
            let _ = self.poll.registry().deregister(extract(&mut data.context));
        } else {
            return;
        }

        self.timers.remove(token);
        self.arena[idx] = None;
        self.free.push(idx);
        self.count -= 1;
    }

    /// **AddTimer(ctx, timeout_ms)** (§4.4): allocates a dedicated
    /// `HandleType::Timer` slot with no mio registration, fired purely off
    /// the timer list.
    pub fn add_timer(&mut self, context: T, timeout: Duration) -> Token {
        let idx = self.free.pop().unwrap_or(self.arena.len());
        let token = Token(idx);
        let data = EventData::new(token, HandleType::Timer, EventMask::NONE, context);

        if idx == self.arena.len() {
            self.arena.push(Some(data));
        } else {
            self.arena[idx] = Some(data);
        }

        self.count += 1;
        self.timers.add(token, timeout);
        token
    }

    /// **ExtendTimer(timer, timeout_ms)** (§4.4): also used to arm/renew an
    /// inactivity timer on a socket-backed token (the API facade's use).
    pub fn extend_timer(&mut self, token: Token, timeout: Duration) {
        self.timers.extend(token, timeout);
    }

    /// **Service(timeout_ms)** (§4.4). The callback is a parameter here
    /// rather than something `create()` stashed in the struct: since it
    /// only ever needs `&mut EventData<T>` (never `&mut Reactor<T>`
    /// itself), passing it in avoids manufacturing a placeholder closure to
    /// swap in and out of `self` for no behavioral difference — the
    /// reactor is single-threaded and the exact same closure is supplied on
    /// every call.
    ///
    /// `extract` gives `service` a way to reach the `Source` backing a
    /// `CbAction::Disconnect` token without the caller pre-borrowing it
    /// (the same aliasing problem `modify_with` solves); it is only ever
    /// invoked on tokens the dispatch loop itself is currently holding.
    ///
    /// Write-before-read ordering and the `RDHUP`/`HUP`/`ERR` short-circuit
    /// table from §4.4 are applied per descriptor; an `Accept` return stops
    /// the loop immediately and is reported via `ServiceOutcome`.
    pub fn service<S: Source>(
        &mut self,
        timeout: Option<Duration>,
        extract: &mut dyn FnMut(&mut T) -> &mut S,
        callback: &mut dyn FnMut(&mut EventData<T>, Reason) -> CbAction,
    ) -> Result<ServiceOutcome, EventStatus> {
        let now = Instant::now();
        let effective_timeout = match (timeout, self.timers.next_deadline()) {
            (Some(requested), Some(deadline)) => Some(requested.min(deadline.saturating_duration_since(now))),
            (Some(requested), None) => Some(requested),
            (None, Some(deadline)) => Some(deadline.saturating_duration_since(now)),
            (None, None) => None,
        };

        if let Err(err) = self.poll.poll(&mut self.events, effective_timeout) {
            if err.kind() == std::io::ErrorKind::Interrupted {
                return Ok(ServiceOutcome {
                    status: EventStatus::EIntr,
                    accept_token: None,
                });
            }
            return Err(EventStatus::EWait);
        }

        let mut outcome = ServiceOutcome {
            status: EventStatus::Success,
            accept_token: None,
        };

        // Copies the batch out of `self.events` up front: the dispatch loop
        // below needs `&mut self.arena`/`&mut self.poll` for cleanup, which
        // would otherwise conflict with an immutable borrow of `self.events`
        // held across the same loop.
        let events: Vec<mio::event::Event> = self.events.iter().cloned().collect();

        'dispatch: for event in events {
            let token = event.token();
            let data = match self.arena.get_mut(token.0).and_then(Option::as_mut) {
                Some(data) if data.open => data,
                _ => continue,
            };

            if event.is_read_closed() {
                match callback(data, Reason::Closed) {
                    CbAction::Break => {
                        outcome.status = EventStatus::Break;
                        break 'dispatch;
                    }
                    CbAction::Disconnect => self.delete_with(token, &mut *extract),
                    _ => {}
                }
                continue;
            }

            if event.is_write_closed() {
                match callback(data, Reason::Hanged) {
                    CbAction::Break => {
                        outcome.status = EventStatus::Break;
                        break 'dispatch;
                    }
                    CbAction::Disconnect => self.delete_with(token, &mut *extract),
                    _ => {}
                }
                continue;
            }

            if event.is_error() {
                match callback(data, Reason::Error) {
                    CbAction::Break => {
                        outcome.status = EventStatus::Break;
                        break 'dispatch;
                    }
                    CbAction::Disconnect => self.delete_with(token, &mut *extract),
                    _ => {}
                }
                continue;
            }

            if event.is_priority() {
                let data = match self.arena.get_mut(token.0).and_then(Option::as_mut) {
                    Some(data) if data.open => data,
                    _ => continue,
                };
                match callback(data, Reason::Exception) {
                    CbAction::Break => {
                        outcome.status = EventStatus::Break;
                        break 'dispatch;
                    }
                    CbAction::Disconnect => {
                        self.delete_with(token, &mut *extract);
                        continue;
                    }
                    _ => {}
                }
            }

            if event.is_writable() {
                let data = match self.arena.get_mut(token.0).and_then(Option::as_mut) {
                    Some(data) if data.open => data,
                    _ => continue,
                };
                match dispatch_with_user_call(data, Reason::Write, callback) {
                    CbAction::Break => {
                        outcome.status = EventStatus::Break;
                        break 'dispatch;
                    }
                    CbAction::Accept => {
                        outcome.accept_token = Some(token);
                        break 'dispatch;
                    }
                    CbAction::Disconnect => {
                        self.delete_with(token, &mut *extract);
                        continue;
                    }
                    _ => {}
                }
            }

            if event.is_readable() {
                let data = match self.arena.get_mut(token.0).and_then(Option::as_mut) {
                    Some(data) if data.open => data,
                    _ => continue,
                };
                match dispatch_with_user_call(data, Reason::Read, callback) {
                    CbAction::Break => {
                        outcome.status = EventStatus::Break;
                        break 'dispatch;
                    }
                    CbAction::Accept => {
                        outcome.accept_token = Some(token);
                        break 'dispatch;
                    }
                    CbAction::Disconnect => self.delete_with(token, &mut *extract),
                    _ => {}
                }
            }
        }

        if outcome.accept_token.is_none() {
            let expired = self.timers.pop_expired(Instant::now());
            for token in expired {
                if let Some(data) = self.arena.get_mut(token.0).and_then(Option::as_mut) {
                    if data.open {
                        if callback(data, Reason::Timeout) == CbAction::Disconnect {
                            self.delete_with(token, &mut *extract);
                        }
                    }
                }
            }
        }

        Ok(outcome)
    }
}

fn dispatch_with_user_call<T>(
    data: &mut EventData<T>,
    reason: Reason,
    callback: &mut dyn FnMut(&mut EventData<T>, Reason) -> CbAction,
) -> CbAction {
    loop {
        match callback(data, reason) {
            CbAction::UserCall => continue,
            other => return other,
        }
    }
}

#[cfg(unix)]
fn system_open_max() -> usize {
    let limit = unsafe {
        let mut rlim = std::mem::MaybeUninit::<libc::rlimit>::uninit();
        if libc::getrlimit(libc::RLIMIT_NOFILE, rlim.as_mut_ptr()) == 0 {
            Some(rlim.assume_init().rlim_cur as usize)
        } else {
            None
        }
    };

    limit.unwrap_or(1024)
}

#[cfg(not(unix))]
fn system_open_max() -> usize {
    1024
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging;
    use mio::net::{TcpListener, TcpStream};
    use sloggers::types::Severity;
    use std::net::SocketAddr;

    fn no_extract(_ctx: &mut i32) -> &mut TcpListener {
        unreachable!("the i32-context tests never return CbAction::Disconnect")
    }

    #[test]
    fn test_register_delete_round_trip_invokes_clear() {
        let mut reactor: Reactor<i32> = Reactor::create(128, false, logging::terminal(Severity::Critical)).unwrap();
        let mut listener = TcpListener::bind("127.0.0.1:0".parse::<SocketAddr>().unwrap()).unwrap();

        let token = reactor
            .register(&mut listener, EventMask::IN, HandleType::Listener, 42)
            .unwrap();

        assert_eq!(reactor.len(), 1);

        let mut cleared = false;
        reactor
            .delete(&mut listener, token, &mut |data, reason| {
                if reason == Reason::Clear {
                    cleared = true;
                    assert_eq!(data.context, 42);
                }
                CbAction::Continue
            })
            .unwrap();

        assert!(cleared);
        assert_eq!(reactor.len(), 0);
        assert!(reactor.get(token).is_none());
    }

    #[test]
    fn test_service_reports_accept_and_stops_dispatch() {
        let mut reactor: Reactor<&str> = Reactor::create(128, false, logging::terminal(Severity::Critical)).unwrap();
        let mut listener = TcpListener::bind("127.0.0.1:0".parse::<SocketAddr>().unwrap()).unwrap();
        let addr = listener.local_addr().unwrap();

        reactor
            .register(&mut listener, EventMask::IN, HandleType::Listener, "listener")
            .unwrap();

        let _client = TcpStream::connect(addr).unwrap();

        let outcome = reactor
            .service(
                Some(Duration::from_millis(500)),
                &mut |_ctx: &mut &str| -> &mut TcpListener { unreachable!() },
                &mut |_data, _reason| CbAction::Accept,
            )
            .unwrap();

        assert!(outcome.accept_token.is_some());
    }

    #[test]
    fn test_timer_fires_after_deadline() {
        let mut reactor: Reactor<&str> = Reactor::create(128, false, logging::terminal(Severity::Critical)).unwrap();
        let token = reactor.add_timer("inactivity", Duration::from_millis(1));

        std::thread::sleep(Duration::from_millis(15));

        let mut fired = false;
        reactor
            .service(
                Some(Duration::from_millis(0)),
                &mut |_ctx: &mut &str| -> &mut TcpListener { unreachable!() },
                &mut |_data, reason| {
                    if reason == Reason::Timeout {
                        fired = true;
                    }
                    CbAction::Continue
                },
            )
            .unwrap();

        assert!(fired);
        let _ = token;
        let _ = no_extract as fn(&mut i32) -> &mut TcpListener;
    }
}
