//! Synchronous, blocking-style HTTP client helpers (§4.2 "added"), ported
//! from the `XHTTP_Exchange`/`XHTTP_LinkExchange`/`XHTTP_EasyExchange` and
//! `XHTTP_Perform`/`XHTTP_LinkPerform`/`XHTTP_EasyPerform`/`XHTTP_SoloPerform`
//! families in `original_source/src/http.c`. These are convenience wrappers
//! over the non-blocking `Socket`/`HttpMessage` primitives used everywhere
//! else in the crate: useful for tests and for a CLI's client mode, never
//! for the reactor-driven server path, which drives the same primitives one
//! half-step at a time instead of spinning on them here.

use super::message::HttpMessage;
use super::method::HttpMethod;
use crate::error::HttpStatus;
use crate::sock::{parse_link, Link, SockFlags, Socket};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(1);
const READ_CHUNK: usize = 4096;

/// **Exchange(request, response, sock)**: writes `request`'s already
/// assembled raw buffer to `sock`, then receives into a fresh `response`.
/// Rejects sockets explicitly marked non-blocking, matching `XSock_IsNB`.
pub fn exchange(request: &mut HttpMessage, sock: &mut Socket) -> Result<HttpMessage, HttpStatus> {
    if sock.flags().is_non_blocking() {
        return Err(HttpStatus::ErrFdMode);
    }

    write_all_blocking(sock, request.raw(), request.timeout())?;

    let mut response = HttpMessage::blank();
    receive_blocking(&mut response, sock, request.timeout())?;
    Ok(response)
}

/// **LinkExchange(request, response, link)**: opens a client socket for
/// `link` (defaulting to `http`/port 80, switching to TLS for `https`,
/// applying Basic auth from `link.user`/`link.pass`), exchanges, then closes
/// the socket regardless of outcome.
pub fn link_exchange(request: &mut HttpMessage, link: &Link) -> Result<HttpMessage, HttpStatus> {
    let mut sock = connect_for_link(request, link)?;
    let result = exchange(request, &mut sock);
    sock.close();
    result
}

/// **EasyExchange(request, response, link_str)**: parses `link_str` then
/// delegates to `link_exchange`.
pub fn easy_exchange(request: &mut HttpMessage, link_str: &str) -> Result<HttpMessage, HttpStatus> {
    if link_str.is_empty() {
        return Err(HttpStatus::ErrLink);
    }
    link_exchange(request, &parse_link(link_str))
}

/// **Perform(http, sock, body, length)**: assembles `http` in place as the
/// request, writes it, then recycles the same handle and receives the
/// response into it (unlike `exchange`, which keeps request and response
/// separate).
pub fn perform(http: &mut HttpMessage, sock: &mut Socket, body: Option<&[u8]>) -> Result<(), HttpStatus> {
    if sock.flags().is_non_blocking() {
        return Err(HttpStatus::ErrFdMode);
    }

    let timeout = http.timeout();
    {
        let raw = http.assemble(body);
        write_all_blocking(sock, raw, timeout)?;
    }

    http.recycle();
    receive_blocking(http, sock, timeout)
}

/// **LinkPerform(http, link, body, length)**: link-based counterpart of
/// `perform`, opening and closing the socket around the call.
pub fn link_perform(http: &mut HttpMessage, link: &Link, body: Option<&[u8]>) -> Result<(), HttpStatus> {
    let mut sock = connect_for_link(http, link)?;
    let result = perform(http, &mut sock, body);
    sock.close();
    result
}

/// **EasyPerform(http, link_str, body, length)**.
pub fn easy_perform(http: &mut HttpMessage, link_str: &str, body: Option<&[u8]>) -> Result<(), HttpStatus> {
    if link_str.is_empty() {
        return Err(HttpStatus::ErrLink);
    }
    link_perform(http, &parse_link(link_str), body)
}

/// **SoloPerform(method, link_str, body, length)**: builds a one-shot
/// request carrying `Host` and `User-Agent` headers, then performs it.
/// Returns the request handle, now holding the response.
pub fn solo_perform(
    method: HttpMethod,
    link_str: &str,
    body: Option<&[u8]>,
) -> Result<HttpMessage, HttpStatus> {
    if link_str.is_empty() {
        return Err(HttpStatus::ErrLink);
    }
    let link = parse_link(link_str);

    let mut http = HttpMessage::init_request(method, &link.uri, "1.1");
    if !http.add_header("Host", link.host.clone()) {
        return Err(HttpStatus::ErrExists);
    }
    if !http.add_header("User-Agent", format!("corenet/{}", env!("CARGO_PKG_VERSION"))) {
        return Err(HttpStatus::ErrExists);
    }

    link_perform(&mut http, &link, body)?;
    Ok(http)
}

fn connect_for_link(request: &mut HttpMessage, link: &Link) -> Result<Socket, HttpStatus> {
    if !link.protocol.is_empty() && !link.protocol.starts_with("http") {
        return Err(HttpStatus::ErrProto);
    }

    let is_tls = link.protocol == "https";
    let mut flags = SockFlags::TCP_CLIENT;
    if is_tls {
        flags = flags | SockFlags::SSL;
    }

    if !link.user.is_empty() && !link.pass.is_empty() && !request.set_auth_basic(&link.user, &link.pass) {
        return Err(HttpStatus::ErrAuth);
    }

    let port = if link.port != 0 { link.port } else { 80 };
    Socket::create(flags, &link.addr, port, 0).map_err(|_| HttpStatus::ErrConnect)
}

/// Drives a send to completion, spin-retrying `WantWrite` until the whole
/// buffer lands or `timeout` (if any) elapses.
fn write_all_blocking(sock: &mut Socket, buf: &[u8], timeout: Option<Duration>) -> Result<(), HttpStatus> {
    let deadline = timeout.map(|d| Instant::now() + d);
    let mut written = 0;

    while written < buf.len() {
        match sock.write(&buf[written..]) {
            Ok(0) => return Err(HttpStatus::ErrWrite),
            Ok(n) => written += n,
            Err(crate::error::SockStatus::WantWrite) | Err(crate::error::SockStatus::WantRead) => {
                if deadline.map(|d| Instant::now() > d).unwrap_or(false) {
                    return Err(HttpStatus::ErrTimeo);
                }
                thread::sleep(POLL_INTERVAL);
            }
            Err(_) => return Err(HttpStatus::ErrWrite),
        }
    }

    Ok(())
}

/// **Receive(msg, sock)**: reads in `READ_CHUNK` slices until `msg.parse()`
/// reports `Complete`, spin-retrying `WantRead` (and driving the TLS
/// handshake first, if any) until `timeout` elapses.
fn receive_blocking(msg: &mut HttpMessage, sock: &mut Socket, timeout: Option<Duration>) -> Result<(), HttpStatus> {
    let deadline = timeout.map(|d| Instant::now() + d);
    let mut chunk = [0u8; READ_CHUNK];
    let mut saw_eof = false;

    loop {
        match sock.drive_tls_handshake() {
            Ok(true) => {}
            Ok(false) => {
                if deadline.map(|d| Instant::now() > d).unwrap_or(false) {
                    return Err(HttpStatus::ErrTimeo);
                }
                thread::sleep(POLL_INTERVAL);
                continue;
            }
            Err(_) => return Err(HttpStatus::ErrConnect),
        }

        match sock.read(&mut chunk) {
            Ok(0) => {
                saw_eof = true;
                break;
            }
            Ok(n) => msg.feed(&chunk[..n]),
            Err(crate::error::SockStatus::WantRead) => {
                if deadline.map(|d| Instant::now() > d).unwrap_or(false) {
                    return Err(HttpStatus::ErrTimeo);
                }
                thread::sleep(POLL_INTERVAL);
                continue;
            }
            Err(crate::error::SockStatus::Eof) => {
                saw_eof = true;
                break;
            }
            Err(_) => return Err(HttpStatus::ErrRead),
        }

        match msg.parse() {
            Ok(HttpStatus::Complete) => return Ok(()),
            Ok(_) => continue,
            Err(e) => return Err(e),
        }
    }

    // No `Content-Length` but a `Content-Type` means "read until EOF"
    // (§4.2 step 7 / Non-goal resolution): the peer closing the stream is
    // itself the completeness signal, not a parse failure.
    match msg.parse() {
        Ok(HttpStatus::Complete) => Ok(()),
        Ok(HttpStatus::Parsed) if saw_eof => {
            msg.force_complete();
            Ok(())
        }
        Ok(_) => Err(HttpStatus::ErrRead),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener as StdTcpListener;

    #[test]
    fn test_exchange_round_trips_against_a_plain_http_server() {
        let listener = StdTcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 1024];
            let n = std::io::Read::read(&mut stream, &mut buf).unwrap();
            assert!(&buf[..n].starts_with(b"GET / HTTP/1.1\r\n"));
            std::io::Write::write_all(&mut stream, b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok").unwrap();
        });

        let mut sock = Socket::create(SockFlags::TCP_CLIENT, &addr.ip().to_string(), addr.port(), 0).unwrap();
        let mut request = HttpMessage::init_request(HttpMethod::Get, "/", "1.1");
        request.assemble(None);

        let response = exchange(&mut request, &mut sock).unwrap();
        assert_eq!(response.status_code, 200);
        assert_eq!(response.body(), b"ok");

        server.join().unwrap();
    }

    #[test]
    fn test_exchange_rejects_non_blocking_socket() {
        let listener = StdTcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = thread::spawn(move || {
            let _ = listener.accept();
        });

        let mut sock = Socket::create(SockFlags::TCP_CLIENT, &addr.ip().to_string(), addr.port(), 0).unwrap();
        sock.set_non_blocking(true).unwrap();

        let mut request = HttpMessage::init_request(HttpMethod::Get, "/", "1.1");
        request.assemble(None);

        match exchange(&mut request, &mut sock) {
            Err(HttpStatus::ErrFdMode) => {}
            other => panic!("expected ErrFdMode, got {:?}", other.map(|_| ())),
        }
        server.join().unwrap();
    }

    #[test]
    fn test_easy_exchange_rejects_empty_link() {
        let mut request = HttpMessage::init_request(HttpMethod::Get, "/", "1.1");
        match easy_exchange(&mut request, "") {
            Err(HttpStatus::ErrLink) => {}
            other => panic!("expected ErrLink, got {:?}", other.map(|_| ())),
        }
    }
}
