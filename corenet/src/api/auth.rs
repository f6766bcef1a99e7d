//! §4.5 `AuthorizeHTTP`/`RespondHTTP`: token and Basic-auth gating for HTTP
//! connections, plus the small JSON status envelope the facade writes back.

use super::connection::ConnData;
use crate::http::{HttpCode, HttpMessage};
use crate::reactor::EventMask;

/// **AuthorizeHTTP(conn, expected_token, expected_key)** (§4.5): checks the
/// `Authorization: Basic` token against `expected_token`, or, if a
/// `X-Api-Key` style `expected_key` is supplied instead, the raw header
/// value. Either check alone is sufficient; both absent means no auth is
/// configured and the request passes.
pub fn authorize_http<U>(
    conn: &mut ConnData<U>,
    expected_token: Option<&str>,
    expected_key: Option<&str>,
) -> Result<(), ()> {
    let msg = match conn.proto.as_http_mut() {
        Some(msg) => msg,
        None => return Err(()),
    };

    if let Some(expected) = expected_token {
        return match msg.auth_basic_token() {
            Some(token) if token == expected => Ok(()),
            _ => Err(()),
        };
    }

    if let Some(expected) = expected_key {
        return match msg.headers().get("x-api-key") {
            Some(key) if key == expected => Ok(()),
            _ => Err(()),
        };
    }

    Ok(())
}

/// **RespondHTTP(conn, code, reason)** (§4.5): recycles the connection's
/// HTTP handle into a fresh response carrying a `{"status": "<reason>"}`
/// body, arms `POLLOUT` so the next write dispatch flushes it, and attaches
/// `WWW-Authenticate` on `401`.
pub fn respond_http<U>(conn: &mut ConnData<U>, code: HttpCode, reason: &str) {
    let body = serde_json::json!({ "status": reason }).to_string();

    let mut response = HttpMessage::init_response(code, "1.1");
    response.add_header("Content-Type", "application/json");
    if code == HttpCode::UNAUTHORIZED {
        response.add_header("WWW-Authenticate", r#"Basic realm="XAPI""#);
    }
    conn.tx.push(response.assemble(Some(body.as_bytes())));

    if let Some(msg) = conn.proto.as_http_mut() {
        msg.recycle();
    }
    conn.arm(EventMask::OUT);
}
