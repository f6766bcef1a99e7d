use std::fmt;

/// `xhttp_method_t` (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Dummy,
    Put,
    Get,
    Post,
    Delete,
    Options,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Dummy => "DUMMY",
            HttpMethod::Put => "PUT",
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Options => "OPTIONS",
        }
    }

    pub fn parse(token: &str) -> HttpMethod {
        match token {
            "PUT" => HttpMethod::Put,
            "GET" => HttpMethod::Get,
            "POST" => HttpMethod::Post,
            "DELETE" => HttpMethod::Delete,
            "OPTIONS" => HttpMethod::Options,
            _ => HttpMethod::Dummy,
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `xhttp_type_t` (§4.2): whether a message is an uninitialized shell, a
/// request, or a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpType {
    Initial,
    Request,
    Response,
}

/// Status codes the API facade is documented to produce (§6.1), plus the
/// general `xhttp_status_t` string table used by `XHTTP_GetCodeStr`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpCode(pub u16);

impl HttpCode {
    pub const OK: HttpCode = HttpCode(200);
    pub const BAD_REQUEST: HttpCode = HttpCode(400);
    pub const UNAUTHORIZED: HttpCode = HttpCode(401);
    pub const NOT_FOUND: HttpCode = HttpCode(404);
    pub const METHOD_NOT_ALLOWED: HttpCode = HttpCode(405);

    pub fn reason(self) -> &'static str {
        match self.0 {
            200 => "OK",
            400 => "Bad Request",
            401 => "Unauthorized",
            404 => "Not Found",
            405 => "Method Not Allowed",
            _ => "Unknown",
        }
    }
}
