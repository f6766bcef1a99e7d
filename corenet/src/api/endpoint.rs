//! §3 `Endpoint`: the declarative listener/client description passed to
//! `Api::add_endpoint`, kept separate from `ConnData` since an endpoint may
//! outlive any one connection it spawns (a listener re-accepts many peers).

use super::connection::Protocol;
use crate::sock::SslCert;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointRole {
    Server,
    Client,
}

/// One bind/connect target plus the protocol it should speak (§3).
pub struct Endpoint {
    pub protocol: Protocol,
    pub role: EndpointRole,
    pub address: String,
    pub port: u16,
    pub uri: String,
    pub tls: bool,
    pub cert: Option<SslCert>,
    pub force_bind: bool,
    pub unix_path: Option<PathBuf>,
    pub backlog: u32,
}

impl Endpoint {
    /// A TCP listener (§4.5 `AddEndpoint` server form).
    pub fn tcp(address: impl Into<String>, port: u16, protocol: Protocol) -> Endpoint {
        Endpoint {
            protocol,
            role: EndpointRole::Server,
            address: address.into(),
            port,
            uri: "/".to_string(),
            tls: false,
            cert: None,
            force_bind: false,
            unix_path: None,
            backlog: 128,
        }
    }

    /// A TCP client connection, immediately dialed on `add_endpoint`.
    pub fn client(address: impl Into<String>, port: u16, protocol: Protocol) -> Endpoint {
        let mut endpoint = Endpoint::tcp(address, port, protocol);
        endpoint.role = EndpointRole::Client;
        endpoint
    }

    /// A UNIX-domain listener.
    pub fn unix(path: impl Into<PathBuf>, protocol: Protocol) -> Endpoint {
        Endpoint {
            protocol,
            role: EndpointRole::Server,
            address: String::new(),
            port: 0,
            uri: "/".to_string(),
            tls: false,
            cert: None,
            force_bind: true,
            unix_path: Some(path.into()),
            backlog: 128,
        }
    }

    /// Attaches a server-side TLS certificate bundle (§4.1 `SetSSLCert`).
    pub fn tls(mut self, cert: SslCert) -> Endpoint {
        self.tls = true;
        self.cert = Some(cert);
        self
    }

    pub fn with_uri(mut self, uri: impl Into<String>) -> Endpoint {
        self.uri = uri.into();
        self
    }

    pub fn with_backlog(mut self, backlog: u32) -> Endpoint {
        self.backlog = backlog;
        self
    }
}
