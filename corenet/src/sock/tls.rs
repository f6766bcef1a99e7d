//! Non-blocking TLS bundle driven by `rustls`'s bring-your-own-IO
//! `Connection` trait. `wants_read`/`wants_write` map directly onto the
//! §4.1 `WantRead`/`WantWrite` half-step model without needing its own
//! socket handle, unlike a blocking `StreamOwned` wrapper would.

use crate::error::SockStatus;
use rustls::{ClientConfig, ClientConnection, ServerConfig, ServerConnection};
use rustls_pki_types::ServerName;
use std::io::{self, Read, Write};
use std::sync::Arc;

/// Certificate/key material for a TLS-enabled socket (§4.1 `SetSSLCert`).
pub struct SslCert {
    pub cert_path: String,
    pub key_path: String,
    pub ca_path: Option<String>,
}

enum Role {
    Server(ServerConnection),
    Client(ClientConnection),
}

/// §3 `TLSBundle`: context/session/connected flag, modeled as one enum over
/// the two `rustls` connection roles plus a `connected` flag.
pub struct TlsBundle {
    role: Role,
    connected: bool,
}

impl TlsBundle {
    pub fn client(server_name: &str) -> Result<TlsBundle, SockStatus> {
        let mut roots = rustls::RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        let config = ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();

        let name = ServerName::try_from(server_name.to_string()).map_err(|_| SockStatus::Addr)?;
        let conn = ClientConnection::new(Arc::new(config), name).map_err(|_| SockStatus::SslConnect)?;

        Ok(TlsBundle {
            role: Role::Client(conn),
            connected: false,
        })
    }

    pub fn server(cert: &SslCert) -> Result<TlsBundle, SockStatus> {
        let cert_file = std::fs::File::open(&cert.cert_path).map_err(|_| SockStatus::SslCert)?;
        let key_file = std::fs::File::open(&cert.key_path).map_err(|_| SockStatus::SslKey)?;

        let certs = rustls_pemfile::certs(&mut io::BufReader::new(cert_file))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| SockStatus::SslCert)?;

        let key = rustls_pemfile::private_key(&mut io::BufReader::new(key_file))
            .map_err(|_| SockStatus::SslKey)?
            .ok_or(SockStatus::SslKey)?;

        let config = ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .map_err(|_| SockStatus::SslCert)?;

        let conn = ServerConnection::new(Arc::new(config)).map_err(|_| SockStatus::SslAccept)?;

        Ok(TlsBundle {
            role: Role::Server(conn),
            connected: false,
        })
    }

    pub fn is_handshaking(&self) -> bool {
        match &self.role {
            Role::Server(c) => c.is_handshaking(),
            Role::Client(c) => c.is_handshaking(),
        }
    }

    pub fn wants_read(&self) -> bool {
        match &self.role {
            Role::Server(c) => c.wants_read(),
            Role::Client(c) => c.wants_read(),
        }
    }

    pub fn wants_write(&self) -> bool {
        match &self.role {
            Role::Server(c) => c.wants_write(),
            Role::Client(c) => c.wants_write(),
        }
    }

    pub fn connected(&self) -> bool {
        self.connected
    }

    /// Pumps one half-step of the handshake against the raw socket. Returns
    /// `Ok(true)` once the handshake has completed, `Ok(false)` while still
    /// in progress (the caller re-arms the event indicated by
    /// `wants_read`/`wants_write` and calls again), `Err` on a fatal TLS
    /// error (the bundle is then marked not-connected so `Close` skips
    /// `shutdown`).
    pub fn drive_handshake<S: Read + Write>(&mut self, sock: &mut S) -> Result<bool, SockStatus> {
        if self.wants_write() {
            match self.write_tls(sock) {
                Ok(_) => {}
                Err(SockStatus::WantWrite) => return Ok(false),
                Err(e) => {
                    self.connected = false;
                    return Err(e);
                }
            }
        }

        if self.wants_read() {
            match self.read_tls(sock) {
                Ok(_) => {}
                Err(SockStatus::WantRead) => return Ok(false),
                Err(e) => {
                    self.connected = false;
                    return Err(e);
                }
            }
        }

        if !self.is_handshaking() {
            self.connected = true;
            return Ok(true);
        }

        Ok(false)
    }

    fn read_tls<S: Read>(&mut self, sock: &mut S) -> Result<usize, SockStatus> {
        let result = match &mut self.role {
            Role::Server(c) => c.read_tls(sock),
            Role::Client(c) => c.read_tls(sock),
        };

        let count = match result {
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Err(SockStatus::WantRead),
            Err(_) => return Err(SockStatus::Recv),
        };

        let process_result = match &mut self.role {
            Role::Server(c) => c.process_new_packets().map(|_| ()),
            Role::Client(c) => c.process_new_packets().map(|_| ()),
        };

        process_result.map_err(|_| SockStatus::SslConnect)?;
        Ok(count)
    }

    fn write_tls<S: Write>(&mut self, sock: &mut S) -> Result<usize, SockStatus> {
        let result = match &mut self.role {
            Role::Server(c) => c.write_tls(sock),
            Role::Client(c) => c.write_tls(sock),
        };

        match result {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Err(SockStatus::WantWrite),
            Err(_) => Err(SockStatus::Send),
        }
    }

    /// Plaintext read once the handshake is complete. Drains rustls's
    /// already-decrypted buffer before touching the raw socket again — a
    /// single TLS record can decrypt to more plaintext than one caller-sized
    /// read, so reading the socket first could block on `WantRead` while
    /// buffered plaintext sits undelivered.
    pub fn read_plain<S: Read + Write>(&mut self, sock: &mut S, buf: &mut [u8]) -> Result<usize, SockStatus> {
        {
            let mut reader = match &mut self.role {
                Role::Server(c) => c.reader(),
                Role::Client(c) => c.reader(),
            };

            match reader.read(buf) {
                Ok(n) if n > 0 => return Ok(n),
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(_) => return Err(SockStatus::Read),
            }
        }

        self.read_tls(sock)?;

        let mut reader = match &mut self.role {
            Role::Server(c) => c.reader(),
            Role::Client(c) => c.reader(),
        };

        match reader.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Err(SockStatus::WantRead),
            Err(_) => Err(SockStatus::Read),
        }
    }

    /// Plaintext write once the handshake is complete.
    pub fn write_plain<S: Read + Write>(&mut self, sock: &mut S, buf: &[u8]) -> Result<usize, SockStatus> {
        let written = {
            let mut writer = match &mut self.role {
                Role::Server(c) => c.writer(),
                Role::Client(c) => c.writer(),
            };
            writer.write(buf).map_err(|_| SockStatus::Write)?
        };

        self.write_tls(sock)?;
        Ok(written)
    }
}
