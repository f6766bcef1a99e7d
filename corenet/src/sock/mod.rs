pub mod addr;
pub mod flags;
pub mod socket;
pub mod tls;

pub use addr::{default_port, parse_link, Link, SocketAddress};
pub use flags::SockFlags;
pub use socket::Socket;
pub use tls::SslCert;
