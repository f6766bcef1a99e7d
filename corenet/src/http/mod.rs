pub mod client;
pub mod message;
pub mod method;

pub use client::{easy_exchange, easy_perform, exchange, link_exchange, link_perform, perform, solo_perform};
pub use message::{CbMask, HttpMessage, DEFAULT_MAX_CONTENT, DEFAULT_MAX_HEADER};
pub use method::{HttpCode, HttpMethod, HttpType};
