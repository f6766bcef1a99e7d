pub mod frame;

pub use frame::{WsFrame, WsFrameType};
