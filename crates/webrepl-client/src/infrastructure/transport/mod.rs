//! Device transport: the link traits, the WebSocket implementation, the
//! authenticated session built on top of them, and a scripted test double.

pub mod link;
pub mod mock;
pub mod session;
pub mod websocket;

pub use link::{Connector, DeviceLink, LinkError};
pub use session::{Session, SessionState, SessionTimeouts};
pub use websocket::{WsConnector, WsLink};
