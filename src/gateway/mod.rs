//! 传输层：WebSocket 网关、HTTP API、会话管理

pub mod http;
pub mod hub;
pub mod message;
pub mod session;

pub use http::{router, HttpState};
pub use hub::GatewayHub;
pub use message::ClientMessage;
pub use session::{Session, SessionManager};
