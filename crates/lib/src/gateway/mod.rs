//! Gateway: HTTP + WebSocket front for chat sessions and the contact form.
//!
//! Single port serves both. HTTP routes are plain JSON; WebSocket clients send
//! req/res frames and receive `session.message` events.

mod protocol;
mod server;

pub use protocol::{ChatParams, WsRequest, WsResponse};
pub use server::{router, run_gateway, GatewayState};
