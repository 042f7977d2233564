//! Connection Manager (§4.4): WebSocket accept loop, per-session
//! heartbeat, and the gateway's small JSON health endpoint.

pub mod gateway;
pub mod session;

pub use gateway::{GatewayState, build_router};
