//! Library surface for `roleplay-hub` — the `main.rs` binary is a thin
//! wrapper over this crate, and integration tests under `tests/` drive
//! the dispatcher directly through these modules rather than over a real
//! socket.

pub mod config;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod frame;
pub mod handlers;
pub mod identity;
pub mod network;
pub mod presence;
pub mod redpacket;
pub mod security;
pub mod state;
