// src/relay/mod.rs
//
// The relay: a stateless WebSocket broadcast hub plus the per-process
// client that keeps a connection to it alive.

pub mod client;
pub mod hub;

pub use client::RelayClient;
pub use hub::{HubState, RelayHub};
