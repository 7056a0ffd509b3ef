//! WebSocket layer: sessions, request routing and event forwarding.
//!
//! The endpoint at `/ws` carries the swap protocol. Every message is a JSON
//! object; requests are discriminated by `kind`, and each session receives a
//! connection message before anything else.

pub mod connection;
pub mod handler;
pub mod messages;
pub mod subscription;

pub use connection::dispatch;
pub use messages::{Decoded, ServerMessage, SwapRequest, decode};
pub use subscription::SubscriptionManager;
