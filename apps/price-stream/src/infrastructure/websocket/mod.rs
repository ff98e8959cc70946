//! WebSocket Price Feed Adapter
//!
//! Transport port implementation for JSON price feeds served over
//! WebSocket.

/// WebSocket transport and session.
pub mod client;

/// JSON wire format.
pub mod codec;

pub use client::{WsSession, WsTransport};
pub use codec::{CodecError, JsonCodec};
