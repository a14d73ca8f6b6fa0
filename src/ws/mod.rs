//! WebSocket echo sessions.
//!
//! An HTTP connection whose request carries the upgrade headers hands its
//! transport (plain or TLS) and the parsed request to a [`session::WsSession`],
//! which completes the accept handshake and echoes frames until the peer
//! closes.

pub mod session;
