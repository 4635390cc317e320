//! server-side websocket session engine
//!
//! Implements the RFC 6455 opening handshake, frame codec, and a four-state
//! session lifecycle (`connecting` -> `open` -> `closing` -> `closed`) that
//! drives an application-supplied [`Handler`]. The acceptor loop, TLS
//! wrapping, and application logic (what to broadcast, reflect, or
//! schedule) are collaborators outside this crate's scope.

pub mod config;
mod error;
mod frame;
mod handshake;
mod session;
pub mod tls;

pub use config::Config;
pub use error::WsError;
pub use frame::{Message, OpCode};
pub use handshake::Headers;
pub use session::{Handler, Session, SessionHandle};
