use thiserror::Error;

/// errors raised while driving a session through its handshake and frame lifecycle
#[derive(Debug, Error)]
pub enum WsError {
    #[error("transport read failed: {0}")]
    TransportRead(#[source] std::io::Error),

    #[error("transport write failed: {0}")]
    TransportWrite(#[source] std::io::Error),

    #[error("malformed handshake: {0}")]
    HandshakeMalformed(String),

    #[error("malformed frame: {0}")]
    FrameMalformed(String),

    #[error("unsupported opcode {0:#x}")]
    ProtocolViolation(u8),
}
