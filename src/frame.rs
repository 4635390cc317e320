use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::WsError;

/// maximum payload length for ping/pong/close control frames, per RFC 6455 5.5
const MAX_CONTROL_FRAME_LEN: u64 = 125;

/// the RFC 6455 frame opcodes this core understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    Continuation,
    Text,
    Binary,
    Close,
    Ping,
    Pong,
}

impl OpCode {
    fn from_u8(b: u8) -> Result<Self, WsError> {
        match b {
            0x0 => Ok(OpCode::Continuation),
            0x1 => Ok(OpCode::Text),
            0x2 => Ok(OpCode::Binary),
            0x8 => Ok(OpCode::Close),
            0x9 => Ok(OpCode::Ping),
            0xA => Ok(OpCode::Pong),
            other => Err(WsError::ProtocolViolation(other)),
        }
    }

    pub(crate) fn as_u8(self) -> u8 {
        match self {
            OpCode::Continuation => 0x0,
            OpCode::Text => 0x1,
            OpCode::Binary => 0x2,
            OpCode::Close => 0x8,
            OpCode::Ping => 0x9,
            OpCode::Pong => 0xA,
        }
    }

    fn is_control(self) -> bool {
        matches!(self, OpCode::Close | OpCode::Ping | OpCode::Pong)
    }
}

/// a decoded message: an opcode and its (already unmasked) payload
#[derive(Debug, Clone)]
pub struct Message {
    pub opcode: OpCode,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn text(payload: Vec<u8>) -> Self {
        Message { opcode: OpCode::Text, payload }
    }

    pub fn binary(payload: Vec<u8>) -> Self {
        Message { opcode: OpCode::Binary, payload }
    }
}

/// outcome of reading one frame off the wire
pub(crate) enum ReadOutcome {
    /// a well-formed frame the session should act on
    Frame(Message),
    /// FIN=0, a reserved bit set, or MASK=0: discarded per 4.3, not an error
    Dropped,
}

/// reads one client-to-server frame: 2-byte header, optional extended length,
/// 4-byte mask, then the masked payload. client frames are always masked.
pub(crate) async fn read_frame<R>(reader: &mut R) -> Result<ReadOutcome, WsError>
where
    R: AsyncRead + Unpin,
{
    let mut head = [0u8; 2];
    reader.read_exact(&mut head).await.map_err(WsError::TransportRead)?;

    let fin = head[0] & 0b1000_0000 != 0;
    let rsv = head[0] & 0b0111_0000 != 0;
    let opcode_bits = head[0] & 0b0000_1111;
    let masked = head[1] & 0b1000_0000 != 0;
    let len7 = head[1] & 0b0111_1111;

    if !fin || rsv || !masked {
        return Ok(ReadOutcome::Dropped);
    }

    let opcode = OpCode::from_u8(opcode_bits)?;

    let len = match len7 {
        126 => {
            let mut ext = [0u8; 2];
            reader.read_exact(&mut ext).await.map_err(WsError::TransportRead)?;
            u16::from_be_bytes(ext) as u64
        }
        127 => {
            let mut ext = [0u8; 8];
            reader.read_exact(&mut ext).await.map_err(WsError::TransportRead)?;
            u64::from_be_bytes(ext)
        }
        n => n as u64,
    };

    if opcode.is_control() && len > MAX_CONTROL_FRAME_LEN {
        return Err(WsError::FrameMalformed(format!(
            "control frame payload {len} exceeds {MAX_CONTROL_FRAME_LEN} bytes"
        )));
    }

    let mut mask = [0u8; 4];
    reader.read_exact(&mut mask).await.map_err(WsError::TransportRead)?;

    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload).await.map_err(WsError::TransportRead)?;
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte ^= mask[i % 4];
    }

    Ok(ReadOutcome::Frame(Message { opcode, payload }))
}

/// serializes an unmasked server-to-client frame: FIN=1, RSV=0, MASK=0.
pub(crate) fn encode_frame(opcode: OpCode, payload: &[u8]) -> Vec<u8> {
    let len = payload.len();
    let mut out = Vec::with_capacity(2 + 8 + len);
    out.push(0x80 | opcode.as_u8());

    if len < 126 {
        out.push(len as u8);
    } else if len <= u16::MAX as usize {
        out.push(126);
        out.extend_from_slice(&(len as u16).to_be_bytes());
    } else {
        out.push(127);
        out.extend_from_slice(&(len as u64).to_be_bytes());
    }

    out.extend_from_slice(payload);
    out
}

pub(crate) async fn write_frame<W>(writer: &mut W, opcode: OpCode, payload: &[u8]) -> Result<(), WsError>
where
    W: AsyncWrite + Unpin,
{
    let bytes = encode_frame(opcode, payload);
    writer.write_all(&bytes).await.map_err(WsError::TransportWrite)?;
    writer.flush().await.map_err(WsError::TransportWrite)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn mask_payload(payload: &[u8], mask: [u8; 4]) -> Vec<u8> {
        payload
            .iter()
            .enumerate()
            .map(|(i, b)| b ^ mask[i % 4])
            .collect()
    }

    fn client_frame(opcode: OpCode, payload: &[u8], mask: [u8; 4]) -> Vec<u8> {
        let len = payload.len();
        let mut out = Vec::new();
        out.push(0x80 | opcode.as_u8());
        if len < 126 {
            out.push(0x80 | len as u8);
        } else if len <= u16::MAX as usize {
            out.push(0x80 | 126);
            out.extend_from_slice(&(len as u16).to_be_bytes());
        } else {
            out.push(0x80 | 127);
            out.extend_from_slice(&(len as u64).to_be_bytes());
        }
        out.extend_from_slice(&mask);
        out.extend_from_slice(&mask_payload(payload, mask));
        out
    }

    #[tokio::test]
    async fn decodes_small_masked_text_frame() {
        let bytes = client_frame(OpCode::Text, b"hello", [0x12, 0x34, 0x56, 0x78]);
        let mut cur = Cursor::new(bytes);
        match read_frame(&mut cur).await.unwrap() {
            ReadOutcome::Frame(msg) => {
                assert_eq!(msg.opcode, OpCode::Text);
                assert_eq!(msg.payload, b"hello");
            }
            ReadOutcome::Dropped => panic!("expected a frame"),
        }
    }

    #[tokio::test]
    async fn drops_unmasked_frame() {
        let bytes = vec![0x81, 0x05, b'h', b'e', b'l', b'l', b'o'];
        let mut cur = Cursor::new(bytes);
        match read_frame(&mut cur).await.unwrap() {
            ReadOutcome::Dropped => {}
            ReadOutcome::Frame(_) => panic!("expected the frame to be dropped"),
        }
    }

    #[tokio::test]
    async fn drops_fragmented_frame() {
        let mut bytes = client_frame(OpCode::Text, b"part", [1, 2, 3, 4]);
        bytes[0] &= !0b1000_0000; // clear FIN
        let mut cur = Cursor::new(bytes);
        match read_frame(&mut cur).await.unwrap() {
            ReadOutcome::Dropped => {}
            ReadOutcome::Frame(_) => panic!("expected the frame to be dropped"),
        }
    }

    #[tokio::test]
    async fn drops_frame_with_reserved_bit_set() {
        let mut bytes = client_frame(OpCode::Binary, b"x", [9, 9, 9, 9]);
        bytes[0] |= 0b0100_0000; // set RSV1
        let mut cur = Cursor::new(bytes);
        match read_frame(&mut cur).await.unwrap() {
            ReadOutcome::Dropped => {}
            ReadOutcome::Frame(_) => panic!("expected the frame to be dropped"),
        }
    }

    #[tokio::test]
    async fn rejects_oversized_ping() {
        let payload = vec![0u8; 126];
        let bytes = client_frame(OpCode::Ping, &payload, [1, 1, 1, 1]);
        let mut cur = Cursor::new(bytes);
        assert!(matches!(read_frame(&mut cur).await, Err(WsError::FrameMalformed(_))));
    }

    #[test]
    fn encodes_small_text_frame_exactly() {
        let out = encode_frame(OpCode::Text, b"hello");
        assert_eq!(out, vec![0x81, 0x05, b'h', b'e', b'l', b'l', b'o']);
    }

    #[test]
    fn encodes_medium_length_prefix() {
        let payload = vec![0u8; 200];
        let out = encode_frame(OpCode::Binary, &payload);
        assert_eq!(&out[0..4], &[0x82, 0x7E, 0x00, 0xC8]);
        assert_eq!(out.len(), 4 + 200);
    }

    #[test]
    fn encodes_large_length_prefix() {
        let payload = vec![0u8; 70000];
        let out = encode_frame(OpCode::Binary, &payload);
        assert_eq!(
            &out[0..10],
            &[0x82, 0x7F, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x11, 0x70]
        );
        assert_eq!(out.len(), 10 + 70000);
    }

    #[tokio::test]
    async fn round_trips_every_length_boundary() {
        for len in [0usize, 125, 126, 127, 65535, 65536, 70000] {
            let payload: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
            let server_bytes = encode_frame(OpCode::Binary, &payload);

            // reinterpret the server frame as if a client had sent it, masked
            let mask = [0xAA, 0xBB, 0xCC, 0xDD];
            let mut client_bytes = server_bytes.clone();
            client_bytes[1] |= 0x80; // set MASK bit
            let header_len = server_bytes.len() - payload.len();
            client_bytes.splice(header_len..header_len, mask);
            for (i, b) in client_bytes[header_len + 4..].iter_mut().enumerate() {
                *b ^= mask[i % 4];
            }

            let mut cur = Cursor::new(client_bytes);
            match read_frame(&mut cur).await.unwrap() {
                ReadOutcome::Frame(msg) => {
                    assert_eq!(msg.opcode, OpCode::Binary);
                    assert_eq!(msg.payload, payload, "mismatch at len {len}");
                }
                ReadOutcome::Dropped => panic!("unexpected drop at len {len}"),
            }
        }
    }
}
