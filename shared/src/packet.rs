//! Remote console packet framing.
//!
//! Every packet is a little-endian `size, id, type` header followed by a
//! NUL-terminated body and one empty padding byte. `size` counts everything
//! after itself.

use serde::{Deserialize, Serialize};

pub const SERVERDATA_AUTH: i32 = 3;
pub const SERVERDATA_AUTH_RESPONSE: i32 = 2;
pub const SERVERDATA_EXECCOMMAND: i32 = 2;
pub const SERVERDATA_RESPONSE_VALUE: i32 = 0;

/// Id the server echoes back when the password is rejected.
pub const AUTH_FAILED_ID: i32 = -1;

pub const HEADER_SIZE: usize = 12;
/// `id` + `type` + two terminating NULs.
pub const MIN_PACKET_SIZE: usize = 10;
pub const MAX_BODY_SIZE: usize = 64 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum PacketError {
    #[error("packet body of {0} bytes exceeds the size limit")]
    BodyTooLarge(usize),
    #[error("invalid packet size {0}")]
    InvalidSize(i32),
    #[error("truncated packet: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },
    #[error("packet encoding failed: {0}")]
    Encoding(#[from] bincode::Error),
}

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    size: i32,
    id: i32,
    kind: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub id: i32,
    pub kind: i32,
    pub body: String,
}

impl Packet {
    pub fn new(id: i32, kind: i32, body: impl Into<String>) -> Self {
        Self {
            id,
            kind,
            body: body.into(),
        }
    }

    pub fn auth(id: i32, password: &str) -> Self {
        Self::new(id, SERVERDATA_AUTH, password)
    }

    pub fn command(id: i32, command: &str) -> Self {
        Self::new(id, SERVERDATA_EXECCOMMAND, command)
    }

    pub fn encode(&self) -> Result<Vec<u8>, PacketError> {
        let body = self.body.as_bytes();
        if body.len() > MAX_BODY_SIZE {
            return Err(PacketError::BodyTooLarge(body.len()));
        }

        let header = Header {
            size: (MIN_PACKET_SIZE + body.len()) as i32,
            id: self.id,
            kind: self.kind,
        };

        let mut data = bincode::serialize(&header)?;
        data.reserve(body.len() + 2);
        data.extend_from_slice(body);
        data.extend_from_slice(&[0, 0]);
        Ok(data)
    }

    /// Reads the leading `size` field and returns how many bytes follow it.
    pub fn frame_len(prefix: [u8; 4]) -> Result<usize, PacketError> {
        let size: i32 = bincode::deserialize(&prefix)?;
        if size < MIN_PACKET_SIZE as i32 || size as usize > MIN_PACKET_SIZE + MAX_BODY_SIZE {
            return Err(PacketError::InvalidSize(size));
        }
        Ok(size as usize)
    }

    /// Decodes the bytes that follow the `size` field.
    pub fn decode(frame: &[u8]) -> Result<Self, PacketError> {
        if frame.len() < MIN_PACKET_SIZE {
            return Err(PacketError::Truncated {
                expected: MIN_PACKET_SIZE,
                actual: frame.len(),
            });
        }

        let (id, kind): (i32, i32) = bincode::deserialize(&frame[..8])?;

        // Servers differ in how many trailing NULs they send.
        let body = &frame[8..];
        let end = body.iter().position(|&b| b == 0).unwrap_or(body.len());

        Ok(Self {
            id,
            kind,
            body: String::from_utf8_lossy(&body[..end]).into_owned(),
        })
    }
}
