//! Wire frames and their encodings.
//!
//! Every frame on a TCP connection is a big-endian `u32` payload length
//! followed by the payload, encoded as JSON or MessagePack. Both ends of a
//! connection must agree on the encoding.

use crate::auth::Credential;
use crate::error::{CollabError, Result};
use mm_core::id::MindMapId;
use mm_editor::sync::Envelope;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Upper bound on a single payload.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// One message between a client and the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Frame {
    Auth {
        credential: Credential,
    },
    #[serde(rename_all = "camelCase")]
    Join {
        mind_map_id: MindMapId,
    },
    #[serde(rename_all = "camelCase")]
    Leave {
        mind_map_id: MindMapId,
    },
    Event(Envelope),
}

/// Payload encoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireCodec {
    #[default]
    Json,
    MsgPack,
}

impl WireCodec {
    pub fn encode(self, frame: &Frame) -> Result<Vec<u8>> {
        Ok(match self {
            WireCodec::Json => serde_json::to_vec(frame)?,
            WireCodec::MsgPack => rmp_serde::to_vec_named(frame)?,
        })
    }

    pub fn decode(self, bytes: &[u8]) -> Result<Frame> {
        Ok(match self {
            WireCodec::Json => serde_json::from_slice(bytes)?,
            WireCodec::MsgPack => rmp_serde::from_slice(bytes)?,
        })
    }
}

impl std::str::FromStr for WireCodec {
    type Err = CollabError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(WireCodec::Json),
            "msgpack" => Ok(WireCodec::MsgPack),
            other => Err(CollabError::Codec(format!("unknown codec `{other}`"))),
        }
    }
}

/// Write one length-prefixed frame and flush.
pub async fn write_frame<W>(writer: &mut W, codec: WireCodec, frame: &Frame) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let payload = codec.encode(frame)?;
    let len = u32::try_from(payload.len())
        .ok()
        .filter(|&len| len as usize <= MAX_FRAME_LEN)
        .ok_or_else(|| CollabError::Codec(format!("frame of {} bytes", payload.len())))?;
    writer.write_u32(len).await?;
    writer.write_all(&payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one length-prefixed frame. `Ok(None)` on a clean end of stream.
pub async fn read_frame<R>(reader: &mut R, codec: WireCodec) -> Result<Option<Frame>>
where
    R: AsyncRead + Unpin,
{
    let len = match reader.read_u32().await {
        Ok(len) => len as usize,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if len > MAX_FRAME_LEN {
        return Err(CollabError::Codec(format!("frame of {len} bytes")));
    }
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    codec.decode(&payload).map(Some)
}
