//! TCP client for the room relay.

use crate::auth::Credential;
use crate::channel::{Inbound, RealtimeChannel};
use crate::codec::{Frame, WireCodec, read_frame, write_frame};
use crate::error::{CollabError, Result};
use async_trait::async_trait;
use mm_core::id::MindMapId;
use mm_editor::sync::Envelope;
use tokio::io::BufReader;
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

/// Connection to an `mm-relay` server.
///
/// A background task reads event frames and forwards them to the
/// [`Inbound`] receiver returned by [`connect`](Self::connect). The
/// receiver closes when the server hangs up.
#[derive(Debug)]
pub struct TcpChannel {
    writer: Mutex<OwnedWriteHalf>,
    codec: WireCodec,
    reader: JoinHandle<()>,
}

impl TcpChannel {
    pub async fn connect(
        addr: &str,
        codec: WireCodec,
        credential: Option<Credential>,
    ) -> Result<(Self, Inbound)> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let (read_half, mut write_half) = stream.into_split();

        if let Some(credential) = credential {
            write_frame(&mut write_half, codec, &Frame::Auth { credential }).await?;
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let reader = tokio::spawn(async move {
            let mut reader = BufReader::new(read_half);
            loop {
                match read_frame(&mut reader, codec).await {
                    Ok(Some(Frame::Event(envelope))) => {
                        if tx.send(envelope).is_err() {
                            break;
                        }
                    }
                    Ok(Some(other)) => log::debug!("ignoring {other:?} from relay"),
                    Ok(None) => {
                        log::info!("relay closed the connection");
                        break;
                    }
                    Err(e) => {
                        log::warn!("relay read failed: {e}");
                        break;
                    }
                }
            }
        });

        log::debug!("connected to relay at {addr}");
        let channel = Self {
            writer: Mutex::new(write_half),
            codec,
            reader,
        };
        Ok((channel, rx))
    }

    async fn write(&self, frame: &Frame) -> Result<()> {
        let mut writer = self.writer.lock().await;
        write_frame(&mut *writer, self.codec, frame)
            .await
            .map_err(|e| match e {
                CollabError::Io(io) => CollabError::Delivery(io.to_string()),
                other => other,
            })
    }
}

#[async_trait]
impl RealtimeChannel for TcpChannel {
    async fn join(&self, mind_map: &MindMapId) -> Result<()> {
        self.write(&Frame::Join {
            mind_map_id: mind_map.clone(),
        })
        .await
    }

    async fn leave(&self, mind_map: &MindMapId) -> Result<()> {
        self.write(&Frame::Leave {
            mind_map_id: mind_map.clone(),
        })
        .await
    }

    async fn send(&self, envelope: &Envelope) -> Result<()> {
        self.write(&Frame::Event(envelope.clone())).await
    }
}

impl Drop for TcpChannel {
    fn drop(&mut self) {
        self.reader.abort();
    }
}
