//! Room relay server.
//!
//! Clients connect over TCP, optionally authenticate, and join rooms keyed
//! by mind-map id. Every event frame is forwarded to the other members of
//! the room it names. The relay keeps no tree state and never echoes a
//! frame back to its sender.

use crate::auth::Credential;
use crate::codec::{Frame, WireCodec, read_frame, write_frame};
use crate::error::Result;
use mm_core::id::MindMapId;
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, mpsc};

type ConnId = u64;
type Outbox = mpsc::UnboundedSender<Frame>;

#[derive(Debug, Default)]
struct Rooms {
    members: HashMap<MindMapId, HashMap<ConnId, Outbox>>,
}

impl Rooms {
    fn join(&mut self, room: &MindMapId, conn: ConnId, outbox: &Outbox) {
        self.members
            .entry(room.clone())
            .or_default()
            .insert(conn, outbox.clone());
    }

    fn leave(&mut self, room: &MindMapId, conn: ConnId) {
        if let Some(members) = self.members.get_mut(room) {
            members.remove(&conn);
            if members.is_empty() {
                self.members.remove(room);
            }
        }
    }

    /// Send `frame` to every member of `room` except `from`.
    fn forward(&self, room: &MindMapId, from: ConnId, frame: &Frame) -> usize {
        self.members.get(room).map_or(0, |members| {
            members
                .iter()
                .filter(|(conn, _)| **conn != from)
                .filter(|(_, outbox)| outbox.send(frame.clone()).is_ok())
                .count()
        })
    }
}

#[derive(Debug)]
struct RelayState {
    codec: WireCodec,
    token: Option<Credential>,
    rooms: Mutex<Rooms>,
}

/// A bound relay, ready to [`serve`](Self::serve).
#[derive(Debug)]
pub struct RelayServer {
    listener: TcpListener,
    state: Arc<RelayState>,
}

impl RelayServer {
    /// Bind to `addr` (port 0 picks a free port). With a `token`, clients
    /// must send a matching auth frame before they can join a room.
    pub async fn bind(addr: &str, codec: WireCodec, token: Option<Credential>) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            state: Arc::new(RelayState {
                codec,
                token,
                rooms: Mutex::new(Rooms::default()),
            }),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until the listener fails.
    pub async fn serve(self) -> Result<()> {
        let mut next_conn: ConnId = 0;
        loop {
            let (stream, peer) = self.listener.accept().await?;
            next_conn += 1;
            let conn = next_conn;
            let state = Arc::clone(&self.state);
            log::debug!("connection {conn} from {peer}");
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, conn, state).await {
                    log::warn!("connection {conn} ended with error: {e}");
                }
            });
        }
    }
}

async fn handle_connection(stream: TcpStream, conn: ConnId, state: Arc<RelayState>) -> Result<()> {
    stream.set_nodelay(true)?;
    let codec = state.codec;
    let (read_half, mut write_half) = stream.into_split();

    let (outbox, mut outgoing) = mpsc::unbounded_channel::<Frame>();
    let writer = tokio::spawn(async move {
        while let Some(frame) = outgoing.recv().await {
            if let Err(e) = write_frame(&mut write_half, codec, &frame).await {
                log::debug!("connection {conn}: write failed: {e}");
                break;
            }
        }
    });

    let mut reader = BufReader::new(read_half);
    let mut authorized = state.token.is_none();
    let mut joined: HashSet<MindMapId> = HashSet::new();

    let result = loop {
        let frame = match read_frame(&mut reader, codec).await {
            Ok(Some(frame)) => frame,
            Ok(None) => break Ok(()),
            Err(e) => break Err(e),
        };
        match frame {
            Frame::Auth { credential } => {
                authorized = state.token.as_ref().is_none_or(|t| *t == credential);
                if !authorized {
                    log::warn!("connection {conn}: credential rejected");
                    leave_all(&state, conn, &mut joined).await;
                }
            }
            Frame::Join { mind_map_id } => {
                if !authorized {
                    log::warn!("connection {conn}: join {mind_map_id} before auth, dropped");
                    continue;
                }
                if joined.insert(mind_map_id.clone()) {
                    state.rooms.lock().await.join(&mind_map_id, conn, &outbox);
                    log::info!("connection {conn} joined {mind_map_id}");
                }
            }
            Frame::Leave { mind_map_id } => {
                if joined.remove(&mind_map_id) {
                    state.rooms.lock().await.leave(&mind_map_id, conn);
                    log::info!("connection {conn} left {mind_map_id}");
                }
            }
            Frame::Event(envelope) => {
                let room = envelope.mind_map_id.clone();
                if !joined.contains(&room) {
                    log::warn!("connection {conn}: event for {room} without joining, dropped");
                    continue;
                }
                let delivered = state
                    .rooms
                    .lock()
                    .await
                    .forward(&room, conn, &Frame::Event(envelope));
                log::trace!("connection {conn}: forwarded to {delivered} in {room}");
            }
        }
    };

    leave_all(&state, conn, &mut joined).await;
    drop(outbox);
    writer.abort();
    log::debug!("connection {conn} closed");
    result
}

async fn leave_all(state: &RelayState, conn: ConnId, joined: &mut HashSet<MindMapId>) {
    if joined.is_empty() {
        return;
    }
    let mut rooms = state.rooms.lock().await;
    for room in joined.drain() {
        rooms.leave(&room, conn);
        log::debug!("connection {conn} removed from {room}");
    }
}
