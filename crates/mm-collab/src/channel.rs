//! Real-time channel abstraction and an in-process hub.
//!
//! A channel is the sending half of one client's connection: it joins and
//! leaves rooms and publishes envelopes. Incoming envelopes arrive on the
//! [`Inbound`] receiver handed out alongside the channel when it connects.

use crate::error::{CollabError, Result};
use async_trait::async_trait;
use mm_core::id::MindMapId;
use mm_editor::sync::Envelope;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

/// Receiving half of a connection.
pub type Inbound = mpsc::UnboundedReceiver<Envelope>;

/// Publish/subscribe connection to a room server.
///
/// Delivery is best-effort: a successful `send` means the frame left this
/// client, not that any peer received it.
#[async_trait]
pub trait RealtimeChannel: Send + Sync {
    /// Subscribe to a room. Joining twice is a no-op.
    async fn join(&self, mind_map: &MindMapId) -> Result<()>;

    /// Unsubscribe from a room.
    async fn leave(&self, mind_map: &MindMapId) -> Result<()>;

    /// Publish to the room named in the envelope.
    async fn send(&self, envelope: &Envelope) -> Result<()>;
}

// ─── In-process hub ──────────────────────────────────────────────────────

type MemberId = u64;

#[derive(Debug, Default)]
struct HubState {
    next_member: MemberId,
    rooms: HashMap<MindMapId, HashMap<MemberId, mpsc::UnboundedSender<Envelope>>>,
}

/// Room server living in the same process. Used by tests and by embedders
/// that host several editors side by side.
#[derive(Debug, Clone, Default)]
pub struct LocalHub {
    state: Arc<Mutex<HubState>>,
    echo_to_sender: bool,
}

impl LocalHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also deliver each envelope back to the member that sent it, the way
    /// some broadcast servers do.
    pub fn with_echo(mut self, echo_to_sender: bool) -> Self {
        self.echo_to_sender = echo_to_sender;
        self
    }

    pub fn connect(&self) -> (LocalChannel, Inbound) {
        let (tx, rx) = mpsc::unbounded_channel();
        let member = {
            let mut state = self.lock();
            state.next_member += 1;
            state.next_member
        };
        let channel = LocalChannel {
            hub: self.clone(),
            member,
            tx,
            joined: Mutex::new(HashSet::new()),
        };
        (channel, rx)
    }

    /// Number of members currently in `mind_map`'s room.
    pub fn members(&self, mind_map: &MindMapId) -> usize {
        self.lock().rooms.get(mind_map).map_or(0, HashMap::len)
    }

    fn lock(&self) -> MutexGuard<'_, HubState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One member's connection to a [`LocalHub`].
#[derive(Debug)]
pub struct LocalChannel {
    hub: LocalHub,
    member: MemberId,
    tx: mpsc::UnboundedSender<Envelope>,
    joined: Mutex<HashSet<MindMapId>>,
}

impl LocalChannel {
    fn joined(&self) -> MutexGuard<'_, HashSet<MindMapId>> {
        self.joined.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl RealtimeChannel for LocalChannel {
    async fn join(&self, mind_map: &MindMapId) -> Result<()> {
        if !self.joined().insert(mind_map.clone()) {
            return Ok(());
        }
        self.hub
            .lock()
            .rooms
            .entry(mind_map.clone())
            .or_default()
            .insert(self.member, self.tx.clone());
        log::debug!("member {} joined {mind_map}", self.member);
        Ok(())
    }

    async fn leave(&self, mind_map: &MindMapId) -> Result<()> {
        if !self.joined().remove(mind_map) {
            return Ok(());
        }
        let mut state = self.hub.lock();
        if let Some(room) = state.rooms.get_mut(mind_map) {
            room.remove(&self.member);
            if room.is_empty() {
                state.rooms.remove(mind_map);
            }
        }
        log::debug!("member {} left {mind_map}", self.member);
        Ok(())
    }

    async fn send(&self, envelope: &Envelope) -> Result<()> {
        if !self.joined().contains(&envelope.mind_map_id) {
            return Err(CollabError::NotJoined);
        }
        let mut state = self.hub.lock();
        let Some(room) = state.rooms.get_mut(&envelope.mind_map_id) else {
            return Err(CollabError::NotJoined);
        };
        // Members whose receiver is gone are pruned as we go.
        room.retain(|member, tx| {
            if *member == self.member && !self.hub.echo_to_sender {
                return true;
            }
            tx.send(envelope.clone()).is_ok()
        });
        Ok(())
    }
}

impl Drop for LocalChannel {
    fn drop(&mut self) {
        let rooms: Vec<MindMapId> = self.joined().drain().collect();
        let mut state = self.hub.lock();
        for mind_map in rooms {
            if let Some(room) = state.rooms.get_mut(&mind_map) {
                room.remove(&self.member);
                if room.is_empty() {
                    state.rooms.remove(&mind_map);
                }
            }
        }
    }
}
