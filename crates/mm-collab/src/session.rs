//! One open mind map: local edits, remote events, debounced delivery and
//! saves, all on a single timeline.
//!
//! The session owns the [`MutationEngine`] and the [`Canvas`] built from the
//! configured zoom limits. Structural changes (create, delete) are
//! broadcast at once; content updates are coalesced per node and broadcast
//! after a quiet period; the whole tree is saved after its own quiet
//! period. Network sends and saves run on background tasks fed
//! by queues, so neither blocks editing and each keeps its order. Their
//! failures surface as [`Notice`]s.

use crate::channel::{Inbound, RealtimeChannel};
use crate::config::SessionConfig;
use crate::error::Result;
use crate::persistence::TreeStore;
use mm_core::id::{ClientId, MindMapId, NodeId};
use mm_core::model::Tree;
use mm_editor::canvas::{Canvas, CanvasAction};
use mm_editor::debounce::Coalescer;
use mm_editor::engine::{Intent, MutationEngine};
use mm_editor::input::InputEvent;
use mm_editor::sync::{Envelope, LinkCommand, Mutation, RoomLink};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Something the UI should tell the user about. Editing continues.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    SaveFailed(String),
    DeliveryFailed(String),
}

pub struct Session {
    mind_map: MindMapId,
    engine: MutationEngine,
    canvas: Canvas,
    link: RoomLink,
    channel: Arc<dyn RealtimeChannel>,
    config: SessionConfig,
    updates: Coalescer<NodeId, String>,
    save_due: Option<Instant>,
    outbound: mpsc::UnboundedSender<Envelope>,
    saves: mpsc::UnboundedSender<Tree>,
    workers: Vec<JoinHandle<()>>,
}

impl Session {
    /// Load `mind_map` from `store`, join its room on `channel`, and start
    /// the delivery and save workers. Returns the session and the notice
    /// stream.
    pub async fn open(
        mind_map: MindMapId,
        client: ClientId,
        store: Arc<dyn TreeStore>,
        channel: Arc<dyn RealtimeChannel>,
        config: SessionConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<Notice>)> {
        let tree = store.load_tree(&mind_map).await?;
        log::info!("opened {mind_map} ({} nodes)", tree.len());

        let (notice_tx, notices) = mpsc::unbounded_channel();
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (saves, saves_rx) = mpsc::unbounded_channel();
        let workers = vec![
            tokio::spawn(deliver(Arc::clone(&channel), outbound_rx, notice_tx.clone())),
            tokio::spawn(persist(mind_map.clone(), store, saves_rx, notice_tx)),
        ];

        let mut session = Self {
            engine: MutationEngine::new(tree).with_placement(config.placement),
            canvas: Canvas::new(config.zoom),
            link: RoomLink::new(client),
            updates: Coalescer::new(config.debounce()),
            save_due: None,
            mind_map: mind_map.clone(),
            channel,
            config,
            outbound,
            saves,
            workers,
        };
        // The channel is already connected; take the link straight through.
        let mut commands = session.link.enter(mind_map);
        if commands.contains(&LinkCommand::Connect) {
            commands = session.link.connected();
        }
        run_link(session.channel.as_ref(), client, commands).await?;
        Ok((session, notices))
    }

    pub fn mind_map(&self) -> &MindMapId {
        &self.mind_map
    }

    pub fn client(&self) -> ClientId {
        self.link.client()
    }

    pub fn engine(&self) -> &MutationEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut MutationEngine {
        &mut self.engine
    }

    pub fn canvas(&self) -> &Canvas {
        &self.canvas
    }

    pub fn canvas_mut(&mut self) -> &mut Canvas {
        &mut self.canvas
    }

    pub fn tree(&self) -> &Tree {
        self.engine.tree()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Apply a local intent at `now`. Returns the mutation if the intent
    /// was accepted.
    pub fn perform(&mut self, intent: &Intent, now: Instant) -> Option<Mutation> {
        let mutation = self.engine.apply(intent)?;
        self.dispatch(&mutation, now);
        Some(mutation)
    }

    /// Route a pointer or key event through the canvas at `now`. Selection,
    /// edit start and tree shortcuts reach the engine; a resulting mutation
    /// is dispatched like one from [`perform`](Self::perform).
    pub fn handle_input(&mut self, event: &InputEvent, now: Instant) -> CanvasAction {
        let action = self.canvas.handle(self.engine.tree(), event);
        match &action {
            CanvasAction::Select(id) => {
                self.engine.select(*id);
            }
            CanvasAction::Edit(id) => {
                self.engine.begin_edit(*id);
            }
            CanvasAction::Shortcut(shortcut) => {
                if let Some(mutation) = self.engine.handle_shortcut(*shortcut) {
                    self.dispatch(&mutation, now);
                }
            }
            CanvasAction::Idle | CanvasAction::ViewChanged => {}
        }
        action
    }

    /// Apply an envelope from the channel. Returns whether it changed the
    /// tree.
    pub fn handle_remote(&mut self, envelope: Envelope) -> bool {
        let Some(mutation) = self.link.accept(envelope) else {
            return false;
        };
        match self.engine.apply_remote(&mutation) {
            Ok(()) => {
                if matches!(mutation, Mutation::NodeDeleted { .. }) {
                    self.drop_stale_updates();
                    self.canvas.sync_elements(self.engine.tree());
                }
                true
            }
            Err(e) => {
                log::warn!("rejected remote {:?}: {e}", mutation.node_id());
                false
            }
        }
    }

    /// Earliest instant at which [`flush_due`](Self::flush_due) has work.
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.updates.next_deadline(), self.save_due) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Broadcast every content update and start the save whose quiet
    /// period has elapsed by `now`.
    pub fn flush_due(&mut self, now: Instant) {
        for (node_id, content) in self.updates.drain_due(now) {
            self.broadcast(Mutation::NodeUpdated { node_id, content });
        }
        if self.save_due.is_some_and(|due| due <= now) {
            self.save_now();
        }
    }

    /// Flush everything pending, wait for the workers to drain their
    /// queues, then leave the room. Returns the final tree.
    pub async fn close(mut self) -> Result<Tree> {
        for (node_id, content) in self.updates.flush() {
            self.broadcast(Mutation::NodeUpdated { node_id, content });
        }
        if self.save_due.is_some() {
            self.save_now();
        }

        let Session {
            mind_map,
            engine,
            mut link,
            channel,
            outbound,
            saves,
            workers,
            ..
        } = self;
        drop(outbound);
        drop(saves);
        for worker in workers {
            if let Err(e) = worker.await {
                log::warn!("worker for {mind_map} failed: {e}");
            }
        }
        run_link(channel.as_ref(), link.client(), link.leave()).await?;
        log::info!("closed {mind_map}");
        Ok(engine.tree().clone())
    }

    /// Drive the session until `intents` closes: apply intents and remote
    /// envelopes as they arrive and flush on deadlines. Closes the session
    /// on exit.
    pub async fn run(
        mut self,
        mut inbound: Inbound,
        mut intents: mpsc::UnboundedReceiver<Intent>,
    ) -> Result<Tree> {
        loop {
            let deadline = self.next_deadline();
            tokio::select! {
                intent = intents.recv() => match intent {
                    Some(intent) => {
                        self.perform(&intent, Instant::now());
                    }
                    None => break,
                },
                Some(envelope) = inbound.recv() => {
                    self.handle_remote(envelope);
                }
                _ = sleep_until(deadline), if deadline.is_some() => {
                    self.flush_due(Instant::now());
                }
            }
        }
        self.close().await
    }

    fn dispatch(&mut self, mutation: &Mutation, now: Instant) {
        match mutation {
            Mutation::NodeUpdated { node_id, content } => {
                self.updates.push(*node_id, content.clone(), now);
            }
            Mutation::NodeCreated { .. } => self.broadcast(mutation.clone()),
            Mutation::NodeDeleted { .. } => {
                self.drop_stale_updates();
                self.canvas.sync_elements(self.engine.tree());
                self.broadcast(mutation.clone());
            }
        }
        self.save_due = Some(now + self.config.save_debounce());
    }

    fn broadcast(&self, mutation: Mutation) {
        let Some(envelope) = self.link.outbound(mutation) else {
            log::debug!("not joined, keeping edit local");
            return;
        };
        if self.outbound.send(envelope).is_err() {
            log::warn!("delivery worker for {} is gone", self.mind_map);
        }
    }

    fn save_now(&mut self) {
        self.save_due = None;
        if self.saves.send(self.engine.tree().clone()).is_err() {
            log::warn!("save worker for {} is gone", self.mind_map);
        }
    }

    /// Forget pending updates for nodes that no longer exist.
    fn drop_stale_updates(&mut self) {
        let tree = self.engine.tree();
        let stale: Vec<NodeId> = self
            .updates
            .keys()
            .filter(|id| !tree.contains(**id))
            .copied()
            .collect();
        for id in stale {
            self.updates.cancel(&id);
        }
    }
}

async fn run_link(
    channel: &dyn RealtimeChannel,
    client: ClientId,
    commands: Vec<LinkCommand>,
) -> Result<()> {
    for command in commands {
        match command {
            LinkCommand::Connect => {}
            LinkCommand::Join(mind_map) => {
                channel.join(&mind_map).await?;
                log::info!("{client} joined {mind_map}");
            }
            LinkCommand::Leave(mind_map) => {
                channel.leave(&mind_map).await?;
                log::info!("{client} left {mind_map}");
            }
        }
    }
    Ok(())
}

async fn sleep_until(deadline: Option<Instant>) {
    if let Some(deadline) = deadline {
        tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await;
    }
}

async fn deliver(
    channel: Arc<dyn RealtimeChannel>,
    mut queue: mpsc::UnboundedReceiver<Envelope>,
    notices: mpsc::UnboundedSender<Notice>,
) {
    while let Some(envelope) = queue.recv().await {
        if let Err(e) = channel.send(&envelope).await {
            log::warn!("delivery of {:?} failed: {e}", envelope.mutation.node_id());
            let _ = notices.send(Notice::DeliveryFailed(e.to_string()));
        }
    }
}

async fn persist(
    mind_map: MindMapId,
    store: Arc<dyn TreeStore>,
    mut queue: mpsc::UnboundedReceiver<Tree>,
    notices: mpsc::UnboundedSender<Notice>,
) {
    while let Some(mut tree) = queue.recv().await {
        // Only the newest snapshot matters.
        while let Ok(newer) = queue.try_recv() {
            tree = newer;
        }
        if let Err(e) = store.save_tree(&mind_map, &tree).await {
            log::warn!("saving {mind_map} failed: {e}");
            let _ = notices.send(Notice::SaveFailed(e.to_string()));
        }
    }
}
