//! Sync protocol: mutation events, room membership, and echo suppression.
//!
//! Every local edit produces one [`Mutation`]. The session applies it to its
//! own tree first, then hands it to [`RoomLink::outbound`] which stamps it
//! with the mind map and the sending client. On the way in,
//! [`RoomLink::accept`] drops events for other mind maps and events this
//! client sent itself, so a relay that echoes back to the sender never
//! causes a second application.
//!
//! Delivery is best-effort and unordered beyond what the transport gives.
//! There is no reconciliation: the last event applied to a field wins.

use mm_core::id::{ClientId, MindMapId, NodeId};
use mm_core::model::Node;
use serde::{Deserialize, Serialize};

/// A change to a mind map, as produced locally or received from a peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Mutation {
    /// A node was created (carries the full node, including its order).
    #[serde(rename = "node:create")]
    NodeCreated { node: Node },

    /// A node's content was replaced.
    #[serde(rename = "node:update", rename_all = "camelCase")]
    NodeUpdated { node_id: NodeId, content: String },

    /// A node and, implicitly, its whole subtree were removed. Receivers
    /// compute the closure against their own tree.
    #[serde(rename = "node:delete", rename_all = "camelCase")]
    NodeDeleted { node_id: NodeId },
}

impl Mutation {
    /// The node this mutation is about.
    pub fn node_id(&self) -> NodeId {
        match self {
            Mutation::NodeCreated { node } => node.id,
            Mutation::NodeUpdated { node_id, .. } | Mutation::NodeDeleted { node_id } => *node_id,
        }
    }
}

/// A mutation addressed to one mind map's room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub mind_map_id: MindMapId,
    pub origin: ClientId,
    pub mutation: Mutation,
}

// ─── Room membership ─────────────────────────────────────────────────────

/// Connection + room state of one client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    /// Connecting; `pending` is the room to join once connected.
    Connecting { pending: Option<MindMapId> },
    /// Connected but not in any room.
    Connected,
    Joined(MindMapId),
}

/// What the transport should do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkCommand {
    Connect,
    Join(MindMapId),
    Leave(MindMapId),
}

/// Drives room membership for one client and filters its traffic.
#[derive(Debug, Clone)]
pub struct RoomLink {
    client: ClientId,
    state: LinkState,
}

impl RoomLink {
    pub fn new(client: ClientId) -> Self {
        Self {
            client,
            state: LinkState::Disconnected,
        }
    }

    pub fn client(&self) -> ClientId {
        self.client
    }

    pub fn state(&self) -> &LinkState {
        &self.state
    }

    /// The room currently joined, if any.
    pub fn room(&self) -> Option<&MindMapId> {
        match &self.state {
            LinkState::Joined(id) => Some(id),
            _ => None,
        }
    }

    /// Open a mind map view. Joining a room that is already joined (or
    /// already pending) issues nothing.
    pub fn enter(&mut self, mind_map: MindMapId) -> Vec<LinkCommand> {
        match &mut self.state {
            LinkState::Disconnected => {
                self.state = LinkState::Connecting {
                    pending: Some(mind_map),
                };
                vec![LinkCommand::Connect]
            }
            LinkState::Connecting { pending } => {
                *pending = Some(mind_map);
                Vec::new()
            }
            LinkState::Connected => {
                self.state = LinkState::Joined(mind_map.clone());
                vec![LinkCommand::Join(mind_map)]
            }
            LinkState::Joined(current) if *current == mind_map => {
                log::debug!("already joined {mind_map}");
                Vec::new()
            }
            LinkState::Joined(current) => {
                let previous = std::mem::replace(current, mind_map.clone());
                vec![LinkCommand::Leave(previous), LinkCommand::Join(mind_map)]
            }
        }
    }

    /// The transport finished connecting.
    pub fn connected(&mut self) -> Vec<LinkCommand> {
        match std::mem::replace(&mut self.state, LinkState::Connected) {
            LinkState::Connecting {
                pending: Some(mind_map),
            } => {
                self.state = LinkState::Joined(mind_map.clone());
                vec![LinkCommand::Join(mind_map)]
            }
            LinkState::Joined(mind_map) => {
                self.state = LinkState::Joined(mind_map);
                Vec::new()
            }
            _ => Vec::new(),
        }
    }

    /// Close the current view. The connection stays up for reuse.
    pub fn leave(&mut self) -> Vec<LinkCommand> {
        match &mut self.state {
            LinkState::Joined(current) => {
                let mind_map = current.clone();
                self.state = LinkState::Connected;
                vec![LinkCommand::Leave(mind_map)]
            }
            LinkState::Connecting { pending } => {
                *pending = None;
                Vec::new()
            }
            _ => Vec::new(),
        }
    }

    /// The transport dropped.
    pub fn disconnected(&mut self) {
        self.state = LinkState::Disconnected;
    }

    /// Wrap a locally produced mutation for broadcast. `None` while not in a
    /// room: the edit stays local.
    pub fn outbound(&self, mutation: Mutation) -> Option<Envelope> {
        let mind_map_id = self.room()?.clone();
        Some(Envelope {
            mind_map_id,
            origin: self.client,
            mutation,
        })
    }

    /// Filter an incoming envelope: only events for the joined room that
    /// some other client sent get through.
    pub fn accept(&self, envelope: Envelope) -> Option<Mutation> {
        let Some(room) = self.room() else {
            log::debug!("dropping event for {}: not joined", envelope.mind_map_id);
            return None;
        };
        if envelope.mind_map_id != *room {
            log::debug!(
                "dropping event for {}: joined {room}",
                envelope.mind_map_id
            );
            return None;
        }
        if envelope.origin == self.client {
            log::trace!("suppressing echo of {:?}", envelope.mutation.node_id());
            return None;
        }
        Some(envelope.mutation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mm_core::model::Position;
    use pretty_assertions::assert_eq;

    fn map(s: &str) -> MindMapId {
        MindMapId::new(s)
    }

    fn joined(client: ClientId, room: &str) -> RoomLink {
        let mut link = RoomLink::new(client);
        link.enter(map(room));
        link.connected();
        link
    }

    #[test]
    fn enter_connects_then_joins() {
        let mut link = RoomLink::new(ClientId::generate());
        assert_eq!(link.enter(map("m1")), vec![LinkCommand::Connect]);
        assert_eq!(
            link.state(),
            &LinkState::Connecting {
                pending: Some(map("m1"))
            }
        );
        assert_eq!(link.connected(), vec![LinkCommand::Join(map("m1"))]);
        assert_eq!(link.room(), Some(&map("m1")));
    }

    #[test]
    fn join_is_idempotent() {
        let mut link = joined(ClientId::generate(), "m1");
        assert!(link.enter(map("m1")).is_empty());
        assert!(link.connected().is_empty());

        let mut pending = RoomLink::new(ClientId::generate());
        pending.enter(map("m2"));
        assert!(pending.enter(map("m2")).is_empty());
        assert_eq!(pending.connected(), vec![LinkCommand::Join(map("m2"))]);
    }

    #[test]
    fn switching_rooms_leaves_the_old_one() {
        let mut link = joined(ClientId::generate(), "m1");
        assert_eq!(
            link.enter(map("m2")),
            vec![LinkCommand::Leave(map("m1")), LinkCommand::Join(map("m2"))]
        );
    }

    #[test]
    fn leave_keeps_connection_for_reuse() {
        let mut link = joined(ClientId::generate(), "m1");
        assert_eq!(link.leave(), vec![LinkCommand::Leave(map("m1"))]);
        assert_eq!(link.state(), &LinkState::Connected);
        assert!(link.leave().is_empty());
        assert_eq!(link.enter(map("m3")), vec![LinkCommand::Join(map("m3"))]);
    }

    #[test]
    fn outbound_requires_a_room() {
        let mut link = RoomLink::new(ClientId::generate());
        let m = Mutation::NodeDeleted {
            node_id: NodeId::intern("x"),
        };
        assert!(link.outbound(m.clone()).is_none());
        link.enter(map("m1"));
        link.connected();
        let env = link.outbound(m).unwrap();
        assert_eq!(env.mind_map_id, map("m1"));
        assert_eq!(env.origin, link.client());
    }

    #[test]
    fn accept_suppresses_echo_and_foreign_rooms() {
        let me = ClientId::generate();
        let link = joined(me, "m1");
        let mutation = Mutation::NodeUpdated {
            node_id: NodeId::intern("x"),
            content: "hi".into(),
        };

        let echo = Envelope {
            mind_map_id: map("m1"),
            origin: me,
            mutation: mutation.clone(),
        };
        assert_eq!(link.accept(echo), None);

        let foreign = Envelope {
            mind_map_id: map("m9"),
            origin: ClientId::generate(),
            mutation: mutation.clone(),
        };
        assert_eq!(link.accept(foreign), None);

        let peer = Envelope {
            mind_map_id: map("m1"),
            origin: ClientId::generate(),
            mutation: mutation.clone(),
        };
        assert_eq!(link.accept(peer), Some(mutation));
    }

    #[test]
    fn wire_shape_uses_event_names() {
        let node = Node::new(
            NodeId::intern("wire_n"),
            Some(NodeId::intern("wire_p")),
            Position::new(1.0, 2.0),
            3,
        );
        let json = serde_json::to_value(Mutation::NodeCreated { node }).unwrap();
        assert_eq!(json["type"], "node:create");
        assert_eq!(json["node"]["parentId"], "wire_p");
        assert_eq!(json["node"]["order"], 3);

        let json = serde_json::to_value(Mutation::NodeDeleted {
            node_id: NodeId::intern("wire_n"),
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"type": "node:delete", "nodeId": "wire_n"}));
    }
}
