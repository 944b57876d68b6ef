//! Integration tests: editing sessions over the in-process hub.

use async_trait::async_trait;
use mm_collab::{
    CollabError, Inbound, LocalHub, MemoryStore, Notice, Session, SessionConfig, TreeStore,
};
use mm_core::id::{ClientId, MindMapId, NodeId};
use mm_core::model::{Node, Tree};
use mm_core::viewport::ZoomLimits;
use mm_editor::{CanvasAction, Envelope, InputEvent, Intent, Mutation};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(2);

fn config() -> SessionConfig {
    SessionConfig {
        debounce_ms: 300,
        save_debounce_ms: 1000,
        ..SessionConfig::default()
    }
}

async fn seeded_store(id: &MindMapId) -> (Arc<MemoryStore>, NodeId) {
    let store = Arc::new(MemoryStore::new());
    let tree = Tree::with_root("Launch plan");
    let root = tree.root_id().unwrap();
    store.save_tree(id, &tree).await.unwrap();
    (store, root)
}

async fn open(
    hub: &LocalHub,
    id: &MindMapId,
    store: Arc<dyn TreeStore>,
) -> (Session, Inbound, mpsc::UnboundedReceiver<Notice>) {
    let (channel, inbound) = hub.connect();
    let (session, notices) = Session::open(
        id.clone(),
        ClientId::generate(),
        store,
        Arc::new(channel),
        config(),
    )
    .await
    .unwrap();
    (session, inbound, notices)
}

async fn next_envelope(inbound: &mut Inbound) -> Envelope {
    timeout(WAIT, inbound.recv())
        .await
        .expect("envelope within timeout")
        .expect("channel open")
}

async fn next_mutation(inbound: &mut Inbound) -> Mutation {
    next_envelope(inbound).await.mutation
}

fn created(m: Option<Mutation>) -> Node {
    match m {
        Some(Mutation::NodeCreated { node }) => node,
        other => panic!("expected NodeCreated, got {other:?}"),
    }
}

#[tokio::test]
async fn structural_edits_reach_peers_immediately() {
    let hub = LocalHub::new();
    let id = MindMapId::new("sess-1");
    let (store, root) = seeded_store(&id).await;
    let (mut alice, _alice_in, _) = open(&hub, &id, store.clone()).await;
    let (mut bob, mut bob_in, _) = open(&hub, &id, store).await;

    let t0 = Instant::now();
    let child = created(alice.perform(&Intent::AddChild(root), t0));
    let sibling = created(alice.perform(&Intent::AddSibling(child.id), t0));

    for _ in 0..2 {
        let envelope = next_envelope(&mut bob_in).await;
        assert_eq!(envelope.origin, alice.client());
        assert!(bob.handle_remote(envelope));
    }
    assert_eq!(bob.tree(), alice.tree());
    assert_eq!(bob.tree().children_of(root)[1].id, sibling.id);
}

#[tokio::test]
async fn content_updates_are_coalesced_per_node() {
    let hub = LocalHub::new();
    let id = MindMapId::new("sess-2");
    let (store, root) = seeded_store(&id).await;
    let (mut alice, _alice_in, _) = open(&hub, &id, store.clone()).await;
    let (_bob, mut bob_in, _) = open(&hub, &id, store).await;

    let t0 = Instant::now();
    let node = created(alice.perform(&Intent::AddChild(root), t0));
    assert!(matches!(
        next_mutation(&mut bob_in).await,
        Mutation::NodeCreated { .. }
    ));

    for (i, text) in ["I", "Id", "Idea"].into_iter().enumerate() {
        let at = t0 + Duration::from_millis(100 * i as u64);
        alice.perform(
            &Intent::EditContent {
                node_id: node.id,
                content: text.into(),
            },
            at,
        );
        alice.flush_due(at);
    }
    // Last keystroke at t0+200ms; nothing is due before t0+500ms.
    alice.flush_due(t0 + Duration::from_millis(499));
    assert!(bob_in.try_recv().is_err());

    alice.flush_due(t0 + Duration::from_millis(500));
    assert_eq!(
        next_mutation(&mut bob_in).await,
        Mutation::NodeUpdated {
            node_id: node.id,
            content: "Idea".into()
        }
    );
    assert!(timeout(Duration::from_millis(100), bob_in.recv()).await.is_err());
}

#[tokio::test]
async fn deleting_a_node_cancels_its_pending_update() {
    let hub = LocalHub::new();
    let id = MindMapId::new("sess-3");
    let (store, root) = seeded_store(&id).await;
    let (mut alice, _alice_in, _) = open(&hub, &id, store.clone()).await;
    let (_bob, mut bob_in, _) = open(&hub, &id, store).await;

    let t0 = Instant::now();
    let node = created(alice.perform(&Intent::AddChild(root), t0));
    alice.perform(
        &Intent::EditContent {
            node_id: node.id,
            content: "draft".into(),
        },
        t0,
    );
    alice.perform(&Intent::DeleteNode(node.id), t0);
    alice.flush_due(t0 + Duration::from_secs(5));

    assert!(matches!(next_mutation(&mut bob_in).await, Mutation::NodeCreated { .. }));
    assert_eq!(
        next_mutation(&mut bob_in).await,
        Mutation::NodeDeleted { node_id: node.id }
    );
    assert!(timeout(Duration::from_millis(100), bob_in.recv()).await.is_err());
}

#[tokio::test]
async fn own_echo_is_ignored() {
    let hub = LocalHub::new().with_echo(true);
    let id = MindMapId::new("sess-4");
    let (store, root) = seeded_store(&id).await;
    let (mut alice, mut alice_in, _) = open(&hub, &id, store).await;

    alice.perform(&Intent::AddChild(root), Instant::now());
    let echo = timeout(WAIT, alice_in.recv()).await.unwrap().unwrap();
    assert!(!alice.handle_remote(echo));
    assert_eq!(alice.tree().len(), 2);
}

#[tokio::test]
async fn close_flushes_and_saves() {
    let hub = LocalHub::new();
    let id = MindMapId::new("sess-5");
    let (store, root) = seeded_store(&id).await;
    let (mut alice, _alice_in, _) = open(&hub, &id, store.clone()).await;
    let (_bob, mut bob_in, _) = open(&hub, &id, store.clone()).await;

    let t0 = Instant::now();
    let node = created(alice.perform(&Intent::AddChild(root), t0));
    alice.perform(
        &Intent::EditContent {
            node_id: node.id,
            content: "final".into(),
        },
        t0,
    );
    assert_eq!(store.load_tree(&id).await.unwrap().len(), 1, "save is debounced");

    let final_tree = alice.close().await.unwrap();
    assert_eq!(store.load_tree(&id).await.unwrap(), final_tree);
    assert_eq!(hub.members(&id), 1);

    next_mutation(&mut bob_in).await;
    assert_eq!(
        next_mutation(&mut bob_in).await,
        Mutation::NodeUpdated {
            node_id: node.id,
            content: "final".into()
        }
    );
}

struct FailingStore {
    inner: MemoryStore,
}

#[async_trait]
impl TreeStore for FailingStore {
    async fn load_tree(&self, id: &MindMapId) -> mm_collab::Result<Tree> {
        self.inner.load_tree(id).await
    }

    async fn save_tree(&self, _: &MindMapId, _: &Tree) -> mm_collab::Result<()> {
        Err(CollabError::Io(std::io::Error::other("disk full")))
    }
}

#[tokio::test]
async fn save_failure_becomes_a_notice() {
    let hub = LocalHub::new();
    let id = MindMapId::new("sess-6");
    let inner = MemoryStore::new();
    let tree = Tree::with_root("root");
    let root = tree.root_id().unwrap();
    inner.save_tree(&id, &tree).await.unwrap();
    let store = Arc::new(FailingStore { inner });

    let (mut alice, _alice_in, mut notices) = open(&hub, &id, store).await;
    let t0 = Instant::now();
    alice.perform(&Intent::AddChild(root), t0);
    alice.flush_due(t0 + Duration::from_secs(1));

    let notice = timeout(WAIT, notices.recv()).await.unwrap().unwrap();
    assert!(matches!(notice, Notice::SaveFailed(msg) if msg.contains("disk full")));
    // Editing continues.
    assert!(alice.perform(&Intent::AddChild(root), t0).is_some());
}

#[tokio::test]
async fn opening_an_unknown_map_fails() {
    let hub = LocalHub::new();
    let (channel, _inbound) = hub.connect();
    let result = Session::open(
        MindMapId::new("sess-missing"),
        ClientId::generate(),
        Arc::new(MemoryStore::new()),
        Arc::new(channel),
        config(),
    )
    .await;
    assert!(matches!(result, Err(CollabError::NotFound(_))));
}

#[tokio::test]
async fn run_loop_applies_intents_and_remote_events() {
    let hub = LocalHub::new();
    let id = MindMapId::new("sess-7");
    let (store, root) = seeded_store(&id).await;
    let (alice, alice_in, _) = open(&hub, &id, store.clone()).await;
    let (mut bob, mut bob_in, _) = open(&hub, &id, store.clone()).await;

    let (intents, intent_rx) = mpsc::unbounded_channel();
    let running = tokio::spawn(alice.run(alice_in, intent_rx));

    intents.send(Intent::AddChild(root)).unwrap();
    let envelope = next_envelope(&mut bob_in).await;
    let node = match &envelope.mutation {
        Mutation::NodeCreated { node } => node.clone(),
        other => panic!("expected NodeCreated, got {other:?}"),
    };
    assert!(bob.handle_remote(envelope));

    intents
        .send(Intent::EditContent {
            node_id: node.id,
            content: "from alice".into(),
        })
        .unwrap();
    // Arrives once the debounce timer in alice's loop fires.
    assert_eq!(
        next_mutation(&mut bob_in).await,
        Mutation::NodeUpdated {
            node_id: node.id,
            content: "from alice".into()
        }
    );

    // Bob's structural edit flows the other way.
    let grandchild = created(bob.perform(&Intent::AddChild(node.id), Instant::now()));
    tokio::time::sleep(Duration::from_millis(200)).await;

    drop(intents);
    let final_tree = timeout(WAIT, running).await.unwrap().unwrap().unwrap();
    assert_eq!(final_tree.get(node.id).unwrap().content, "from alice");
    assert!(final_tree.contains(grandchild.id));
    assert_eq!(store.load_tree(&id).await.unwrap(), final_tree);
}

#[tokio::test]
async fn canvas_input_uses_configured_zoom_and_reaches_peers() {
    let hub = LocalHub::new();
    let id = MindMapId::new("sess-8");
    let (store, root) = seeded_store(&id).await;
    let (channel, _alice_in) = hub.connect();
    let config = SessionConfig {
        zoom: ZoomLimits::new(0.25, 3.0, 0.1).unwrap(),
        ..config()
    };
    let (mut alice, _) = Session::open(
        id.clone(),
        ClientId::generate(),
        store.clone(),
        Arc::new(channel),
        config,
    )
    .await
    .unwrap();
    let (_bob, mut bob_in, _) = open(&hub, &id, store).await;

    let t0 = Instant::now();
    for _ in 0..30 {
        alice.handle_input(
            &InputEvent::Wheel {
                x: 0.0,
                y: 0.0,
                delta_y: -1.0,
            },
            t0,
        );
    }
    assert_eq!(alice.canvas().viewport().zoom, 3.0);
    let reset = InputEvent::Key {
        key: "0".into(),
        ctrl: true,
        shift: false,
        alt: false,
        meta: false,
    };
    assert_eq!(alice.handle_input(&reset, t0), CanvasAction::ViewChanged);
    assert_eq!(alice.canvas().viewport().zoom, 1.0);

    alice.canvas_mut().elements_mut().mount(root, 120.0, 40.0);
    assert_eq!(
        alice.handle_input(&InputEvent::PointerDown { x: 10.0, y: 10.0 }, t0),
        CanvasAction::Select(root)
    );
    assert_eq!(alice.engine().focus().active(), Some(root));

    alice.handle_input(&InputEvent::key("Tab"), t0);
    let Mutation::NodeCreated { node } = next_mutation(&mut bob_in).await else {
        panic!("expected NodeCreated");
    };
    assert_eq!(node.parent_id, Some(root));
    assert!(alice.tree().contains(node.id));
}
