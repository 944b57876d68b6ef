//! Core tree data model for mind maps.
//!
//! A mind map is a rooted tree. Nodes live in a `StableDiGraph` whose edges
//! go from parent → child, with an `id_index` for O(1) lookup by `NodeId`.
//! Each node also records its `parent_id` so a node can be shipped over the
//! wire or to storage on its own.
//!
//! All mutating operations validate first and write second, so a returned
//! `Err` always means the tree is untouched.

use crate::error::TreeError;
use crate::id::NodeId;
use petgraph::Direction;
use petgraph::graph::NodeIndex;
use petgraph::stable_graph::StableDiGraph;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::{HashMap, HashSet, VecDeque};

// ─── Nodes ───────────────────────────────────────────────────────────────

/// Absolute placement in the rendering plane (world units).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Position {
    pub const ORIGIN: Position = Position { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn offset(self, dx: f32, dy: f32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }
}

/// A single content unit of the mind map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: NodeId,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub parent_id: Option<NodeId>,
    #[serde(default)]
    pub position: Position,
    /// Rank among siblings. Unique within a sibling group, not necessarily
    /// contiguous.
    #[serde(default)]
    pub order: i64,
}

impl Node {
    pub fn new(id: NodeId, parent_id: Option<NodeId>, position: Position, order: i64) -> Self {
        Self {
            id,
            content: String::new(),
            parent_id,
            position,
            order,
        }
    }

    /// A parentless node at the origin with a fresh id.
    pub fn root(content: impl Into<String>) -> Self {
        Self {
            id: NodeId::generate(),
            content: content.into(),
            parent_id: None,
            position: Position::ORIGIN,
            order: 0,
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

// ─── Tree ────────────────────────────────────────────────────────────────

/// All nodes of one mind map.
///
/// Serializes as a flat list of nodes (parents before children), which is
/// also the shape the persistence layer stores.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<Node>", into = "Vec<Node>")]
pub struct Tree {
    graph: StableDiGraph<Node, ()>,
    id_index: HashMap<NodeId, NodeIndex>,
    root: Option<NodeId>,
}

impl Tree {
    /// An empty tree (no root).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A tree holding only a freshly created root.
    #[must_use]
    pub fn with_root(content: impl Into<String>) -> Self {
        let mut tree = Self::new();
        let root = Node::root(content);
        let id = root.id;
        let idx = tree.graph.add_node(root);
        tree.id_index.insert(id, idx);
        tree.root = Some(id);
        tree
    }

    /// Build a tree from nodes in arbitrary order, as storage returns them.
    ///
    /// Parents are inserted before their children. Sibling groups whose
    /// stored `order` values collide are repaired by bumping the later
    /// sibling (by `(order, id)`) just past its predecessor.
    pub fn from_nodes(nodes: Vec<Node>) -> Result<Self, TreeError> {
        let mut by_parent: HashMap<Option<NodeId>, Vec<Node>> = HashMap::new();
        let mut seen = HashSet::with_capacity(nodes.len());
        for node in nodes {
            if !seen.insert(node.id) {
                return Err(TreeError::DuplicateId(node.id));
            }
            by_parent.entry(node.parent_id).or_default().push(node);
        }

        let mut repaired = 0usize;
        for (parent, group) in by_parent.iter_mut() {
            // A parentless group of more than one is rejected below.
            let Some(parent) = *parent else { continue };
            group.sort_by(|a, b| a.order.cmp(&b.order).then(a.id.cmp(&b.id)));
            for i in 1..group.len() {
                let floor = group[i - 1]
                    .order
                    .checked_add(1)
                    .ok_or(TreeError::OrderOverflow { parent })?;
                if group[i].order < floor {
                    group[i].order = floor;
                    repaired += 1;
                }
            }
        }
        if repaired > 0 {
            log::debug!("repaired {repaired} colliding sibling orders on load");
        }

        let mut tree = Self::new();
        let mut roots = by_parent.remove(&None).unwrap_or_default();
        if roots.len() > 1 {
            return Err(TreeError::RootExists {
                id: roots[1].id,
                root: roots[0].id,
            });
        }

        let mut queue: VecDeque<Node> = roots.drain(..).collect();
        while let Some(node) = queue.pop_front() {
            let id = node.id;
            tree.insert(node)?;
            if let Some(children) = by_parent.remove(&Some(id)) {
                queue.extend(children);
            }
        }

        // Anything left over hangs off a parent that was never reached.
        let dangling = by_parent.values().flatten().find_map(|n| match n.parent_id {
            Some(parent) if !seen.contains(&parent) => Some((n.id, parent)),
            _ => None,
        });
        if let Some((id, parent)) = dangling {
            return Err(TreeError::DanglingParent { id, parent });
        }
        let leftover: usize = by_parent.values().map(Vec::len).sum();
        if leftover > 0 {
            return Err(TreeError::OrphanedNodes { count: leftover });
        }

        Ok(tree)
    }

    // ─── Queries ─────────────────────────────────────────────────────────

    pub fn len(&self) -> usize {
        self.id_index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id_index.is_empty()
    }

    pub fn root_id(&self) -> Option<NodeId> {
        self.root
    }

    pub fn root(&self) -> Option<&Node> {
        self.root.and_then(|id| self.get(id))
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.id_index.contains_key(&id)
    }

    /// Look up a node by id.
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.id_index.get(&id).map(|idx| &self.graph[*idx])
    }

    /// Iterate all nodes in unspecified order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.graph.node_indices().map(|idx| &self.graph[idx])
    }

    pub fn parent_of(&self, id: NodeId) -> Option<&Node> {
        self.get(id)?.parent_id.and_then(|p| self.get(p))
    }

    /// Children of `id`, ordered by `order` then `id`.
    pub fn children_of(&self, id: NodeId) -> Vec<&Node> {
        let Some(&idx) = self.id_index.get(&id) else {
            return Vec::new();
        };
        let mut children: Vec<&Node> = self
            .graph
            .neighbors_directed(idx, Direction::Outgoing)
            .map(|c| &self.graph[c])
            .collect();
        children.sort_by(|a, b| a.order.cmp(&b.order).then(a.id.cmp(&b.id)));
        children
    }

    pub fn child_count(&self, id: NodeId) -> usize {
        self.id_index.get(&id).map_or(0, |&idx| {
            self.graph.neighbors_directed(idx, Direction::Outgoing).count()
        })
    }

    /// The full sibling group of `id` (including `id` itself), in the same
    /// order as [`children_of`](Self::children_of). The root's group is
    /// just the root.
    pub fn siblings_of(&self, id: NodeId) -> Vec<&Node> {
        match self.get(id) {
            Some(node) => match node.parent_id {
                Some(parent) => self.children_of(parent),
                None => vec![node],
            },
            None => Vec::new(),
        }
    }

    /// `id` plus all of its transitive descendants, parents before children.
    ///
    /// Walks an explicit work-list over parent → child edges. Every node has
    /// exactly one incoming edge and the root none, so each node is visited
    /// once and the walk ends.
    pub fn subtree_ids(&self, id: NodeId) -> Result<Vec<NodeId>, TreeError> {
        let start = *self.id_index.get(&id).ok_or(TreeError::NotFound(id))?;
        let mut closure = Vec::new();
        let mut stack: SmallVec<[NodeIndex; 16]> = SmallVec::new();
        stack.push(start);
        while let Some(idx) = stack.pop() {
            closure.push(self.graph[idx].id);
            stack.extend(self.graph.neighbors_directed(idx, Direction::Outgoing));
        }
        Ok(closure)
    }

    /// Nodes in pre-order (each parent before its children, siblings by
    /// order). Deterministic; used for saving.
    pub fn to_nodes(&self) -> Vec<Node> {
        let mut out = Vec::with_capacity(self.len());
        let Some(root) = self.root else {
            return out;
        };
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if let Some(node) = self.get(id) {
                out.push(node.clone());
            }
            stack.extend(self.children_of(id).iter().rev().map(|c| c.id));
        }
        out
    }

    /// Check every structural invariant: a single root, every parent present,
    /// distinct sibling orders, and every node reachable from the root.
    pub fn validate(&self) -> Result<(), TreeError> {
        for node in self.nodes() {
            match node.parent_id {
                Some(parent) if !self.contains(parent) => {
                    return Err(TreeError::DanglingParent {
                        id: node.id,
                        parent,
                    });
                }
                None if self.root != Some(node.id) => {
                    return Err(TreeError::RootExists {
                        id: node.id,
                        root: self.root.unwrap_or(node.id),
                    });
                }
                _ => {}
            }
        }

        let reachable = match self.root {
            Some(root) => self.subtree_ids(root)?.len(),
            None => 0,
        };
        if reachable != self.len() {
            return Err(TreeError::OrphanedNodes {
                count: self.len() - reachable,
            });
        }
        Ok(())
    }

    /// Whether sibling `order` values are pairwise distinct in every group.
    pub fn sibling_orders_distinct(&self) -> bool {
        let mut seen: HashSet<(Option<NodeId>, i64)> = HashSet::with_capacity(self.len());
        self.nodes().all(|n| seen.insert((n.parent_id, n.order)))
    }

    // ─── Mutations ───────────────────────────────────────────────────────

    /// Insert a node.
    ///
    /// Fails with `DuplicateId`, `DanglingParent` or `RootExists`. If the
    /// node's `order` collides with an existing sibling, that sibling and
    /// every later one move up by one to make room; `OrderOverflow` if one
    /// of them already sits at `i64::MAX`.
    pub fn insert(&mut self, node: Node) -> Result<(), TreeError> {
        if self.contains(node.id) {
            return Err(TreeError::DuplicateId(node.id));
        }
        let parent_idx = match node.parent_id {
            Some(parent) => Some(*self.id_index.get(&parent).ok_or(
                TreeError::DanglingParent {
                    id: node.id,
                    parent,
                },
            )?),
            None => {
                if let Some(root) = self.root {
                    return Err(TreeError::RootExists { id: node.id, root });
                }
                None
            }
        };

        let id = node.id;
        match parent_idx {
            Some(pidx) => {
                if self.order_taken(pidx, node.order) {
                    self.shift_children_from(pidx, node.order)?;
                }
                let idx = self.graph.add_node(node);
                self.graph.add_edge(pidx, idx, ());
                self.id_index.insert(id, idx);
            }
            None => {
                let idx = self.graph.add_node(node);
                self.id_index.insert(id, idx);
                self.root = Some(id);
            }
        }
        Ok(())
    }

    /// Replace a node's content.
    pub fn update(&mut self, id: NodeId, content: impl Into<String>) -> Result<(), TreeError> {
        let idx = *self.id_index.get(&id).ok_or(TreeError::NotFound(id))?;
        self.graph[idx].content = content.into();
        Ok(())
    }

    /// Remove `id` and all of its descendants. Returns the removed nodes,
    /// parents before children. Removing the root empties the tree.
    pub fn remove_subtree(&mut self, id: NodeId) -> Result<Vec<Node>, TreeError> {
        let closure = self.subtree_ids(id)?;
        let mut removed = Vec::with_capacity(closure.len());
        for node_id in closure {
            if let Some(idx) = self.id_index.remove(&node_id)
                && let Some(node) = self.graph.remove_node(idx)
            {
                removed.push(node);
            }
        }
        if self.root.is_some_and(|root| !self.id_index.contains_key(&root)) {
            self.root = None;
        }
        Ok(removed)
    }

    /// Remove every node.
    pub fn clear(&mut self) {
        self.graph.clear();
        self.id_index.clear();
        self.root = None;
    }

    /// Increment the `order` of every child of `parent` whose order is
    /// strictly greater than `after`. Returns how many siblings moved, or
    /// `OrderOverflow` (moving nothing) if one already sits at `i64::MAX`.
    pub fn shift_orders_after(&mut self, parent: NodeId, after: i64) -> Result<usize, TreeError> {
        let pidx = *self.id_index.get(&parent).ok_or(TreeError::NotFound(parent))?;
        match after.checked_add(1) {
            Some(from) => self.shift_children_from(pidx, from),
            None => Ok(0),
        }
    }

    /// Checks every order first, so an overflow moves nothing.
    fn shift_children_from(&mut self, pidx: NodeIndex, from: i64) -> Result<usize, TreeError> {
        let children: Vec<NodeIndex> = self
            .graph
            .neighbors_directed(pidx, Direction::Outgoing)
            .filter(|&c| self.graph[c].order >= from)
            .collect();
        if children.iter().any(|&c| self.graph[c].order == i64::MAX) {
            return Err(TreeError::OrderOverflow {
                parent: self.graph[pidx].id,
            });
        }
        for &child in &children {
            self.graph[child].order += 1;
        }
        Ok(children.len())
    }

    fn order_taken(&self, parent: NodeIndex, order: i64) -> bool {
        self.graph
            .neighbors_directed(parent, Direction::Outgoing)
            .any(|c| self.graph[c].order == order)
    }
}

impl TryFrom<Vec<Node>> for Tree {
    type Error = TreeError;

    fn try_from(nodes: Vec<Node>) -> Result<Self, Self::Error> {
        Tree::from_nodes(nodes)
    }
}

impl From<Tree> for Vec<Node> {
    fn from(tree: Tree) -> Self {
        tree.to_nodes()
    }
}

impl PartialEq for Tree {
    /// Two trees are equal when they hold the same nodes with the same
    /// fields, regardless of internal graph indices.
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self.root == other.root
            && self.nodes().all(|n| other.get(n.id) == Some(n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn id(s: &str) -> NodeId {
        NodeId::intern(s)
    }

    fn child(name: &str, parent: &str, order: i64) -> Node {
        Node::new(id(name), Some(id(parent)), Position::ORIGIN, order)
    }

    fn rooted(name: &str) -> Tree {
        let mut tree = Tree::new();
        tree.insert(Node::new(id(name), None, Position::ORIGIN, 0))
            .unwrap();
        tree
    }

    #[test]
    fn insert_and_lookup() {
        let mut tree = rooted("m_root");
        tree.insert(child("m_a", "m_root", 0)).unwrap();

        assert_eq!(tree.len(), 2);
        assert_eq!(tree.root_id(), Some(id("m_root")));
        assert_eq!(tree.parent_of(id("m_a")).map(|n| n.id), Some(id("m_root")));
        assert_eq!(tree.child_count(id("m_root")), 1);
    }

    #[test]
    fn insert_rejects_dangling_parent() {
        let mut tree = rooted("dp_root");
        let before = tree.clone();
        let err = tree.insert(child("dp_a", "dp_ghost", 0)).unwrap_err();
        assert_eq!(
            err,
            TreeError::DanglingParent {
                id: id("dp_a"),
                parent: id("dp_ghost")
            }
        );
        assert_eq!(tree, before);
    }

    #[test]
    fn insert_rejects_duplicate_id() {
        let mut tree = rooted("dup_root");
        tree.insert(child("dup_a", "dup_root", 0)).unwrap();
        let err = tree.insert(child("dup_a", "dup_root", 1)).unwrap_err();
        assert_eq!(err, TreeError::DuplicateId(id("dup_a")));
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn insert_rejects_second_root() {
        let mut tree = rooted("two_root");
        let err = tree
            .insert(Node::new(id("two_other"), None, Position::ORIGIN, 0))
            .unwrap_err();
        assert!(matches!(err, TreeError::RootExists { .. }));
    }

    #[test]
    fn insert_self_parent_is_dangling() {
        let mut tree = rooted("self_root");
        let err = tree.insert(child("self_a", "self_a", 0)).unwrap_err();
        assert!(matches!(err, TreeError::DanglingParent { .. }));
    }

    #[test]
    fn insert_with_colliding_order_shifts_later_siblings() {
        let mut tree = rooted("col_root");
        tree.insert(child("col_a", "col_root", 0)).unwrap();
        tree.insert(child("col_b", "col_root", 1)).unwrap();
        tree.insert(child("col_c", "col_root", 2)).unwrap();
        tree.insert(child("col_new", "col_root", 1)).unwrap();

        let order: Vec<(&str, i64)> = tree
            .children_of(id("col_root"))
            .iter()
            .map(|n| (n.id.as_str(), n.order))
            .collect();
        assert_eq!(
            order,
            vec![("col_a", 0), ("col_new", 1), ("col_b", 2), ("col_c", 3)]
        );
    }

    #[test]
    fn insert_refuses_to_shift_past_max_order() {
        let mut tree = rooted("ov_root");
        tree.insert(child("ov_a", "ov_root", i64::MAX - 1)).unwrap();
        tree.insert(child("ov_b", "ov_root", i64::MAX)).unwrap();
        let before = tree.clone();

        let err = tree.insert(child("ov_c", "ov_root", i64::MAX - 1)).unwrap_err();
        assert_eq!(err, TreeError::OrderOverflow { parent: id("ov_root") });
        assert_eq!(tree, before);
        assert_eq!(
            tree.shift_orders_after(id("ov_root"), 0),
            Err(TreeError::OrderOverflow { parent: id("ov_root") })
        );
        assert_eq!(tree, before);
        assert_eq!(tree.shift_orders_after(id("ov_root"), i64::MAX), Ok(0));
    }

    #[test]
    fn update_replaces_content() {
        let mut tree = rooted("up_root");
        tree.update(id("up_root"), "Ideas").unwrap();
        assert_eq!(tree.get(id("up_root")).unwrap().content, "Ideas");
        assert_eq!(
            tree.update(id("up_missing"), "x"),
            Err(TreeError::NotFound(id("up_missing")))
        );
    }

    #[test]
    fn remove_subtree_takes_descendants_only() {
        let mut tree = rooted("rm_root");
        tree.insert(child("rm_a", "rm_root", 0)).unwrap();
        tree.insert(child("rm_b", "rm_a", 0)).unwrap();
        tree.insert(child("rm_c", "rm_b", 0)).unwrap();
        tree.insert(child("rm_d", "rm_root", 1)).unwrap();

        let removed = tree.remove_subtree(id("rm_a")).unwrap();
        let mut removed_ids: Vec<&str> = removed.iter().map(|n| n.id.as_str()).collect();
        removed_ids.sort();
        assert_eq!(removed_ids, vec!["rm_a", "rm_b", "rm_c"]);
        assert!(tree.contains(id("rm_root")));
        assert!(tree.contains(id("rm_d")));
        assert_eq!(tree.len(), 2);
        tree.validate().unwrap();
    }

    #[test]
    fn remove_root_empties_tree() {
        let mut tree = rooted("rr_root");
        tree.insert(child("rr_a", "rr_root", 0)).unwrap();
        tree.remove_subtree(id("rr_root")).unwrap();
        assert!(tree.is_empty());
        assert_eq!(tree.root_id(), None);
        assert_eq!(
            tree.remove_subtree(id("rr_root")),
            Err(TreeError::NotFound(id("rr_root")))
        );
    }

    #[test]
    fn children_sorted_by_order_not_insertion() {
        let mut tree = rooted("tie_root");
        tree.insert(child("tie_b", "tie_root", 5)).unwrap();
        tree.insert(child("tie_a", "tie_root", 7)).unwrap();
        let names: Vec<&str> = tree
            .children_of(id("tie_root"))
            .iter()
            .map(|n| n.id.as_str())
            .collect();
        assert_eq!(names, vec!["tie_b", "tie_a"]);
    }

    #[test]
    fn siblings_include_self_and_root_is_alone() {
        let mut tree = rooted("sib_root");
        tree.insert(child("sib_a", "sib_root", 0)).unwrap();
        tree.insert(child("sib_b", "sib_root", 1)).unwrap();
        assert_eq!(tree.siblings_of(id("sib_b")).len(), 2);
        assert_eq!(tree.siblings_of(id("sib_root")).len(), 1);
        assert!(tree.siblings_of(id("sib_missing")).is_empty());
    }

    #[test]
    fn shift_orders_after_moves_only_later_siblings() {
        let mut tree = rooted("sh_root");
        tree.insert(child("sh_a", "sh_root", 0)).unwrap();
        tree.insert(child("sh_b", "sh_root", 1)).unwrap();
        tree.insert(child("sh_c", "sh_root", 2)).unwrap();
        assert_eq!(tree.shift_orders_after(id("sh_root"), 0), Ok(2));
        assert_eq!(tree.get(id("sh_a")).unwrap().order, 0);
        assert_eq!(tree.get(id("sh_b")).unwrap().order, 2);
        assert_eq!(tree.get(id("sh_c")).unwrap().order, 3);
    }

    #[test]
    fn from_nodes_accepts_any_order_and_repairs_collisions() {
        let nodes = vec![
            child("fn_c", "fn_a", 0),
            child("fn_b", "fn_root", 0),
            child("fn_a", "fn_root", 0),
            Node::new(id("fn_root"), None, Position::ORIGIN, 0),
        ];
        let tree = Tree::from_nodes(nodes).unwrap();
        tree.validate().unwrap();
        assert!(tree.sibling_orders_distinct());
        let names: Vec<(&str, i64)> = tree
            .children_of(id("fn_root"))
            .iter()
            .map(|n| (n.id.as_str(), n.order))
            .collect();
        assert_eq!(names, vec![("fn_a", 0), ("fn_b", 1)]);
    }

    #[test]
    fn from_nodes_rejects_collisions_at_max_order() {
        let nodes = vec![
            Node::new(id("fo_root"), None, Position::ORIGIN, 0),
            child("fo_a", "fo_root", i64::MAX),
            child("fo_b", "fo_root", i64::MAX),
        ];
        assert_eq!(
            Tree::from_nodes(nodes),
            Err(TreeError::OrderOverflow { parent: id("fo_root") })
        );
    }

    #[test]
    fn from_nodes_rejects_dangling_and_cycles() {
        let dangling = vec![
            Node::new(id("dang_root"), None, Position::ORIGIN, 0),
            child("dang_a", "dang_nowhere", 0),
        ];
        assert!(matches!(
            Tree::from_nodes(dangling),
            Err(TreeError::DanglingParent { .. })
        ));

        let cyclic = vec![
            Node::new(id("cy_root"), None, Position::ORIGIN, 0),
            child("cy_a", "cy_b", 0),
            child("cy_b", "cy_a", 0),
        ];
        assert_eq!(
            Tree::from_nodes(cyclic),
            Err(TreeError::OrphanedNodes { count: 2 })
        );
    }

    #[test]
    fn serde_roundtrip_as_node_list() {
        let mut tree = Tree::with_root("Central topic");
        let root = tree.root_id().unwrap();
        let a = Node::new(id("sd_a"), Some(root), Position::new(0.0, 100.0), 0).with_content("A");
        tree.insert(a).unwrap();

        let json = serde_json::to_string(&tree).unwrap();
        assert!(json.starts_with('['));
        assert!(json.contains("\"parentId\""));
        let back: Tree = serde_json::from_str(&json).unwrap();
        assert_eq!(back, tree);
    }
}
