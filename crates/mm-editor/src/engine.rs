//! Mutation engine: turns user intents into tree changes.
//!
//! Every accepted intent is validated against the current tree, applied to
//! it, and returned as the single [`Mutation`] that peers need to replay
//! it. A refused intent leaves both the tree and the focus untouched.
//!
//! Remote mutations go through [`MutationEngine::apply_remote`], which
//! applies without producing anything to re-broadcast.

use crate::focus::Focus;
use crate::shortcuts::ShortcutAction;
use crate::sync::Mutation;
use mm_core::error::TreeError;
use mm_core::id::NodeId;
use mm_core::layout::Placement;
use mm_core::model::{Node, Tree};

/// A semantic edit request from the UI.
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    AddChild(NodeId),
    /// On the root this behaves as `AddChild(root)`.
    AddSibling(NodeId),
    DeleteNode(NodeId),
    EditContent { node_id: NodeId, content: String },
    /// The node lost edit focus. Empty non-root nodes are removed.
    EndEdit(NodeId),
    /// Remove every node, root included.
    ClearTree,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EditError {
    #[error("mind map is read-only")]
    ReadOnly,
    #[error("node {0} not found")]
    NotFound(NodeId),
    #[error("the root cannot be deleted while other nodes exist")]
    RootDeletion,
    #[error(transparent)]
    Tree(#[from] TreeError),
}

/// Owns one client's tree and focus, and applies intents to them.
#[derive(Debug, Clone, Default)]
pub struct MutationEngine {
    tree: Tree,
    focus: Focus,
    placement: Placement,
    read_only: bool,
}

impl MutationEngine {
    pub fn new(tree: Tree) -> Self {
        Self {
            tree,
            ..Self::default()
        }
    }

    pub fn with_placement(mut self, placement: Placement) -> Self {
        self.placement = placement;
        self
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn focus(&self) -> &Focus {
        &self.focus
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Read-only clients may select and navigate but never mutate. Remote
    /// mutations still apply.
    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
        if read_only {
            self.focus.stop_editing();
        }
    }

    /// Swap in a freshly loaded tree, keeping the selection if it survived.
    pub fn replace_tree(&mut self, tree: Tree) {
        self.tree = tree;
        if self.focus.active().is_some_and(|id| !self.tree.contains(id)) {
            self.focus.clear();
        }
    }

    /// Select a node (click). Allowed in read-only mode.
    pub fn select(&mut self, id: NodeId) -> bool {
        if !self.tree.contains(id) {
            return false;
        }
        self.focus.activate(id);
        true
    }

    /// Enter edit mode on a node (double click).
    pub fn begin_edit(&mut self, id: NodeId) -> bool {
        if self.read_only || !self.tree.contains(id) {
            return false;
        }
        self.focus.begin_edit(id);
        true
    }

    pub fn clear_selection(&mut self) {
        self.focus.clear();
    }

    /// Validate and apply one intent. `Ok(None)` means the intent was
    /// accepted but changed nothing.
    pub fn execute(&mut self, intent: &Intent) -> Result<Option<Mutation>, EditError> {
        if self.read_only {
            return Err(EditError::ReadOnly);
        }
        match intent {
            Intent::AddChild(parent) => self.add_child(*parent).map(Some),
            Intent::AddSibling(target) => self.add_sibling(*target).map(Some),
            Intent::DeleteNode(id) => self.delete_node(*id).map(Some),
            Intent::EditContent { node_id, content } => {
                self.edit_content(*node_id, content).map(Some)
            }
            Intent::EndEdit(id) => self.end_edit(*id),
            Intent::ClearTree => Ok(self.clear_tree()),
        }
    }

    /// Like [`execute`](Self::execute), but refusals are logged and
    /// swallowed.
    pub fn apply(&mut self, intent: &Intent) -> Option<Mutation> {
        match self.execute(intent) {
            Ok(mutation) => mutation,
            Err(e) => {
                log::debug!("{intent:?} refused: {e}");
                None
            }
        }
    }

    /// Interpret a keyboard shortcut against the active node.
    ///
    /// While editing, Delete and the arrows belong to the text field; Tab,
    /// Enter and Escape still act on the tree.
    pub fn handle_shortcut(&mut self, action: ShortcutAction) -> Option<Mutation> {
        let active = self.focus.active()?;
        let editing = self.focus.is_editing();
        let intent = match action {
            ShortcutAction::Navigate(direction) => {
                if !editing {
                    self.focus.navigate(&self.tree, direction);
                }
                return None;
            }
            ShortcutAction::ZoomIn | ShortcutAction::ZoomOut | ShortcutAction::ResetView => {
                return None;
            }
            _ if action.is_edit() && self.read_only => return None,
            ShortcutAction::AddChild => Intent::AddChild(active),
            ShortcutAction::AddSibling => Intent::AddSibling(active),
            ShortcutAction::Delete if editing => return None,
            ShortcutAction::Delete => Intent::DeleteNode(active),
            ShortcutAction::EndEdit if !editing => return None,
            ShortcutAction::EndEdit => Intent::EndEdit(active),
        };
        self.apply(&intent)
    }

    /// Apply a mutation received from a peer. Nothing is re-broadcast.
    /// A refused mutation (unknown parent, duplicate id, missing node)
    /// leaves the tree untouched.
    pub fn apply_remote(&mut self, mutation: &Mutation) -> Result<(), TreeError> {
        match mutation {
            Mutation::NodeCreated { node } => self.tree.insert(node.clone()),
            Mutation::NodeUpdated { node_id, content } => {
                self.tree.update(*node_id, content.as_str())
            }
            Mutation::NodeDeleted { node_id } => {
                let parent = self.tree.get(*node_id).and_then(|n| n.parent_id);
                self.tree.remove_subtree(*node_id)?;
                self.focus.retarget_after_removal(&self.tree, parent);
                Ok(())
            }
        }
    }

    // ─── Intents ─────────────────────────────────────────────────────────

    fn add_child(&mut self, parent: NodeId) -> Result<Mutation, EditError> {
        let parent_node = self.tree.get(parent).ok_or(EditError::NotFound(parent))?;
        let children = self.tree.children_of(parent);
        // Append after the highest existing order; the count alone can
        // collide once a middle child has been deleted.
        let order = match children.last() {
            Some(last) => last
                .order
                .checked_add(1)
                .ok_or(TreeError::OrderOverflow { parent })?,
            None => 0,
        };
        let position = self.placement.child_of(parent_node.position, children.len());

        let node = Node::new(NodeId::generate(), Some(parent), position, order);
        self.tree.insert(node.clone())?;
        self.focus.begin_edit(node.id);
        log::debug!("added child {} under {parent}", node.id);
        Ok(Mutation::NodeCreated { node })
    }

    fn add_sibling(&mut self, target: NodeId) -> Result<Mutation, EditError> {
        let target_node = self.tree.get(target).ok_or(EditError::NotFound(target))?;
        let Some(parent) = target_node.parent_id else {
            return self.add_child(target);
        };
        let after = target_node.order;
        let position = self.placement.sibling_of(target_node.position);

        let order = after
            .checked_add(1)
            .ok_or(TreeError::OrderOverflow { parent })?;
        self.tree.shift_orders_after(parent, after)?;
        let node = Node::new(NodeId::generate(), Some(parent), position, order);
        self.tree.insert(node.clone())?;
        self.focus.begin_edit(node.id);
        log::debug!("added sibling {} after {target}", node.id);
        Ok(Mutation::NodeCreated { node })
    }

    fn delete_node(&mut self, id: NodeId) -> Result<Mutation, EditError> {
        let node = self.tree.get(id).ok_or(EditError::NotFound(id))?;
        if node.is_root() && self.tree.len() > 1 {
            return Err(EditError::RootDeletion);
        }
        let parent = node.parent_id;
        let removed = self.tree.remove_subtree(id)?;
        self.focus.retarget_after_removal(&self.tree, parent);
        log::debug!("deleted {id} ({} nodes)", removed.len());
        Ok(Mutation::NodeDeleted { node_id: id })
    }

    fn edit_content(&mut self, id: NodeId, content: &str) -> Result<Mutation, EditError> {
        if !self.tree.contains(id) {
            return Err(EditError::NotFound(id));
        }
        self.tree.update(id, content)?;
        Ok(Mutation::NodeUpdated {
            node_id: id,
            content: content.to_owned(),
        })
    }

    fn end_edit(&mut self, id: NodeId) -> Result<Option<Mutation>, EditError> {
        let node = self.tree.get(id).ok_or(EditError::NotFound(id))?;
        let discard = !node.is_root() && node.content.trim().is_empty();
        if self.focus.editing() == Some(id) {
            self.focus.stop_editing();
        }
        if discard {
            self.delete_node(id).map(Some)
        } else {
            Ok(None)
        }
    }

    fn clear_tree(&mut self) -> Option<Mutation> {
        let root = self.tree.root_id()?;
        self.tree.clear();
        self.focus.clear();
        Some(Mutation::NodeDeleted { node_id: root })
    }
}
