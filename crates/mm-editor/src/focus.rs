//! Selection and edit focus.
//!
//! At most one node is active and at most one node is being edited; the
//! edited node is always the active one. This is per-client view state and
//! is never synchronized.

use mm_core::id::NodeId;
use mm_core::model::Tree;

/// Arrow-key movement through the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Previous sibling.
    Up,
    /// Next sibling.
    Down,
    /// Parent.
    Left,
    /// First child.
    Right,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Focus {
    active: Option<NodeId>,
    editing: bool,
}

impl Focus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active(&self) -> Option<NodeId> {
        self.active
    }

    pub fn is_editing(&self) -> bool {
        self.editing
    }

    /// The node being edited, if any.
    pub fn editing(&self) -> Option<NodeId> {
        self.active.filter(|_| self.editing)
    }

    /// Select `id`. Selecting a different node ends any edit.
    pub fn activate(&mut self, id: NodeId) {
        if self.active != Some(id) {
            self.editing = false;
        }
        self.active = Some(id);
    }

    /// Select `id` and start editing it.
    pub fn begin_edit(&mut self, id: NodeId) {
        self.active = Some(id);
        self.editing = true;
    }

    pub fn stop_editing(&mut self) {
        self.editing = false;
    }

    pub fn clear(&mut self) {
        self.active = None;
        self.editing = false;
    }

    /// Move the selection one step. Moving past either end of a sibling
    /// group, above the root, or below a leaf leaves the selection alone.
    /// Returns whether the selection moved.
    pub fn navigate(&mut self, tree: &Tree, direction: Direction) -> bool {
        let Some(current) = self.active.filter(|id| tree.contains(*id)) else {
            return false;
        };
        let target = match direction {
            Direction::Left => tree.parent_of(current).map(|p| p.id),
            Direction::Right => tree.children_of(current).first().map(|c| c.id),
            Direction::Up | Direction::Down => {
                let siblings = tree.siblings_of(current);
                siblings
                    .iter()
                    .position(|n| n.id == current)
                    .and_then(|i| match direction {
                        Direction::Up => i.checked_sub(1),
                        _ => Some(i + 1),
                    })
                    .and_then(|i| siblings.get(i))
                    .map(|n| n.id)
            }
        };
        match target {
            Some(id) => {
                self.activate(id);
                true
            }
            None => false,
        }
    }

    /// Repair the selection after a subtree rooted at a child of `parent`
    /// was removed from `tree`: if the active node is gone, select `parent`.
    pub fn retarget_after_removal(&mut self, tree: &Tree, parent: Option<NodeId>) {
        if self.active.is_some_and(|id| !tree.contains(id)) {
            self.editing = false;
            self.active = parent.filter(|p| tree.contains(*p));
        }
    }
}
