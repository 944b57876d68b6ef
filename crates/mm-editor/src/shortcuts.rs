//! Keyboard shortcut mapping.
//!
//! Maps key + modifier combos to semantic `ShortcutAction`s. `key` is the
//! `KeyboardEvent.key` value, so any front end can feed it straight in.
//!
//! - Tab = new child of the active node
//! - Enter = new sibling below the active node (Shift+Enter is a newline)
//! - Delete = remove the active node and its subtree
//! - Arrows = move the selection through the tree
//! - ⌘ +/−/0 = zoom

use crate::focus::Direction;

/// Actions that keyboard shortcuts can trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShortcutAction {
    // ── Edit ──
    AddChild,
    AddSibling,
    Delete,
    /// Leave edit mode (same as losing focus).
    EndEdit,

    // ── Selection ──
    Navigate(Direction),

    // ── View ──
    ZoomIn,
    ZoomOut,
    ResetView,
}

impl ShortcutAction {
    /// Whether the action can change the tree. The engine drops these in
    /// read-only mode.
    pub fn is_edit(self) -> bool {
        matches!(
            self,
            Self::AddChild | Self::AddSibling | Self::Delete | Self::EndEdit
        )
    }
}

/// Resolves key events into shortcut actions.
///
/// On macOS `meta` is ⌘; on other platforms `ctrl` serves the same role.
pub struct ShortcutMap;

impl ShortcutMap {
    /// Resolve a key event to an action.
    /// Returns `None` if the key combo has no binding.
    pub fn resolve(
        key: &str,
        ctrl: bool,
        shift: bool,
        _alt: bool,
        meta: bool,
    ) -> Option<ShortcutAction> {
        let cmd = ctrl || meta;

        if cmd {
            return match key {
                "=" | "+" => Some(ShortcutAction::ZoomIn),
                "-" => Some(ShortcutAction::ZoomOut),
                "0" => Some(ShortcutAction::ResetView),
                _ => None,
            };
        }

        match key {
            "Tab" if !shift => Some(ShortcutAction::AddChild),
            "Enter" if !shift => Some(ShortcutAction::AddSibling),
            "Delete" => Some(ShortcutAction::Delete),
            "Escape" => Some(ShortcutAction::EndEdit),
            "ArrowUp" => Some(ShortcutAction::Navigate(Direction::Up)),
            "ArrowDown" => Some(ShortcutAction::Navigate(Direction::Down)),
            "ArrowLeft" => Some(ShortcutAction::Navigate(Direction::Left)),
            "ArrowRight" => Some(ShortcutAction::Navigate(Direction::Right)),
            _ => None,
        }
    }
}
