//! Canvas controller: pan, zoom, and pointer targeting.
//!
//! Owns the per-client [`ViewportState`] and the table of mounted node
//! elements. Pointer presses on a node select it; presses on empty canvas
//! start a pan drag. The wheel zooms around the cursor.

use crate::input::InputEvent;
use crate::shortcuts::{ShortcutAction, ShortcutMap};
use mm_core::id::NodeId;
use mm_core::layout::{Connector, ElementTable, hit_test, resolve_connectors};
use mm_core::model::Tree;
use mm_core::viewport::{ViewportState, ZoomLimits};

/// What the host should do after the canvas handled an event.
#[derive(Debug, Clone, PartialEq)]
pub enum CanvasAction {
    /// Nothing visible changed.
    Idle,
    /// Pan or zoom changed; redraw.
    ViewChanged,
    /// A node was pressed.
    Select(NodeId),
    /// A node was double clicked.
    Edit(NodeId),
    /// A tree shortcut for the mutation engine.
    Shortcut(ShortcutAction),
}

#[derive(Debug, Clone, Default)]
pub struct Canvas {
    viewport: ViewportState,
    elements: ElementTable,
    /// Last pointer position while a background drag is in progress.
    drag: Option<(f32, f32)>,
    /// Canvas size in screen pixels, used as the keyboard zoom anchor.
    size: (f32, f32),
}

impl Canvas {
    pub fn new(limits: ZoomLimits) -> Self {
        Self {
            viewport: ViewportState::new(limits),
            ..Self::default()
        }
    }

    pub fn viewport(&self) -> &ViewportState {
        &self.viewport
    }

    pub fn elements(&self) -> &ElementTable {
        &self.elements
    }

    pub fn elements_mut(&mut self) -> &mut ElementTable {
        &mut self.elements
    }

    pub fn resize(&mut self, width: f32, height: f32) {
        self.size = (width, height);
    }

    pub fn is_panning(&self) -> bool {
        self.drag.is_some()
    }

    /// Drop element entries for nodes that left the tree.
    pub fn sync_elements(&mut self, tree: &Tree) {
        self.elements.retain_in(tree);
    }

    /// Connector curves for the current frame.
    pub fn connectors(&self, tree: &Tree) -> Vec<Connector> {
        resolve_connectors(tree, &self.viewport, &self.elements)
    }

    pub fn handle(&mut self, tree: &Tree, event: &InputEvent) -> CanvasAction {
        match event {
            InputEvent::PointerDown { x, y } => {
                match hit_test(tree, &self.viewport, &self.elements, *x, *y) {
                    Some(id) => CanvasAction::Select(id),
                    None => {
                        self.drag = Some((*x, *y));
                        CanvasAction::Idle
                    }
                }
            }
            InputEvent::PointerMove { x, y } => match self.drag {
                Some((last_x, last_y)) => {
                    self.viewport.pan_by(x - last_x, y - last_y);
                    self.drag = Some((*x, *y));
                    CanvasAction::ViewChanged
                }
                None => CanvasAction::Idle,
            },
            InputEvent::PointerUp { .. } | InputEvent::PointerLeave => {
                self.drag = None;
                CanvasAction::Idle
            }
            InputEvent::DoubleClick { x, y } => {
                match hit_test(tree, &self.viewport, &self.elements, *x, *y) {
                    Some(id) => CanvasAction::Edit(id),
                    None => CanvasAction::Idle,
                }
            }
            InputEvent::Wheel { x, y, delta_y } => {
                if self.viewport.wheel(*delta_y, *x, *y) {
                    CanvasAction::ViewChanged
                } else {
                    CanvasAction::Idle
                }
            }
            InputEvent::Key {
                key,
                ctrl,
                shift,
                alt,
                meta,
            } => match ShortcutMap::resolve(key, *ctrl, *shift, *alt, *meta) {
                Some(action) => self.handle_shortcut(action),
                None => CanvasAction::Idle,
            },
        }
    }

    fn handle_shortcut(&mut self, action: ShortcutAction) -> CanvasAction {
        let (cx, cy) = (self.size.0 / 2.0, self.size.1 / 2.0);
        let step = self.viewport.limits().wheel_step;
        let changed = match action {
            ShortcutAction::ZoomIn => self.viewport.zoom_at(self.viewport.zoom + step, cx, cy),
            ShortcutAction::ZoomOut => self.viewport.zoom_at(self.viewport.zoom - step, cx, cy),
            ShortcutAction::ResetView => {
                self.viewport.reset();
                true
            }
            other => return CanvasAction::Shortcut(other),
        };
        if changed {
            CanvasAction::ViewChanged
        } else {
            CanvasAction::Idle
        }
    }
}
