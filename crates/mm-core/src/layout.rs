//! Placement and connector layout.
//!
//! New nodes get a fixed-step placement below their parent; nothing is
//! relaid out afterwards. Connectors are derived every frame from the tree,
//! the viewport, and the side-table of mounted elements, which the UI fills
//! as node elements mount and unmount.

use crate::id::NodeId;
use crate::model::{Position, Tree};
use crate::viewport::ViewportState;
use kurbo::{BezPath, CubicBez, Point};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Step sizes for placing freshly created nodes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Placement {
    /// Distance from a parent down to its first child.
    pub child_step: f32,
    /// Extra distance per existing child, so siblings fan out.
    pub fan_step: f32,
    /// Distance from a node down to a sibling created next to it.
    pub sibling_step: f32,
}

impl Default for Placement {
    fn default() -> Self {
        Self {
            child_step: 100.0,
            fan_step: 60.0,
            sibling_step: 60.0,
        }
    }
}

impl Placement {
    pub fn child_of(&self, parent: Position, existing_children: usize) -> Position {
        parent.offset(0.0, self.child_step + existing_children as f32 * self.fan_step)
    }

    pub fn sibling_of(&self, node: Position) -> Position {
        node.offset(0.0, self.sibling_step)
    }
}

// ─── Mounted elements ────────────────────────────────────────────────────

/// World-space box of a mounted node element.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ElementBounds {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl ElementBounds {
    pub fn contains(&self, px: f32, py: f32) -> bool {
        px >= self.x && px <= self.x + self.width && py >= self.y && py <= self.y + self.height
    }

    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

/// Side-table of measured element sizes, keyed by node id.
///
/// Owned by the view, never by the tree. A node that is in the tree but not
/// mounted has no anchor and draws no connector.
#[derive(Debug, Clone, Default)]
pub struct ElementTable {
    sizes: HashMap<NodeId, (f32, f32)>,
}

impl ElementTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record (or re-measure) a mounted element.
    pub fn mount(&mut self, id: NodeId, width: f32, height: f32) {
        self.sizes.insert(id, (width, height));
    }

    pub fn unmount(&mut self, id: NodeId) {
        self.sizes.remove(&id);
    }

    pub fn is_mounted(&self, id: NodeId) -> bool {
        self.sizes.contains_key(&id)
    }

    /// Drop entries for nodes that no longer exist in `tree`.
    pub fn retain_in(&mut self, tree: &Tree) {
        self.sizes.retain(|id, _| tree.contains(*id));
    }

    pub fn len(&self) -> usize {
        self.sizes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }

    /// World-space bounds of a mounted node, placed at its tree position.
    pub fn bounds(&self, tree: &Tree, id: NodeId) -> Option<ElementBounds> {
        let &(width, height) = self.sizes.get(&id)?;
        let node = tree.get(id)?;
        Some(ElementBounds {
            x: node.position.x,
            y: node.position.y,
            width,
            height,
        })
    }

    /// Screen-space anchor (element center) of a mounted node.
    pub fn anchor(&self, tree: &Tree, viewport: &ViewportState, id: NodeId) -> Option<Point> {
        let (cx, cy) = self.bounds(tree, id)?.center();
        let (sx, sy) = viewport.to_screen(Position::new(cx, cy));
        Some(Point::new(f64::from(sx), f64::from(sy)))
    }
}

// ─── Connectors ──────────────────────────────────────────────────────────

/// A parent → child curve in screen space.
#[derive(Debug, Clone, PartialEq)]
pub struct Connector {
    pub from: NodeId,
    pub to: NodeId,
    pub curve: CubicBez,
}

impl Connector {
    /// S-curve leaving the parent horizontally and entering the child
    /// horizontally, with both control points at the horizontal midpoint.
    pub fn between(from: NodeId, to: NodeId, start: Point, end: Point) -> Self {
        let mid_x = start.x + (end.x - start.x) / 2.0;
        Self {
            from,
            to,
            curve: CubicBez::new(
                start,
                Point::new(mid_x, start.y),
                Point::new(mid_x, end.y),
                end,
            ),
        }
    }

    /// SVG path data (`M… C…`).
    pub fn to_svg(&self) -> String {
        let mut path = BezPath::new();
        path.move_to(self.curve.p0);
        path.curve_to(self.curve.p1, self.curve.p2, self.curve.p3);
        path.to_svg()
    }
}

/// Compute connectors for every parented node whose element and parent
/// element are both mounted. Output follows tree pre-order.
pub fn resolve_connectors(
    tree: &Tree,
    viewport: &ViewportState,
    elements: &ElementTable,
) -> Vec<Connector> {
    tree.to_nodes()
        .iter()
        .filter_map(|node| {
            let parent = node.parent_id?;
            let start = elements.anchor(tree, viewport, parent)?;
            let end = elements.anchor(tree, viewport, node.id)?;
            Some(Connector::between(parent, node.id, start, end))
        })
        .collect()
}

/// Find the topmost mounted node under screen point `(sx, sy)`.
/// Returns `None` for the background. Later nodes in pre-order paint over
/// earlier ones.
pub fn hit_test(
    tree: &Tree,
    viewport: &ViewportState,
    elements: &ElementTable,
    sx: f32,
    sy: f32,
) -> Option<NodeId> {
    let p = viewport.to_world(sx, sy);
    tree.to_nodes()
        .iter()
        .rev()
        .find(|node| {
            elements
                .bounds(tree, node.id)
                .is_some_and(|b| b.contains(p.x, p.y))
        })
        .map(|node| node.id)
}
