//! Schema-shaped privacy policy tree.
//!
//! The policy mirrors the shape of the section's protobuf schema: one node
//! per redactable field, children sorted ascending by field id so lookups
//! can stop early. Nodes live in a flat arena and name their children by
//! index; a self-referential schema type (a message containing itself) is a
//! child index equal to the node's own slot, which needs no unsafe aliasing
//! and no reference-counted cycles.
//!
//! Policies are immutable once built and shared freely across stripping
//! passes.

use crate::error::{RedactError, Result};
use crate::wire::WireKind;
use ird_common::Destination;
use regex::Regex;

/// Index of a node in its [`PolicyTree`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) u32);

/// Per-field redaction metadata.
#[derive(Debug, Clone)]
pub struct PolicyNode {
    /// Field id this node describes (0 for synthetic message roots).
    pub field_id: u32,
    /// Wire kind the field is expected to carry.
    pub wire_kind: WireKind,
    /// Destination tag, or `None` to inherit the parent's.
    pub destination: Option<Destination>,
    /// Children sorted ascending by field id; empty for leaves.
    children: Vec<NodeId>,
    /// Scrub patterns applied to kept string payloads.
    scrub: Vec<Regex>,
}

impl PolicyNode {
    fn new(field_id: u32, wire_kind: WireKind) -> Self {
        Self {
            field_id,
            wire_kind,
            destination: None,
            children: Vec::new(),
            scrub: Vec::new(),
        }
    }

    /// Whether this node describes a submessage with its own policy.
    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    pub(crate) fn scrub_patterns(&self) -> &[Regex] {
        &self.scrub
    }
}

/// Immutable arena of policy nodes.
#[derive(Debug, Clone)]
pub struct PolicyTree {
    nodes: Vec<PolicyNode>,
}

impl PolicyTree {
    /// Borrow a node by id.
    pub fn node(&self, id: NodeId) -> &PolicyNode {
        &self.nodes[id.0 as usize]
    }

    /// Find the child of `parent` describing `field_id`.
    ///
    /// Children are sorted ascending, so the scan stops as soon as a child
    /// id exceeds the target.
    pub fn lookup(&self, parent: NodeId, field_id: u32) -> Option<NodeId> {
        for &child in &self.node(parent).children {
            let child_field = self.node(child).field_id;
            if child_field == field_id {
                return Some(child);
            }
            if child_field > field_id {
                break;
            }
        }
        None
    }

    /// The destination a field is effectively tagged with: its own if set,
    /// otherwise the parent's.
    pub fn effective_destination(
        &self,
        node: Option<NodeId>,
        parent_destination: Destination,
    ) -> Destination {
        node.and_then(|id| self.node(id).destination)
            .unwrap_or(parent_destination)
    }
}

/// Two-phase builder: allocate nodes first, wire children second.
///
/// The split is what makes self-referential policies constructible — a
/// node's id exists before its child list does.
#[derive(Debug, Default)]
pub struct PolicyTreeBuilder {
    nodes: Vec<PolicyNode>,
}

impl PolicyTreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a leaf node for a scalar field.
    pub fn leaf(&mut self, field_id: u32, wire_kind: WireKind) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(PolicyNode::new(field_id, wire_kind));
        id
    }

    /// Allocate a node for a submessage field.
    pub fn message(&mut self, field_id: u32) -> NodeId {
        self.leaf(field_id, WireKind::LengthDelimited)
    }

    /// Tag a node with its own destination.
    pub fn set_destination(&mut self, id: NodeId, destination: Destination) {
        self.nodes[id.0 as usize].destination = Some(destination);
    }

    /// Add a scrub pattern applied to kept string payloads of this field.
    pub fn add_scrub_pattern(&mut self, id: NodeId, pattern: &str) -> Result<()> {
        let re = Regex::new(pattern).map_err(|source| RedactError::Pattern {
            pattern: pattern.to_string(),
            source,
        })?;
        self.nodes[id.0 as usize].scrub.push(re);
        Ok(())
    }

    /// Wire a node's children. Must be sorted ascending by field id; a
    /// child id equal to `id` itself is legal (self-referential type).
    pub fn set_children(&mut self, id: NodeId, children: Vec<NodeId>) -> Result<()> {
        let mut prev: Option<u32> = None;
        for &child in &children {
            let field = self.nodes[child.0 as usize].field_id;
            if let Some(p) = prev {
                if field <= p {
                    return Err(RedactError::UnsortedChildren {
                        field_id: self.nodes[id.0 as usize].field_id,
                    });
                }
            }
            prev = Some(field);
        }
        self.nodes[id.0 as usize].children = children;
        Ok(())
    }

    pub fn build(self) -> PolicyTree {
        PolicyTree { nodes: self.nodes }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_tree() -> (PolicyTree, NodeId) {
        let mut b = PolicyTreeBuilder::new();
        let root = b.message(0);
        let f1 = b.leaf(1, WireKind::Varint);
        let f3 = b.leaf(3, WireKind::LengthDelimited);
        let f7 = b.leaf(7, WireKind::Fixed32);
        b.set_destination(f1, Destination::Local);
        b.set_destination(f7, Destination::Automatic);
        b.set_children(root, vec![f1, f3, f7]).unwrap();
        (b.build(), root)
    }

    #[test]
    fn test_lookup_hit_and_miss() {
        let (tree, root) = small_tree();
        assert!(tree.lookup(root, 1).is_some());
        assert!(tree.lookup(root, 3).is_some());
        assert!(tree.lookup(root, 7).is_some());
        assert!(tree.lookup(root, 2).is_none());
        assert!(tree.lookup(root, 8).is_none());
    }

    #[test]
    fn test_lookup_early_exit_does_not_skip_later_children() {
        let (tree, root) = small_tree();
        // 5 sits between sorted children 3 and 7; the scan must stop at 7
        // without false-matching.
        assert!(tree.lookup(root, 5).is_none());
    }

    #[test]
    fn test_effective_destination_inherits() {
        let (tree, root) = small_tree();
        let f3 = tree.lookup(root, 3);
        assert_eq!(
            tree.effective_destination(f3, Destination::Explicit),
            Destination::Explicit
        );
        let f1 = tree.lookup(root, 1);
        assert_eq!(
            tree.effective_destination(f1, Destination::Explicit),
            Destination::Local
        );
        assert_eq!(
            tree.effective_destination(None, Destination::Automatic),
            Destination::Automatic
        );
    }

    #[test]
    fn test_unsorted_children_rejected() {
        let mut b = PolicyTreeBuilder::new();
        let root = b.message(0);
        let f2 = b.leaf(2, WireKind::Varint);
        let f1 = b.leaf(1, WireKind::Varint);
        let err = b.set_children(root, vec![f2, f1]).unwrap_err();
        assert!(matches!(err, RedactError::UnsortedChildren { .. }));
    }

    #[test]
    fn test_self_referential_node() {
        // A message type containing itself: children include its own slot.
        let mut b = PolicyTreeBuilder::new();
        let root = b.message(0);
        let nested = b.message(2);
        let name = b.leaf(1, WireKind::LengthDelimited);
        b.set_children(nested, vec![name, nested]).unwrap();
        b.set_children(root, vec![nested]).unwrap();
        let tree = b.build();

        let hit = tree.lookup(root, 2).unwrap();
        assert_eq!(tree.lookup(hit, 2), Some(hit));
    }

    #[test]
    fn test_bad_scrub_pattern() {
        let mut b = PolicyTreeBuilder::new();
        let leaf = b.leaf(1, WireKind::LengthDelimited);
        assert!(b.add_scrub_pattern(leaf, "(unclosed").is_err());
        assert!(b.add_scrub_pattern(leaf, "ssid=\\S+").is_ok());
    }
}
