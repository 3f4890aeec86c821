//! Dirty-path trees.

use serde_json::{Map, Value};
use std::collections::BTreeMap;

static CHANGED: DirtyNode = DirtyNode::Changed;

/// A tree mirroring the touched part of the document, marking changed values.
///
/// A [`DirtyNode::Changed`] marker is terminal: the whole subtree below it
/// is considered changed. Interior nodes exist only if some descendant
/// changed, so an empty root means the batch changed nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirtyNode {
    /// The value at this position differs from its pre-batch value.
    Changed,
    /// Some descendants changed.
    Children(BTreeMap<String, DirtyNode>),
}

impl DirtyNode {
    /// Creates an empty root.
    pub fn new() -> Self {
        DirtyNode::Children(BTreeMap::new())
    }

    /// Returns true if nothing is marked.
    pub fn is_empty(&self) -> bool {
        matches!(self, DirtyNode::Children(children) if children.is_empty())
    }

    /// Returns true for a terminal marker.
    pub fn is_changed(&self) -> bool {
        matches!(self, DirtyNode::Changed)
    }

    /// Returns the dirty subtree for `key`.
    ///
    /// Below a terminal marker every key is dirty, so this returns a
    /// terminal marker for any key.
    pub fn child(&self, key: &str) -> Option<&DirtyNode> {
        match self {
            DirtyNode::Changed => Some(&CHANGED),
            DirtyNode::Children(children) => children.get(key),
        }
    }

    /// Returns true if `key` is dirty.
    pub fn has(&self, key: &str) -> bool {
        self.child(key).is_some()
    }

    /// Returns the per-key children, or `None` for a terminal marker.
    pub fn children(&self) -> Option<&BTreeMap<String, DirtyNode>> {
        match self {
            DirtyNode::Changed => None,
            DirtyNode::Children(children) => Some(children),
        }
    }

    /// Follows `path` through the tree.
    pub fn at<S: AsRef<str>>(&self, path: &[S]) -> Option<&DirtyNode> {
        let mut cur = self;
        for segment in path {
            cur = cur.child(segment.as_ref())?;
        }
        Some(cur)
    }

    /// Marks `path` as changed, creating interior nodes along the way.
    pub fn mark<S: AsRef<str>>(&mut self, path: &[S]) {
        match (self, path.split_first()) {
            (DirtyNode::Changed, _) => {}
            (node, None) => *node = DirtyNode::Changed,
            (DirtyNode::Children(children), Some((head, rest))) => children
                .entry(head.as_ref().to_string())
                .or_insert_with(DirtyNode::new)
                .mark(rest),
        }
    }

    /// Counts terminal markers.
    pub fn changed_count(&self) -> usize {
        match self {
            DirtyNode::Changed => 1,
            DirtyNode::Children(children) => children.values().map(Self::changed_count).sum(),
        }
    }

    /// Renders the tree as JSON, with `true` for terminal markers.
    pub fn to_value(&self) -> Value {
        match self {
            DirtyNode::Changed => Value::Bool(true),
            DirtyNode::Children(children) => Value::Object(
                children
                    .iter()
                    .map(|(key, child)| (key.clone(), child.to_value()))
                    .collect::<Map<String, Value>>(),
            ),
        }
    }
}

impl Default for DirtyNode {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn mark_builds_interior_nodes() {
        let mut dirty = DirtyNode::new();
        dirty.mark(&["tablesById", "tbl1", "name"]);
        dirty.mark(&["tablesById", "tbl2"]);

        assert_eq!(
            dirty.to_value(),
            json!({"tablesById": {"tbl1": {"name": true}, "tbl2": true}})
        );
        assert_eq!(dirty.changed_count(), 2);
        assert!(dirty.at(&["tablesById", "tbl2", "anything"]).unwrap().is_changed());
        assert!(dirty.at(&["tablesById", "tbl3"]).is_none());
    }

    #[test]
    fn terminal_marker_absorbs_descendants() {
        let mut dirty = DirtyNode::new();
        dirty.mark(&["a", "b", "c"]);
        dirty.mark(&["a"]);
        dirty.mark(&["a", "d"]);

        assert_eq!(dirty.to_value(), json!({"a": true}));
        assert_eq!(dirty.changed_count(), 1);
    }

    #[test]
    fn empty_tree() {
        let dirty = DirtyNode::new();
        assert!(dirty.is_empty());
        assert!(!dirty.has("name"));
        assert_eq!(dirty.changed_count(), 0);
    }
}
