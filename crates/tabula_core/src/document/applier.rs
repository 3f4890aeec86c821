//! Change batch application.
//!
//! Changes are applied in input order. The first time a batch touches a path
//! its pre-batch value is captured; once the whole batch is applied, every
//! touched path whose final value differs from that capture is marked dirty.
//! The dirty tree therefore reflects the net effect of the batch: a value set
//! and then restored within one batch is not dirty.
//!
//! Intermediate objects created to reach a key are touched too, so creating
//! a whole entity marks the entity itself rather than each of its leaves.

use super::{value_at, Change, DirtyNode, Document};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Applies `changes` to `document` and returns the dirty-path tree.
pub fn apply_changes(document: &mut Document, changes: &[Change]) -> DirtyNode {
    let mut batch = Batch::default();
    for change in changes {
        batch.apply(document.root_mut(), change);
    }
    batch.into_dirty(document.root())
}

struct Touched {
    path: Vec<String>,
    before: Option<Value>,
}

/// Index of touched paths, shaped like the document.
#[derive(Default)]
struct TouchNode {
    index: Option<usize>,
    children: HashMap<String, TouchNode>,
}

impl TouchNode {
    fn lookup(&self, path: &[String]) -> Option<&TouchNode> {
        let mut cur = self;
        for segment in path {
            cur = cur.children.get(segment)?;
        }
        Some(cur)
    }

    /// Nearest touched proper prefix of `path`, as `(index, depth)`.
    fn nearest_ancestor(&self, path: &[String]) -> Option<(usize, usize)> {
        let mut cur = self;
        for (depth, segment) in path.iter().enumerate() {
            if let Some(index) = cur.index {
                return Some((index, depth));
            }
            cur = cur.children.get(segment)?;
        }
        None
    }

    fn insert(&mut self, path: &[String], index: usize) {
        let mut cur = self;
        for segment in path {
            cur = cur.children.entry(segment.clone()).or_default();
        }
        cur.index = Some(index);
    }

    fn collect(&self, out: &mut Vec<usize>) {
        out.extend(self.index);
        for child in self.children.values() {
            child.collect(out);
        }
    }
}

#[derive(Default)]
struct Batch {
    touched: Vec<Touched>,
    index: TouchNode,
}

impl Batch {
    fn apply(&mut self, root: &mut Value, change: &Change) {
        match &change.value {
            Some(value) => {
                for depth in first_missing_container(root, &change.path)..change.path.len() {
                    self.touch(root, &change.path[..depth]);
                }
                self.touch(root, &change.path);
                set_in(root, &change.path, value.clone());
            }
            None => {
                self.touch(root, &change.path);
                remove_in(root, &change.path);
            }
        }
    }

    /// Records the pre-batch value of `path` the first time it is touched.
    fn touch(&mut self, root: &Value, path: &[String]) {
        if self
            .index
            .lookup(path)
            .and_then(|node| node.index)
            .is_some()
        {
            return;
        }

        let before = match self.index.nearest_ancestor(path) {
            // The ancestor's capture already holds the whole pre-batch subtree.
            Some((index, depth)) => self.touched[index]
                .before
                .as_ref()
                .and_then(|value| value_at(value, &path[depth..]))
                .cloned(),
            None => {
                let mut before = value_at(root, path).cloned();
                if let Some(node) = self.index.lookup(path) {
                    let mut descendants = Vec::new();
                    node.collect(&mut descendants);
                    // Undo later writes first.
                    descendants.sort_unstable_by(|a, b| b.cmp(a));
                    for index in descendants {
                        let touched = &self.touched[index];
                        restore(&mut before, &touched.path[path.len()..], &touched.before);
                    }
                }
                before
            }
        };

        let index = self.touched.len();
        self.touched.push(Touched {
            path: path.to_vec(),
            before,
        });
        self.index.insert(path, index);
    }

    fn into_dirty(self, root: &Value) -> DirtyNode {
        let mut dirty = DirtyNode::new();
        for touched in &self.touched {
            if value_at(root, &touched.path) != touched.before.as_ref() {
                dirty.mark(&touched.path);
            }
        }
        dirty
    }
}

/// Depth of the first proper prefix of `path` that is not an object.
///
/// Returns `path.len()` when every parent already exists.
fn first_missing_container(root: &Value, path: &[String]) -> usize {
    let parents = path.len().saturating_sub(1);
    let mut cur = root;
    for depth in 0..parents {
        let Some(map) = cur.as_object() else {
            return depth;
        };
        match map.get(&path[depth]) {
            Some(next) => cur = next,
            None => return depth + 1,
        }
    }
    if cur.is_object() || path.is_empty() {
        path.len()
    } else {
        parents
    }
}

fn restore(target: &mut Option<Value>, rel: &[String], value: &Option<Value>) {
    if rel.is_empty() {
        *target = value.clone();
        return;
    }
    match (target.as_mut(), value) {
        (Some(root), Some(value)) => set_in(root, rel, value.clone()),
        (Some(root), None) => remove_in(root, rel),
        (None, Some(value)) => {
            let mut root = Value::Object(Map::new());
            set_in(&mut root, rel, value.clone());
            *target = Some(root);
        }
        (None, None) => {}
    }
}

fn ensure_object(value: &mut Value) -> &mut Map<String, Value> {
    if !value.is_object() {
        *value = Value::Object(Map::new());
    }
    value
        .as_object_mut()
        .unwrap_or_else(|| unreachable!("value was just replaced with an object"))
}

fn set_in(root: &mut Value, path: &[String], value: Value) {
    let Some((last, parents)) = path.split_last() else {
        *root = value;
        return;
    };
    let mut cur = root;
    for segment in parents {
        cur = ensure_object(cur)
            .entry(segment.clone())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    ensure_object(cur).insert(last.clone(), value);
}

fn remove_in(root: &mut Value, path: &[String]) {
    let Some((last, parents)) = path.split_last() else {
        *root = Value::Object(Map::new());
        return;
    };
    let mut cur = root;
    for segment in parents {
        match cur.as_object_mut().and_then(|map| map.get_mut(segment)) {
            Some(next) => cur = next,
            None => return,
        }
    }
    if let Some(map) = cur.as_object_mut() {
        map.shift_remove(last);
    }
}
