//! The shared document and its change applier.
//!
//! The [`Document`] is a single JSON tree holding every piece of state the
//! host has mirrored into the SDK. It is mutated only by [`apply_changes`],
//! which also produces the [`DirtyNode`] tree consumed by the propagator.

mod applier;
mod change;
mod dirty;

pub use applier::apply_changes;
pub use change::Change;
pub use dirty::DirtyNode;

use serde_json::{Map, Value};

/// The shared, mutable state tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    root: Value,
}

impl Document {
    /// Creates a document from an existing JSON tree.
    pub fn new(root: Value) -> Self {
        Self { root }
    }

    /// Creates a document with an empty object root.
    pub fn empty() -> Self {
        Self::new(Value::Object(Map::new()))
    }

    /// Returns the root of the tree.
    pub fn root(&self) -> &Value {
        &self.root
    }

    /// Returns the value at `path`, if present.
    pub fn get<S: AsRef<str>>(&self, path: &[S]) -> Option<&Value> {
        value_at(&self.root, path)
    }

    /// Returns true if a value is present at `path`.
    pub fn contains<S: AsRef<str>>(&self, path: &[S]) -> bool {
        self.get(path).is_some()
    }

    /// Consumes the document and returns its tree.
    pub fn into_value(self) -> Value {
        self.root
    }

    pub(crate) fn root_mut(&mut self) -> &mut Value {
        &mut self.root
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<Value> for Document {
    fn from(root: Value) -> Self {
        Self::new(root)
    }
}

/// Follows `path` through nested objects.
///
/// Arrays and scalars are leaves: a path that continues through one resolves
/// to `None`.
pub fn value_at<'a, S: AsRef<str>>(value: &'a Value, path: &[S]) -> Option<&'a Value> {
    let mut cur = value;
    for segment in path {
        cur = cur.as_object()?.get(segment.as_ref())?;
    }
    Some(cur)
}

/// Returns the keys of the object at `path`, in document order.
pub(crate) fn keys_at<S: AsRef<str>>(value: &Value, path: &[S]) -> Vec<String> {
    value_at(value, path)
        .and_then(Value::as_object)
        .map(|map| map.keys().cloned().collect())
        .unwrap_or_default()
}

/// Returns the string members of an array, skipping anything else.
pub(crate) fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default()
}

/// Builds an owned path from string-like segments.
pub fn path<I, S>(segments: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    segments.into_iter().map(Into::into).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn lookup_follows_objects_only() {
        let doc = Document::new(json!({
            "tablesById": {"tbl1": {"name": "Tasks", "viewOrder": ["viw1"]}}
        }));

        assert_eq!(
            doc.get(&["tablesById", "tbl1", "name"]),
            Some(&json!("Tasks"))
        );
        assert!(doc.get(&["tablesById", "tbl1", "viewOrder", "0"]).is_none());
        assert!(doc.get(&["tablesById", "tbl2"]).is_none());
        assert_eq!(doc.get::<&str>(&[]), Some(doc.root()));
    }

    #[test]
    fn keys_preserve_document_order() {
        let doc = json!({"fieldsById": {"fldB": {}, "fldA": {}, "fldC": {}}});
        assert_eq!(keys_at(&doc, &["fieldsById"]), vec!["fldB", "fldA", "fldC"]);
        assert!(keys_at(&doc, &["missing"]).is_empty());
    }
}
