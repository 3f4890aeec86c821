//! Property-based test generators using proptest.
//!
//! Paths are drawn from a small alphabet so that random changes in one
//! batch overlap, nest and undo each other often.

use proptest::prelude::*;
use serde_json::{Map, Value};
use tabula_core::{Change, Document};

/// Strategy for path segments.
pub fn segment_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["a", "b", "c"]).prop_map(str::to_owned)
}

/// Strategy for paths of one to three segments.
pub fn path_strategy() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(segment_strategy(), 1..4)
}

/// Strategy for scalar JSON values.
pub fn json_leaf_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        (0i64..4).prop_map(Value::from),
        prop::sample::select(vec!["x", "y"]).prop_map(Value::from),
    ]
}

/// Strategy for JSON values, nested up to three objects deep.
pub fn json_value_strategy() -> impl Strategy<Value = Value> {
    json_leaf_strategy().prop_recursive(3, 24, 3, |inner| {
        prop::collection::btree_map(segment_strategy(), inner, 0..3)
            .prop_map(|members| Value::Object(members.into_iter().collect::<Map<_, _>>()))
    })
}

/// Strategy for a single set or remove.
pub fn change_strategy() -> impl Strategy<Value = Change> {
    prop_oneof![
        3 => (path_strategy(), json_value_strategy())
            .prop_map(|(path, value)| Change::set(path, value)),
        1 => path_strategy().prop_map(Change::remove),
    ]
}

/// Strategy for a batch of up to eight changes.
pub fn batch_strategy() -> impl Strategy<Value = Vec<Change>> {
    prop::collection::vec(change_strategy(), 0..8)
}

/// Strategy for documents with an object root.
pub fn document_strategy() -> impl Strategy<Value = Document> {
    prop::collection::btree_map(segment_strategy(), json_value_strategy(), 0..3).prop_map(
        |members| Document::new(Value::Object(members.into_iter().collect::<Map<_, _>>())),
    )
}

/// Strategy for renames of the sample document's tables and fields.
///
/// Every path exists in [`sample_document`](crate::fixtures::sample_document).
pub fn sample_rename_strategy() -> impl Strategy<Value = Vec<Change>> {
    let targets = vec![
        vec!["name"],
        vec!["tablesById", "tblFeatures", "name"],
        vec!["tablesById", "tblReleases", "name"],
        vec!["tablesById", "tblFeatures", "fieldsById", "fldName", "name"],
        vec!["tablesById", "tblFeatures", "fieldsById", "fldEstimate", "name"],
        vec!["tablesById", "tblReleases", "viewsById", "viwReleases", "name"],
    ];
    prop::collection::vec(
        (
            prop::sample::select(targets),
            prop::sample::select(vec!["One", "Two", "Three"]),
        )
            .prop_map(|(path, name)| Change::set(path, name)),
        1..6,
    )
}

/// Configuration for property-based tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for thorough tests.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 1024,
            max_shrink_iters: 10000,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
