//! Diff command implementation.

use super::{read_batches, read_json};
use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use tabula_core::{apply_changes, Document};

/// Dirty tree of one batch.
#[derive(Debug, Serialize)]
pub struct BatchDiff {
    /// One-based batch number.
    pub batch: usize,
    /// Number of changes in the batch.
    pub changes: usize,
    /// The dirty-path tree, `true` marking changed subtrees.
    pub dirty: Value,
}

/// Runs the diff command.
pub fn run(document: &Path, batches: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let mut doc = Document::new(read_json(document)?);
    let batches = read_batches(batches)?;

    let diffs = diff_batches(&mut doc, &batches);
    println!("{}", serde_json::to_string_pretty(&diffs)?);
    Ok(())
}

fn diff_batches(doc: &mut Document, batches: &[Vec<tabula_core::Change>]) -> Vec<BatchDiff> {
    batches
        .iter()
        .enumerate()
        .map(|(index, batch)| BatchDiff {
            batch: index + 1,
            changes: batch.len(),
            dirty: apply_changes(doc, batch).to_value(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tabula_core::Change;

    #[test]
    fn each_batch_sees_the_previous_result() {
        let mut doc = Document::new(json!({"name": "a"}));
        let batches = vec![
            vec![Change::set(["name"], "b")],
            vec![Change::set(["name"], "b")],
        ];

        let diffs = diff_batches(&mut doc, &batches);

        assert_eq!(diffs[0].dirty, json!({"name": true}));
        assert_eq!(diffs[1].dirty, json!({}));
        assert_eq!(diffs[1].batch, 2);
    }
}
