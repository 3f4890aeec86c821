//! Benchmark utilities.

use rand::Rng;
use serde_json::{json, Map, Value};
use tabula_core::Change;

/// Generate a document with `tables` tables of `fields` fields each.
pub fn wide_document(tables: usize, fields: usize) -> Value {
    let mut tables_by_id = Map::new();
    for t in 0..tables {
        let table_id = format!("tbl{t}");
        let fields_by_id: Map<String, Value> = (0..fields)
            .map(|f| {
                let field_id = format!("fld{f}");
                let field = json!({"id": field_id, "name": format!("Field {f}"), "type": "text"});
                (field_id, field)
            })
            .collect();
        tables_by_id.insert(
            table_id.clone(),
            json!({
                "id": table_id,
                "name": format!("Table {t}"),
                "primaryFieldId": "fld0",
                "fieldsById": fields_by_id,
            }),
        );
    }
    let order: Vec<Value> = tables_by_id.keys().cloned().map(Value::String).collect();
    json!({"id": "appBench", "name": "Bench", "tableOrder": order, "tablesById": tables_by_id})
}

/// Generate `count` records with `fields` numeric cells each.
pub fn records(count: usize, fields: usize) -> Value {
    let mut rng = rand::thread_rng();
    let records: Map<String, Value> = (0..count)
        .map(|r| {
            let record_id = format!("rec{r}");
            let cells: Map<String, Value> = (0..fields)
                .map(|f| (format!("fld{f}"), Value::from(rng.gen_range(0..1000_i64))))
                .collect();
            let record = json!({"id": record_id, "cellValuesByFieldId": cells});
            (record_id, record)
        })
        .collect();
    Value::Object(records)
}

/// Generate `count` random field renames against [`wide_document`].
pub fn random_renames(count: usize, tables: usize, fields: usize) -> Vec<Change> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|_| {
            let table_id = format!("tbl{}", rng.gen_range(0..tables));
            let field_id = format!("fld{}", rng.gen_range(0..fields));
            Change::set(
                ["tablesById", table_id.as_str(), "fieldsById", field_id.as_str(), "name"],
                format!("Renamed {}", rng.gen::<u32>()),
            )
        })
        .collect()
}

/// Generate `count` random cell writes for `table_id`.
pub fn random_cell_writes(
    table_id: &str,
    count: usize,
    records: usize,
    fields: usize,
) -> Vec<Change> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|_| {
            let record_id = format!("rec{}", rng.gen_range(0..records));
            let field_id = format!("fld{}", rng.gen_range(0..fields));
            Change::set(
                [
                    "tablesById",
                    table_id,
                    "recordsById",
                    record_id.as_str(),
                    "cellValuesByFieldId",
                    field_id.as_str(),
                ],
                rng.gen_range(0..1000_i64),
            )
        })
        .collect()
}
