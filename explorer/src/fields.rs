use crate::state::user::BASE_FIELDS;
use query_engine::ColumnSet;
use serde_json::Value;
use std::collections::BTreeSet;

const LABELS_COLUMN: &str = "labels";

/// Every `labels.<key>` seen in the fetched rows plus the selected ones,
/// sorted.
pub fn discover_labels(log_fields: &ColumnSet, selected_labels: &[String]) -> Vec<String> {
    let mut labels: BTreeSet<String> = selected_labels.iter().cloned().collect();
    if let Some(column) = log_fields.column(LABELS_COLUMN) {
        for value in &column.values {
            if let Value::Object(map) = value {
                labels.extend(map.keys().map(|k| format!("{}.{}", LABELS_COLUMN, k)));
            }
        }
    }

    labels.into_iter().collect()
}

/// Columns to show: selected base fields in their fixed order, then the
/// selected labels in selection order.
pub fn display_fields(selected_fields: &[String], selected_labels: &[String]) -> Vec<String> {
    BASE_FIELDS
        .iter()
        .filter(|f| selected_fields.iter().any(|s| s == *f))
        .map(|f| f.to_string())
        .chain(selected_labels.iter().cloned())
        .collect()
}
