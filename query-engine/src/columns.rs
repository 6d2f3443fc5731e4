use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub values: Vec<Value>,
}

impl Column {
    pub fn new(name: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    /// Non-empty string values in row order, without duplicates.
    pub fn distinct_strings(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for value in &self.values {
            let s = match value {
                Value::String(s) if !s.is_empty() => s.clone(),
                Value::Number(n) => n.to_string(),
                _ => continue,
            };
            if !out.contains(&s) {
                out.push(s);
            }
        }
        out
    }
}

/// Columnar query result: named columns of equal length, in result order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColumnSet(Vec<Column>);

impl ColumnSet {
    pub fn new(columns: Vec<Column>) -> Self {
        Self(columns)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.0.iter().find(|c| c.name == name)
    }

    pub fn columns(&self) -> &[Column] {
        &self.0
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|c| c.name.as_str())
    }

    pub fn row_count(&self) -> usize {
        self.0.first().map(|c| c.values.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.row_count() == 0
    }
}
