use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Key reserved for the time range control. Filters on it are never stored.
pub const TIMESTAMP_KEY: &str = "timestamp";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilterOperation {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    Neq,
}

impl FilterOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOperation::Eq => "=",
            FilterOperation::Neq => "!=",
        }
    }
}

impl fmt::Display for FilterOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub key: String,
    pub operation: FilterOperation,
    pub value: Value,
}

impl Filter {
    pub fn new(key: impl Into<String>, operation: FilterOperation, value: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            operation,
            value: value.into(),
        }
    }

    pub fn eq(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(key, FilterOperation::Eq, value)
    }

    pub fn neq(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(key, FilterOperation::Neq, value)
    }

    #[inline]
    pub fn is_timestamp(&self) -> bool {
        self.key == TIMESTAMP_KEY
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.key, self.operation)?;
        match &self.value {
            Value::String(s) => write!(f, "\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\"")),
            v => write!(f, "{}", v),
        }
    }
}

/// Ordered set of filters. Order only matters for display; identity of a
/// member is the whole `(key, operation, value)` tuple, and two sets are
/// equal when they hold the same members in any order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<Filter>", into = "Vec<Filter>")]
pub struct FilterSet(Vec<Filter>);

impl FilterSet {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn contains(&self, filter: &Filter) -> bool {
        self.0.iter().any(|f| f == filter)
    }

    pub fn add(&self, filter: &Filter) -> Self {
        if filter.is_timestamp() || self.contains(filter) {
            return self.clone();
        }

        let mut filters = self.0.clone();
        filters.push(filter.clone());
        Self(filters)
    }

    pub fn remove(&self, filter: &Filter) -> Self {
        if filter.is_timestamp() {
            return self.clone();
        }

        Self(self.0.iter().filter(|f| *f != filter).cloned().collect())
    }

    /// Click-to-filter primitive: drops the filter when present, appends it
    /// otherwise.
    pub fn toggle(&self, filter: &Filter) -> Self {
        if filter.is_timestamp() {
            return self.clone();
        }

        if self.contains(filter) {
            self.remove(filter)
        } else {
            let mut filters = self.0.clone();
            filters.push(filter.clone());
            Self(filters)
        }
    }

    pub fn only(&self, filter: &Filter) -> Self {
        if filter.is_timestamp() {
            return self.clone();
        }

        Self(vec![filter.clone()])
    }

    /// Members in a stable order independent of insertion, for rendering
    /// that must not change when a filter is toggled off and back on.
    pub fn canonical(&self) -> Vec<&Filter> {
        let mut filters: Vec<&Filter> = self.0.iter().collect();
        filters.sort_by_cached_key(|f| (f.key.clone(), f.operation.as_str(), f.value.to_string()));
        filters
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Filter> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl PartialEq for FilterSet {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().all(|f| other.contains(f))
    }
}

impl From<Vec<Filter>> for FilterSet {
    fn from(filters: Vec<Filter>) -> Self {
        filters
            .into_iter()
            .fold(FilterSet::new(), |set, f| set.add(&f))
    }
}

impl From<FilterSet> for Vec<Filter> {
    fn from(set: FilterSet) -> Self {
        set.0
    }
}

impl<'a> IntoIterator for &'a FilterSet {
    type Item = &'a Filter;
    type IntoIter = std::slice::Iter<'a, Filter>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for FilterSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, filter) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", filter)?;
        }
        f.write_str("}")
    }
}
