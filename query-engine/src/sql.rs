use crate::time::ResolvedWindow;
use crate::Error;
use carbon_ql::{Filter, FilterOperation, FilterSet};
use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

pub const LOG_LEVELS: [&str; 5] = ["DEBUG", "INFO", "WARN", "ERROR", "FATAL"];
pub const DEFAULT_TABLE: &str = "otel_logs";
pub const DEFAULT_ROW_LIMIT: usize = 10_000;
pub const LOOKUP_LIMIT: usize = 1000;

const LABEL_PREFIX: &str = "labels.";
const SOURCE_COLUMNS: &str = "Timestamp AS timestamp, Body AS body, SeverityText AS level, \
LogAttributes AS labels, TraceId AS traceID, SpanId AS spanID";
const LOG_COLUMNS: &str = "timestamp, body, level, labels, traceID, spanID";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryMode {
    #[default]
    Builder,
    Sql,
}

impl FromStr for QueryMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "builder" => Ok(QueryMode::Builder),
            "sql" => Ok(QueryMode::Sql),
            other => Err(Error::ParseMode(other.to_string())),
        }
    }
}

impl fmt::Display for QueryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryMode::Builder => f.write_str("builder"),
            QueryMode::Sql => f.write_str("sql"),
        }
    }
}

/// The four multi-select dimensions. An empty list places no restriction on
/// its dimension.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub log_levels: Vec<String>,
    pub apps: Vec<String>,
    pub components: Vec<String>,
    pub teams: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct QueryInput<'a> {
    pub mode: QueryMode,
    pub sql: Option<&'a str>,
    pub search_term: &'a str,
    pub filters: &'a FilterSet,
    pub selection: &'a Selection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lookup {
    Apps,
    Components,
    Teams,
}

impl Lookup {
    pub const ALL: [Lookup; 3] = [Lookup::Apps, Lookup::Components, Lookup::Teams];

    pub fn label(&self) -> &'static str {
        match self {
            Lookup::Apps => "app",
            Lookup::Components => "component",
            Lookup::Teams => "team",
        }
    }

    /// Filter keys that exist in the lookup's column set. Filters on any
    /// other key are left out of the lookup query.
    fn columns(&self) -> &'static [&'static str] {
        match self {
            Lookup::Apps => &["level", "body", "traceID", "spanID", "labels.team"],
            Lookup::Components => &[
                "level",
                "body",
                "traceID",
                "spanID",
                "labels.app",
                "labels.team",
            ],
            Lookup::Teams => &["level", "body", "traceID", "spanID", "labels.app"],
        }
    }

    fn accepts(&self, filter: &Filter) -> bool {
        self.columns().contains(&filter.key.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Buckets {
    pub width_secs: i64,
    pub count: i64,
}

/// Histogram slot width grows in steps with the window length. `count` is
/// the number of slots the window spans, `ceil(duration / width)`.
pub fn histogram_buckets(duration: TimeDelta) -> Buckets {
    let secs = duration.num_seconds().max(0);
    let width_secs = match secs {
        s if s < 10 => 1,
        s if s < 60 => 5,
        s if s < 120 => 50,
        _ => 100,
    };

    Buckets {
        width_secs,
        count: (secs + width_secs - 1) / width_secs,
    }
}

/// Levels the histogram and level filter work with: the known levels,
/// restricted to the selection when one is made.
pub fn severity_levels(selected: &[String]) -> Vec<&'static str> {
    if selected.is_empty() {
        return LOG_LEVELS.to_vec();
    }

    LOG_LEVELS
        .into_iter()
        .filter(|level| selected.iter().any(|s| s == level))
        .collect()
}

#[derive(Debug, Clone)]
pub struct Compiler {
    table: String,
    row_limit: usize,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new(DEFAULT_TABLE)
    }
}

impl Compiler {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            row_limit: DEFAULT_ROW_LIMIT,
        }
    }

    #[inline]
    pub fn with_row_limit(mut self, row_limit: usize) -> Self {
        self.row_limit = row_limit;

        self
    }

    /// The filter expression shared by the log-row and histogram queries. In
    /// SQL mode this is the user's text, untouched.
    pub fn expression(&self, input: &QueryInput) -> String {
        if input.mode == QueryMode::Sql {
            return input.sql.unwrap_or_default().to_string();
        }

        let mut conditions = vec![search_condition(input.search_term)];
        if !input.selection.log_levels.is_empty() {
            conditions.push(in_condition(
                "level",
                &severity_levels(&input.selection.log_levels),
            ));
        }
        conditions.extend(label_conditions(input.selection));
        conditions.extend(input.filters.canonical().into_iter().map(predicate));

        conditions.join("\n  AND ")
    }

    pub fn log_rows(&self, expression: &str, window: &ResolvedWindow) -> String {
        format!(
            "SELECT {}\nFROM {}\nWHERE {}\n  AND ({})\nORDER BY timestamp DESC\nLIMIT {}",
            LOG_COLUMNS,
            self.source(),
            time_condition(window),
            expression,
            self.row_limit
        )
    }

    /// Per-severity counts per slot. Empty slots are filled from the slot
    /// holding `from` up to, not including, `to`. Bounds are inclusive, so
    /// when `to` sits on a slot boundary a row stamped exactly `to` opens
    /// one extra edge slot after the filled range.
    pub fn histogram(
        &self,
        expression: &str,
        selected_levels: &[String],
        window: &ResolvedWindow,
    ) -> String {
        let buckets = histogram_buckets(window.duration());
        let bucket = |t: String| {
            format!(
                "toStartOfInterval({}, INTERVAL {} SECOND)",
                t, buckets.width_secs
            )
        };

        let mut columns = vec![format!("{} AS bucket", bucket("toDateTime(timestamp)".into()))];
        columns.extend(
            severity_levels(selected_levels)
                .into_iter()
                .map(|level| format!("countIf(level = '{}') AS \"{}\"", level, level)),
        );

        format!(
            "SELECT\n  {}\nFROM {}\nWHERE {}\n  AND ({})\nGROUP BY bucket\nORDER BY bucket ASC WITH FILL FROM {} TO toDateTime({}) STEP {}",
            columns.join(",\n  "),
            self.source(),
            time_condition(window),
            expression,
            bucket(format!("toDateTime({})", window.from_secs())),
            window.to_secs(),
            buckets.width_secs
        )
    }

    pub fn lookup(&self, lookup: Lookup, input: &QueryInput, window: &ResolvedWindow) -> String {
        let label = lookup.label();
        let column = label_column(label);

        let mut conditions = vec![time_condition(window), format!("{} != ''", column)];
        if input.mode == QueryMode::Builder {
            conditions.push(search_condition(input.search_term));
            conditions.extend(
                input
                    .filters
                    .canonical()
                    .into_iter()
                    .filter(|f| lookup.accepts(f))
                    .map(predicate),
            );
        }
        if lookup == Lookup::Components && !input.selection.apps.is_empty() {
            conditions.push(in_condition(&label_column("app"), &input.selection.apps));
        }

        format!(
            "SELECT DISTINCT {} AS {}\nFROM {}\nWHERE {}\nORDER BY {} ASC\nLIMIT {}",
            column,
            label,
            self.source(),
            conditions.join("\n  AND "),
            label,
            LOOKUP_LIMIT
        )
    }

    fn source(&self) -> String {
        format!("(SELECT {} FROM \"{}\")", SOURCE_COLUMNS, self.table)
    }
}

fn time_condition(window: &ResolvedWindow) -> String {
    format!(
        "timestamp >= toDateTime({}) AND timestamp <= toDateTime({})",
        window.from_secs(),
        window.to_secs()
    )
}

// The term is embedded as-is; `%`, `_` and quotes keep their SQL meaning.
fn search_condition(term: &str) -> String {
    format!("body ILIKE '%{}%'", term)
}

fn label_conditions(selection: &Selection) -> Vec<String> {
    [
        ("app", &selection.apps),
        ("component", &selection.components),
        ("team", &selection.teams),
    ]
    .into_iter()
    .filter(|(_, values)| !values.is_empty())
    .map(|(label, values)| in_condition(&label_column(label), values))
    .collect()
}

fn in_condition<S: AsRef<str>>(column: &str, values: &[S]) -> String {
    if values.is_empty() {
        return "0".to_string();
    }

    let values: Vec<String> = values
        .iter()
        .map(|v| format!("'{}'", v.as_ref()))
        .collect();
    format!("{} IN ({})", column, values.join(","))
}

fn label_column(label: &str) -> String {
    format!("labels['{}']", label)
}

fn column(key: &str) -> String {
    match key.strip_prefix(LABEL_PREFIX) {
        Some(label) => label_column(label),
        None => key.to_string(),
    }
}

fn predicate(filter: &Filter) -> String {
    let column = column(&filter.key);
    match (&filter.value, filter.operation) {
        (Value::Null, FilterOperation::Eq) => format!("{} IS NULL", column),
        (Value::Null, FilterOperation::Neq) => format!("{} IS NOT NULL", column),
        (value, op) => format!("{} {} {}", column, op, literal(value)),
    }
}

fn literal(value: &Value) -> String {
    match value {
        Value::String(s) => format!("'{}'", s),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => format!("'{}'", other),
    }
}
