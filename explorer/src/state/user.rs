use carbon_ql::{Filter, FilterSet};
use query_engine::sql::LOG_LEVELS;
use query_engine::{QueryInput, QueryMode, Selection, TimeWindow};

pub const BASE_FIELDS: [&str; 5] = ["level", "timestamp", "traceID", "spanID", "body"];
pub const DEFAULT_LABELS: [&str; 3] = ["labels.app", "labels.component", "labels.team"];

/// Everything the user has asked for. Only changed through [`UserAction`].
#[derive(Debug, Clone, PartialEq)]
pub struct UserState {
    pub search_term: String,
    pub filters: FilterSet,
    pub time_range: TimeWindow,
    pub datasource: String,
    pub selection: Selection,
    pub refresh_interval: String,
    pub selected_fields: Vec<String>,
    pub selected_labels: Vec<String>,
    pub mode: QueryMode,
    pub sql: Option<String>,
    pub sql_editor_open: bool,
    pub log_details: Option<usize>,
}

impl UserState {
    pub fn new(datasource: impl Into<String>) -> Self {
        Self {
            search_term: String::new(),
            filters: FilterSet::new(),
            time_range: TimeWindow::default(),
            datasource: datasource.into(),
            selection: Selection {
                log_levels: LOG_LEVELS.iter().map(|l| l.to_string()).collect(),
                ..Selection::default()
            },
            refresh_interval: String::new(),
            selected_fields: BASE_FIELDS.iter().map(|f| f.to_string()).collect(),
            selected_labels: DEFAULT_LABELS.iter().map(|l| l.to_string()).collect(),
            mode: QueryMode::Builder,
            sql: None,
            sql_editor_open: false,
            log_details: None,
        }
    }

    pub fn query_input(&self) -> QueryInput<'_> {
        QueryInput {
            mode: self.mode,
            sql: self.sql.as_deref(),
            search_term: &self.search_term,
            filters: &self.filters,
            selection: &self.selection,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum UserAction {
    SetSearchTerm(String),
    SetSql(String),
    ClearSql,
    SqlMode(bool),
    OpenSqlEditor,
    CloseSqlEditor,
    FilterRm(Filter),
    FilterAdd(Filter),
    FilterToggle(Filter),
    FilterOnly(Filter),
    SetTimeRange(TimeWindow),
    SetDatasource(String),
    SetLogLevels(Vec<String>),
    SetApps(Vec<String>),
    SetComponents(Vec<String>),
    SetTeams(Vec<String>),
    SetRefreshInterval(String),
    SetLogDetails(usize),
    CloseLogDetails,
    ToggleLabel(String),
    ToggleField(String),
}

fn toggle_member(values: &mut Vec<String>, value: String) {
    match values.iter().position(|v| *v == value) {
        Some(i) => {
            values.remove(i);
        }
        None => values.push(value),
    }
}

pub fn reduce(state: &UserState, action: UserAction) -> UserState {
    let mut next = state.clone();
    match action {
        UserAction::SetSearchTerm(term) => next.search_term = term,
        UserAction::SetSql(sql) => next.sql = Some(sql),
        UserAction::ClearSql => next.sql = None,
        UserAction::SqlMode(on) => {
            next.mode = if on {
                QueryMode::Sql
            } else {
                QueryMode::Builder
            }
        }
        UserAction::OpenSqlEditor => next.sql_editor_open = true,
        UserAction::CloseSqlEditor => next.sql_editor_open = false,
        UserAction::FilterRm(f) => next.filters = state.filters.remove(&f),
        UserAction::FilterAdd(f) => next.filters = state.filters.add(&f),
        UserAction::FilterToggle(f) => next.filters = state.filters.toggle(&f),
        UserAction::FilterOnly(f) => next.filters = state.filters.only(&f),
        UserAction::SetTimeRange(window) => next.time_range = window,
        UserAction::SetDatasource(ds) => next.datasource = ds,
        UserAction::SetLogLevels(levels) => next.selection.log_levels = levels,
        UserAction::SetApps(apps) => next.selection.apps = apps,
        UserAction::SetComponents(components) => next.selection.components = components,
        UserAction::SetTeams(teams) => next.selection.teams = teams,
        UserAction::SetRefreshInterval(token) => next.refresh_interval = token,
        UserAction::SetLogDetails(row) => next.log_details = Some(row),
        UserAction::CloseLogDetails => next.log_details = None,
        UserAction::ToggleLabel(label) => toggle_member(&mut next.selected_labels, label),
        UserAction::ToggleField(field) => toggle_member(&mut next.selected_fields, field),
    }

    next
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(actions: Vec<UserAction>) -> UserState {
        actions
            .into_iter()
            .fold(UserState::new("clickhouse"), |s, a| reduce(&s, a))
    }

    #[test]
    fn test_defaults() {
        let state = UserState::new("clickhouse");

        assert_eq!(state.selection.log_levels.len(), 5);
        assert!(state.selection.apps.is_empty());
        assert_eq!(state.time_range, TimeWindow::default());
        assert_eq!(state.selected_fields[0], "level");
        assert_eq!(state.mode, QueryMode::Builder);
        assert_eq!(state.sql, None);
    }

    #[test]
    fn test_double_add_keeps_one_predicate() {
        let error = Filter::eq("level", "ERROR");
        let state = apply(vec![
            UserAction::FilterAdd(error.clone()),
            UserAction::FilterAdd(error.clone()),
        ]);

        assert_eq!(state.filters, FilterSet::from(vec![error]));
    }

    #[test]
    fn test_filter_actions() {
        let api = Filter::eq("labels.app", "api");
        let warn = Filter::neq("level", "WARN");
        let state = apply(vec![
            UserAction::FilterAdd(api.clone()),
            UserAction::FilterToggle(warn.clone()),
            UserAction::FilterToggle(api.clone()),
        ]);
        assert_eq!(state.filters, FilterSet::from(vec![warn.clone()]));

        let state = reduce(&state, UserAction::FilterOnly(api.clone()));
        assert_eq!(state.filters, FilterSet::from(vec![api.clone()]));

        let state = reduce(&state, UserAction::FilterRm(api));
        assert!(state.filters.is_empty());
    }

    #[test]
    fn test_sql_actions() {
        let state = apply(vec![
            UserAction::SqlMode(true),
            UserAction::OpenSqlEditor,
            UserAction::SetSql("level = 'ERROR'".into()),
        ]);
        assert_eq!(state.mode, QueryMode::Sql);
        assert!(state.sql_editor_open);
        assert_eq!(state.query_input().sql, Some("level = 'ERROR'"));

        let state = apply(vec![UserAction::SetSql("x".into()), UserAction::ClearSql]);
        assert_eq!(state.sql, None);
    }

    #[test]
    fn test_toggle_label_and_field() {
        let state = apply(vec![
            UserAction::ToggleLabel("labels.app".into()),
            UserAction::ToggleLabel("labels.pod".into()),
            UserAction::ToggleField("traceID".into()),
        ]);

        assert_eq!(state.selected_labels, vec!["labels.component", "labels.team", "labels.pod"]);
        assert_eq!(state.selected_fields, vec!["level", "timestamp", "spanID", "body"]);
    }

    #[test]
    fn test_reduce_leaves_input_untouched() {
        let before = UserState::new("clickhouse");
        let after = reduce(&before, UserAction::SetDatasource("archive".into()));

        assert_eq!(before.datasource, "clickhouse");
        assert_eq!(after.datasource, "archive");
    }
}
