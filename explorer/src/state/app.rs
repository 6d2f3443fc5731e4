use query_engine::ColumnSet;

/// Derived state: what was compiled and what came back.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppState {
    pub sql: String,
    pub log_fields: ColumnSet,
    pub level_fields: ColumnSet,
    pub available_apps: Vec<String>,
    pub available_components: Vec<String>,
    pub available_teams: Vec<String>,
    pub loading: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AppAction {
    SetSql(String),
    SetLogFields(ColumnSet),
    SetLevelFields(ColumnSet),
    SetAvailableApps(Vec<String>),
    SetAvailableComponents(Vec<String>),
    SetAvailableTeams(Vec<String>),
    Loading,
    NotLoading,
    SetError(String),
    ClearError,
}

pub fn reduce(state: &AppState, action: AppAction) -> AppState {
    let mut next = state.clone();
    match action {
        AppAction::SetSql(sql) => next.sql = sql,
        AppAction::SetLogFields(fields) => next.log_fields = fields,
        AppAction::SetLevelFields(fields) => next.level_fields = fields,
        AppAction::SetAvailableApps(apps) => next.available_apps = apps,
        AppAction::SetAvailableComponents(components) => next.available_components = components,
        AppAction::SetAvailableTeams(teams) => next.available_teams = teams,
        AppAction::Loading => next.loading = true,
        AppAction::NotLoading => next.loading = false,
        AppAction::SetError(message) => next.error = Some(message),
        AppAction::ClearError => next.error = None,
    }

    next
}
