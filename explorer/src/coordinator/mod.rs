use crate::state::{AppAction, AppStore, UserState};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use query_engine::{ColumnSet, Compiler, Lookup, QueryMode, ResolvedWindow};
use std::fmt;

pub mod timer;

pub use timer::RefreshTimer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    StateChange,
    Manual,
    Timer,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::StateChange => f.write_str("state change"),
            Trigger::Manual => f.write_str("manual refresh"),
            Trigger::Timer => f.write_str("timer"),
        }
    }
}

/// Which ApplicationState field a query's result lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    LogRows,
    Histogram,
    Lookup(Lookup),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub cycle: u64,
    pub target: Target,
    pub datasource: String,
    pub sql: String,
    pub window: ResolvedWindow,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settled {
    pub cycle: u64,
    pub target: Target,
    pub result: Result<ColumnSet, String>,
}

/// Identity of an issuance: compiled SQL, datasource and resolved window.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestSignature(String);

impl RequestSignature {
    pub fn new(sql: &str, datasource: &str, window: &ResolvedWindow) -> Self {
        Self(format!("{}\u{1f}{}\u{1f}{}", datasource, window, sql))
    }
}

/// What a user state transition requires of the session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Reaction {
    pub refresh: bool,
    pub rearm_timer: bool,
}

pub struct RefreshCoordinator {
    compiler: Compiler,
    lookups: bool,
    discard_stale: bool,
    last_issued: Option<RequestSignature>,
    latest_cycle: u64,
    in_flight: usize,
}

impl RefreshCoordinator {
    pub fn new(compiler: Compiler) -> Self {
        Self {
            compiler,
            lookups: true,
            discard_stale: false,
            last_issued: None,
            latest_cycle: 0,
            in_flight: 0,
        }
    }

    #[inline]
    pub fn with_lookups(mut self, lookups: bool) -> Self {
        self.lookups = lookups;

        self
    }

    #[inline]
    pub fn with_discard_stale(mut self, discard_stale: bool) -> Self {
        self.discard_stale = discard_stale;

        self
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn compile(&self, user: &UserState) -> String {
        self.compiler.expression(&user.query_input())
    }

    /// Recompiles `next` into `app` and decides whether the transition
    /// calls for a refresh and whether the timer must be re-armed.
    pub fn on_user_state_changed(
        &self,
        prev: &UserState,
        next: &UserState,
        app: &mut AppStore,
        now: DateTime<Utc>,
    ) -> Reaction {
        let sql = self.compile(next);
        let sql_changed = sql != app.state().sql;
        if sql_changed {
            app.dispatch(AppAction::SetSql(sql));
        }

        let datasource_changed = prev.datasource != next.datasource;
        let window_changed = prev.time_range.resolve(now) != next.time_range.resolve(now);
        let interval_changed = prev.refresh_interval != next.refresh_interval;

        Reaction {
            refresh: sql_changed || datasource_changed || window_changed,
            rearm_timer: interval_changed || window_changed || sql_changed,
        }
    }

    /// Builds the requests of a new cycle, or `None` when there is nothing
    /// to issue: an empty compiled expression, or a signature equal to the
    /// last issued one.
    pub fn plan(
        &mut self,
        trigger: Trigger,
        user: &UserState,
        app: &mut AppStore,
        now: DateTime<Utc>,
    ) -> Option<Vec<Request>> {
        let expression = app.state().sql.clone();
        if expression.trim().is_empty() {
            debug!("Skipping refresh on {}: compiled SQL is empty", trigger);
            return None;
        }

        let window = user.time_range.resolve(now);
        let signature = RequestSignature::new(&expression, &user.datasource, &window);
        if self.last_issued.as_ref() == Some(&signature) {
            debug!("Skipping refresh on {}: identical to last issued", trigger);
            return None;
        }

        self.latest_cycle += 1;
        let cycle = self.latest_cycle;
        let request = |target: Target, sql: String| Request {
            cycle,
            target,
            datasource: user.datasource.clone(),
            sql,
            window,
        };

        let mut requests = vec![
            request(Target::LogRows, self.compiler.log_rows(&expression, &window)),
            request(
                Target::Histogram,
                self.compiler
                    .histogram(&expression, &user.selection.log_levels, &window),
            ),
        ];
        if self.lookups {
            let input = user.query_input();
            requests.extend(Lookup::ALL.into_iter().map(|lookup| {
                request(
                    Target::Lookup(lookup),
                    self.compiler.lookup(lookup, &input, &window),
                )
            }));
        }

        info!(
            "Issuing cycle {} on {} ({} queries, {} over {}{})",
            cycle,
            trigger,
            requests.len(),
            user.datasource,
            window,
            if user.mode == QueryMode::Sql { ", sql mode" } else { "" }
        );
        app.dispatch(AppAction::Loading);
        self.in_flight += requests.len();
        self.last_issued = Some(signature);

        Some(requests)
    }

    /// Merges one completed query. Returns true when it was the last one
    /// outstanding.
    pub fn settle(&mut self, settled: Settled, app: &mut AppStore) -> bool {
        self.in_flight = self.in_flight.saturating_sub(1);

        if self.discard_stale && settled.cycle < self.latest_cycle {
            debug!(
                "Discarding {:?} from cycle {} (latest {})",
                settled.target, settled.cycle, self.latest_cycle
            );
        } else {
            match settled.result {
                Ok(columns) => app.dispatch(merge(settled.target, columns)),
                Err(message) => {
                    warn!("Query for {:?} failed: {}", settled.target, message);
                    app.dispatch(AppAction::SetError(message));
                }
            }
        }

        if self.in_flight == 0 {
            app.dispatch(AppAction::NotLoading);
            return true;
        }

        false
    }
}

fn merge(target: Target, columns: ColumnSet) -> AppAction {
    match target {
        Target::LogRows => AppAction::SetLogFields(columns),
        Target::Histogram => AppAction::SetLevelFields(columns),
        Target::Lookup(lookup) => {
            let values = columns
                .column(lookup.label())
                .map(|c| c.distinct_strings())
                .unwrap_or_default();
            match lookup {
                Lookup::Apps => AppAction::SetAvailableApps(values),
                Lookup::Components => AppAction::SetAvailableComponents(values),
                Lookup::Teams => AppAction::SetAvailableTeams(values),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{user, UserAction};
    use carbon_ql::Filter;
    use chrono::{TimeDelta, TimeZone};
    use query_engine::Column;
    use serde_json::json;

    fn instant() -> DateTime<Utc> {
        Utc.timestamp_opt(1_756_819_928, 0).unwrap()
    }

    fn setup() -> (RefreshCoordinator, UserState, AppStore) {
        let coordinator = RefreshCoordinator::new(Compiler::default());
        let user = UserState::new("clickhouse");
        let mut app = AppStore::new();
        app.dispatch(AppAction::SetSql(coordinator.compile(&user)));
        (coordinator, user, app)
    }

    fn rows(n: usize) -> ColumnSet {
        ColumnSet::new(vec![Column::new("body", vec![json!("line"); n])])
    }

    #[test]
    fn test_plan_issues_all_queries() {
        let (mut coordinator, user, mut app) = setup();
        let requests = coordinator
            .plan(Trigger::StateChange, &user, &mut app, instant())
            .unwrap();

        let targets: Vec<Target> = requests.iter().map(|r| r.target).collect();
        assert_eq!(
            targets,
            vec![
                Target::LogRows,
                Target::Histogram,
                Target::Lookup(Lookup::Apps),
                Target::Lookup(Lookup::Components),
                Target::Lookup(Lookup::Teams),
            ]
        );
        assert!(requests.iter().all(|r| r.cycle == 1 && r.datasource == "clickhouse"));
        assert!(app.state().loading);
        assert_eq!(coordinator.in_flight(), 5);
    }

    #[test]
    fn test_same_signature_is_issued_once() {
        let (mut coordinator, user, mut app) = setup();

        assert!(coordinator.plan(Trigger::StateChange, &user, &mut app, instant()).is_some());
        assert!(coordinator.plan(Trigger::Manual, &user, &mut app, instant()).is_none());
        assert!(coordinator.plan(Trigger::Timer, &user, &mut app, instant()).is_none());

        let later = instant() + TimeDelta::seconds(1);
        assert!(coordinator.plan(Trigger::Timer, &user, &mut app, later).is_some());
    }

    #[test]
    fn test_empty_sql_mode_expression_skips() {
        let (mut coordinator, user, mut app) = setup();
        let user = user::reduce(&user, UserAction::SqlMode(true));
        app.dispatch(AppAction::SetSql(coordinator.compile(&user)));

        assert!(coordinator.plan(Trigger::Manual, &user, &mut app, instant()).is_none());
        assert!(!app.state().loading);
    }

    #[test]
    fn test_loading_clears_after_every_query_settles() {
        let (mut coordinator, user, mut app) = setup();
        let requests = coordinator
            .plan(Trigger::StateChange, &user, &mut app, instant())
            .unwrap();
        let count = requests.len();

        for (i, request) in requests.into_iter().enumerate() {
            let last = coordinator.settle(
                Settled {
                    cycle: request.cycle,
                    target: request.target,
                    result: Ok(ColumnSet::default()),
                },
                &mut app,
            );
            assert_eq!(last, i + 1 == count);
            assert_eq!(app.state().loading, i + 1 < count);
        }
    }

    #[test]
    fn test_partial_failure_keeps_successes() {
        let (mut coordinator, user, mut app) = setup();
        let requests = coordinator
            .plan(Trigger::StateChange, &user, &mut app, instant())
            .unwrap();

        for request in requests {
            let result = match request.target {
                Target::Histogram => Err("histogram failed".to_string()),
                Target::LogRows => Ok(rows(3)),
                Target::Lookup(Lookup::Apps) => Ok(ColumnSet::new(vec![Column::new(
                    "app",
                    vec![json!("api"), json!("web"), json!("api")],
                )])),
                Target::Lookup(_) => Ok(ColumnSet::default()),
            };
            coordinator.settle(
                Settled {
                    cycle: request.cycle,
                    target: request.target,
                    result,
                },
                &mut app,
            );
        }

        let state = app.state();
        assert_eq!(state.log_fields, rows(3));
        assert_eq!(state.error.as_deref(), Some("histogram failed"));
        assert_eq!(state.available_apps, vec!["api", "web"]);
        assert!(!state.loading);
    }

    #[test]
    fn test_stale_results_merge_unless_discarded() {
        for discard in [false, true] {
            let (coordinator, user, mut app) = setup();
            let mut coordinator = coordinator.with_lookups(false).with_discard_stale(discard);

            let first = coordinator
                .plan(Trigger::StateChange, &user, &mut app, instant())
                .unwrap();
            let later = instant() + TimeDelta::seconds(5);
            let second = coordinator
                .plan(Trigger::Manual, &user, &mut app, later)
                .unwrap();

            for request in second.into_iter().chain(first) {
                let result = Ok(rows(request.cycle as usize));
                coordinator.settle(
                    Settled {
                        cycle: request.cycle,
                        target: request.target,
                        result,
                    },
                    &mut app,
                );
            }

            let expected = if discard { rows(2) } else { rows(1) };
            assert_eq!(app.state().log_fields, expected);
            assert!(!app.state().loading);
        }
    }

    #[test]
    fn test_reaction_to_user_changes() {
        let (coordinator, user, mut app) = setup();
        let react = |prev: &UserState, action: UserAction, app: &mut AppStore| {
            let next = user::reduce(prev, action);
            (coordinator.on_user_state_changed(prev, &next, app, instant()), next)
        };

        let (reaction, user) = react(&user, UserAction::SetSearchTerm("oops".into()), &mut app);
        assert_eq!(reaction, Reaction { refresh: true, rearm_timer: true });
        assert!(app.state().sql.contains("'%oops%'"));

        let (reaction, user) = react(&user, UserAction::SetRefreshInterval("30s".into()), &mut app);
        assert_eq!(reaction, Reaction { refresh: false, rearm_timer: true });

        let (reaction, user) = react(&user, UserAction::SetDatasource("archive".into()), &mut app);
        assert_eq!(reaction, Reaction { refresh: true, rearm_timer: false });

        let (reaction, user) = react(&user, UserAction::ToggleLabel("labels.pod".into()), &mut app);
        assert_eq!(reaction, Reaction::default());

        let window = query_engine::TimeWindow::parse("now-1h", "now").unwrap();
        let (reaction, user) = react(&user, UserAction::SetTimeRange(window.clone()), &mut app);
        assert_eq!(reaction, Reaction { refresh: true, rearm_timer: true });

        let (reaction, _) = react(&user, UserAction::SetTimeRange(window), &mut app);
        assert_eq!(reaction, Reaction::default());
    }

    #[test]
    fn test_toggle_off_and_on_restores_sql() {
        let (coordinator, user, mut app) = setup();
        let error = Filter::eq("level", "ERROR");
        let user = user::reduce(&user, UserAction::FilterAdd(error.clone()));
        let user = user::reduce(&user, UserAction::FilterAdd(Filter::neq("labels.app", "web")));
        app.dispatch(AppAction::SetSql(coordinator.compile(&user)));
        let original = app.state().sql.clone();

        let off = user::reduce(&user, UserAction::FilterToggle(error.clone()));
        assert!(coordinator.on_user_state_changed(&user, &off, &mut app, instant()).refresh);

        let on = user::reduce(&off, UserAction::FilterToggle(error));
        assert!(coordinator.on_user_state_changed(&off, &on, &mut app, instant()).refresh);
        assert_eq!(on.filters, user.filters);
        assert_eq!(app.state().sql, original);
    }

    #[test]
    fn test_sql_mode_change_only_refreshes_on_new_expression() {
        let (coordinator, user, mut app) = setup();
        let user = user::reduce(&user, UserAction::SetSql("level = 'ERROR'".into()));
        app.dispatch(AppAction::SetSql(coordinator.compile(&user)));

        let next = user::reduce(&user, UserAction::SqlMode(true));
        let reaction = coordinator.on_user_state_changed(&user, &next, &mut app, instant());
        assert!(reaction.refresh);
        assert_eq!(app.state().sql, "level = 'ERROR'");

        let prev = next.clone();
        let next = user::reduce(&prev, UserAction::FilterAdd(Filter::eq("level", "WARN")));
        let reaction = coordinator.on_user_state_changed(&prev, &next, &mut app, instant());
        assert!(!reaction.refresh);
    }
}
