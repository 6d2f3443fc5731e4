use crate::fields::{discover_labels, display_fields};
use crate::session::{Command, SessionHandle};
use crate::state::UserAction;
use crate::vars;
use chrono::Utc;
use log::{error, info, warn};
use query_engine::TimeWindow;
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

const USAGE: &str = "commands: refresh | search <text> | filter add|rm|toggle|only <selector> \
| levels|apps|components|teams <a,b,..> | range <from> <to> | ds <name> | interval <token> \
| sql <expression> | builder | clear-sql | editor open|close | field <name> | label <name> | details <row> | close \
| link [abs] | show | clear-error | quit";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Selector(carbon_ql::Error),

    #[error("{0}")]
    Query(query_engine::Error),

    #[error("invalid row: {0}")]
    Row(std::num::ParseIntError),

    #[error("unknown command {0:?}")]
    Unknown(String),

    #[error("usage: {0}")]
    Usage(&'static str),
}

impl From<carbon_ql::Error> for Error {
    fn from(e: carbon_ql::Error) -> Self {
        Self::Selector(e)
    }
}

impl From<query_engine::Error> for Error {
    fn from(e: query_engine::Error) -> Self {
        Self::Query(e)
    }
}

#[derive(Debug, PartialEq)]
pub enum Input {
    Send(Vec<Command>),
    Link { absolute: bool },
    Show,
    Help,
    Quit,
    Empty,
}

fn list(arg: &str) -> Vec<String> {
    arg.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn dispatch(actions: Vec<UserAction>) -> Input {
    Input::Send(actions.into_iter().map(Command::Dispatch).collect())
}

pub fn parse_line(line: &str) -> Result<Input, Error> {
    let line = line.trim();
    let (name, arg) = match line.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (line, ""),
    };

    let input = match name {
        "" => Input::Empty,
        "help" => Input::Help,
        "quit" | "exit" => Input::Quit,
        "show" => Input::Show,
        "refresh" => Input::Send(vec![Command::Refresh]),
        "clear-error" => Input::Send(vec![Command::ClearError]),
        "link" => Input::Link {
            absolute: arg == "abs",
        },
        "search" => dispatch(vec![UserAction::SetSearchTerm(arg.to_string())]),
        "filter" => {
            let (op, selector) = arg
                .split_once(char::is_whitespace)
                .ok_or(Error::Usage("filter add|rm|toggle|only <selector>"))?;
            let filters = carbon_ql::parse(selector)?;
            let action = match op {
                "add" => UserAction::FilterAdd,
                "rm" => UserAction::FilterRm,
                "toggle" => UserAction::FilterToggle,
                "only" => UserAction::FilterOnly,
                _ => return Err(Error::Usage("filter add|rm|toggle|only <selector>")),
            };
            dispatch(filters.iter().cloned().map(action).collect())
        }
        "levels" => dispatch(vec![UserAction::SetLogLevels(list(arg))]),
        "apps" => dispatch(vec![UserAction::SetApps(list(arg))]),
        "components" => dispatch(vec![UserAction::SetComponents(list(arg))]),
        "teams" => dispatch(vec![UserAction::SetTeams(list(arg))]),
        "range" => {
            let (from, to) = arg
                .split_once(char::is_whitespace)
                .ok_or(Error::Usage("range <from> <to>"))?;
            dispatch(vec![UserAction::SetTimeRange(TimeWindow::parse(from, to.trim())?)])
        }
        "ds" if !arg.is_empty() => dispatch(vec![UserAction::SetDatasource(arg.to_string())]),
        "interval" => dispatch(vec![UserAction::SetRefreshInterval(arg.to_string())]),
        "sql" => dispatch(vec![
            UserAction::SetSql(arg.to_string()),
            UserAction::SqlMode(true),
        ]),
        "builder" => dispatch(vec![UserAction::SqlMode(false)]),
        "clear-sql" => dispatch(vec![UserAction::ClearSql]),
        "editor" => match arg {
            "open" => dispatch(vec![UserAction::OpenSqlEditor]),
            "close" => dispatch(vec![UserAction::CloseSqlEditor]),
            _ => return Err(Error::Usage("editor open|close")),
        },
        "field" if !arg.is_empty() => dispatch(vec![UserAction::ToggleField(arg.to_string())]),
        "label" if !arg.is_empty() => dispatch(vec![UserAction::ToggleLabel(arg.to_string())]),
        "details" => dispatch(vec![UserAction::SetLogDetails(
            arg.parse().map_err(Error::Row)?,
        )]),
        "close" => dispatch(vec![UserAction::CloseLogDetails]),
        "ds" | "field" | "label" => return Err(Error::Usage("<command> <name>")),
        other => return Err(Error::Unknown(other.to_string())),
    };

    Ok(input)
}

/// Reads commands from stdin until EOF, `quit` or cancellation.
pub async fn console(handle: SessionHandle, cancellation_token: CancellationToken) {
    let mut lines = BufReader::new(io::stdin()).lines();
    info!("Console ready, type `help` for commands");

    loop {
        let line = tokio::select! {
            _ = cancellation_token.cancelled() => break,
            line = lines.next_line() => match line {
                Ok(Some(l)) => l,
                Ok(None) => break,
                Err(e) => {
                    error!("Failed to read stdin: {}", e);
                    break;
                }
            },
        };

        match parse_line(&line) {
            Ok(Input::Send(commands)) => {
                for command in commands {
                    if handle.commands.send(command).await.is_err() {
                        return;
                    }
                }
            }
            Ok(Input::Link { absolute }) => {
                let user = handle.user.borrow().clone();
                match vars::share_link(&user, absolute, Utc::now()) {
                    Ok(link) => println!("?{}", link),
                    Err(e) => error!("Failed to build share link: {}", e),
                }
            }
            Ok(Input::Show) => show(&handle),
            Ok(Input::Help) => println!("{}", USAGE),
            Ok(Input::Quit) => {
                cancellation_token.cancel();
                break;
            }
            Ok(Input::Empty) => {}
            Err(e) => warn!("{}", e),
        }
    }
}

fn show(handle: &SessionHandle) {
    let user = handle.user.borrow().clone();
    let app = handle.app.borrow().clone();

    println!("sql: {}", app.sql);
    if user.sql_editor_open {
        println!("editor: {}", user.sql.as_deref().unwrap_or_default());
    }
    println!("filters: {}", user.filters);
    println!("window: {} .. {}", user.time_range.from, user.time_range.to);
    println!("rows: {}, buckets: {}", app.log_fields.row_count(), app.level_fields.row_count());
    println!(
        "columns: {}",
        display_fields(&user.selected_fields, &user.selected_labels).join(", ")
    );
    println!(
        "labels: {}",
        discover_labels(&app.log_fields, &user.selected_labels).join(", ")
    );
    println!("apps: {}", app.available_apps.join(", "));
    println!("components: {}", app.available_components.join(", "));
    println!("teams: {}", app.available_teams.join(", "));
    if let Some(e) = &app.error {
        println!("error: {}", e);
    }
}
