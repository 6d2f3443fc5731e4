#[global_allocator]
static GLOBAL: jemallocator::Jemalloc = jemallocator::Jemalloc;

use crate::config::Config;
use crate::coordinator::RefreshCoordinator;
use crate::gateway::ClickHouseGateway;
use crate::session::Session;
use crate::state::{user, UserAction, UserState};
use clap::Parser;
use log::{error, info, warn};
use query_engine::{Compiler, TimeWindow};
use std::io::ErrorKind;
use std::process::exit;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;

mod commands;
mod config;
mod coordinator;
mod fields;
mod gateway;
mod session;
mod state;
mod vars;

#[derive(Parser, Debug)]
#[command(version, about = "Carboncat log explorer", long_about = None)]
struct CliArgs {
    #[arg(
        short,
        long,
        help = "Config file location",
        default_value = config::DEFAULT_CONFIG_PATH
    )]
    config_file: String,

    #[arg(long, help = "Application log level", default_value_t = log::LevelFilter::Info)]
    log_level: log::LevelFilter,

    #[arg(short, long, help = "Datasource to query")]
    datasource: Option<String>,

    #[arg(long, help = "Share link or query string to restore")]
    link: Option<String>,

    #[arg(short, long, help = "Case-insensitive search over log bodies")]
    search: Option<String>,

    #[arg(short, long, help = r#"Filter selector, e.g. {level="ERROR", labels.app!="api"}"#)]
    filter: Option<String>,

    #[arg(long, help = "Start of the time range, e.g. now-1h")]
    from: Option<String>,

    #[arg(long, help = "End of the time range")]
    to: Option<String>,

    #[arg(short, long, help = "Refresh interval, e.g. 30s")]
    refresh: Option<String>,

    #[arg(long, help = "SQL filter expression; switches to SQL mode")]
    sql: Option<String>,

    #[arg(long, help = "Do not read commands from stdin")]
    no_console: bool,
}

#[tokio::main]
async fn main() {
    let cli_args = CliArgs::parse();
    env_logger::builder()
        .filter_level(cli_args.log_level)
        .init();

    let config = match config::load(&cli_args.config_file) {
        Ok(c) => c,
        Err(config::Error::IO(e))
            if e.kind() == ErrorKind::NotFound
                && cli_args.config_file == config::DEFAULT_CONFIG_PATH =>
        {
            warn!(
                "No configuration at {}, using defaults",
                config::DEFAULT_CONFIG_PATH
            );
            Config::default()
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            exit(1);
        }
    };

    let user = match initial_state(&config, &cli_args) {
        Ok(u) => u,
        Err(e) => {
            error!("Invalid startup arguments: {}", e);
            exit(1);
        }
    };

    let gateway = match ClickHouseGateway::new(&config.datasources) {
        Ok(g) => g,
        Err(e) => {
            error!("Failed to create datasource gateway: {}", e);
            exit(1);
        }
    };

    let compiler = Compiler::new(config.query.table.as_str()).with_row_limit(config.query.row_limit);
    let coordinator = RefreshCoordinator::new(compiler)
        .with_lookups(config.query.lookups)
        .with_discard_stale(config.query.discard_stale_results);

    let cancellation_token = CancellationToken::new();
    shutdown(cancellation_token.clone());

    info!(
        "Exploring {} on {} from {} to {}",
        config.query.table, user.datasource, user.time_range.from, user.time_range.to
    );
    let (handle, session) = Session::new(user, coordinator, Arc::new(gateway))
        .with_timeout(config.query.timeout())
        .spawn(cancellation_token.clone());

    if !cli_args.no_console {
        tokio::spawn(commands::console(handle.clone(), cancellation_token.clone()));
    }

    if let Err(e) = session.await {
        error!("Session failed: {}", e);
        exit(1);
    }

    // A pending stdin read keeps the runtime alive.
    exit(0);
}

fn initial_state(config: &Config, args: &CliArgs) -> Result<UserState, String> {
    let mut state = UserState::new(config.default_datasource());
    state.time_range = config.defaults.time_range();
    state.refresh_interval = config.defaults.refresh_interval.clone();

    if let Some(link) = &args.link {
        state = vars::apply_params(&state, link).map_err(|e| e.to_string())?;
    }

    let mut actions = Vec::new();
    if let Some(ds) = &args.datasource {
        actions.push(UserAction::SetDatasource(ds.clone()));
    }
    if let Some(term) = &args.search {
        actions.push(UserAction::SetSearchTerm(term.clone()));
    }
    if let Some(selector) = &args.filter {
        let filters = carbon_ql::parse(selector).map_err(|e| e.to_string())?;
        actions.extend(filters.iter().cloned().map(UserAction::FilterAdd));
    }
    if args.from.is_some() || args.to.is_some() {
        let from = match &args.from {
            Some(f) => f.parse().map_err(|e: query_engine::Error| e.to_string())?,
            None => state.time_range.from.clone(),
        };
        let to = match &args.to {
            Some(t) => t.parse().map_err(|e: query_engine::Error| e.to_string())?,
            None => state.time_range.to.clone(),
        };
        actions.push(UserAction::SetTimeRange(TimeWindow::new(from, to)));
    }
    if let Some(token) = &args.refresh {
        actions.push(UserAction::SetRefreshInterval(token.clone()));
    }
    if let Some(sql) = &args.sql {
        actions.push(UserAction::SetSql(sql.clone()));
        actions.push(UserAction::SqlMode(true));
    }

    Ok(actions
        .into_iter()
        .fold(state, |s, action| user::reduce(&s, action)))
}

fn shutdown(token: CancellationToken) {
    tokio::spawn(async move {
        let mut terminate = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                return;
            }
        };
        tokio::select! {
            _ = signal::ctrl_c() => {},
            _ = terminate.recv() => {},
        }
        info!("Shutting down");
        token.cancel();
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use carbon_ql::Filter;
    use query_engine::{QueryMode, TimePoint};

    fn args(extra: &[&str]) -> CliArgs {
        let mut argv = vec!["carboncat"];
        argv.extend_from_slice(extra);
        CliArgs::parse_from(argv)
    }

    #[test]
    fn test_initial_state_from_config_defaults() {
        let state = initial_state(&Config::default(), &args(&[])).unwrap();

        assert_eq!(state, UserState::new("clickhouse"));
    }

    #[test]
    fn test_cli_overrides_link() {
        let cli = args(&[
            "--link",
            "search=panic&ds=archive&from=now-1h",
            "--search",
            "timeout",
            "--filter",
            r#"{level="ERROR"}"#,
            "--to",
            "now-5m",
            "--sql",
            "level = 'ERROR'",
        ]);
        let state = initial_state(&Config::default(), &cli).unwrap();

        assert_eq!(state.search_term, "timeout");
        assert_eq!(state.datasource, "archive");
        assert_eq!(state.filters.iter().collect::<Vec<_>>(), vec![&Filter::eq("level", "ERROR")]);
        assert_eq!(
            state.time_range,
            TimeWindow::new(
                "now-1h".parse::<TimePoint>().unwrap(),
                "now-5m".parse::<TimePoint>().unwrap()
            )
        );
        assert_eq!(state.mode, QueryMode::Sql);
    }

    #[test]
    fn test_invalid_arguments() {
        assert!(initial_state(&Config::default(), &args(&["--filter", "{level"])).is_err());
        assert!(initial_state(&Config::default(), &args(&["--from", "soon"])).is_err());
        assert!(initial_state(&Config::default(), &args(&["--link", "mode=graph"])).is_err());
    }
}
