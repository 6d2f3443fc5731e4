use query_engine::sql::{DEFAULT_ROW_LIMIT, DEFAULT_TABLE};
use query_engine::{TimePoint, TimeWindow};
use serde::Deserialize;
use std::fs::File;
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/carboncat/config.yaml";
const DEFAULT_DATASOURCE: &str = "clickhouse";
const DEFAULT_CLICKHOUSE_URL: &str = "http://localhost:8123";

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    pub datasources: Vec<DatasourceConfig>,
    pub query: QueryConfig,
    pub defaults: DefaultsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            datasources: vec![DatasourceConfig::default()],
            query: QueryConfig::default(),
            defaults: DefaultsConfig::default(),
        }
    }
}

impl Config {
    /// The first configured datasource is the session default.
    pub fn default_datasource(&self) -> &str {
        self.datasources
            .first()
            .map(|d| d.name.as_str())
            .unwrap_or(DEFAULT_DATASOURCE)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatasourceConfig {
    pub name: String,
    pub url: String,
    pub database: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
}

impl Default for DatasourceConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_DATASOURCE.to_string(),
            url: DEFAULT_CLICKHOUSE_URL.to_string(),
            database: None,
            user: None,
            password: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    pub table: String,
    pub row_limit: usize,
    pub lookups: bool,
    pub query_timeout_seconds: Option<u64>,
    pub discard_stale_results: bool,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            table: DEFAULT_TABLE.to_string(),
            row_limit: DEFAULT_ROW_LIMIT,
            lookups: true,
            query_timeout_seconds: None,
            discard_stale_results: false,
        }
    }
}

impl QueryConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.query_timeout_seconds
            .filter(|s| *s > 0)
            .map(Duration::from_secs)
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DefaultsConfig {
    pub from: TimePoint,
    pub to: TimePoint,
    pub refresh_interval: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        let window = TimeWindow::default();
        Self {
            from: window.from,
            to: window.to,
            refresh_interval: String::new(),
        }
    }
}

impl DefaultsConfig {
    pub fn time_range(&self) -> TimeWindow {
        TimeWindow::new(self.from.clone(), self.to.clone())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read config file: {0}")]
    IO(std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(serde_yml::Error),

    #[error("no datasources configured")]
    NoDatasources,
}

pub fn load(filename: &str) -> Result<Config, Error> {
    let file = File::open(filename).map_err(Error::IO)?;
    from_reader(file)
}

fn from_reader(reader: impl std::io::Read) -> Result<Config, Error> {
    let c: Config = serde_yml::from_reader(reader).map_err(Error::Parse)?;
    if c.datasources.is_empty() {
        return Err(Error::NoDatasources);
    }

    Ok(c)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let c = Config::default();

        assert_eq!(c.default_datasource(), "clickhouse");
        assert_eq!(c.query.table, "otel_logs");
        assert_eq!(c.query.row_limit, 10_000);
        assert_eq!(c.query.timeout(), None);
        assert_eq!(c.defaults.time_range(), TimeWindow::default());
        assert!(c.defaults.refresh_interval.is_empty());
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
datasources:
  - name: prod
    url: http://clickhouse.prod:8123
    user: reader
  - name: staging
    url: http://clickhouse.staging:8123
query:
  row_limit: 20000
  query_timeout_seconds: 30
  discard_stale_results: true
defaults:
  from: now-1h
  to: now
  refresh_interval: 30s
"#;
        let c = from_reader(yaml.as_bytes()).unwrap();

        assert_eq!(c.default_datasource(), "prod");
        assert_eq!(c.datasources[0].user.as_deref(), Some("reader"));
        assert_eq!(c.datasources[1].database, None);
        assert_eq!(c.query.table, "otel_logs");
        assert_eq!(c.query.row_limit, 20_000);
        assert_eq!(c.query.timeout(), Some(Duration::from_secs(30)));
        assert!(c.query.discard_stale_results);
        assert!(c.query.lookups);
        assert_eq!(c.defaults.from, "now-1h".parse::<TimePoint>().unwrap());
        assert_eq!(c.defaults.refresh_interval, "30s");
    }

    #[test]
    fn test_rejects_bad_time_and_empty_datasources() {
        let bad_time = "defaults:\n  from: yesterday\n";
        assert!(matches!(from_reader(bad_time.as_bytes()), Err(Error::Parse(_))));

        let empty = "datasources: []\n";
        assert!(matches!(from_reader(empty.as_bytes()), Err(Error::NoDatasources)));
    }
}
