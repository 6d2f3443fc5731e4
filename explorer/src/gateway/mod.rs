use async_trait::async_trait;
use query_engine::{ColumnSet, ResolvedWindow};

pub mod clickhouse;

pub use clickhouse::ClickHouseGateway;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Http(reqwest::Error),

    #[error("{body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("Failed to decode query result: {0}")]
    Decode(serde_json::Error),

    #[error("Invalid datasource url: {0}")]
    Url(url::ParseError),

    #[error("Unknown datasource: {0}")]
    UnknownDatasource(String),

    #[error("Query returned no result frames")]
    NoFrames,

    #[error("query timed out after {0}s")]
    Timeout(u64),
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Decode(e)
    }
}

impl From<url::ParseError> for Error {
    fn from(e: url::ParseError) -> Self {
        Self::Url(e)
    }
}

/// Executes SQL against a named datasource. The window is passed alongside
/// the SQL for datasources that scope by time outside the query text.
#[async_trait]
pub trait DatasourceGateway: Send + Sync + 'static {
    async fn execute(
        &self,
        datasource: &str,
        sql: &str,
        window: &ResolvedWindow,
    ) -> Result<ColumnSet, Error>;
}

#[async_trait]
pub trait AsyncTryFrom<T>: Sized {
    type Error;

    async fn try_from(value: T) -> Result<Self, Self::Error>;
}
