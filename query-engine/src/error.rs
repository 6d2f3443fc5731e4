#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("invalid time {0:?}: expected now[+-]<n><unit>, RFC 3339 or epoch milliseconds")]
    ParseTime(String),

    #[error("invalid query mode {0:?}")]
    ParseMode(String),
}
