#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("unexpected input at position {position}: {fragment:?}")]
    Syntax { position: usize, fragment: String },
}
