mod ast;
mod error;
mod parser;

pub use ast::{Filter, FilterOperation, FilterSet, TIMESTAMP_KEY};
pub use error::Error;
pub use parser::parse;
