mod error;
pub mod columns;
pub mod interval;
pub mod sql;
pub mod time;

pub use columns::{Column, ColumnSet};
pub use error::Error;
pub use sql::{Compiler, Lookup, QueryInput, QueryMode, Selection};
pub use time::{ResolvedWindow, TimePoint, TimeWindow};
