//! Database module for SQLite persistence.

mod entities;
mod pool;

pub use entities::*;
pub use pool::*;
