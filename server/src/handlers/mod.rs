//! Request handlers for the entity collections.

mod entities;

pub use entities::*;
