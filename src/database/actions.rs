//! Queries, one submodule per entity. Every function takes the pool (and the
//! viewer, where the result depends on who is asking) explicitly.

mod catalog;
mod follows;
mod recipes;
mod relations;
mod users;

pub use catalog::*;
pub use follows::*;
pub use recipes::*;
pub use relations::*;
pub use users::*;
