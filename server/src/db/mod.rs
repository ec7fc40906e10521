//! Database module for PostgreSQL persistence.
//!
//! Every function takes a `&mut PgConnection` so it can run inside the
//! caller's transaction; none of them begin or commit on their own.

mod clients;
mod entries;
mod pool;
mod spaces;

pub use clients::*;
pub use entries::*;
pub use pool::*;
pub use spaces::*;
