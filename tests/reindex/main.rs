//! Online schema changes: reindex, resume and restart.

#[path = "../common/mod.rs"]
mod common;

mod restart;
mod resume;
mod schema_change;
