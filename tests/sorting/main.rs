//! Sorting across shards and indices through the embedded service.

#[path = "../common/mod.rs"]
mod common;

mod compound;
mod field_types;
mod multi_index;
mod partial;
mod score;
