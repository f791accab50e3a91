//! Query passed through to shard executors
//!
//! The merge core never interprets a query; it only forwards it. Matching
//! and scoring belong to the shard executor.

use serde::{Deserialize, Serialize};

/// A shard-level query
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Query {
    /// Every document, score 1.0
    #[default]
    MatchAll,
    /// Documents whose `field` contains any of `terms`
    AnyTerm {
        /// Field searched
        field: String,
        /// Terms OR-ed together
        terms: Vec<String>,
    },
}

impl Query {
    /// Documents whose `field` contains any of `terms`
    pub fn any_term<I, S>(field: impl Into<String>, terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Query::AnyTerm {
            field: field.into(),
            terms: terms.into_iter().map(Into::into).collect(),
        }
    }
}
