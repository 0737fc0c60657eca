//! Superseding queries.
//!
//! A logical query (such as global search) keeps one in-progress slot: a new
//! request cancels the previous one and a late result from a superseded
//! request is discarded instead of overwriting newer state.

mod latest;
mod search;

pub use latest::{LatestOnly, Superseded};
pub use search::{DEFAULT_SEARCH_PATH, SearchOutcome, SearchResults, SearchService};
