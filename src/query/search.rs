//! Global search over the API.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};

use super::latest::LatestOnly;
use crate::transport::{ApiClient, ApiError};

/// Default search endpoint, relative to the API base.
pub const DEFAULT_SEARCH_PATH: &str = "/search";

/// Search hits grouped by result kind (`events`, `jobVacancies`, ...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SearchResults {
    groups: BTreeMap<String, Vec<Value>>,
}

impl SearchResults {
    /// Total number of hits across all groups.
    #[must_use]
    pub fn total(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    /// Hits in group `name`; empty when the group is absent.
    #[must_use]
    pub fn group(&self, name: &str) -> &[Value] {
        self.groups.get(name).map_or(&[][..], Vec::as_slice)
    }

    /// Group names in sorted order.
    pub fn group_names(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }
}

/// Result of one [`SearchService::search`] call.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    /// The query was blank; nothing was requested.
    Empty,
    /// Results for this query.
    Found(SearchResults),
    /// A newer search replaced this one; its results were discarded.
    Superseded,
}

/// Runs searches so that only the most recent query's results are returned.
#[derive(Debug, Clone)]
pub struct SearchService {
    client: ApiClient,
    path: String,
    latest: LatestOnly,
}

impl SearchService {
    /// Creates a service using the default search path.
    #[must_use]
    pub fn new(client: ApiClient) -> Self {
        Self {
            client,
            path: DEFAULT_SEARCH_PATH.to_string(),
            latest: LatestOnly::new(),
        }
    }

    /// Overrides the search endpoint path.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Searches for `query`.
    ///
    /// A blank query cancels any outstanding search and returns
    /// [`SearchOutcome::Empty`] without a request.
    ///
    /// # Errors
    ///
    /// Returns the request's [`ApiError`] when this search was not
    /// superseded.
    #[instrument(skip(self))]
    pub async fn search(&self, query: &str) -> Result<SearchOutcome, ApiError> {
        let query = query.trim();
        if query.is_empty() {
            self.latest.cancel();
            return Ok(SearchOutcome::Empty);
        }

        let request = async {
            let response = self
                .client
                .get_with_query(&self.path, &[("q", query)])
                .await?;
            response.data::<SearchResults>()
        };
        match self.latest.run(request).await {
            Ok(results) => {
                let results = results?;
                debug!(total = results.total(), "search complete");
                Ok(SearchOutcome::Found(results))
            }
            Err(_) => {
                debug!("search superseded");
                Ok(SearchOutcome::Superseded)
            }
        }
    }

    /// Returns true while a search is outstanding.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.latest.is_in_progress()
    }

    /// Cancels the outstanding search, if any.
    pub fn cancel(&self) {
        self.latest.cancel();
    }
}
