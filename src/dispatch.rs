//! Hands the index contents to a matching backend and relays the result.

use crate::error::Result;
use crate::matcher::{FzfBackend, MatchBackend, SelectOptions};
use crate::store::IndexStore;

/// Paths the user picked. Empty when the index was empty or the selection
/// was cancelled; neither is an error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    paths: Vec<String>,
}

impl Selection {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn first(&self) -> Option<&str> {
        self.paths.first().map(String::as_str)
    }

    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    pub fn into_paths(self) -> Vec<String> {
        self.paths
    }
}

impl From<Vec<String>> for Selection {
    fn from(paths: Vec<String>) -> Self {
        Self { paths }
    }
}

pub struct QueryDispatcher {
    backend: Box<dyn MatchBackend>,
}

impl Default for QueryDispatcher {
    fn default() -> Self {
        Self::new(FzfBackend::new())
    }
}

impl QueryDispatcher {
    pub fn new(backend: impl MatchBackend + 'static) -> Self {
        Self {
            backend: Box::new(backend),
        }
    }

    pub fn from_boxed(backend: Box<dyn MatchBackend>) -> Self {
        Self { backend }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Interactive search over every indexed path. An empty index returns
    /// at once without starting the backend.
    pub fn query_interactive(&self, store: &IndexStore, opts: &SelectOptions) -> Result<Selection> {
        let candidates = store.all_paths()?;
        if candidates.is_empty() {
            tracing::info!("index is empty, nothing to search");
            return Ok(Selection::empty());
        }
        tracing::debug!(
            backend = self.backend.name(),
            candidates = candidates.len(),
            "dispatching query"
        );
        Ok(self.backend.select(&candidates, opts)?.into())
    }

    /// Non-interactive: every indexed path matching `pattern`, best first.
    pub fn query(&self, store: &IndexStore, pattern: &str) -> Result<Vec<String>> {
        let candidates = store.all_paths()?;
        if candidates.is_empty() {
            tracing::info!("index is empty, nothing to search");
            return Ok(Vec::new());
        }
        self.backend.filter(&candidates, pattern)
    }
}
