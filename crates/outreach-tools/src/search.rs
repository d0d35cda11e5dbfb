//! Offline web search.

use async_trait::async_trait;

use outreach_types::Result;

use crate::{SearchResult, SearchTool};

/// Upper bound on results per query, whatever the caller asks for.
const MAX_OFFLINE_RESULTS: usize = 5;

/// Deterministic search backend: the same query always yields the same
/// results, each with a resolvable-looking domain and a contact address.
#[derive(Debug, Clone, Default)]
pub struct OfflineSearch;

impl OfflineSearch {
    pub fn new() -> Self {
        Self
    }
}

/// Lowercase alphanumeric runs joined by single dashes.
pub(crate) fn slugify(text: &str) -> String {
    text.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(|part| part.to_ascii_lowercase())
        .collect::<Vec<_>>()
        .join("-")
}

#[async_trait]
impl SearchTool for OfflineSearch {
    fn name(&self) -> &str {
        "offline"
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let slug = slugify(query);
        let count = max_results.min(MAX_OFFLINE_RESULTS);
        tracing::debug!(query, count, "Offline search");

        Ok((1..=count)
            .map(|i| {
                let host = format!("example-{slug}-{i}.com");
                SearchResult {
                    title: format!("{query} Business {i}"),
                    url: format!("https://{host}"),
                    snippet: format!(
                        "Local result for {query}. The company provides relevant services \
                         in this industry. Contact us at info@{host}."
                    ),
                }
            })
            .collect())
    }
}
