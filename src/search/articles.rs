//! Search over the local article archive.

use super::{SearchItem, SearchProvider};
use crate::error::Result;
use crate::feed::ArticleStore;
use async_trait::async_trait;
use std::sync::Arc;

pub struct ArticleSearch {
    store: Arc<ArticleStore>,
}

impl ArticleSearch {
    pub fn new(store: Arc<ArticleStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl SearchProvider for ArticleSearch {
    fn name(&self) -> &str {
        "article_search"
    }

    fn description(&self) -> &str {
        "Articles previously collected from RSS feeds. Last resort."
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchItem>> {
        let articles = self.store.search(query, max_results)?;
        Ok(articles
            .into_iter()
            .map(|a| {
                SearchItem::new(&a.url, &a.title, &a.description, "article_search")
                    .with_source_name(a.source.as_deref().unwrap_or_default())
                    .with_published_date(a.published.as_deref().unwrap_or_default())
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::feed::FeedEntry;

    #[tokio::test]
    async fn test_archive_hits_become_items() {
        let store = Arc::new(ArticleStore::new(Arc::new(Database::open_in_memory().unwrap())));
        store
            .insert_entries(
                None,
                &[FeedEntry {
                    title: "Quantum chips".to_string(),
                    link: "https://q.example".to_string(),
                    description: "New qubits".to_string(),
                    published: Some("2024-05-01".to_string()),
                    source: None,
                }],
            )
            .unwrap();

        let items = ArticleSearch::new(store).search("quantum", 5).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].tool_used, "article_search");
        assert_eq!(items[0].source_name, "general");
        assert_eq!(items[0].published_date, "2024-05-01");
    }
}
