//! Collecting wanted items and resolving them into download targets.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::{PagingMode, SearchSource};
use crate::library::{
    Author, DownloadTarget, LibraryError, LibraryService, QualityProfile, WantedItem, WantedPage,
    WantedSource,
};
use crate::retry::{with_retry, RetryPolicy};
use crate::state::{next_page, PageStore};

use super::WorkflowError;

/// A wanted item that could not be turned into a download target.
#[derive(Debug)]
pub struct TargetFailure {
    pub item: WantedItem,
    pub author_name: String,
    pub reason: String,
}

/// Pages wanted items out of the library service.
pub struct WantedCollector {
    library: Arc<dyn LibraryService>,
    source: SearchSource,
    paging: PagingMode,
    page_size: u32,
    page_store: PageStore,
    retry: RetryPolicy,
}

impl WantedCollector {
    pub fn new(
        library: Arc<dyn LibraryService>,
        source: SearchSource,
        paging: PagingMode,
        page_size: u32,
        page_store: PageStore,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            library,
            source,
            paging,
            page_size: page_size.max(1),
            page_store,
            retry,
        }
    }

    fn sources(&self) -> &'static [WantedSource] {
        match self.source {
            SearchSource::Missing => &[WantedSource::Missing],
            SearchSource::CutoffUnmet => &[WantedSource::CutoffUnmet],
            SearchSource::All => &[WantedSource::Missing, WantedSource::CutoffUnmet],
        }
    }

    /// Wanted items from every configured source, in source order.
    pub async fn collect(&self) -> Result<Vec<WantedItem>, WorkflowError> {
        let mut items = Vec::new();
        for &source in self.sources() {
            let found = match self.paging {
                PagingMode::FirstPage => self.fetch(source, 1).await?.records,
                PagingMode::All => self.collect_all(source).await?,
                PagingMode::IncrementingPage => self.collect_incrementing(source).await?,
            };
            info!(source = source.as_str(), count = found.len(), "Collected wanted items");
            items.extend(found);
        }
        Ok(items)
    }

    async fn fetch(&self, source: WantedSource, page: u32) -> Result<WantedPage, WorkflowError> {
        let library = &self.library;
        let page_size = self.page_size;
        with_retry(
            &self.retry,
            "fetch wanted items",
            LibraryError::is_connectivity,
            move || library.wanted(source, page, page_size),
        )
        .await
        .map_err(|e| {
            if e.is_connectivity() {
                WorkflowError::LibraryUnavailable(e)
            } else {
                WorkflowError::Wanted(e)
            }
        })
    }

    async fn collect_all(&self, source: WantedSource) -> Result<Vec<WantedItem>, WorkflowError> {
        let mut items = Vec::new();
        let mut page = 1;
        loop {
            let batch = self.fetch(source, page).await?;
            let total = batch.total_records as usize;
            if batch.records.is_empty() {
                break;
            }
            items.extend(batch.records);
            if items.len() >= total {
                break;
            }
            page += 1;
        }
        Ok(items)
    }

    async fn collect_incrementing(
        &self,
        source: WantedSource,
    ) -> Result<Vec<WantedItem>, WorkflowError> {
        let state_err = |source: std::io::Error| WorkflowError::State {
            path: self.page_store.path().to_path_buf(),
            source,
        };

        let page = self.page_store.load().await.map_err(state_err)?;
        let batch = self.fetch(source, page).await?;
        let next = next_page(page, batch.total_records, self.page_size);
        debug!(page, next, total = batch.total_records, "Advancing wanted page");
        self.page_store.save(next).await.map_err(state_err)?;
        Ok(batch.records)
    }

    /// Resolve author and quality profile for each item.
    ///
    /// Lookups are cached per run. Items whose lookups fail for reasons other
    /// than connectivity are returned as failures; connectivity failures that
    /// outlast the retry policy abort.
    pub async fn build_targets(
        &self,
        items: &[WantedItem],
    ) -> Result<(Vec<DownloadTarget>, Vec<TargetFailure>), WorkflowError> {
        let mut authors: HashMap<i64, Author> = HashMap::new();
        let mut profiles: HashMap<i64, QualityProfile> = HashMap::new();
        let mut targets = Vec::new();
        let mut failures = Vec::new();

        for item in items {
            let author = match authors.get(&item.author_id) {
                Some(author) => author.clone(),
                None => match self.author(item.author_id).await {
                    Ok(author) => {
                        authors.insert(author.id, author.clone());
                        author
                    }
                    Err(e) if e.is_connectivity() => return Err(WorkflowError::LibraryUnavailable(e)),
                    Err(e) => {
                        warn!(title = %item.title, error = %e, "Author lookup failed");
                        failures.push(TargetFailure {
                            item: item.clone(),
                            author_name: format!("author {}", item.author_id),
                            reason: e.to_string(),
                        });
                        continue;
                    }
                },
            };

            let profile = match profiles.get(&author.quality_profile_id) {
                Some(profile) => profile.clone(),
                None => match self.profile(author.quality_profile_id).await {
                    Ok(profile) => {
                        profiles.insert(profile.id, profile.clone());
                        profile
                    }
                    Err(e) if e.is_connectivity() => return Err(WorkflowError::LibraryUnavailable(e)),
                    Err(e) => {
                        warn!(title = %item.title, error = %e, "Quality profile lookup failed");
                        failures.push(TargetFailure {
                            item: item.clone(),
                            author_name: author.author_name.clone(),
                            reason: e.to_string(),
                        });
                        continue;
                    }
                },
            };

            targets.push(DownloadTarget {
                item: item.clone(),
                author,
                profile,
            });
        }

        Ok((targets, failures))
    }

    async fn author(&self, author_id: i64) -> Result<Author, LibraryError> {
        let library = &self.library;
        with_retry(&self.retry, "fetch author", LibraryError::is_connectivity, move || {
            library.get_author(author_id)
        })
        .await
    }

    async fn profile(&self, profile_id: i64) -> Result<QualityProfile, LibraryError> {
        let library = &self.library;
        with_retry(
            &self.retry,
            "fetch quality profile",
            LibraryError::is_connectivity,
            move || library.get_quality_profile(profile_id),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fixtures, MockLibrary};
    use std::time::Duration;
    use tempfile::TempDir;

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    fn items(count: i64) -> Vec<WantedItem> {
        (1..=count)
            .map(|i| fixtures::wanted_item(i, &format!("Book {}", i), 1))
            .collect()
    }

    fn collector(
        library: &Arc<MockLibrary>,
        source: SearchSource,
        paging: PagingMode,
        dir: &TempDir,
    ) -> WantedCollector {
        WantedCollector::new(
            library.clone(),
            source,
            paging,
            10,
            PageStore::new(dir.path().join(".current_page.txt")),
            fast_retry(),
        )
    }

    #[tokio::test]
    async fn test_first_page_only() {
        let dir = TempDir::new().unwrap();
        let library = Arc::new(MockLibrary::new());
        library.set_wanted(WantedSource::Missing, items(25)).await;

        let found = collector(&library, SearchSource::Missing, PagingMode::FirstPage, &dir)
            .collect()
            .await
            .unwrap();
        assert_eq!(found.len(), 10);
        assert_eq!(found[0].id, 1);
    }

    #[tokio::test]
    async fn test_all_pages() {
        let dir = TempDir::new().unwrap();
        let library = Arc::new(MockLibrary::new());
        library.set_wanted(WantedSource::Missing, items(25)).await;

        let found = collector(&library, SearchSource::Missing, PagingMode::All, &dir)
            .collect()
            .await
            .unwrap();
        assert_eq!(found.len(), 25);
        assert_eq!(library.wanted_queries().await.len(), 3);
    }

    #[tokio::test]
    async fn test_incrementing_page_advances_and_wraps() {
        let dir = TempDir::new().unwrap();
        let library = Arc::new(MockLibrary::new());
        library.set_wanted(WantedSource::Missing, items(25)).await;
        let c = collector(&library, SearchSource::Missing, PagingMode::IncrementingPage, &dir);

        let first: Vec<i64> = c.collect().await.unwrap().iter().map(|i| i.id).collect();
        assert_eq!(first[0], 1);
        let second = c.collect().await.unwrap();
        assert_eq!(second[0].id, 11);
        let third = c.collect().await.unwrap();
        assert_eq!(third.len(), 5);
        let fourth = c.collect().await.unwrap();
        assert_eq!(fourth[0].id, 1);
    }

    #[tokio::test]
    async fn test_all_sources_concatenate() {
        let dir = TempDir::new().unwrap();
        let library = Arc::new(MockLibrary::new());
        library.set_wanted(WantedSource::Missing, items(2)).await;
        library
            .set_wanted(WantedSource::CutoffUnmet, vec![fixtures::wanted_item(99, "Old", 1)])
            .await;

        let found = collector(&library, SearchSource::All, PagingMode::FirstPage, &dir)
            .collect()
            .await
            .unwrap();
        assert_eq!(found.iter().map(|i| i.id).collect::<Vec<_>>(), vec![1, 2, 99]);
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let dir = TempDir::new().unwrap();
        let library = Arc::new(MockLibrary::new());
        library.set_wanted(WantedSource::Missing, items(1)).await;
        library.fail_next(2).await;

        let found = collector(&library, SearchSource::Missing, PagingMode::FirstPage, &dir)
            .collect()
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_library_is_fatal() {
        let dir = TempDir::new().unwrap();
        let library = Arc::new(MockLibrary::new());
        library.set_unreachable(true).await;

        let err = collector(&library, SearchSource::Missing, PagingMode::FirstPage, &dir)
            .collect()
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::LibraryUnavailable(_)));
    }

    #[tokio::test]
    async fn test_targets_cache_lookups_and_report_missing_authors() {
        let dir = TempDir::new().unwrap();
        let library = Arc::new(MockLibrary::new());
        library.add_author(fixtures::author(1, "Frank Herbert", 1)).await;
        library.add_profile(fixtures::ebook_profile(1)).await;

        let mut wanted = items(3);
        wanted.push(fixtures::wanted_item(4, "Orphan", 42));
        let c = collector(&library, SearchSource::Missing, PagingMode::FirstPage, &dir);

        let (targets, failures) = c.build_targets(&wanted).await.unwrap();
        assert_eq!(targets.len(), 3);
        assert_eq!(targets[0].author.author_name, "Frank Herbert");
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].item.id, 4);
        // One successful and one failed author lookup
        assert_eq!(library.author_calls().await, 2);
    }
}
