//! Prefix listing aggregation.
//!
//! Drives a paginated listing source to exhaustion and folds every page into
//! one [`ListingResult`]: group prefixes one level below the requested prefix,
//! and the objects sitting directly under it.

use crate::{
    models::listing::{ListingPage, ListingResult, PageRequest},
    services::storage_service::{StorageError, StorageResult, StorageService},
};
use std::{collections::HashSet, future::Future};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ListingError {
    #[error("listing `{namespace}` failed: {source}")]
    ListingFailed {
        namespace: String,
        #[source]
        source: StorageError,
    },
}

impl ListingError {
    fn failed(namespace: &str, source: StorageError) -> Self {
        Self::ListingFailed {
            namespace: namespace.to_string(),
            source,
        }
    }
}

/// Anything that can serve one ListObjectsV2-style page.
pub trait ListingSource: Send + Sync {
    fn list_page(
        &self,
        namespace: &str,
        request: &PageRequest,
    ) -> impl Future<Output = StorageResult<ListingPage>> + Send;
}

impl ListingSource for StorageService {
    async fn list_page(&self, namespace: &str, request: &PageRequest) -> StorageResult<ListingPage> {
        self.list_objects_v2(namespace, request).await
    }
}

/// What to list within a namespace.
#[derive(Clone, Debug, Default)]
pub struct ListingQuery {
    pub prefix: String,
    pub delimiter: Option<String>,
    pub max_keys_per_page: Option<usize>,
}

impl ListingQuery {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            ..Default::default()
        }
    }

    pub fn delimited(prefix: impl Into<String>, delimiter: impl Into<String>) -> Self {
        Self {
            delimiter: Some(delimiter.into()),
            ..Self::new(prefix)
        }
    }

    pub fn max_keys_per_page(mut self, max_keys: usize) -> Self {
        self.max_keys_per_page = Some(max_keys);
        self
    }
}

enum PageState {
    Paging(Option<String>),
    Done,
}

impl PageState {
    fn after(page: &ListingPage) -> StorageResult<Self> {
        match (page.is_truncated, &page.next_continuation_token) {
            (false, _) => Ok(Self::Done),
            (true, Some(token)) => Ok(Self::Paging(Some(token.clone()))),
            (true, None) => Err(StorageError::MissingContinuationToken),
        }
    }
}

/// Request pages one at a time until the source reports no truncation,
/// handing each page to `fold` in arrival order.
async fn paginate<S, F>(
    source: &S,
    namespace: &str,
    query: &ListingQuery,
    mut fold: F,
) -> Result<(), ListingError>
where
    S: ListingSource + ?Sized,
    F: FnMut(ListingPage),
{
    let mut state = PageState::Paging(None);
    let mut pages = 0usize;

    while let PageState::Paging(token) = state {
        let request = PageRequest {
            prefix: query.prefix.clone(),
            delimiter: query.delimiter.clone(),
            max_keys: query.max_keys_per_page,
            continuation_token: token,
        };
        let page = source
            .list_page(namespace, &request)
            .await
            .map_err(|err| ListingError::failed(namespace, err))?;
        pages += 1;

        state = PageState::after(&page).map_err(|err| ListingError::failed(namespace, err))?;
        fold(page);
    }

    debug!(namespace, prefix = %query.prefix, pages, "listing complete");
    Ok(())
}

/// List everything under `query.prefix`, partitioned into groups and entries.
///
/// Groups are deduplicated by exact string. The zero-byte placeholder whose
/// key equals the prefix is never returned as an entry.
pub async fn list<S>(
    source: &S,
    namespace: &str,
    query: &ListingQuery,
) -> Result<ListingResult, ListingError>
where
    S: ListingSource + ?Sized,
{
    let mut result = ListingResult::default();
    let mut seen_groups = HashSet::new();

    paginate(source, namespace, query, |page| {
        result.entries.extend(page.objects);
        for group in page.common_prefixes {
            if seen_groups.insert(group.clone()) {
                result.groups.push(group);
            }
        }
    })
    .await?;

    result.entries.retain(|object| object.key != query.prefix);
    Ok(result)
}

/// Discover the child groups of `prefix` one key per page.
///
/// A group is taken from every page that yields exactly one group prefix;
/// objects are ignored and pages without a group only advance the cursor.
pub async fn discover_groups<S>(
    source: &S,
    namespace: &str,
    prefix: &str,
    delimiter: &str,
) -> Result<Vec<String>, ListingError>
where
    S: ListingSource + ?Sized,
{
    let query = ListingQuery::delimited(prefix, delimiter).max_keys_per_page(1);
    let mut groups = Vec::new();
    let mut seen = HashSet::new();

    paginate(source, namespace, &query, |page| {
        if let [group] = page.common_prefixes.as_slice() {
            if seen.insert(group.clone()) {
                groups.push(group.clone());
            }
        }
    })
    .await?;

    Ok(groups)
}
