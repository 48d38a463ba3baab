use std::time::Duration;

use crate::cache::{CachePolicy, QueryCache, QueryState};
use crate::catalog::CatalogClient;
use crate::models::{ApiResponse, Event, SearchParams};

const EVENTS_POLICY: CachePolicy = CachePolicy::new(
    Duration::from_secs(5 * 60),
    Duration::from_secs(10 * 60),
);
const DETAILS_POLICY: CachePolicy = CachePolicy::new(
    Duration::from_secs(10 * 60),
    Duration::from_secs(30 * 60),
);
const CATEGORIES_POLICY: CachePolicy = CachePolicy::new(
    Duration::from_secs(60 * 60),
    Duration::from_secs(24 * 60 * 60),
);

/// Read side of the data layer: every catalog request goes through a
/// per-kind cache so equal fingerprints share one fetch and one entry.
pub struct EventQueries {
    catalog: CatalogClient,
    events: QueryCache<SearchParams, ApiResponse<Event>>,
    details: QueryCache<String, Event>,
    categories: QueryCache<(), Vec<String>>,
}

impl EventQueries {
    pub fn new(catalog: CatalogClient) -> Self {
        Self {
            catalog,
            events: QueryCache::new(EVENTS_POLICY),
            details: QueryCache::new(DETAILS_POLICY),
            categories: QueryCache::new(CATEGORIES_POLICY),
        }
    }

    /// Keyword/city search. Disabled (idle, no fetch) until the params
    /// carry at least a keyword or a city.
    pub async fn search(&self, params: &SearchParams) -> QueryState<ApiResponse<Event>> {
        self.search_inner(params, false).await
    }

    /// Re-issues the search regardless of freshness. Used by the retry
    /// affordance after a network or HTTP error.
    pub async fn refresh_search(&self, params: &SearchParams) -> QueryState<ApiResponse<Event>> {
        self.search_inner(params, true).await
    }

    async fn search_inner(
        &self,
        params: &SearchParams,
        refresh: bool,
    ) -> QueryState<ApiResponse<Event>> {
        if !params.has_search_input() {
            return QueryState::idle();
        }
        let catalog = self.catalog.clone();
        let fetch_params = params.clone();
        self.events
            .fetch(params.clone(), refresh, move || {
                let catalog = catalog.clone();
                let params = fetch_params.clone();
                async move { catalog.search_events(&params).await }
            })
            .await
    }

    pub async fn details(&self, id: &str) -> QueryState<Event> {
        self.details_inner(id, false).await
    }

    pub async fn refresh_details(&self, id: &str) -> QueryState<Event> {
        self.details_inner(id, true).await
    }

    async fn details_inner(&self, id: &str, refresh: bool) -> QueryState<Event> {
        let id = id.trim();
        if id.is_empty() {
            return QueryState::idle();
        }
        let catalog = self.catalog.clone();
        let fetch_id = id.to_string();
        self.details
            .fetch(id.to_string(), refresh, move || {
                let catalog = catalog.clone();
                let id = fetch_id.clone();
                async move { catalog.event_details(&id).await }
            })
            .await
    }

    /// Classification taxonomy. The catalog client already degrades to a
    /// fallback list, so this query never carries an error.
    pub async fn categories(&self) -> QueryState<Vec<String>> {
        let catalog = self.catalog.clone();
        self.categories
            .fetch((), false, move || {
                let catalog = catalog.clone();
                async move { Ok(catalog.categories().await) }
            })
            .await
    }

    /// Materializes a favorites list from stored ids. There is no batch
    /// endpoint; each id resolves through the details cache independently.
    pub async fn events_by_ids(&self, ids: &[String]) -> Vec<QueryState<Event>> {
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            out.push(self.details(id).await);
        }
        out
    }
}
