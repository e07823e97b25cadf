//! Location search cache-and-ingest.
//!
//! The suggestion path prefers previously seen queries over a live provider
//! call: a case-insensitive substring probe of the search history serves as a
//! fuzzy cache, and only a miss reaches the geocoding provider. Every
//! observation is folded into per-query analytics records as a best-effort
//! side effect that never changes an already computed response.

use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::clients::geocode::{GeocodeProvider, Prediction};
use crate::config::GeocodingConfig;
use crate::db::repositories::settings::{GEOCODING_API_KEY_KEY, GEOCODING_ENABLED_KEY};
use crate::db::{NewSearchRecord, Store, normalize_query};
use crate::entities::search_history;
use serde::Serialize;

pub const USER_TYPE_GUEST: &str = "guest";
pub const CATEGORY_LOCATION_SEARCH: &str = "LOCATION_SEARCH";

/// Hard ceiling for the history page size; this is a reporting endpoint.
const MAX_PAGE_SIZE: u64 = 200;

#[derive(Debug, Error)]
pub enum LocationsError {
    /// The provider is enabled but no credential is configured anywhere.
    /// Surfaced to the operator instead of degrading, unlike provider
    /// failures.
    #[error("geocoding provider is enabled but no API key is configured")]
    MissingCredential,

    #[error(transparent)]
    Database(#[from] anyhow::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Suggestion {
    pub label: String,
    pub value: String,
    #[serde(skip)]
    pub place_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccuracyReport {
    pub success_rate: f64,
    pub total_searches: i64,
    pub failed_searches: i64,
    pub average_completion_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PopularQuery {
    pub search_query: String,
    pub search_count: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrendPoint {
    pub date: String,
    pub searches: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub current_page: u64,
    pub page_size: u64,
    pub total_items: u64,
    pub total_pages: u64,
}

/// Deferred analytics write, executed detached from the request that
/// produced it.
#[derive(Debug, Clone)]
enum IngestPlan {
    /// A cache hit matched the query exactly; count the repeat occurrence.
    BumpExisting { query: String },

    /// The provider produced predictions; fold each one into the history.
    RecordPredictions {
        api_key: String,
        predictions: Vec<Prediction>,
    },

    /// The provider confirmed it knows nothing for this query.
    RecordFailure { query: String },
}

#[derive(Clone)]
pub struct LocationSearchService {
    store: Store,
    provider: Arc<dyn GeocodeProvider>,
    config: GeocodingConfig,
}

impl LocationSearchService {
    #[must_use]
    pub fn new(store: Store, provider: Arc<dyn GeocodeProvider>, config: GeocodingConfig) -> Self {
        Self {
            store,
            provider,
            config,
        }
    }

    /// Returns ranked suggestions for a free-text query and schedules the
    /// analytics write as a detached task. Only a missing credential is
    /// surfaced as an error; provider and cache failures degrade to an empty
    /// list.
    pub async fn suggest(&self, query: &str) -> Result<Vec<Suggestion>, LocationsError> {
        let (suggestions, plan) = self.resolve(query).await?;

        if let Some(plan) = plan {
            let service = self.clone();
            tokio::spawn(async move {
                if let Err(e) = service.ingest(plan).await {
                    warn!("Search analytics write failed: {e:#}");
                }
            });
        }

        Ok(suggestions)
    }

    /// Computes the suggestion response plus the analytics write it implies,
    /// without performing the write.
    async fn resolve(
        &self,
        query: &str,
    ) -> Result<(Vec<Suggestion>, Option<IngestPlan>), LocationsError> {
        let trimmed = query.trim();
        if trimmed.is_empty() {
            return Ok((Vec::new(), None));
        }

        let limit = self.config.max_suggestions as u64;

        // A failing cache read is treated as a miss, not an error.
        let cached = match self.store.find_matching_searches(trimmed, limit).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!("Search cache probe failed: {e:#}");
                Vec::new()
            }
        };

        if !cached.is_empty() {
            let normalized = normalize_query(trimmed);
            let plan = cached
                .iter()
                .any(|r| r.query_normalized == normalized)
                .then(|| IngestPlan::BumpExisting {
                    query: trimmed.to_string(),
                });

            let suggestions = cached
                .into_iter()
                .map(|r| Suggestion {
                    label: r.query.clone(),
                    value: r.query,
                    place_id: None,
                })
                .collect();

            return Ok((suggestions, plan));
        }

        if !self.provider_enabled().await {
            debug!("Geocoding provider disabled, returning no suggestions for {trimmed:?}");
            return Ok((Vec::new(), None));
        }

        let api_key = self
            .api_key()
            .await
            .ok_or(LocationsError::MissingCredential)?;

        let predictions = match self
            .provider
            .autocomplete(
                &api_key,
                trimmed,
                &self.config.country,
                self.config.max_suggestions,
            )
            .await
        {
            Ok(predictions) => predictions,
            Err(e) => {
                warn!("Geocoding lookup for {trimmed:?} failed: {e}");
                return Ok((Vec::new(), None));
            }
        };

        if predictions.is_empty() {
            return Ok((
                Vec::new(),
                Some(IngestPlan::RecordFailure {
                    query: trimmed.to_string(),
                }),
            ));
        }

        let suggestions = predictions
            .iter()
            .map(|p| Suggestion {
                label: p.description.clone(),
                value: p.description.clone(),
                place_id: Some(p.place_id.clone()),
            })
            .collect();

        Ok((
            suggestions,
            Some(IngestPlan::RecordPredictions {
                api_key,
                predictions,
            }),
        ))
    }

    /// Executes a deferred analytics write. Per-prediction failures are
    /// logged and skipped so one bad row cannot lose the rest.
    async fn ingest(&self, plan: IngestPlan) -> anyhow::Result<()> {
        match plan {
            IngestPlan::BumpExisting { query } => {
                self.store.bump_search(&query).await?;
            }
            IngestPlan::RecordFailure { query } => {
                self.store
                    .record_search(self.build_record(&query, None, false))
                    .await?;
            }
            IngestPlan::RecordPredictions {
                api_key,
                predictions,
            } => {
                for prediction in predictions {
                    let coordinates = match self
                        .provider
                        .place_details(&api_key, &prediction.place_id)
                        .await
                    {
                        Ok(coordinates) => coordinates,
                        Err(e) => {
                            warn!(
                                "Place details for {:?} failed: {e}",
                                prediction.description
                            );
                            None
                        }
                    };

                    let record = self.build_record(&prediction.description, coordinates, true);
                    if let Err(e) = self.store.record_search(record).await {
                        warn!(
                            "Failed to record search {:?}: {e:#}",
                            prediction.description
                        );
                    }
                }
            }
        }

        Ok(())
    }

    fn build_record(
        &self,
        query: &str,
        coordinates: Option<(f64, f64)>,
        successful: bool,
    ) -> NewSearchRecord {
        let (city, state, region) = split_segments(query);

        NewSearchRecord {
            query: query.to_string(),
            city,
            state,
            region,
            latitude: coordinates.map(|c| c.0),
            longitude: coordinates.map(|c| c.1),
            is_successful: successful,
            user_type: USER_TYPE_GUEST.to_string(),
            category: CATEGORY_LOCATION_SEARCH.to_string(),
        }
    }

    async fn provider_enabled(&self) -> bool {
        match self.store.get_setting(GEOCODING_ENABLED_KEY).await {
            Ok(value) => value.as_deref() == Some("true"),
            Err(e) => {
                warn!("Failed to read geocoding toggle, treating as disabled: {e:#}");
                false
            }
        }
    }

    /// Credential from the settings store, falling back to config.
    async fn api_key(&self) -> Option<String> {
        let stored = match self.store.get_setting(GEOCODING_API_KEY_KEY).await {
            Ok(value) => value.filter(|v| !v.is_empty()),
            Err(e) => {
                warn!("Failed to read geocoding API key setting: {e:#}");
                None
            }
        };

        stored.or_else(|| {
            let fallback = self.config.api_key.clone();
            (!fallback.is_empty()).then_some(fallback)
        })
    }

    /// Paged history read. `page` is 1-indexed; `page_size` is capped.
    pub async fn history(
        &self,
        sort: &str,
        descending: bool,
        page: u64,
        page_size: u64,
    ) -> Result<(Vec<search_history::Model>, PageInfo), LocationsError> {
        let page = page.max(1);
        let page_size = page_size.clamp(1, MAX_PAGE_SIZE);

        let (items, total_items, total_pages) = self
            .store
            .search_history(parse_sort_key(sort), descending, page, page_size)
            .await?;

        Ok((
            items,
            PageInfo {
                current_page: page,
                page_size,
                total_items,
                total_pages,
            },
        ))
    }

    pub async fn popular(&self, limit: u64) -> Result<Vec<PopularQuery>, LocationsError> {
        let rows = self.store.popular_searches(limit).await?;

        Ok(rows
            .into_iter()
            .map(|(search_query, search_count)| PopularQuery {
                search_query,
                search_count,
            })
            .collect())
    }

    /// Daily search volume for the trailing week, month or year.
    pub async fn trends(&self, range: &str) -> Result<Vec<TrendPoint>, LocationsError> {
        let now = chrono::Utc::now();
        let since = match range {
            "month" => now - chrono::Duration::days(30),
            "year" => now - chrono::Duration::days(365),
            _ => now - chrono::Duration::days(7),
        };

        let rows = self.store.search_trends(&since.to_rfc3339()).await?;

        Ok(rows
            .into_iter()
            .map(|(date, searches)| TrendPoint { date, searches })
            .collect())
    }

    /// Success-rate report over the trailing window. An empty window yields
    /// the zero-valued report rather than a division error.
    pub async fn accuracy(&self, window_days: i64) -> Result<AccuracyReport, LocationsError> {
        let since = (chrono::Utc::now() - chrono::Duration::days(window_days)).to_rfc3339();

        let buckets = self.store.search_accuracy_buckets(&since).await?;

        let total: i64 = buckets.iter().map(|(_, count, _)| count).sum();
        if total == 0 {
            return Ok(AccuracyReport::default());
        }

        let successful = buckets
            .iter()
            .find(|(is_successful, _, _)| *is_successful)
            .map_or(0, |(_, count, _)| *count);

        let completion_sum: f64 = buckets
            .iter()
            .filter_map(|(_, _, sum)| *sum)
            .sum();

        #[allow(clippy::cast_precision_loss)]
        let success_rate = (successful as f64 / total as f64) * 100.0;

        #[allow(clippy::cast_precision_loss)]
        let average_completion_rate = completion_sum / total as f64;

        Ok(AccuracyReport {
            success_rate: (success_rate * 100.0).round() / 100.0,
            total_searches: total,
            failed_searches: total - successful,
            average_completion_rate,
        })
    }
}

fn parse_sort_key(sort: &str) -> search_history::Column {
    match sort {
        "search_query" | "query" => search_history::Column::Query,
        "search_count" => search_history::Column::SearchCount,
        "first_searched" => search_history::Column::FirstSearched,
        "user_type" => search_history::Column::UserType,
        "is_successful" => search_history::Column::IsSuccessful,
        _ => search_history::Column::LastSearched,
    }
}

/// First two comma-separated segments become city and state; the remainder
/// is kept as the region.
fn split_segments(query: &str) -> (Option<String>, Option<String>, Option<String>) {
    let mut parts = query.split(',').map(str::trim).filter(|p| !p.is_empty());

    let city = parts.next().map(ToString::to_string);
    let state = parts.next().map(ToString::to_string);

    let rest: Vec<&str> = parts.collect();
    let region = if rest.is_empty() {
        None
    } else {
        Some(rest.join(", "))
    };

    (city, state, region)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::geocode::GeocodeError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeProvider {
        predictions: Vec<Prediction>,
        fail: bool,
        autocomplete_calls: AtomicUsize,
        details_calls: AtomicUsize,
    }

    impl FakeProvider {
        fn returning(labels: &[&str]) -> Self {
            Self {
                predictions: labels
                    .iter()
                    .enumerate()
                    .map(|(i, label)| Prediction {
                        description: (*label).to_string(),
                        place_id: format!("place-{i}"),
                    })
                    .collect(),
                fail: false,
                autocomplete_calls: AtomicUsize::new(0),
                details_calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                predictions: Vec::new(),
                fail: true,
                autocomplete_calls: AtomicUsize::new(0),
                details_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl GeocodeProvider for FakeProvider {
        async fn autocomplete(
            &self,
            _api_key: &str,
            _query: &str,
            _country: &str,
            limit: usize,
        ) -> Result<Vec<Prediction>, GeocodeError> {
            self.autocomplete_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(GeocodeError::Api("REQUEST_DENIED".to_string()));
            }
            Ok(self.predictions.iter().take(limit).cloned().collect())
        }

        async fn place_details(
            &self,
            _api_key: &str,
            _place_id: &str,
        ) -> Result<Option<(f64, f64)>, GeocodeError> {
            self.details_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(GeocodeError::Api("REQUEST_DENIED".to_string()));
            }
            Ok(Some((12.97, 77.59)))
        }
    }

    async fn service_with(provider: FakeProvider) -> (LocationSearchService, Arc<FakeProvider>) {
        let store = Store::new("sqlite::memory:").await.unwrap();
        let provider = Arc::new(provider);
        let service = LocationSearchService::new(
            store,
            provider.clone(),
            GeocodingConfig::default(),
        );
        (service, provider)
    }

    async fn enable_provider(service: &LocationSearchService) {
        service
            .store
            .set_setting(GEOCODING_ENABLED_KEY, "true")
            .await
            .unwrap();
        service
            .store
            .set_setting(GEOCODING_API_KEY_KEY, "test-key")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_blank_query_short_circuits() {
        let (service, provider) = service_with(FakeProvider::returning(&["Springfield"])).await;
        enable_provider(&service).await;

        assert!(service.suggest("").await.unwrap().is_empty());
        assert!(service.suggest("   ").await.unwrap().is_empty());

        assert_eq!(provider.autocomplete_calls.load(Ordering::SeqCst), 0);
        assert_eq!(service.store.count_searches().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_cache_hit_skips_provider() {
        let (service, provider) = service_with(FakeProvider::returning(&["unused"])).await;
        enable_provider(&service).await;

        service
            .store
            .record_search(service.build_record("Springfield", None, true))
            .await
            .unwrap();
        service
            .store
            .record_search(service.build_record("Springfield East", None, true))
            .await
            .unwrap();

        let suggestions = service.suggest("spr").await.unwrap();

        assert_eq!(suggestions.len(), 2);
        assert_eq!(provider.autocomplete_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_repeat_query_increments_without_duplicating() {
        let (service, _provider) =
            service_with(FakeProvider::returning(&["Springfield, IL"])).await;
        enable_provider(&service).await;

        // First occurrence: cache miss, provider path.
        let (suggestions, plan) = service.resolve("Springfield, IL").await.unwrap();
        assert_eq!(suggestions.len(), 1);
        service.ingest(plan.unwrap()).await.unwrap();

        let first = service
            .store
            .find_search("Springfield, IL")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.search_count, 1);
        assert!(first.is_successful);
        assert_eq!(first.city.as_deref(), Some("Springfield"));
        assert_eq!(first.state.as_deref(), Some("IL"));
        assert_eq!(first.latitude, Some(12.97));

        // Second occurrence: served from cache, counted as a repeat.
        let (suggestions, plan) = service.resolve("Springfield, IL").await.unwrap();
        assert_eq!(suggestions.len(), 1);
        assert!(matches!(plan, Some(IngestPlan::BumpExisting { .. })));
        service.ingest(plan.unwrap()).await.unwrap();

        let second = service
            .store
            .find_search("springfield, il")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.search_count, 2);
        assert!(second.last_searched >= first.last_searched);
        assert_eq!(service.store.count_searches().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_fuzzy_hit_does_not_bump_counts() {
        let (service, _provider) = service_with(FakeProvider::returning(&[])).await;

        service
            .store
            .record_search(service.build_record("Springfield", None, true))
            .await
            .unwrap();

        let (suggestions, plan) = service.resolve("spring").await.unwrap();
        assert_eq!(suggestions.len(), 1);
        assert!(plan.is_none());
    }

    #[tokio::test]
    async fn test_provider_failure_degrades_to_empty() {
        let (service, provider) = service_with(FakeProvider::failing()).await;
        enable_provider(&service).await;

        let suggestions = service.suggest("Springfield").await.unwrap();

        assert!(suggestions.is_empty());
        assert_eq!(provider.autocomplete_calls.load(Ordering::SeqCst), 1);
        assert_eq!(service.store.count_searches().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_disabled_provider_returns_empty_without_call() {
        let (service, provider) = service_with(FakeProvider::returning(&["x"])).await;

        let suggestions = service.suggest("Springfield").await.unwrap();

        assert!(suggestions.is_empty());
        assert_eq!(provider.autocomplete_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_enabled_without_credential_is_a_config_error() {
        let (service, _provider) = service_with(FakeProvider::returning(&["x"])).await;
        service
            .store
            .set_setting(GEOCODING_ENABLED_KEY, "true")
            .await
            .unwrap();

        let result = service.suggest("Springfield").await;
        assert!(matches!(result, Err(LocationsError::MissingCredential)));
    }

    #[tokio::test]
    async fn test_zero_predictions_record_a_failed_search() {
        let (service, _provider) = service_with(FakeProvider::returning(&[])).await;
        enable_provider(&service).await;

        let (suggestions, plan) = service.resolve("Nowhere Special").await.unwrap();
        assert!(suggestions.is_empty());
        service.ingest(plan.unwrap()).await.unwrap();

        let record = service
            .store
            .find_search("Nowhere Special")
            .await
            .unwrap()
            .unwrap();
        assert!(!record.is_successful);
        assert_eq!(record.search_count, 1);
    }

    #[tokio::test]
    async fn test_accuracy_on_empty_window_is_all_zeroes() {
        let (service, _provider) = service_with(FakeProvider::returning(&[])).await;

        let report = service.accuracy(7).await.unwrap();

        assert_eq!(report.total_searches, 0);
        assert_eq!(report.failed_searches, 0);
        assert!((report.success_rate - 0.0).abs() < f64::EPSILON);
        assert!((report.average_completion_rate - 0.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_accuracy_mixes_outcomes() {
        let (service, _provider) = service_with(FakeProvider::returning(&[])).await;

        service
            .store
            .record_search(service.build_record("Found One", None, true))
            .await
            .unwrap();
        service
            .store
            .record_search(service.build_record("Found Two", None, true))
            .await
            .unwrap();
        service
            .store
            .record_search(service.build_record("Lost One", None, false))
            .await
            .unwrap();

        let report = service.accuracy(7).await.unwrap();

        assert_eq!(report.total_searches, 3);
        assert_eq!(report.failed_searches, 1);
        assert!((report.success_rate - 66.67).abs() < 0.001);
        assert!((report.average_completion_rate - 200.0 / 3.0).abs() < 0.001);
    }

    #[tokio::test]
    async fn test_history_pagination_window() {
        let (service, _provider) = service_with(FakeProvider::returning(&[])).await;

        for i in 0..25 {
            service
                .store
                .record_search(service.build_record(&format!("Town {i:02}"), None, true))
                .await
                .unwrap();
        }

        let (items, page_info) = service.history("search_query", false, 2, 10).await.unwrap();

        assert_eq!(items.len(), 10);
        assert_eq!(items[0].query, "Town 10");
        assert_eq!(items[9].query, "Town 19");
        assert_eq!(page_info.total_items, 25);
        assert_eq!(page_info.total_pages, 3);
        assert_eq!(page_info.current_page, 2);
    }

    #[tokio::test]
    async fn test_history_caps_page_size() {
        let (service, _provider) = service_with(FakeProvider::returning(&[])).await;

        let (_, page_info) = service.history("last_searched", true, 1, 10_000).await.unwrap();

        assert_eq!(page_info.page_size, MAX_PAGE_SIZE);
    }

    #[tokio::test]
    async fn test_popular_limits_and_orders() {
        let (service, _provider) = service_with(FakeProvider::returning(&[])).await;

        for i in 0..15 {
            let query = format!("Town {i:02}");
            service
                .store
                .record_search(service.build_record(&query, None, true))
                .await
                .unwrap();
            // Give earlier towns higher counts.
            for _ in 0..(15 - i) {
                service.store.bump_search(&query).await.unwrap();
            }
        }

        let popular = service.popular(10).await.unwrap();

        assert_eq!(popular.len(), 10);
        assert_eq!(popular[0].search_query, "Town 00");
        assert!(
            popular
                .windows(2)
                .all(|w| w[0].search_count >= w[1].search_count)
        );
    }

    #[test]
    fn test_split_segments() {
        assert_eq!(
            split_segments("Springfield, IL, Midwest Region"),
            (
                Some("Springfield".to_string()),
                Some("IL".to_string()),
                Some("Midwest Region".to_string())
            )
        );
        assert_eq!(
            split_segments("Springfield"),
            (Some("Springfield".to_string()), None, None)
        );
        assert_eq!(split_segments(" , "), (None, None, None));
    }
}
