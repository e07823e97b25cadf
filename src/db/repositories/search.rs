use crate::entities::{prelude::*, search_history};
use anyhow::Result;
use sea_orm::sea_query::{Expr, OnConflict, SimpleExpr};
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, Order, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};

/// Normalized form used as the dedup key for search records.
#[must_use]
pub fn normalize_query(query: &str) -> String {
    query.trim().to_lowercase()
}

/// Fields captured when a query is recorded for the first time.
#[derive(Debug, Clone)]
pub struct NewSearchRecord {
    pub query: String,
    pub city: Option<String>,
    pub state: Option<String>,
    pub region: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub is_successful: bool,
    pub user_type: String,
    pub category: String,
}

pub struct SearchRepository {
    conn: DatabaseConnection,
}

impl SearchRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Case-insensitive substring probe against previously seen queries,
    /// most-searched first. This is the fuzzy cache the suggestion endpoint
    /// consults before going to the provider.
    pub async fn find_matching(
        &self,
        fragment: &str,
        limit: u64,
    ) -> Result<Vec<search_history::Model>> {
        let rows = SearchHistory::find()
            .filter(search_history::Column::QueryNormalized.contains(normalize_query(fragment)))
            .order_by_desc(search_history::Column::SearchCount)
            .order_by_asc(search_history::Column::Query)
            .limit(limit)
            .all(&self.conn)
            .await?;

        Ok(rows)
    }

    pub async fn find_exact(&self, query: &str) -> Result<Option<search_history::Model>> {
        let row = SearchHistory::find()
            .filter(search_history::Column::QueryNormalized.eq(normalize_query(query)))
            .one(&self.conn)
            .await?;

        Ok(row)
    }

    /// Records one observation of a query as a single conditional upsert.
    ///
    /// First occurrence inserts the row with `search_count = 1`; a repeat
    /// occurrence increments the counter and refreshes `last_searched` without
    /// touching `first_searched` or `is_successful`. The unique index on
    /// `query_normalized` makes this safe under concurrent first-time
    /// searches for the same query.
    pub async fn record(&self, record: NewSearchRecord) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        let completion_rate = if record.is_successful { 100.0 } else { 0.0 };

        let active_model = search_history::ActiveModel {
            query: Set(record.query.trim().to_string()),
            query_normalized: Set(normalize_query(&record.query)),
            city: Set(record.city),
            state: Set(record.state),
            region: Set(record.region),
            latitude: Set(record.latitude),
            longitude: Set(record.longitude),
            search_count: Set(1),
            first_searched: Set(now.clone()),
            last_searched: Set(now.clone()),
            is_successful: Set(record.is_successful),
            completion_rate: Set(completion_rate),
            user_type: Set(record.user_type),
            category: Set(record.category),
            ..Default::default()
        };

        let on_conflict = OnConflict::column(search_history::Column::QueryNormalized)
            .value(
                search_history::Column::SearchCount,
                Expr::col(search_history::Column::SearchCount).add(1),
            )
            .value(search_history::Column::LastSearched, Expr::val(now))
            .to_owned();

        SearchHistory::insert(active_model)
            .on_conflict(on_conflict)
            .exec(&self.conn)
            .await?;

        Ok(())
    }

    /// Increments the counter of an existing record, if any.
    /// Returns whether a record was touched.
    pub async fn bump(&self, query: &str) -> Result<bool> {
        let now = chrono::Utc::now().to_rfc3339();

        let result = SearchHistory::update_many()
            .col_expr(
                search_history::Column::SearchCount,
                Expr::col(search_history::Column::SearchCount).add(1),
            )
            .col_expr(search_history::Column::LastSearched, Expr::value(now))
            .filter(search_history::Column::QueryNormalized.eq(normalize_query(query)))
            .exec(&self.conn)
            .await?;

        Ok(result.rows_affected > 0)
    }

    /// Paged history read; `page` is 1-indexed.
    pub async fn history(
        &self,
        sort: search_history::Column,
        descending: bool,
        page: u64,
        page_size: u64,
    ) -> Result<(Vec<search_history::Model>, u64, u64)> {
        let order = if descending { Order::Desc } else { Order::Asc };

        let paginator = SearchHistory::find()
            .order_by(sort, order)
            .paginate(&self.conn, page_size);

        let totals = paginator.num_items_and_pages().await?;
        let items = paginator.fetch_page(page.saturating_sub(1)).await?;

        Ok((items, totals.number_of_items, totals.number_of_pages))
    }

    /// Top queries by accumulated search count, ties broken by query text.
    /// One row per query is guaranteed by the unique index, so the stored
    /// counter is the occurrence count.
    pub async fn popular(&self, limit: u64) -> Result<Vec<(String, i32)>> {
        let rows = SearchHistory::find()
            .select_only()
            .column(search_history::Column::Query)
            .column(search_history::Column::SearchCount)
            .order_by_desc(search_history::Column::SearchCount)
            .order_by_asc(search_history::Column::Query)
            .limit(limit)
            .into_tuple::<(String, i32)>()
            .all(&self.conn)
            .await?;

        Ok(rows)
    }

    /// Per-outcome aggregates over records touched since `since` (RFC3339):
    /// (is_successful, row count, sum of completion rates).
    pub async fn accuracy_buckets(&self, since: &str) -> Result<Vec<(bool, i64, Option<f64>)>> {
        let rows = SearchHistory::find()
            .select_only()
            .column(search_history::Column::IsSuccessful)
            .column_as(search_history::Column::Id.count(), "count")
            .column_as(
                search_history::Column::CompletionRate.sum(),
                "completion_sum",
            )
            .filter(search_history::Column::LastSearched.gte(since))
            .group_by(search_history::Column::IsSuccessful)
            .into_tuple::<(bool, i64, Option<f64>)>()
            .all(&self.conn)
            .await?;

        Ok(rows)
    }

    /// Daily record counts since `since` (RFC3339), oldest day first.
    pub async fn trends(&self, since: &str) -> Result<Vec<(String, i64)>> {
        let day: SimpleExpr = Expr::cust("date(last_searched)").into();

        let rows = SearchHistory::find()
            .select_only()
            .column_as(day.clone(), "date")
            .column_as(search_history::Column::Id.count(), "searches")
            .filter(search_history::Column::LastSearched.gte(since))
            .group_by(day.clone())
            .order_by(day, Order::Asc)
            .into_tuple::<(String, i64)>()
            .all(&self.conn)
            .await?;

        Ok(rows)
    }

    pub async fn count(&self) -> Result<u64> {
        Ok(SearchHistory::find().count(&self.conn).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Store;

    fn record(query: &str, successful: bool) -> NewSearchRecord {
        NewSearchRecord {
            query: query.to_string(),
            city: None,
            state: None,
            region: None,
            latitude: None,
            longitude: None,
            is_successful: successful,
            user_type: "guest".to_string(),
            category: "LOCATION_SEARCH".to_string(),
        }
    }

    #[tokio::test]
    async fn test_record_upsert_increments_instead_of_duplicating() {
        let store = Store::new("sqlite::memory:").await.unwrap();
        let repo = SearchRepository::new(store.conn.clone());

        repo.record(record("Springfield, IL", true)).await.unwrap();
        let first = repo.find_exact("springfield, il").await.unwrap().unwrap();
        assert_eq!(first.search_count, 1);

        repo.record(record("Springfield, IL", true)).await.unwrap();
        let second = repo.find_exact("Springfield, IL").await.unwrap().unwrap();
        assert_eq!(second.search_count, 2);
        assert_eq!(second.first_searched, first.first_searched);
        assert!(second.last_searched >= first.last_searched);

        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_find_matching_is_case_insensitive_substring() {
        let store = Store::new("sqlite::memory:").await.unwrap();
        let repo = SearchRepository::new(store.conn.clone());

        repo.record(record("Springfield", true)).await.unwrap();
        repo.record(record("Springfield East", true)).await.unwrap();
        repo.record(record("Shelbyville", true)).await.unwrap();

        let matches = repo.find_matching("SPR", 5).await.unwrap();
        assert_eq!(matches.len(), 2);
        assert!(matches.iter().all(|m| m.query.starts_with("Springfield")));
    }

    #[tokio::test]
    async fn test_popular_orders_by_count_then_query() {
        let store = Store::new("sqlite::memory:").await.unwrap();
        let repo = SearchRepository::new(store.conn.clone());

        repo.record(record("Beta", true)).await.unwrap();
        repo.record(record("Alpha", true)).await.unwrap();
        repo.record(record("Gamma", true)).await.unwrap();
        repo.record(record("Gamma", true)).await.unwrap();

        let popular = repo.popular(10).await.unwrap();
        assert_eq!(popular[0], ("Gamma".to_string(), 2));
        // Tie between Alpha and Beta resolved alphabetically.
        assert_eq!(popular[1].0, "Alpha");
        assert_eq!(popular[2].0, "Beta");
    }

    #[tokio::test]
    async fn test_bump_missing_record_touches_nothing() {
        let store = Store::new("sqlite::memory:").await.unwrap();
        let repo = SearchRepository::new(store.conn.clone());

        assert!(!repo.bump("never seen").await.unwrap());
        assert_eq!(repo.count().await.unwrap(), 0);
    }
}
