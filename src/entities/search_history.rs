use sea_orm::entity::prelude::*;

/// One row per distinct location query observed by the suggestion endpoint.
/// Repeat searches bump `search_count` instead of inserting a new row.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "search_history")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    /// Query text as first observed, case preserved.
    pub query: String,

    /// Trimmed + lowercased form; dedup key for repeat searches.
    #[sea_orm(unique)]
    pub query_normalized: String,

    pub city: Option<String>,
    pub state: Option<String>,
    pub region: Option<String>,

    pub latitude: Option<f64>,
    pub longitude: Option<f64>,

    pub search_count: i32,

    /// RFC3339; immutable after creation.
    pub first_searched: String,

    /// RFC3339; refreshed on every repeat occurrence.
    pub last_searched: String,

    /// Whether the geocoding provider returned at least one prediction
    /// when this record was created.
    pub is_successful: bool,

    pub completion_rate: f64,

    pub user_type: String,

    pub category: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
