use crate::entities::{prelude::*, settings};
use anyhow::Result;
use sea_orm::sea_query::OnConflict;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};

/// Whether the geocoding provider may be consulted at all.
pub const GEOCODING_ENABLED_KEY: &str = "google_maps_api_enabled";

/// Credential for the geocoding provider.
pub const GEOCODING_API_KEY_KEY: &str = "google_maps_api_key";

pub struct SettingsRepository {
    conn: DatabaseConnection,
}

impl SettingsRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        let row = Settings::find()
            .filter(settings::Column::Key.eq(key))
            .one(&self.conn)
            .await?;

        Ok(row.map(|s| s.value))
    }

    pub async fn set(&self, key: &str, value: &str) -> Result<()> {
        let active_model = settings::ActiveModel {
            key: Set(key.to_string()),
            value: Set(value.to_string()),
            updated_at: Set(chrono::Utc::now().to_rfc3339()),
        };

        Settings::insert(active_model)
            .on_conflict(
                OnConflict::column(settings::Column::Key)
                    .update_columns([settings::Column::Value, settings::Column::UpdatedAt])
                    .to_owned(),
            )
            .exec(&self.conn)
            .await?;

        Ok(())
    }
}
