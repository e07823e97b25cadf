use crate::entities::prelude::*;
use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::Schema;

#[derive(DeriveMigrationName)]
pub struct Migration;

/// Bootstrap machine credential for the seeded admin account.
/// Rotate it after the first login.
pub const BOOTSTRAP_AUTH_CODE: &str = "RIDEDESK-BOOTSTRAP-CODE";

/// Hash the default admin password using Argon2id
fn hash_default_password() -> String {
    use argon2::{
        Argon2,
        password_hash::{PasswordHasher, SaltString, rand_core::OsRng},
    };

    let password = b"password";
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password, &salt)
        .expect("Failed to hash default password")
        .to_string()
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let backend = manager.get_database_backend();
        let schema = Schema::new(backend);

        manager
            .create_table(
                schema
                    .create_table_from_entity(Users)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                schema
                    .create_table_from_entity(Settings)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                schema
                    .create_table_from_entity(SearchHistory)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        // Analytics endpoints filter on the trailing window.
        manager
            .create_index(
                Index::create()
                    .name("idx_search_history_last_searched")
                    .table(SearchHistory)
                    .col(crate::entities::search_history::Column::LastSearched)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        let now = chrono::Utc::now().to_rfc3339();
        let password_hash = hash_default_password();

        let seed_admin = sea_orm_migration::sea_query::Query::insert()
            .into_table(Users)
            .columns([
                crate::entities::users::Column::FullName,
                crate::entities::users::Column::Email,
                crate::entities::users::Column::Phone,
                crate::entities::users::Column::EmployeeId,
                crate::entities::users::Column::Designation,
                crate::entities::users::Column::Department,
                crate::entities::users::Column::Manager,
                crate::entities::users::Column::Approver,
                crate::entities::users::Column::Role,
                crate::entities::users::Column::Status,
                crate::entities::users::Column::Pin,
                crate::entities::users::Column::AuthCode,
                crate::entities::users::Column::PasswordHash,
                crate::entities::users::Column::NeedsPasswordChange,
                crate::entities::users::Column::CreatedAt,
                crate::entities::users::Column::UpdatedAt,
            ])
            .values_panic([
                "Administrator".into(),
                "admin@ridedesk.local".into(),
                "".into(),
                "EMP01HR".into(),
                "Administrator".into(),
                "Operations".into(),
                "".into(),
                "".into(),
                "admin".into(),
                "ACTIVE".into(),
                "0000".into(),
                BOOTSTRAP_AUTH_CODE.into(),
                password_hash.into(),
                true.into(),
                now.clone().into(),
                now.clone().into(),
            ])
            .to_owned();

        manager.exec_stmt(seed_admin).await?;

        // Provider stays off until an operator supplies a credential.
        for (key, value) in [
            ("google_maps_api_enabled", "false"),
            ("google_maps_api_key", ""),
        ] {
            let insert = sea_orm_migration::sea_query::Query::insert()
                .into_table(Settings)
                .columns([
                    crate::entities::settings::Column::Key,
                    crate::entities::settings::Column::Value,
                    crate::entities::settings::Column::UpdatedAt,
                ])
                .values_panic([key.into(), value.into(), now.clone().into()])
                .to_owned();

            manager.exec_stmt(insert).await?;
        }

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(SearchHistory).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Settings).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Users).to_owned())
            .await?;

        Ok(())
    }
}
