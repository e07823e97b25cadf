use anyhow::Result;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::config::SecurityConfig;
use crate::entities::search_history;

pub mod migrator;
pub mod repositories;

pub use repositories::search::{NewSearchRecord, normalize_query};
pub use repositories::user::{Employee, EmployeePatch, NewEmployee, STATUS_ACTIVE, STATUS_SUSPENDED};

#[derive(Clone)]
pub struct Store {
    pub conn: DatabaseConnection,
}

impl Store {
    pub async fn new(db_url: &str) -> Result<Self> {
        Self::with_pool_options(db_url, 5, 1).await
    }

    pub async fn with_pool_options(
        db_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self> {
        use sea_orm_migration::MigratorTrait;

        // Every pooled connection to an in-memory database would get its own
        // private store, so the pool must stay at a single connection there.
        let (max_connections, min_connections) = if db_url.contains(":memory:") {
            (1, 1)
        } else {
            (max_connections, min_connections)
        };

        if !db_url.contains(":memory:") {
            let path_str = db_url.trim_start_matches("sqlite:");
            if let Some(parent) = Path::new(path_str).parent() {
                tokio::fs::create_dir_all(parent).await.ok();
            }
            if !Path::new(path_str).exists() {
                std::fs::File::create(path_str)?;
            }
        }

        let mut opt = ConnectOptions::new(db_url.to_string());
        opt.max_connections(max_connections)
            .min_connections(min_connections)
            .connect_timeout(Duration::from_secs(10))
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(300))
            .max_lifetime(Duration::from_secs(600))
            .sqlx_logging(false);

        let conn = Database::connect(opt).await?;

        migrator::Migrator::up(&conn, None).await?;

        info!(
            "Database connected & migrations applied (pool: {}-{})",
            min_connections, max_connections
        );

        Ok(Self { conn })
    }

    pub async fn ping(&self) -> Result<()> {
        let backend = self.conn.get_database_backend();
        self.conn
            .query_one(Statement::from_string(backend, "SELECT 1".to_string()))
            .await?;
        Ok(())
    }

    fn search_repo(&self) -> repositories::search::SearchRepository {
        repositories::search::SearchRepository::new(self.conn.clone())
    }

    fn user_repo(&self) -> repositories::user::UserRepository {
        repositories::user::UserRepository::new(self.conn.clone())
    }

    fn settings_repo(&self) -> repositories::settings::SettingsRepository {
        repositories::settings::SettingsRepository::new(self.conn.clone())
    }

    // Search history

    pub async fn find_matching_searches(
        &self,
        fragment: &str,
        limit: u64,
    ) -> Result<Vec<search_history::Model>> {
        self.search_repo().find_matching(fragment, limit).await
    }

    pub async fn find_search(&self, query: &str) -> Result<Option<search_history::Model>> {
        self.search_repo().find_exact(query).await
    }

    pub async fn record_search(&self, record: NewSearchRecord) -> Result<()> {
        self.search_repo().record(record).await
    }

    pub async fn bump_search(&self, query: &str) -> Result<bool> {
        self.search_repo().bump(query).await
    }

    pub async fn search_history(
        &self,
        sort: search_history::Column,
        descending: bool,
        page: u64,
        page_size: u64,
    ) -> Result<(Vec<search_history::Model>, u64, u64)> {
        self.search_repo()
            .history(sort, descending, page, page_size)
            .await
    }

    pub async fn popular_searches(&self, limit: u64) -> Result<Vec<(String, i32)>> {
        self.search_repo().popular(limit).await
    }

    pub async fn search_accuracy_buckets(
        &self,
        since: &str,
    ) -> Result<Vec<(bool, i64, Option<f64>)>> {
        self.search_repo().accuracy_buckets(since).await
    }

    pub async fn search_trends(&self, since: &str) -> Result<Vec<(String, i64)>> {
        self.search_repo().trends(since).await
    }

    pub async fn count_searches(&self) -> Result<u64> {
        self.search_repo().count().await
    }

    // Employees

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<Employee>> {
        self.user_repo().get_by_email(email).await
    }

    pub async fn get_user_by_id(&self, id: i32) -> Result<Option<Employee>> {
        self.user_repo().get_by_id(id).await
    }

    pub async fn list_users(&self) -> Result<Vec<Employee>> {
        self.user_repo().list().await
    }

    pub async fn find_conflicting_user(
        &self,
        email: &str,
        full_name: &str,
        department: &str,
        designation: &str,
    ) -> Result<Option<Employee>> {
        self.user_repo()
            .find_conflicting(email, full_name, department, designation)
            .await
    }

    pub async fn create_user(
        &self,
        new: NewEmployee,
        initial_password: &str,
        security: &SecurityConfig,
    ) -> Result<Employee> {
        self.user_repo()
            .create(new, initial_password, security)
            .await
    }

    pub async fn update_user(&self, id: i32, patch: EmployeePatch) -> Result<Option<Employee>> {
        self.user_repo().update(id, patch).await
    }

    pub async fn set_user_status(&self, id: i32, status: &str) -> Result<Option<Employee>> {
        self.user_repo().set_status(id, status).await
    }

    pub async fn remove_user(&self, id: i32) -> Result<bool> {
        self.user_repo().remove(id).await
    }

    pub async fn count_users(&self) -> Result<u64> {
        self.user_repo().count().await
    }

    pub async fn verify_user_password(&self, email: &str, password: &str) -> Result<bool> {
        self.user_repo().verify_password(email, password).await
    }

    pub async fn update_user_password(
        &self,
        email: &str,
        new_password: &str,
        security: &SecurityConfig,
    ) -> Result<()> {
        self.user_repo()
            .update_password(email, new_password, security, false)
            .await
    }

    pub async fn reset_user_password(
        &self,
        email: &str,
        new_password: &str,
        security: &SecurityConfig,
    ) -> Result<()> {
        self.user_repo()
            .update_password(email, new_password, security, true)
            .await
    }

    pub async fn verify_auth_code(&self, auth_code: &str) -> Result<Option<Employee>> {
        self.user_repo().verify_auth_code(auth_code).await
    }

    // Settings

    pub async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        self.settings_repo().get(key).await
    }

    pub async fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        self.settings_repo().set(key, value).await
    }
}
