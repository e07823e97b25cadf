use anyhow::{Context, Result};
use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, Set,
};
use tokio::task;

use crate::config::SecurityConfig;
use crate::entities::users;

pub const STATUS_ACTIVE: &str = "ACTIVE";
pub const STATUS_SUSPENDED: &str = "SUSPENDED";

/// Employee data returned from the repository (without the password hash).
#[derive(Debug, Clone)]
pub struct Employee {
    pub id: i32,
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub employee_id: String,
    pub designation: String,
    pub department: String,
    pub manager: String,
    pub approver: String,
    pub role: String,
    pub status: String,
    pub pin: String,
    pub auth_code: String,
    pub needs_password_change: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl From<users::Model> for Employee {
    fn from(model: users::Model) -> Self {
        Self {
            id: model.id,
            full_name: model.full_name,
            email: model.email,
            phone: model.phone,
            employee_id: model.employee_id,
            designation: model.designation,
            department: model.department,
            manager: model.manager,
            approver: model.approver,
            role: model.role,
            status: model.status,
            pin: model.pin,
            auth_code: model.auth_code,
            needs_password_change: model.needs_password_change,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

/// Profile fields an operator can create an employee with.
#[derive(Debug, Clone)]
pub struct NewEmployee {
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub designation: String,
    pub department: String,
    pub manager: String,
    pub approver: String,
    pub role: String,
}

/// Profile fields an operator can change after creation.
#[derive(Debug, Clone, Default)]
pub struct EmployeePatch {
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub designation: Option<String>,
    pub department: Option<String>,
    pub manager: Option<String>,
    pub approver: Option<String>,
    pub role: Option<String>,
}

pub struct UserRepository {
    conn: DatabaseConnection,
}

impl UserRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn get_by_email(&self, email: &str) -> Result<Option<Employee>> {
        let user = users::Entity::find()
            .filter(users::Column::Email.eq(email.trim().to_lowercase()))
            .one(&self.conn)
            .await
            .context("Failed to query user by email")?;

        Ok(user.map(Employee::from))
    }

    pub async fn get_by_id(&self, id: i32) -> Result<Option<Employee>> {
        let user = users::Entity::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query user by ID")?;

        Ok(user.map(Employee::from))
    }

    pub async fn list(&self) -> Result<Vec<Employee>> {
        let rows = users::Entity::find()
            .order_by_desc(users::Column::CreatedAt)
            .all(&self.conn)
            .await
            .context("Failed to list users")?;

        Ok(rows.into_iter().map(Employee::from).collect())
    }

    /// Finds an employee colliding with the given identity: same email, or
    /// same (name, department, designation) triple.
    pub async fn find_conflicting(
        &self,
        email: &str,
        full_name: &str,
        department: &str,
        designation: &str,
    ) -> Result<Option<Employee>> {
        let user = users::Entity::find()
            .filter(
                Condition::any()
                    .add(users::Column::Email.eq(email.trim().to_lowercase()))
                    .add(
                        Condition::all()
                            .add(users::Column::FullName.eq(full_name.trim()))
                            .add(users::Column::Department.eq(department.trim()))
                            .add(users::Column::Designation.eq(designation.trim())),
                    ),
            )
            .one(&self.conn)
            .await
            .context("Failed to query conflicting user")?;

        Ok(user.map(Employee::from))
    }

    /// Creates an employee with generated badge id and credentials.
    /// The initial password is hashed with the supplied security params and
    /// must be rotated on first login.
    pub async fn create(
        &self,
        new: NewEmployee,
        initial_password: &str,
        security: &SecurityConfig,
    ) -> Result<Employee> {
        let employee_id = self.next_employee_id().await?;
        let pin = generate_pin();
        let auth_code = generate_auth_code();
        let now = chrono::Utc::now().to_rfc3339();

        let password = initial_password.to_string();
        let security = security.clone();
        let password_hash = task::spawn_blocking(move || hash_password(&password, &security))
            .await
            .context("Password hashing task panicked")??;

        let active = users::ActiveModel {
            full_name: Set(new.full_name.trim().to_string()),
            email: Set(new.email.trim().to_lowercase()),
            phone: Set(new.phone.trim().to_string()),
            employee_id: Set(employee_id),
            designation: Set(new.designation.trim().to_string()),
            department: Set(new.department.trim().to_string()),
            manager: Set(new.manager.trim().to_string()),
            approver: Set(new.approver.trim().to_string()),
            role: Set(new.role),
            status: Set(STATUS_ACTIVE.to_string()),
            pin: Set(pin),
            auth_code: Set(auth_code),
            password_hash: Set(password_hash),
            needs_password_change: Set(true),
            created_at: Set(now.clone()),
            updated_at: Set(now),
            ..Default::default()
        };

        let model = active
            .insert(&self.conn)
            .await
            .context("Failed to insert user")?;

        Ok(Employee::from(model))
    }

    pub async fn update(&self, id: i32, patch: EmployeePatch) -> Result<Option<Employee>> {
        let Some(user) = users::Entity::find_by_id(id).one(&self.conn).await? else {
            return Ok(None);
        };

        let mut active: users::ActiveModel = user.into();

        if let Some(full_name) = patch.full_name {
            active.full_name = Set(full_name.trim().to_string());
        }
        if let Some(phone) = patch.phone {
            active.phone = Set(phone.trim().to_string());
        }
        if let Some(designation) = patch.designation {
            active.designation = Set(designation.trim().to_string());
        }
        if let Some(department) = patch.department {
            active.department = Set(department.trim().to_string());
        }
        if let Some(manager) = patch.manager {
            active.manager = Set(manager.trim().to_string());
        }
        if let Some(approver) = patch.approver {
            active.approver = Set(approver.trim().to_string());
        }
        if let Some(role) = patch.role {
            active.role = Set(role);
        }
        active.updated_at = Set(chrono::Utc::now().to_rfc3339());

        let model = active.update(&self.conn).await?;
        Ok(Some(Employee::from(model)))
    }

    pub async fn set_status(&self, id: i32, status: &str) -> Result<Option<Employee>> {
        let Some(user) = users::Entity::find_by_id(id).one(&self.conn).await? else {
            return Ok(None);
        };

        let mut active: users::ActiveModel = user.into();
        active.status = Set(status.to_string());
        active.updated_at = Set(chrono::Utc::now().to_rfc3339());

        let model = active.update(&self.conn).await?;
        Ok(Some(Employee::from(model)))
    }

    pub async fn remove(&self, id: i32) -> Result<bool> {
        let result = users::Entity::delete_by_id(id).exec(&self.conn).await?;
        Ok(result.rows_affected > 0)
    }

    pub async fn count(&self) -> Result<u64> {
        Ok(users::Entity::find().count(&self.conn).await?)
    }

    /// Verify password for a user.
    /// Argon2 verification is CPU-bound, so it runs on the blocking pool.
    pub async fn verify_password(&self, email: &str, password: &str) -> Result<bool> {
        let user = users::Entity::find()
            .filter(users::Column::Email.eq(email.trim().to_lowercase()))
            .one(&self.conn)
            .await
            .context("Failed to query user for password verification")?;

        let Some(user) = user else {
            return Ok(false);
        };

        let password_hash = user.password_hash;
        let password = password.to_string();

        let is_valid = task::spawn_blocking(move || {
            let parsed_hash = PasswordHash::new(&password_hash)
                .map_err(|e| anyhow::anyhow!("Invalid password hash format: {e}"))?;

            let argon2 = Argon2::default();
            Ok::<bool, anyhow::Error>(
                argon2
                    .verify_password(password.as_bytes(), &parsed_hash)
                    .is_ok(),
            )
        })
        .await
        .context("Password verification task panicked")??;

        Ok(is_valid)
    }

    /// Updates the stored password hash. `force_change` controls whether the
    /// account is flagged for another rotation (true for admin resets, false
    /// when the user chose the password themselves).
    pub async fn update_password(
        &self,
        email: &str,
        new_password: &str,
        security: &SecurityConfig,
        force_change: bool,
    ) -> Result<()> {
        let user = users::Entity::find()
            .filter(users::Column::Email.eq(email.trim().to_lowercase()))
            .one(&self.conn)
            .await
            .context("Failed to query user for password update")?
            .ok_or_else(|| anyhow::anyhow!("User not found: {email}"))?;

        let password = new_password.to_string();
        let security = security.clone();
        let new_hash = task::spawn_blocking(move || hash_password(&password, &security))
            .await
            .context("Password hashing task panicked")??;

        let mut active: users::ActiveModel = user.into();
        active.password_hash = Set(new_hash);
        active.needs_password_change = Set(force_change);
        active.updated_at = Set(chrono::Utc::now().to_rfc3339());
        active.update(&self.conn).await?;

        Ok(())
    }

    /// Verify a machine credential and return the owning active employee.
    pub async fn verify_auth_code(&self, auth_code: &str) -> Result<Option<Employee>> {
        let user = users::Entity::find()
            .filter(users::Column::AuthCode.eq(auth_code))
            .filter(users::Column::Status.eq(STATUS_ACTIVE))
            .one(&self.conn)
            .await
            .context("Failed to query user by auth code")?;

        Ok(user.map(Employee::from))
    }

    /// Next badge id in the EMPnnHR sequence.
    async fn next_employee_id(&self) -> Result<String> {
        let pattern = regex::Regex::new(r"^EMP(\d+)HR$")?;

        let ids: Vec<String> = users::Entity::find()
            .all(&self.conn)
            .await?
            .into_iter()
            .map(|u| u.employee_id)
            .collect();

        let max_number = ids
            .iter()
            .filter_map(|id| pattern.captures(id))
            .filter_map(|c| c[1].parse::<u32>().ok())
            .max()
            .unwrap_or(0);

        Ok(format!("EMP{:02}HR", max_number + 1))
    }
}

/// Hash a password using Argon2id with the configured params.
pub fn hash_password(password: &str, config: &SecurityConfig) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);

    let params = Params::new(
        config.argon2_memory_cost_kib,
        config.argon2_time_cost,
        config.argon2_parallelism,
        None,
    )
    .map_err(|e| anyhow::anyhow!("Invalid Argon2 params: {e}"))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {e}"))?;

    Ok(hash.to_string())
}

/// Generate a 4-digit PIN issued alongside new employee accounts.
#[must_use]
pub fn generate_pin() -> String {
    use rand::Rng;

    let mut rng = rand::rng();
    format!("{:04}", rng.random_range(0..10_000))
}

/// Generate a 10-character uppercase alphanumeric credential.
#[must_use]
pub fn generate_auth_code() -> String {
    use rand::Rng;

    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

    let mut rng = rand::rng();
    (0..10)
        .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Store;

    fn new_employee(email: &str, name: &str) -> NewEmployee {
        NewEmployee {
            full_name: name.to_string(),
            email: email.to_string(),
            phone: "5550100".to_string(),
            designation: "Dispatcher".to_string(),
            department: "Operations".to_string(),
            manager: "M. Rao".to_string(),
            approver: "A. Shah".to_string(),
            role: "user".to_string(),
        }
    }

    #[tokio::test]
    async fn test_employee_id_sequence_continues_from_seed() {
        let store = Store::new("sqlite::memory:").await.unwrap();
        let repo = UserRepository::new(store.conn.clone());

        // Migration seeds the admin as EMP01HR.
        let security = SecurityConfig::default();
        let created = repo
            .create(new_employee("jo@example.com", "Jo Doe"), "pw", &security)
            .await
            .unwrap();

        assert_eq!(created.employee_id, "EMP02HR");
        assert_eq!(created.status, STATUS_ACTIVE);
        assert_eq!(created.pin.len(), 4);
        assert_eq!(created.auth_code.len(), 10);
        assert!(created.needs_password_change);
    }

    #[tokio::test]
    async fn test_conflict_detection_by_email_and_identity() {
        let store = Store::new("sqlite::memory:").await.unwrap();
        let repo = UserRepository::new(store.conn.clone());
        let security = SecurityConfig::default();

        repo.create(new_employee("jo@example.com", "Jo Doe"), "pw", &security)
            .await
            .unwrap();

        let by_email = repo
            .find_conflicting("JO@example.com", "Other Name", "Other", "Other")
            .await
            .unwrap();
        assert!(by_email.is_some());

        let by_identity = repo
            .find_conflicting("new@example.com", "Jo Doe", "Operations", "Dispatcher")
            .await
            .unwrap();
        assert!(by_identity.is_some());

        let clean = repo
            .find_conflicting("new@example.com", "Jo Doe", "Operations", "Driver")
            .await
            .unwrap();
        assert!(clean.is_none());
    }

    #[tokio::test]
    async fn test_suspended_account_fails_auth_code_check() {
        let store = Store::new("sqlite::memory:").await.unwrap();
        let repo = UserRepository::new(store.conn.clone());
        let security = SecurityConfig::default();

        let created = repo
            .create(new_employee("jo@example.com", "Jo Doe"), "pw", &security)
            .await
            .unwrap();

        assert!(
            repo.verify_auth_code(&created.auth_code)
                .await
                .unwrap()
                .is_some()
        );

        repo.set_status(created.id, STATUS_SUSPENDED).await.unwrap();

        assert!(
            repo.verify_auth_code(&created.auth_code)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_generated_credentials_shape() {
        let pin = generate_pin();
        assert_eq!(pin.len(), 4);
        assert!(pin.chars().all(|c| c.is_ascii_digit()));

        let code = generate_auth_code();
        assert_eq!(code.len(), 10);
        assert!(code.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }
}
