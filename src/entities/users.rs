use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub full_name: String,

    /// Stored lowercased; login identifier.
    #[sea_orm(unique)]
    pub email: String,

    pub phone: String,

    /// Sequential badge id, format EMPnnHR.
    #[sea_orm(unique)]
    pub employee_id: String,

    pub designation: String,

    pub department: String,

    pub manager: String,

    pub approver: String,

    /// "admin" or "user"
    pub role: String,

    /// "ACTIVE" or "SUSPENDED"
    pub status: String,

    /// 4-digit PIN issued at creation.
    pub pin: String,

    /// 10-char uppercase machine credential issued at creation.
    pub auth_code: String,

    /// Argon2id password hash
    pub password_hash: String,

    /// Forces password rotation on first login.
    pub needs_password_change: bool,

    pub created_at: String,

    pub updated_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
