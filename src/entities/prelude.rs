pub use super::search_history::Entity as SearchHistory;
pub use super::settings::Entity as Settings;
pub use super::users::Entity as Users;
