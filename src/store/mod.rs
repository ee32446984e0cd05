//! Credential store boundary.
//!
//! The authentication core only depends on this trait; the bundled
//! [`MemoryUserStore`] is a single-process implementation, and a
//! database-backed one can be managed in its place without touching the
//! gate or the auth routes.

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::auth::responses::Role;

pub mod memory;

pub use memory::MemoryUserStore;

pub type SharedUserStore = std::sync::Arc<dyn UserStore>;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("email already registered")]
    DuplicateEmail,
    #[error("store backend error: {0}")]
    Backend(String),
}

/// A persisted user account. Deliberately not `Serialize`: responses go
/// through [`crate::auth::responses::UserSummary`] so the password hash
/// cannot leak.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
}

#[rocket::async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<UserRecord>>;

    /// Lookup by email, case-insensitively.
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<UserRecord>>;

    /// Insert a new account. Email uniqueness is enforced here, at write
    /// time; a duplicate yields [`StoreError::DuplicateEmail`].
    async fn insert(&self, user: NewUser) -> StoreResult<UserRecord>;

    async fn update_role(&self, id: Uuid, role: Role) -> StoreResult<Option<UserRecord>>;

    async fn set_active(&self, id: Uuid, active: bool) -> StoreResult<Option<UserRecord>>;

    async fn record_login(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<()>;

    async fn delete(&self, id: Uuid) -> StoreResult<bool>;

    async fn list(&self) -> StoreResult<Vec<UserRecord>>;
}
