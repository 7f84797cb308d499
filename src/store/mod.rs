//! Persistence seams for accounts and projects.
//!
//! Services only see the [`AccountStore`] and [`ProjectStore`] traits; the
//! process picks a Postgres or in-memory backend at startup.

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{Account, NewProject, Project};

pub mod memory;
pub mod postgres;

pub use memory::{MemoryAccountStore, MemoryProjectStore};
pub use postgres::{PgAccountStore, PgProjectStore};

#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("unique constraint violated")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("backend failure: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Conflict,
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => StoreError::NotFound,
            _ => StoreError::Backend(err.to_string()),
        }
    }
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Fails with [`StoreError::Conflict`] when the username or email is taken.
    async fn insert(&self, account: &Account) -> Result<(), StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<Account>, StoreError>;

    /// Looks an account up by email or username.
    async fn find_by_login(&self, identifier: &str) -> Result<Option<Account>, StoreError>;

    async fn list(&self) -> Result<Vec<Account>, StoreError>;

    /// Replaces the stored record with the same `user_id`.
    async fn update(&self, account: &Account) -> Result<(), StoreError>;

    async fn delete(&self, id: Uuid) -> Result<(), StoreError>;
}

#[async_trait]
pub trait ProjectStore: Send + Sync {
    async fn insert(&self, project: NewProject) -> Result<Project, StoreError>;

    /// Projects owned by `owner_id`, oldest first.
    async fn list_by_owner(&self, owner_id: Uuid) -> Result<Vec<Project>, StoreError>;

    /// Returns the number of removed projects.
    async fn delete_by_owner(&self, owner_id: Uuid) -> Result<u64, StoreError>;
}
