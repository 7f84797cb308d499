use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{AccountStore, ProjectStore, StoreError};
use crate::models::{Account, NewProject, Project};

#[derive(Default)]
pub struct MemoryAccountStore {
    accounts: Mutex<HashMap<Uuid, Account>>,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn collides(existing: &Account, candidate: &Account) -> bool {
    existing.user_id != candidate.user_id
        && (existing.username == candidate.username || existing.email == candidate.email)
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn insert(&self, account: &Account) -> Result<(), StoreError> {
        let mut accounts = self.accounts.lock().await;
        if accounts.contains_key(&account.user_id)
            || accounts.values().any(|existing| collides(existing, account))
        {
            return Err(StoreError::Conflict);
        }
        accounts.insert(account.user_id, account.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Account>, StoreError> {
        Ok(self.accounts.lock().await.get(&id).cloned())
    }

    async fn find_by_login(&self, identifier: &str) -> Result<Option<Account>, StoreError> {
        let accounts = self.accounts.lock().await;
        // Email matches win over username matches.
        Ok(accounts
            .values()
            .find(|account| account.email == identifier)
            .or_else(|| accounts.values().find(|account| account.username == identifier))
            .cloned())
    }

    async fn list(&self) -> Result<Vec<Account>, StoreError> {
        let mut accounts: Vec<Account> = self.accounts.lock().await.values().cloned().collect();
        accounts.sort_by_key(|account| account.created_at);
        Ok(accounts)
    }

    async fn update(&self, account: &Account) -> Result<(), StoreError> {
        let mut accounts = self.accounts.lock().await;
        if !accounts.contains_key(&account.user_id) {
            return Err(StoreError::NotFound);
        }
        if accounts.values().any(|existing| collides(existing, account)) {
            return Err(StoreError::Conflict);
        }
        accounts.insert(account.user_id, account.clone());
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        self.accounts
            .lock()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }
}

#[derive(Default)]
pub struct MemoryProjectStore {
    projects: Mutex<Vec<Project>>,
}

impl MemoryProjectStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProjectStore for MemoryProjectStore {
    async fn insert(&self, project: NewProject) -> Result<Project, StoreError> {
        let project = project.into_project(Uuid::new_v4());
        self.projects.lock().await.push(project.clone());
        Ok(project)
    }

    async fn list_by_owner(&self, owner_id: Uuid) -> Result<Vec<Project>, StoreError> {
        Ok(self
            .projects
            .lock()
            .await
            .iter()
            .filter(|project| project.owner_id == owner_id)
            .cloned()
            .collect())
    }

    async fn delete_by_owner(&self, owner_id: Uuid) -> Result<u64, StoreError> {
        let mut projects = self.projects.lock().await;
        let before = projects.len();
        projects.retain(|project| project.owner_id != owner_id);
        Ok((before - projects.len()) as u64)
    }
}
