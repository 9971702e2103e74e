use std::collections::HashMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::auth::repo::UserStore;
use crate::auth::repo_types::{CreateUserError, IdentityField, NewUser, User};

/// In-process user store for tests and local runs without PostgreSQL.
#[derive(Default)]
pub struct MemoryUserStore {
    users: RwLock<HashMap<Uuid, User>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    /// Flip `is_active` on an existing user. Returns false if the id is unknown.
    pub async fn set_active(&self, id: Uuid, active: bool) -> bool {
        match self.users.write().await.get_mut(&id) {
            Some(u) => {
                u.is_active = active;
                true
            }
            None => false,
        }
    }

    #[cfg(test)]
    pub async fn count(&self) -> usize {
        self.users.read().await.len()
    }

    async fn find(&self, pred: impl Fn(&User) -> bool) -> Option<User> {
        self.users.read().await.values().find(|u| pred(u)).cloned()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_email_ci(&self, email: &str) -> anyhow::Result<Option<User>> {
        let needle = email.to_lowercase();
        Ok(self.find(|u| u.email.to_lowercase() == needle).await)
    }

    async fn find_by_email_exact(&self, email: &str) -> anyhow::Result<Option<User>> {
        Ok(self.find(|u| u.email == email).await)
    }

    async fn find_by_username(&self, username: &str) -> anyhow::Result<Option<User>> {
        Ok(self.find(|u| u.username == username).await)
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn create(&self, new_user: NewUser) -> Result<User, CreateUserError> {
        // Check and insert under one guard so concurrent signups cannot both win.
        let mut users = self.users.write().await;
        let email_key = new_user.email.to_lowercase();
        if users.values().any(|u| u.username == new_user.username) {
            return Err(CreateUserError::Duplicate(IdentityField::Username));
        }
        if users.values().any(|u| u.email.to_lowercase() == email_key) {
            return Err(CreateUserError::Duplicate(IdentityField::Email));
        }

        let user = User {
            id: Uuid::new_v4(),
            username: new_user.username,
            email: new_user.email,
            password_hash: new_user.password_hash,
            phone: new_user.phone,
            full_name: new_user.full_name,
            is_active: true,
            created_at: OffsetDateTime::now_utc(),
        };
        users.insert(user.id, user.clone());
        Ok(user)
    }
}
