use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use super::{PermissionLookup, StoreFuture, UserLookup};
use crate::identity::{Permissions, User};

#[derive(Default)]
struct Tables {
    users: HashMap<i64, User>,
    tokens: HashMap<String, i64>,
    permissions: HashMap<i64, Vec<String>>,
}

/// In-process user, token and permission tables.
///
/// Cheap to clone; clones share the same tables.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a user.
    pub async fn insert_user(&self, user: User) {
        self.tables.write().await.users.insert(user.id, user);
    }

    /// Register a plaintext token for an existing user id.
    pub async fn insert_token(&self, token: impl Into<String>, user_id: i64) {
        self.tables
            .write()
            .await
            .tokens
            .insert(token.into(), user_id);
    }

    /// Grant permission codes to a user.
    pub async fn grant<I, S>(&self, user_id: i64, codes: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut tables = self.tables.write().await;
        let granted = tables.permissions.entry(user_id).or_default();
        for code in codes {
            let code = code.into();
            if !granted.contains(&code) {
                granted.push(code);
            }
        }
    }
}

impl UserLookup for MemoryStore {
    fn get_for_token<'a>(&'a self, token: &'a str) -> StoreFuture<'a, Option<User>> {
        Box::pin(async move {
            let tables = self.tables.read().await;
            let user = tables
                .tokens
                .get(token)
                .and_then(|id| tables.users.get(id))
                .cloned();
            if user.is_none() {
                debug!("No user registered for presented token");
            }
            Ok(user)
        })
    }
}

impl PermissionLookup for MemoryStore {
    fn get_all_for_user(&self, user_id: i64) -> StoreFuture<'_, Permissions> {
        Box::pin(async move {
            let tables = self.tables.read().await;
            Ok(tables
                .permissions
                .get(&user_id)
                .map(|codes| codes.iter().cloned().collect())
                .unwrap_or_default())
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_token_resolves_to_user() {
        let store = MemoryStore::new();
        store
            .insert_user(User::new(7, "Ada", "ada@example.test", true))
            .await;
        store.insert_token("Y3QMGX3PJ3WLRL2YRTQGQ6KRHU", 7).await;

        let user = store
            .get_for_token("Y3QMGX3PJ3WLRL2YRTQGQ6KRHU")
            .await
            .unwrap();
        assert_eq!(user.map(|u| u.id), Some(7));
    }

    #[tokio::test]
    async fn test_unknown_token_is_none() {
        let store = MemoryStore::new();
        assert!(store.get_for_token("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_token_for_deleted_user_is_none() {
        let store = MemoryStore::new();
        store.insert_token("orphan", 99).await;
        assert!(store.get_for_token("orphan").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_grant_deduplicates() {
        let store = MemoryStore::new();
        store.grant(1, ["movies:read"]).await;
        store.grant(1, ["movies:read", "movies:write"]).await;

        let perms = store.get_all_for_user(1).await.unwrap();
        assert_eq!(perms.len(), 2);
        assert!(perms.includes("movies:write"));
        assert!(store.get_all_for_user(2).await.unwrap().is_empty());
    }
}
