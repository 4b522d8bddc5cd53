//! Request-scoped batch loaders.
//!
//! Both loaders are created fresh for every HTTP request, so their caches
//! never outlive the response that filled them.

use std::{collections::HashMap, sync::Arc};

use async_graphql::dataloader::{DataLoader, HashMapCache, Loader};
use sqlx::PgPool;
use tracing::debug;

use crate::{auth, auth::dto::User, posts};

pub struct UserLoader {
    db: PgPool,
}

impl UserLoader {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

impl Loader<i32> for UserLoader {
    type Value = User;
    type Error = Arc<sqlx::Error>;

    async fn load(&self, keys: &[i32]) -> Result<HashMap<i32, Self::Value>, Self::Error> {
        debug!(count = keys.len(), "batch loading users");
        let rows = auth::repo::find_by_ids(&self.db, keys).await?;
        Ok(rows.into_iter().map(|r| (r.id, User::from(r))).collect())
    }
}

/// A user's vote on a post.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub struct UpdootKey {
    pub post_id: i32,
    pub user_id: i32,
}

pub struct UpdootLoader {
    db: PgPool,
}

impl UpdootLoader {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

impl Loader<UpdootKey> for UpdootLoader {
    type Value = i32;
    type Error = Arc<sqlx::Error>;

    async fn load(&self, keys: &[UpdootKey]) -> Result<HashMap<UpdootKey, i32>, Self::Error> {
        debug!(count = keys.len(), "batch loading updoots");
        let pairs: Vec<(i32, i32)> = keys.iter().map(|k| (k.post_id, k.user_id)).collect();
        let rows = posts::repo::find_updoots(&self.db, &pairs).await?;
        Ok(rows
            .into_iter()
            .map(|r| {
                (
                    UpdootKey {
                        post_id: r.post_id,
                        user_id: r.user_id,
                    },
                    r.value,
                )
            })
            .collect())
    }
}

/// Fresh, caching loaders for one request.
pub fn request_loaders(
    db: &PgPool,
) -> (
    DataLoader<UserLoader, HashMapCache>,
    DataLoader<UpdootLoader, HashMapCache>,
) {
    (
        DataLoader::with_cache(
            UserLoader::new(db.clone()),
            tokio::spawn,
            HashMapCache::default(),
        ),
        DataLoader::with_cache(
            UpdootLoader::new(db.clone()),
            tokio::spawn,
            HashMapCache::default(),
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[sqlx::test]
    async fn loaders_answer_per_key(db: PgPool) {
        let alice = auth::repo::create(&db, "alice", "alice@example.com", "hash")
            .await
            .unwrap()
            .id;
        let bob = auth::repo::create(&db, "bob", "bob@example.com", "hash")
            .await
            .unwrap()
            .id;
        let first = posts::repo::create(&db, alice, "first", "x").await.unwrap().id;
        let second = posts::repo::create(&db, alice, "second", "y").await.unwrap().id;
        posts::repo::vote(&db, bob, first, -1).await.unwrap();
        posts::repo::vote(&db, alice, second, 1).await.unwrap();

        let (users, updoots) = request_loaders(&db);

        let found = users.load_many([alice, bob, 9999]).await.unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[&alice].username, "alice");
        assert_eq!(found[&bob].username, "bob");
        assert!(users.load_one(9999).await.unwrap().is_none());

        let key = |post_id, user_id| UpdootKey { post_id, user_id };
        assert_eq!(updoots.load_one(key(first, bob)).await.unwrap(), Some(-1));
        assert_eq!(updoots.load_one(key(second, alice)).await.unwrap(), Some(1));
        assert_eq!(updoots.load_one(key(first, alice)).await.unwrap(), None);
        assert_eq!(updoots.load_one(key(second, bob)).await.unwrap(), None);
    }
}
