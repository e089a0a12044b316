use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use thiserror::Error;

pub const DEFAULT_KEY: &str = "twitter_tweets";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(
        #[source]
        #[from]
        redis::RedisError,
    ),
}

/// A list whose head holds the current batch
#[async_trait]
pub trait PostStore: Send + Sync {
    /// Drops the current head and pushes `payload` in its place. Not atomic:
    /// readers may briefly observe an empty list.
    async fn replace_latest(&self, payload: String) -> Result<(), StoreError>;

    async fn latest(&self) -> Result<Option<String>, StoreError>;
}

pub struct RedisStore {
    connection: MultiplexedConnection,
    key: String,
}

impl RedisStore {
    pub async fn connect(url: &str, key: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let connection = client.get_multiplexed_async_connection().await?;
        Ok(Self {
            connection,
            key: key.to_string(),
        })
    }
}

#[async_trait]
impl PostStore for RedisStore {
    async fn replace_latest(&self, payload: String) -> Result<(), StoreError> {
        let mut connection = self.connection.clone();
        let _: Option<String> = connection.lpop(&self.key, None).await?;
        let _: () = connection.lpush(&self.key, payload).await?;
        Ok(())
    }

    async fn latest(&self) -> Result<Option<String>, StoreError> {
        let mut connection = self.connection.clone();
        let head: Vec<String> = connection.lrange(&self.key, 0, 0).await?;
        Ok(head.into_iter().next())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Mirrors the Redis list operations on a deque
    #[derive(Default)]
    pub(crate) struct MemoryStore {
        pub list: Mutex<VecDeque<String>>,
    }

    #[async_trait]
    impl PostStore for MemoryStore {
        async fn replace_latest(&self, payload: String) -> Result<(), StoreError> {
            let mut list = self.list.lock().unwrap();
            list.pop_front();
            list.push_front(payload);
            Ok(())
        }

        async fn latest(&self) -> Result<Option<String>, StoreError> {
            Ok(self.list.lock().unwrap().front().cloned())
        }
    }

    /// A scratch key on the server named by `REDIS_URL`, or `None` to skip
    async fn scratch_list(entries: &[&str]) -> Option<(RedisStore, MultiplexedConnection)> {
        let url = std::env::var("REDIS_URL").ok()?;
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let key = format!("tweet-cache-test-{}-{nanos}", std::process::id());
        let mut connection = redis::Client::open(url.as_str())
            .unwrap()
            .get_multiplexed_async_connection()
            .await
            .unwrap();
        if !entries.is_empty() {
            let _: () = connection.rpush(&key, entries).await.unwrap();
        }
        let store = RedisStore::connect(&url, &key).await.unwrap();
        Some((store, connection))
    }

    #[tokio::test]
    #[ignore = "needs a Redis server at REDIS_URL"]
    async fn redis_replaces_only_the_head() {
        let Some((store, mut connection)) = scratch_list(&["old", "older"]).await else {
            return;
        };
        assert_eq!(store.latest().await.unwrap().as_deref(), Some("old"));
        store.replace_latest("new".to_string()).await.unwrap();
        let list: Vec<String> = connection.lrange(&store.key, 0, -1).await.unwrap();
        let _: () = connection.del(&store.key).await.unwrap();
        assert_eq!(list, vec!["new", "older"]);
    }

    #[tokio::test]
    #[ignore = "needs a Redis server at REDIS_URL"]
    async fn redis_empty_list_has_no_latest() {
        let Some((store, mut connection)) = scratch_list(&[]).await else {
            return;
        };
        assert_eq!(store.latest().await.unwrap(), None);
        store.replace_latest("first".to_string()).await.unwrap();
        assert_eq!(store.latest().await.unwrap().as_deref(), Some("first"));
        let list: Vec<String> = connection.lrange(&store.key, 0, -1).await.unwrap();
        let _: () = connection.del(&store.key).await.unwrap();
        assert_eq!(list, vec!["first"]);
    }

    #[tokio::test]
    async fn rejects_malformed_urls() {
        assert!(RedisStore::connect("not a url", DEFAULT_KEY).await.is_err());
    }
}
