use std::collections::HashMap;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use redis::AsyncCommands;
use uuid::Uuid;

use crate::storage::JoinStore;

// KEYS[1] = join collection, ARGV[1] = required entries.
// Size check, read and delete run as one script so two retrievers can never
// both observe the full collection.
const DRAIN_SCRIPT: &str = r#"
    local size = redis.call("HLEN", KEYS[1])
    if size < tonumber(ARGV[1]) then
        return false
    end
    local entries = redis.call("HGETALL", KEYS[1])
    redis.call("DEL", KEYS[1])
    return entries
"#;

// KEYS[1] = lock name, ARGV[1] = owner token.
const UNLOCK_SCRIPT: &str = r#"
    if redis.call("GET", KEYS[1]) == ARGV[1] then
        return redis.call("DEL", KEYS[1])
    end
    return 0
"#;

pub struct RedisJoinStore {
    client: redis::Client,
    drain: redis::Script,
    unlock: redis::Script,
}

impl RedisJoinStore {
    pub fn new(client: redis::Client) -> Self {
        Self {
            client,
            drain: redis::Script::new(DRAIN_SCRIPT),
            unlock: redis::Script::new(UNLOCK_SCRIPT),
        }
    }

    pub fn open(url: &str) -> Result<Self> {
        Ok(Self::new(redis::Client::open(url)?))
    }
}

#[async_trait]
impl JoinStore for RedisJoinStore {
    async fn store(&self, key: &str, field: &str, payload: String, ttl: Duration) -> Result<usize> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let ttl_secs = ttl.as_secs().max(1) as i64;
        let (size,): (usize,) = redis::pipe()
            .atomic()
            .hset(key, field, payload)
            .ignore()
            .expire(key, ttl_secs)
            .ignore()
            .hlen(key)
            .query_async(&mut conn)
            .await?;
        Ok(size)
    }

    async fn drain_if_ready(&self, key: &str, required: usize) -> Result<Option<HashMap<String, String>>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let flat: Option<Vec<String>> = self.drain.key(key).arg(required).invoke_async(&mut conn).await?;

        Ok(flat.map(|flat| {
            flat.chunks_exact(2)
                .map(|pair| (pair[0].clone(), pair[1].clone()))
                .collect()
        }))
    }

    async fn count(&self, key: &str) -> Result<usize> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let size: usize = conn.hlen(key).await?;
        Ok(size)
    }

    async fn try_lock(&self, name: &str, ttl: Duration) -> Result<Option<String>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let token = Uuid::new_v4().to_string();
        let ttl_ms = ttl.as_millis().max(1) as u64;
        let acquired: Option<String> = redis::cmd("SET")
            .arg(name)
            .arg(&token)
            .arg("NX")
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut conn)
            .await?;
        Ok(acquired.map(|_| token))
    }

    async fn unlock(&self, name: &str, token: &str) -> Result<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let _: i64 = self.unlock.key(name).arg(token).invoke_async(&mut conn).await?;
        Ok(())
    }
}
