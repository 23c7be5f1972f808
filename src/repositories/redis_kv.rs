use async_trait::async_trait;

use crate::core::redis::RedisHandle;
use crate::repositories::kv::{KvBackend, StoreError};

#[derive(Clone)]
pub struct RedisKv {
    redis: RedisHandle,
}

impl RedisKv {
    pub fn new(redis: RedisHandle) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl KvBackend for RedisKv {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.redis.get(key).await?)
    }

    async fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        Ok(self.redis.set(key, &value).await?)
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        Ok(self.redis.del(key).await?)
    }
}
