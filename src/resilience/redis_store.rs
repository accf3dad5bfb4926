//! Redis-backed shared counter store.
//!
//! Every rate check is one `EVALSHA` round trip: the script increments the
//! window counter and sets its expiry on first use, so concurrent instances
//! never observe a counter without a TTL.
//!
//! ```rust,ignore
//! use faultline::resilience::{RateLimiter, RateLimiterConfig, RedisCounterStore};
//! use std::sync::Arc;
//!
//! let store = RedisCounterStore::connect("redis://127.0.0.1/").await?;
//! let limiter = RateLimiter::distributed(RateLimiterConfig::default(), Arc::new(store));
//! ```

use super::shared_store::{SharedCounterStore, StoreError};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, Script};
use std::fmt;
use std::time::Duration;

const INCR_WITH_EXPIRY: &str = r#"
local n = redis.call('INCR', KEYS[1])
if n == 1 then
  redis.call('PEXPIRE', KEYS[1], ARGV[1])
end
return n
"#;

#[derive(Clone)]
pub struct RedisCounterStore {
    connection: ConnectionManager,
    script: Script,
}

impl fmt::Debug for RedisCounterStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisCounterStore").finish_non_exhaustive()
    }
}

impl RedisCounterStore {
    /// Connect to Redis (e.g. `redis://127.0.0.1/`).
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = Client::open(url)?;
        let connection = ConnectionManager::new(client).await?;
        Ok(Self {
            connection,
            script: Script::new(INCR_WITH_EXPIRY),
        })
    }
}

#[async_trait]
impl SharedCounterStore for RedisCounterStore {
    async fn incr_window(&self, key: &str, ttl: Duration) -> Result<u64, StoreError> {
        // ConnectionManager is a cheap multiplexed handle
        let mut conn = self.connection.clone();
        let ttl_ms = ttl.as_millis().max(1) as u64;
        let count: i64 = self
            .script
            .key(key)
            .arg(ttl_ms)
            .invoke_async(&mut conn)
            .await?;
        u64::try_from(count).map_err(|_| StoreError::Protocol(format!("negative counter {count}")))
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}
