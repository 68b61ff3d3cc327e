use async_trait::async_trait;
use redis::{aio::ConnectionManager, Client};

/// Shared key-value store backing one-time codes, attempt counters,
/// magic-link payloads, and the session revocation entries.
///
/// Every method is a single-key atomic operation: `take` is a
/// read-and-delete in one round trip and `incr` is a server-side
/// increment, so concurrent verifiers cannot double-spend a magic link or
/// lose an attempt count.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn put(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<(), anyhow::Error>;

    async fn get(&self, key: &str) -> Result<Option<String>, anyhow::Error>;

    /// Atomically read and delete a key. Returns `None` for keys that are
    /// absent, expired, or already taken.
    async fn take(&self, key: &str) -> Result<Option<String>, anyhow::Error>;

    async fn delete(&self, key: &str) -> Result<(), anyhow::Error>;

    /// Atomic increment; creates the key at 1 when missing.
    async fn incr(&self, key: &str) -> Result<i64, anyhow::Error>;

    /// Mark a session id revoked for `ttl_seconds`. Each id gets its own
    /// entry with an independent expiry.
    async fn revoke_session(&self, jti: &str, ttl_seconds: u64) -> Result<(), anyhow::Error>;

    async fn is_revoked(&self, jti: &str) -> Result<bool, anyhow::Error>;

    async fn health_check(&self) -> Result<(), anyhow::Error>;
}

fn revocation_key(jti: &str) -> String {
    format!("revoked:{}", jti)
}

#[derive(Clone)]
pub struct RedisStore {
    _client: Client,
    manager: ConnectionManager,
}

impl RedisStore {
    pub async fn new(url: &str) -> Result<Self, anyhow::Error> {
        tracing::info!(url = %url, "Connecting to Redis");
        let client = Client::open(url)?;

        // Use ConnectionManager for automatic reconnection
        let manager = client.get_connection_manager().await.map_err(|e| {
            tracing::error!("Failed to get Redis connection manager: {}", e);
            anyhow::anyhow!("Failed to connect to Redis: {}", e)
        })?;

        tracing::info!("Successfully connected to Redis");

        Ok(Self {
            _client: client,
            manager,
        })
    }
}

#[async_trait]
impl CredentialStore for RedisStore {
    async fn put(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<(), anyhow::Error> {
        let mut conn = self.manager.clone();
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl_seconds)
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to set key: {}", e))
    }

    async fn get(&self, key: &str) -> Result<Option<String>, anyhow::Error> {
        let mut conn = self.manager.clone();
        redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to get key: {}", e))
    }

    async fn take(&self, key: &str) -> Result<Option<String>, anyhow::Error> {
        let mut conn = self.manager.clone();
        redis::cmd("GETDEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to take key: {}", e))
    }

    async fn delete(&self, key: &str) -> Result<(), anyhow::Error> {
        let mut conn = self.manager.clone();
        redis::cmd("DEL")
            .arg(key)
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to delete key: {}", e))
    }

    async fn incr(&self, key: &str) -> Result<i64, anyhow::Error> {
        let mut conn = self.manager.clone();
        redis::cmd("INCR")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to increment key: {}", e))
    }

    async fn revoke_session(&self, jti: &str, ttl_seconds: u64) -> Result<(), anyhow::Error> {
        self.put(&revocation_key(jti), "revoked", ttl_seconds).await
    }

    async fn is_revoked(&self, jti: &str) -> Result<bool, anyhow::Error> {
        let mut conn = self.manager.clone();
        let exists: bool = redis::cmd("EXISTS")
            .arg(revocation_key(jti))
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to check revocation: {}", e))?;

        Ok(exists)
    }

    async fn health_check(&self) -> Result<(), anyhow::Error> {
        let mut conn = self.manager.clone();
        redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Redis health check failed: {}", e))
    }
}

/// In-memory store for tests. TTLs are honored on read so expiry behavior
/// matches the real store.
#[derive(Default)]
pub struct MemoryStore {
    entries: std::sync::Mutex<std::collections::HashMap<String, MemoryEntry>>,
}

struct MemoryEntry {
    value: String,
    expires_at: Option<std::time::Instant>,
}

impl MemoryEntry {
    fn is_expired(&self) -> bool {
        self.expires_at
            .map(|at| std::time::Instant::now() >= at)
            .unwrap_or(false)
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (unexpired) entries; used by tests asserting that
    /// login-start left nothing behind.
    pub fn live_entries(&self) -> usize {
        let guard = self.entries.lock().expect("memory store mutex poisoned");
        guard.values().filter(|e| !e.is_expired()).count()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        let guard = self.entries.lock().expect("memory store mutex poisoned");
        guard.get(key).map(|e| !e.is_expired()).unwrap_or(false)
    }

    fn read(&self, key: &str, remove: bool) -> Option<String> {
        let mut guard = self.entries.lock().expect("memory store mutex poisoned");
        let expired = guard.get(key).map(MemoryEntry::is_expired)?;
        if expired {
            guard.remove(key);
            return None;
        }
        if remove {
            guard.remove(key).map(|entry| entry.value)
        } else {
            guard.get(key).map(|entry| entry.value.clone())
        }
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn put(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<(), anyhow::Error> {
        let mut guard = self.entries.lock().expect("memory store mutex poisoned");
        guard.insert(
            key.to_string(),
            MemoryEntry {
                value: value.to_string(),
                expires_at: Some(
                    std::time::Instant::now() + std::time::Duration::from_secs(ttl_seconds),
                ),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, anyhow::Error> {
        Ok(self.read(key, false))
    }

    async fn take(&self, key: &str) -> Result<Option<String>, anyhow::Error> {
        Ok(self.read(key, true))
    }

    async fn delete(&self, key: &str) -> Result<(), anyhow::Error> {
        let mut guard = self.entries.lock().expect("memory store mutex poisoned");
        guard.remove(key);
        Ok(())
    }

    async fn incr(&self, key: &str) -> Result<i64, anyhow::Error> {
        let mut guard = self.entries.lock().expect("memory store mutex poisoned");
        let (next, expires_at) = match guard.get(key) {
            Some(entry) if !entry.is_expired() => {
                (entry.value.parse::<i64>().unwrap_or(0) + 1, entry.expires_at)
            }
            _ => (1, None),
        };
        guard.insert(
            key.to_string(),
            MemoryEntry {
                value: next.to_string(),
                expires_at,
            },
        );
        Ok(next)
    }

    async fn revoke_session(&self, jti: &str, ttl_seconds: u64) -> Result<(), anyhow::Error> {
        self.put(&revocation_key(jti), "revoked", ttl_seconds).await
    }

    async fn is_revoked(&self, jti: &str) -> Result<bool, anyhow::Error> {
        Ok(self.read(&revocation_key(jti), false).is_some())
    }

    async fn health_check(&self) -> Result<(), anyhow::Error> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn take_is_single_use() {
        let store = MemoryStore::new();
        store.put("magic:tok", "payload", 60).await.unwrap();

        assert_eq!(store.take("magic:tok").await.unwrap().as_deref(), Some("payload"));
        assert_eq!(store.take("magic:tok").await.unwrap(), None);
    }

    #[tokio::test]
    async fn incr_counts_from_one() {
        let store = MemoryStore::new();
        assert_eq!(store.incr("otp_attempts:a@x.com").await.unwrap(), 1);
        assert_eq!(store.incr("otp_attempts:a@x.com").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn expired_entries_read_as_absent() {
        let store = MemoryStore::new();
        store.put("otp:a@x.com", "123456", 0).await.unwrap();
        assert_eq!(store.get("otp:a@x.com").await.unwrap(), None);
    }

    #[tokio::test]
    async fn revocation_is_per_session_id() {
        let store = MemoryStore::new();
        store.revoke_session("jti-1", 60).await.unwrap();

        assert!(store.is_revoked("jti-1").await.unwrap());
        assert!(!store.is_revoked("jti-2").await.unwrap());
    }
}
