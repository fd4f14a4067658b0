use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use redis::{Client, Script, aio::ConnectionManager};

use crate::{BucketStore, IncrementCommit, RingrateError};

// HINCRBY runs first so a failure there leaves the hash untouched; a Lua error aborts
// the rest of the script. A field HINCRBY refuses as "not an integer" is overwritten with
// the delta; overflow is still an error. HDEL goes out in chunks because `unpack` is
// capped by the Lua stack (LUAI_MAXCSTACK, 8000).
const INCREMENT_COMMIT_LUA: &str = r#"
    local key = KEYS[1]

    local field = ARGV[1]
    local delta = ARGV[2]
    local ttl_ms = tonumber(ARGV[3])

    local new_count = redis.pcall("HINCRBY", key, field, delta)

    if type(new_count) == "table" and new_count.err then
        if not string.find(new_count.err, "not an integer", 1, true) then
            return new_count
        end

        redis.call("HSET", key, field, delta)
        new_count = tonumber(delta)
    end

    local chunk = tonumber(ARGV[4])
    local first = 5

    while first <= #ARGV do
        local last = math.min(first + chunk - 1, #ARGV)
        redis.call("HDEL", key, unpack(ARGV, first, last))
        first = last + 1
    end

    redis.call("PEXPIRE", key, ttl_ms)

    return new_count
"#;

/// Stale fields deleted per `HDEL` call inside the increment script.
const EVICT_CHUNK: usize = 1_000;

/// Redis-backed [`BucketStore`].
///
/// Holds one or more [`ConnectionManager`]s and hands them out round-robin. The
/// increment commit runs as a single Lua script, which Redis executes atomically, so
/// concurrent increments of one key from any number of processes never interleave.
///
/// # Data model
///
/// One hash per tracked identifier at `prefix:id`. Fields are bucket indices, values are
/// integer counts, and the key carries a `PEXPIRE` of one period, refreshed on every
/// increment.
///
/// # Examples
///
/// ```ignore
/// use ringrate::RedisStore;
///
/// let client = redis::Client::open("redis://127.0.0.1:6379/")?;
/// let store = RedisStore::from_client(client, 4).await?;
/// ```
pub struct RedisStore {
    connection_managers: Arc<Vec<ConnectionManager>>,
    track_index: AtomicUsize,
    increment_script: Script,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("connection_managers", &self.connection_managers.len())
            .field("track_index", &self.track_index)
            .field("increment_script", &self.increment_script)
            .finish()
    }
}

impl RedisStore {
    /// Create a store holding a single connection manager.
    pub async fn default_from_client(client: Client) -> Result<Self, RingrateError> {
        Self::from_client(client, 1).await
    }

    /// Create a store holding `connection_count` connection managers from `client`.
    pub async fn from_client(
        client: Client,
        connection_count: usize,
    ) -> Result<Self, RingrateError> {
        if connection_count == 0 {
            return Err(RingrateError::InvalidConnectionCount(
                "connection count must be > 0".to_string(),
            ));
        }

        let mut connection_managers = Vec::with_capacity(connection_count);

        for _ in 0..connection_count {
            connection_managers.push(client.get_connection_manager().await?);
        }

        Ok(Self::from_connection_managers(connection_managers))
    }

    /// Wrap an existing connection manager.
    pub fn from_connection_manager(connection_manager: ConnectionManager) -> Self {
        Self::from_connection_managers(vec![connection_manager])
    }

    fn from_connection_managers(connection_managers: Vec<ConnectionManager>) -> Self {
        Self {
            connection_managers: Arc::new(connection_managers),
            track_index: AtomicUsize::new(0),
            increment_script: Script::new(INCREMENT_COMMIT_LUA),
        }
    }

    /// Get a [`ConnectionManager`] from the pool.
    pub(crate) fn get(&self) -> ConnectionManager {
        let index = self.track_index.fetch_add(1, Ordering::Relaxed);
        self.connection_managers[index % self.connection_managers.len()].clone()
    } // end method get
} // end impl RedisStore

impl Clone for RedisStore {
    fn clone(&self) -> Self {
        Self {
            connection_managers: self.connection_managers.clone(),
            track_index: AtomicUsize::new(0),
            increment_script: self.increment_script.clone(),
        }
    }
}

#[async_trait]
impl BucketStore for RedisStore {
    async fn commit_increment(&self, commit: &IncrementCommit) -> Result<i64, RingrateError> {
        // PEXPIRE takes whole milliseconds and treats 0 as "delete now".
        let ttl_ms = u64::try_from(commit.ttl.as_nanos().div_ceil(1_000_000))
            .unwrap_or(u64::MAX)
            .max(1);

        let mut invocation = self.increment_script.key(commit.key.as_str());
        invocation
            .arg(commit.field.as_str())
            .arg(commit.delta)
            .arg(ttl_ms)
            .arg(EVICT_CHUNK);

        for field in &commit.evict {
            invocation.arg(field.as_str());
        }

        let mut connection_manager = self.get();
        let new_count: i64 = invocation.invoke_async(&mut connection_manager).await?;

        Ok(new_count)
    } // end method commit_increment

    async fn read_fields(
        &self,
        key: &str,
        fields: &[String],
    ) -> Result<Vec<Option<String>>, RingrateError> {
        if fields.is_empty() {
            return Ok(Vec::new());
        }

        let mut connection_manager = self.get();
        let values: Vec<Option<String>> = redis::cmd("HMGET")
            .arg(key)
            .arg(fields)
            .query_async(&mut connection_manager)
            .await?;

        if values.len() != fields.len() {
            return Err(RingrateError::Store(format!(
                "HMGET on {key} returned {} values for {} fields",
                values.len(),
                fields.len()
            )));
        }

        Ok(values)
    } // end method read_fields

    async fn delete(&self, key: &str) -> Result<(), RingrateError> {
        let mut connection_manager = self.get();
        redis::cmd("DEL")
            .arg(key)
            .query_async::<()>(&mut connection_manager)
            .await?;

        Ok(())
    }
}
