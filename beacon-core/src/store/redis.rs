use std::fmt;

use async_trait::async_trait;
use redis::{AsyncCommands, Script, aio::ConnectionManager};
use tracing::{debug, info};

use super::{CasDecision, CasUpdate, CoordinationStore};
use crate::error::{BeaconError, Result};

/// Redis scripts for atomic operations
mod scripts {
    use redis::Script;

    /// Write ARGV[3] only if the key still holds what the caller read.
    ///
    /// ARGV[1] is `1` when a value was read (ARGV[2] holds it) and `0` when
    /// the key was absent.
    pub fn compare_and_set() -> Script {
        Script::new(
            r#"
            local current = redis.call('GET', KEYS[1])
            if ARGV[1] == '1' then
                if current ~= ARGV[2] then
                    return 0
                end
            elseif current then
                return 0
            end
            redis.call('SET', KEYS[1], ARGV[3])
            return 1
            "#,
        )
    }
}

/// Coordination store backed by a shared Redis instance.
///
/// The CAS is optimistic: read, run the callback, then let a Lua script
/// write only if nobody changed the key in between. Lost races re-run the
/// callback against the fresh value.
pub struct RedisCoordinationStore {
    conn: ConnectionManager,
    cas_script: Script,
    max_conflicts: u32,
}

impl fmt::Debug for RedisCoordinationStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisCoordinationStore")
            .field("connection", &"ConnectionManager")
            .field("max_conflicts", &self.max_conflicts)
            .finish()
    }
}

impl RedisCoordinationStore {
    pub const DEFAULT_MAX_CONFLICTS: u32 = 10;

    pub async fn connect(redis_url: &str) -> Result<Self> {
        info!(target: "usage::store", "Connecting to Redis coordination store at {}", redis_url);

        let client = redis::Client::open(redis_url).map_err(|e| {
            BeaconError::StoreUnavailable(format!("Failed to create Redis client: {e}"))
        })?;

        let conn = ConnectionManager::new(client).await.map_err(|e| {
            BeaconError::StoreUnavailable(format!("Failed to connect to Redis: {e}"))
        })?;

        Ok(Self::from_connection(conn))
    }

    pub fn from_connection(conn: ConnectionManager) -> Self {
        Self {
            conn,
            cas_script: scripts::compare_and_set(),
            max_conflicts: Self::DEFAULT_MAX_CONFLICTS,
        }
    }

    /// How many lost races a single CAS tolerates before giving up.
    pub fn with_max_conflicts(mut self, max_conflicts: u32) -> Self {
        self.max_conflicts = max_conflicts.max(1);
        self
    }
}

#[async_trait]
impl CoordinationStore for RedisCoordinationStore {
    async fn compare_and_swap(&self, key: &str, update: &mut CasUpdate<'_>) -> Result<()> {
        let mut conn = self.conn.clone();

        for attempt in 1..=self.max_conflicts {
            let current: Option<Vec<u8>> = conn.get(key).await.map_err(|e| {
                BeaconError::StoreUnavailable(format!("Redis GET {key} failed: {e}"))
            })?;

            let next = match update(current.as_deref())? {
                CasDecision::Keep => return Ok(()),
                CasDecision::Put(next) => next,
            };

            let expected_present = if current.is_some() { "1" } else { "0" };
            let swapped: i64 = self
                .cas_script
                .key(key)
                .arg(expected_present)
                .arg(current.unwrap_or_default())
                .arg(next)
                .invoke_async(&mut conn)
                .await
                .map_err(|e| {
                    BeaconError::StoreUnavailable(format!(
                        "Redis compare-and-set on {key} failed: {e}"
                    ))
                })?;

            if swapped == 1 {
                return Ok(());
            }
            debug!(target: "usage::store", key, attempt, "lost compare-and-set race, re-reading");
        }

        Err(BeaconError::StoreUnavailable(format!(
            "compare-and-swap on {key} lost {} consecutive races",
            self.max_conflicts
        )))
    }
}
