//! Distributed migration lock.
//!
//! A PostgreSQL session-level advisory lock keyed by a deterministic hash of
//! the fully-qualified tracking table name serialises `migrate up`/`migrate
//! down` across processes and pods. The guard releases the lock on all exit
//! paths; closing the session releases it regardless.

use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::config::LockingConfig;
use crate::error::ConfitureError;

/// Poll interval while waiting for the lock.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Derive the advisory lock key from the tracking table name.
///
/// Every process derives the same 64-bit key without coordination.
pub fn lock_key(tracking_table: &str) -> i64 {
    let mut hasher = Sha256::new();
    hasher.update(b"confiture:migration-lock:");
    hasher.update(tracking_table.as_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    i64::from_be_bytes(bytes)
}

/// Migration lock bound to a target database.
pub struct MigrationLock {
    database_url: String,
    config: LockingConfig,
    key: i64,
}

impl MigrationLock {
    pub fn new(database_url: &str, config: LockingConfig, tracking_table: &str) -> Self {
        Self {
            database_url: database_url.to_string(),
            config,
            key: lock_key(tracking_table),
        }
    }

    /// Acquire the lock, waiting up to `timeout_ms`.
    ///
    /// With locking disabled this returns a no-op guard; dangerous in
    /// multi-writer environments.
    pub fn acquire(&self) -> Result<LockGuard, ConfitureError> {
        if !self.config.enabled {
            warn!("migration locking disabled; concurrent runs are not serialised");
            return Ok(LockGuard { client: None, key: self.key });
        }

        // Dedicated session: an advisory lock is session-scoped, so the
        // guard owns its connection and release follows from drop.
        let mut client = postgres::Client::connect(&self.database_url, postgres::NoTls)
            .map_err(|e| ConfitureError::Config(format!("Database connection failed: {}", e)))?;

        let deadline = Instant::now() + Duration::from_millis(self.config.timeout_ms);
        loop {
            let row = client
                .query_one("SELECT pg_try_advisory_lock($1)", &[&self.key])
                .map_err(|e| ConfitureError::LockAcquisition {
                    message: format!("Cannot acquire migration lock: {}", e),
                    timeout: false,
                })?;
            let acquired: bool = row.get(0);
            if acquired {
                debug!(key = self.key, "acquired migration lock");
                return Ok(LockGuard {
                    client: Some(client),
                    key: self.key,
                });
            }

            if Instant::now() >= deadline {
                return Err(ConfitureError::LockAcquisition {
                    message: format!(
                        "Timed out after {} ms waiting for the migration lock. Likely causes: \
                         another migration is running, a stale session still holds the lock, or \
                         the timeout is too low for your environment.",
                        self.config.timeout_ms
                    ),
                    timeout: true,
                });
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }
}

/// Scoped lock handle. Dropping it releases the advisory lock.
pub struct LockGuard {
    client: Option<postgres::Client>,
    key: i64,
}

impl LockGuard {
    /// True when this guard actually holds a lock (locking enabled).
    pub fn is_held(&self) -> bool {
        self.client.is_some()
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Some(mut client) = self.client.take() {
            // Best effort: the session close would release it anyway
            let _ = client.execute("SELECT pg_advisory_unlock($1)", &[&self.key]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_key_deterministic() {
        assert_eq!(lock_key("tb_confiture"), lock_key("tb_confiture"));
        assert_ne!(lock_key("tb_confiture"), lock_key("public.tb_confiture"));
    }

    #[test]
    fn test_disabled_lock_is_noop() {
        let lock = MigrationLock::new(
            "postgresql://localhost/unused",
            LockingConfig {
                enabled: false,
                timeout_ms: 10,
            },
            "tb_confiture",
        );
        let guard = lock.acquire().unwrap();
        assert!(!guard.is_held());
    }
}
