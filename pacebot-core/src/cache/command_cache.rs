// File: src/cache/command_cache.rs
//
// Time-bounded command lookup cache. Resolution order: fresh cache entry,
// then the API (by name or alias), then a stale cache entry when the API
// is unreachable. Eviction is lazy: staleness is checked on read, nothing
// sweeps in the background. Errors are logged here; callers only ever see
// `Option<Command>` (fail-closed).

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use pacebot_common::models::command::Command;
use pacebot_common::traits::api_traits::BotApiClient;

/// Default staleness window for cached entries.
pub const DEFAULT_TTL_SECONDS: i64 = 600;

#[derive(Debug, Clone)]
struct CacheEntry {
    command: Command,
    stale_after: DateTime<Utc>,
}

pub struct CommandCache {
    api: Arc<dyn BotApiClient>,
    ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry>>,
    /// One refresh lock per key, so concurrent stale lookups for the same
    /// name collapse into a single API call instead of a thundering herd.
    refresh_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl CommandCache {
    pub fn new(api: Arc<dyn BotApiClient>) -> Self {
        Self::with_ttl(api, Duration::seconds(DEFAULT_TTL_SECONDS))
    }

    pub fn with_ttl(api: Arc<dyn BotApiClient>, ttl: Duration) -> Self {
        Self {
            api,
            ttl,
            entries: Mutex::new(HashMap::new()),
            refresh_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Resolves `name` (canonical or alias, case-insensitive) to its
    /// definition, or `None` when nothing matches or the API is down with
    /// no cached fallback.
    pub async fn resolve(&self, name: &str) -> Option<Command> {
        let key = name.to_lowercase();

        if let Some(command) = self.fresh(&key).await {
            return Some(command);
        }

        let refresh_lock = self.refresh_lock(&key).await;
        let _guard = refresh_lock.lock().await;

        // Another task may have refreshed while we waited on the lock.
        if let Some(command) = self.fresh(&key).await {
            return Some(command);
        }

        match self.api.find_command(&key).await {
            Ok(Some(command)) => {
                self.store(&command).await;
                Some(command)
            }
            Ok(None) => {
                debug!("no command matches '{key}'");
                None
            }
            Err(e) => {
                let stale = self
                    .entries
                    .lock()
                    .await
                    .get(&key)
                    .map(|entry| entry.command.clone());
                match stale {
                    Some(command) => {
                        warn!("command lookup for '{key}' failed ({e}); serving stale entry");
                        Some(command)
                    }
                    None => {
                        warn!("command lookup for '{key}' failed ({e}); no cached fallback");
                        None
                    }
                }
            }
        }
    }

    async fn fresh(&self, key: &str) -> Option<Command> {
        let now = Utc::now();
        let entries = self.entries.lock().await;
        entries
            .get(key)
            .filter(|e| now < e.stale_after)
            .map(|e| e.command.clone())
    }

    /// Stores the command under its canonical name and every alias, so a
    /// follow-up lookup by any of its names is a hit.
    async fn store(&self, command: &Command) {
        let stale_after = Utc::now() + self.ttl;
        let mut entries = self.entries.lock().await;
        entries.insert(
            command.command.to_lowercase(),
            CacheEntry { command: command.clone(), stale_after },
        );
        for alias in &command.aliases {
            entries.insert(
                alias.to_lowercase(),
                CacheEntry { command: command.clone(), stale_after },
            );
        }
    }

    async fn refresh_lock(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.refresh_locks.lock().await;
        locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
