// File: pacebot-core/tests/command_cache_tests.rs

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration as StaleDuration;
use tokio::time::{sleep, Duration};

use pacebot_common::error::Error;
use pacebot_common::models::channel::{ChannelConfig, ChannelConfigPatch};
use pacebot_common::models::command::{Command, CommandUsageLog};
use pacebot_common::models::platform::Platform;
use pacebot_common::traits::api_traits::BotApiClient;
use pacebot_core::cache::CommandCache;

/// API stub that serves a fixed command list, counts lookups, and can be
/// flipped into a failing state.
struct StubApi {
    commands: Vec<Command>,
    lookup_count: AtomicUsize,
    failing: AtomicBool,
    lookup_delay: Duration,
}

impl StubApi {
    fn with_commands(commands: Vec<Command>) -> Self {
        Self {
            commands,
            lookup_count: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
            lookup_delay: Duration::ZERO,
        }
    }

    fn lookups(&self) -> usize {
        self.lookup_count.load(Ordering::SeqCst)
    }

    fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl BotApiClient for StubApi {
    async fn active_channels(&self, _platform: Platform) -> Result<Vec<ChannelConfig>, Error> {
        Ok(vec![])
    }

    async fn find_command(&self, name: &str) -> Result<Option<Command>, Error> {
        self.lookup_count.fetch_add(1, Ordering::SeqCst);
        if !self.lookup_delay.is_zero() {
            sleep(self.lookup_delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Api("api is down".into()));
        }
        Ok(self.commands.iter().find(|c| c.matches(name)).cloned())
    }

    async fn log_command_usage(&self, _usage: &CommandUsageLog) -> Result<(), Error> {
        Ok(())
    }

    async fn update_channel_config(
        &self,
        _id: &str,
        _patch: &ChannelConfigPatch,
    ) -> Result<ChannelConfig, Error> {
        Err(Error::Api("not supported by this stub".into()))
    }
}

fn help_command() -> Command {
    Command {
        command: "help".into(),
        aliases: vec!["commands".into(), "h".into()],
        response: "Use !commands".into(),
        enabled: true,
        cooldown_seconds: None,
        tags: vec![],
    }
}

#[tokio::test]
async fn fresh_entry_hits_the_api_only_once() {
    let api = Arc::new(StubApi::with_commands(vec![help_command()]));
    let cache = CommandCache::new(api.clone());

    let first = cache.resolve("help").await.expect("should resolve");
    let second = cache.resolve("help").await.expect("should resolve");

    assert_eq!(first.response, "Use !commands");
    assert_eq!(second, first);
    assert_eq!(api.lookups(), 1);
}

#[tokio::test]
async fn alias_and_canonical_name_resolve_to_the_same_command() {
    let api = Arc::new(StubApi::with_commands(vec![help_command()]));
    let cache = CommandCache::new(api.clone());

    let by_alias = cache.resolve("commands").await.expect("alias should resolve");
    assert_eq!(by_alias.command, "help");

    // The entry was stored under every name, so these are cache hits.
    let by_name = cache.resolve("help").await.expect("name should resolve");
    let by_other_alias = cache.resolve("H").await.expect("alias should resolve");
    assert_eq!(by_name, by_alias);
    assert_eq!(by_other_alias, by_alias);
    assert_eq!(api.lookups(), 1);
}

#[tokio::test]
async fn stale_entry_triggers_a_refresh() {
    let api = Arc::new(StubApi::with_commands(vec![help_command()]));
    let cache = CommandCache::with_ttl(api.clone(), StaleDuration::milliseconds(40));

    cache.resolve("help").await.expect("should resolve");
    sleep(Duration::from_millis(80)).await;
    cache.resolve("help").await.expect("should resolve");

    assert_eq!(api.lookups(), 2);
}

#[tokio::test]
async fn stale_entry_is_served_when_the_api_is_down() {
    let api = Arc::new(StubApi::with_commands(vec![help_command()]));
    let cache = CommandCache::with_ttl(api.clone(), StaleDuration::milliseconds(40));

    cache.resolve("help").await.expect("should resolve");
    api.set_failing(true);
    sleep(Duration::from_millis(80)).await;

    let served = cache.resolve("help").await.expect("stale entry should be served");
    assert_eq!(served.response, "Use !commands");
    assert_eq!(api.lookups(), 2);
}

#[tokio::test]
async fn miss_with_no_cached_fallback_is_none() {
    let api = Arc::new(StubApi::with_commands(vec![help_command()]));
    let cache = CommandCache::new(api.clone());

    assert!(cache.resolve("nosuchcommand").await.is_none());

    api.set_failing(true);
    assert!(cache.resolve("alsonothing").await.is_none());
}

#[tokio::test]
async fn concurrent_stale_resolves_issue_one_lookup() {
    let mut api = StubApi::with_commands(vec![help_command()]);
    api.lookup_delay = Duration::from_millis(50);
    let api = Arc::new(api);
    let cache = CommandCache::with_ttl(api.clone(), StaleDuration::milliseconds(40));

    cache.resolve("help").await.expect("should resolve");
    assert_eq!(api.lookups(), 1);
    sleep(Duration::from_millis(80)).await;

    let (a, b, c, d, e) = tokio::join!(
        cache.resolve("help"),
        cache.resolve("help"),
        cache.resolve("help"),
        cache.resolve("help"),
        cache.resolve("help"),
    );
    for resolved in [a, b, c, d, e] {
        assert!(resolved.is_some());
    }

    // One refresh for the whole burst, not one per caller.
    assert_eq!(api.lookups(), 2);
}
