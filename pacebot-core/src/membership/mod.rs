//! src/membership/mod.rs
//!
//! Channel membership store and API-driven reconciliation.
//!
//! Each bot process tracks which channels it is actually joined to plus
//! the per-channel config it last saw. Push events from the relay hub
//! mutate this immediately; a periodic `reconcile` against the API's
//! active list is the backstop for anything missed while disconnected.

use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use pacebot_common::error::Error;
use pacebot_common::models::channel::ChannelConfig;
use pacebot_common::models::platform::Platform;
use pacebot_common::models::relay::RelayEvent;
use pacebot_common::traits::api_traits::BotApiClient;

use crate::platforms::ChatPlatform;

/// Membership state from this process's point of view. A channel the
/// process has never seen has no entry at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Joined,
    Left,
}

#[derive(Debug, Clone)]
struct ChannelEntry {
    state: ChannelState,
    /// Last config seen for this channel; `None` until a reconcile pass or
    /// a configUpdate push supplies one.
    config: Option<ChannelConfig>,
}

/// Outcome of one reconciliation pass, for logging.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct ReconcileSummary {
    pub joined: usize,
    pub parted: usize,
    pub unchanged: usize,
}

pub struct MembershipStore {
    platform: Platform,
    channels: Mutex<HashMap<String, ChannelEntry>>,
}

impl MembershipStore {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            channels: Mutex::new(HashMap::new()),
        }
    }

    /// Canonical map key: Twitch channels by lowercased login (leading `#`
    /// stripped), Discord guilds by their numeric id.
    fn normalize_key(&self, raw: &str) -> String {
        match self.platform {
            Platform::Twitch => raw.trim_start_matches('#').to_lowercase(),
            Platform::Discord => raw.to_string(),
        }
    }

    fn key_of(&self, config: &ChannelConfig) -> String {
        match self.platform {
            Platform::Twitch => self.normalize_key(&config.name),
            Platform::Discord => config.id.clone(),
        }
    }

    pub fn state(&self, channel: &str) -> Option<ChannelState> {
        let key = self.normalize_key(channel);
        self.channels.lock().get(&key).map(|e| e.state)
    }

    pub fn config_for(&self, channel: &str) -> Option<ChannelConfig> {
        let key = self.normalize_key(channel);
        self.channels.lock().get(&key).and_then(|e| e.config.clone())
    }

    pub fn joined_count(&self) -> usize {
        self.channels
            .lock()
            .values()
            .filter(|e| e.state == ChannelState::Joined)
            .count()
    }

    pub fn joined_channels(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .channels
            .lock()
            .iter()
            .filter(|(_, e)| e.state == ChannelState::Joined)
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Configs of currently-joined channels, for alert fan-out.
    pub fn joined_configs(&self) -> Vec<ChannelConfig> {
        self.channels
            .lock()
            .values()
            .filter(|e| e.state == ChannelState::Joined)
            .filter_map(|e| e.config.clone())
            .collect()
    }

    /// Idempotent join: a no-op when the channel is already joined. The
    /// platform call happens first; on failure the state is left as-is so
    /// the next reconcile pass retries. Two racing joins may repeat the
    /// platform call; platforms treat a duplicate join as a no-op and the
    /// entry converges to `Joined` either way.
    pub async fn join(&self, chat: &dyn ChatPlatform, channel: &str) -> Result<(), Error> {
        let key = self.normalize_key(channel);
        if self.state(&key) == Some(ChannelState::Joined) {
            debug!("join '{key}' skipped; already joined");
            return Ok(());
        }
        chat.join_channel(&key).await?;
        let mut channels = self.channels.lock();
        channels
            .entry(key.clone())
            .and_modify(|e| e.state = ChannelState::Joined)
            .or_insert(ChannelEntry { state: ChannelState::Joined, config: None });
        info!("joined channel '{key}'");
        Ok(())
    }

    /// Idempotent leave; the entry is kept (state `Left`) so the config
    /// survives a later re-activation.
    pub async fn leave(&self, chat: &dyn ChatPlatform, channel: &str) -> Result<(), Error> {
        let key = self.normalize_key(channel);
        if self.state(&key) != Some(ChannelState::Joined) {
            debug!("leave '{key}' skipped; not joined");
            return Ok(());
        }
        chat.leave_channel(&key).await?;
        if let Some(entry) = self.channels.lock().get_mut(&key) {
            entry.state = ChannelState::Left;
        }
        info!("left channel '{key}'");
        Ok(())
    }

    /// Full overwrite of the stored config. Repeated delivery of the same
    /// update converges instead of drifting.
    pub fn apply_config(&self, config: ChannelConfig) {
        let key = self.key_of(&config);
        let mut channels = self.channels.lock();
        channels
            .entry(key)
            .and_modify(|e| e.config = Some(config.clone()))
            .or_insert(ChannelEntry { state: ChannelState::Left, config: Some(config) });
    }

    /// Immediate application of one relay push event, ahead of the next
    /// reconcile tick. Safe to apply redundantly: joins and leaves no-op
    /// in the desired state and config updates overwrite.
    pub async fn apply_push(
        &self,
        chat: &dyn ChatPlatform,
        event: &RelayEvent,
    ) -> Result<(), Error> {
        match event {
            RelayEvent::JoinChannel(target) => self.join(chat, &target.channel_name).await,
            RelayEvent::LeaveChannel(target) => self.leave(chat, &target.channel_name).await,
            RelayEvent::ConfigUpdate(update) => {
                self.apply_config(update.config.clone());
                Ok(())
            }
            // Alerts never touch membership; the front-ends route them.
            RelayEvent::StreamAlert(_) | RelayEvent::WeeklyRaceRoomCreated(_) => Ok(()),
        }
    }

    /// Pulls the authoritative active list and converges the local joined
    /// set: join what is active remotely but not joined here, part what is
    /// joined here but inactive or absent remotely, overwrite configs.
    /// Per-channel platform failures are logged and retried next pass.
    pub async fn reconcile(
        &self,
        api: &dyn BotApiClient,
        chat: &dyn ChatPlatform,
    ) -> Result<ReconcileSummary, Error> {
        let active = api.active_channels(self.platform).await?;
        let mut summary = ReconcileSummary::default();

        let desired: HashMap<String, ChannelConfig> = active
            .into_iter()
            .filter(|c| c.active)
            .map(|c| (self.key_of(&c), c))
            .collect();

        for config in desired.values() {
            self.apply_config(config.clone());
        }

        let currently_joined = self.joined_channels();

        for key in desired.keys() {
            if self.state(key) == Some(ChannelState::Joined) {
                summary.unchanged += 1;
                continue;
            }
            match self.join(chat, key).await {
                Ok(()) => summary.joined += 1,
                Err(e) => warn!("reconcile: join '{key}' failed: {e}"),
            }
        }

        for key in currently_joined {
            if !desired.contains_key(&key) {
                match self.leave(chat, &key).await {
                    Ok(()) => summary.parted += 1,
                    Err(e) => warn!("reconcile: part '{key}' failed: {e}"),
                }
            }
        }

        info!(
            "reconcile: {} joined, {} parted, {} unchanged",
            summary.joined, summary.parted, summary.unchanged
        );
        Ok(summary)
    }
}
