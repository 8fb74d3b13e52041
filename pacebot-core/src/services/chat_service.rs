//! src/services/chat_service.rs
//!
//! Inbound-message pipeline shared by both front-ends: prefix parse,
//! cooldown gate, cached command lookup, reply selection. The reply text
//! is returned to the caller for sending, but by that point the cooldown
//! is already placed, so two near-simultaneous messages cannot both fire.
//!
//! Failures are fail-closed: a user whose lookup fails gets no response
//! at all, and cooldown rejections are silent.

use std::sync::Arc;

use tracing::{debug, warn};

use pacebot_common::models::command::{Command, CommandUsageLog};
use pacebot_common::models::platform::Platform;
use pacebot_common::traits::api_traits::BotApiClient;

use crate::cache::CommandCache;
use crate::cooldown::{scope_key, CooldownTracker, CooldownVerdict};
use crate::membership::MembershipStore;

/// A reply the front-end should emit, plus where to emit it.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatReply {
    pub channel: String,
    pub text: String,
}

pub struct ChatService {
    platform: Platform,
    api: Arc<dyn BotApiClient>,
    cache: CommandCache,
    cooldowns: CooldownTracker,
    membership: Arc<MembershipStore>,
}

impl ChatService {
    pub fn new(
        platform: Platform,
        api: Arc<dyn BotApiClient>,
        membership: Arc<MembershipStore>,
    ) -> Self {
        let cache = CommandCache::new(api.clone());
        Self {
            platform,
            api,
            cache,
            cooldowns: CooldownTracker::new(),
            membership,
        }
    }

    /// Handles one inbound chat line. `channel_key` is the membership key
    /// (Twitch channel login / Discord guild id); `reply_channel` is where
    /// a reply goes (the same login on Twitch, the originating channel id
    /// on Discord).
    pub async fn handle_chat_line(
        &self,
        channel_key: &str,
        reply_channel: &str,
        username: &str,
        text: &str,
    ) -> Option<ChatReply> {
        let config = match self.membership.config_for(channel_key) {
            Some(config) => config,
            None => {
                debug!("no config for channel '{channel_key}'; ignoring message");
                return None;
            }
        };
        if !config.active {
            return None;
        }

        let trimmed = text.trim();
        let candidate = trimmed.strip_prefix(config.command_prefix.as_str())?;
        let name = candidate.split_whitespace().next()?;

        let scope = scope_key(name, channel_key);
        let channel_default = config.text_command_cooldown_seconds;

        // Fast reject before touching cache or API. Non-mutating, so a
        // blocked user does not keep pushing their own cooldown forward.
        if let CooldownVerdict::Blocked { remaining_seconds } =
            self.cooldowns.check(&scope, channel_default)
        {
            debug!("'{name}' on cooldown in '{channel_key}' ({remaining_seconds:.1}s left)");
            return None;
        }

        let command = self.cache.resolve(name).await?;
        if !command.enabled {
            debug!("command '{}' is disabled", command.command);
            return None;
        }

        // The real gate, with the command's effective cooldown. Placed
        // here, before any response I/O happens.
        let effective = command.effective_cooldown(channel_default);
        if let CooldownVerdict::Blocked { remaining_seconds } =
            self.cooldowns.try_acquire(&scope, effective)
        {
            debug!("'{name}' lost the cooldown race in '{channel_key}' ({remaining_seconds:.1}s left)");
            return None;
        }

        self.log_usage(&command, name, username);

        Some(ChatReply {
            channel: reply_channel.to_string(),
            text: command.response.clone(),
        })
    }

    /// Fire-and-forget usage POST; failures are logged, never retried.
    fn log_usage(&self, command: &Command, invoked_as: &str, username: &str) {
        let alias = (!command.command.eq_ignore_ascii_case(invoked_as))
            .then(|| invoked_as.to_lowercase());
        let usage = CommandUsageLog {
            command: command.command.clone(),
            alias,
            source: self.platform,
            username: username.to_string(),
            metadata: None,
        };
        let api = self.api.clone();
        tokio::spawn(async move {
            if let Err(e) = api.log_command_usage(&usage).await {
                warn!("usage log failed for '{}': {e}", usage.command);
            }
        });
    }

    pub fn membership(&self) -> &Arc<MembershipStore> {
        &self.membership
    }
}
