// File: pacebot-common/src/traits/api_traits.rs

use async_trait::async_trait;

use crate::error::Error;
use crate::models::channel::{ChannelConfig, ChannelConfigPatch};
use crate::models::command::{Command, CommandUsageLog};
use crate::models::platform::Platform;

/// Typed contract against the central CRUD API.
///
/// The HTTP framing lives in `pacebot-core::api`; everything else talks to
/// this trait so tests can substitute an in-memory implementation.
#[async_trait]
pub trait BotApiClient: Send + Sync {
    /// Channels whose `active` flag is set for the given platform.
    async fn active_channels(&self, platform: Platform) -> Result<Vec<ChannelConfig>, Error>;

    /// Exact name-or-alias lookup, case-insensitive. `Ok(None)` when
    /// nothing matches.
    async fn find_command(&self, name: &str) -> Result<Option<Command>, Error>;

    /// Usage record; callers treat failures as log-and-move-on.
    async fn log_command_usage(&self, usage: &CommandUsageLog) -> Result<(), Error>;

    /// Partial update of one channel config; returns the updated record.
    async fn update_channel_config(
        &self,
        id: &str,
        patch: &ChannelConfigPatch,
    ) -> Result<ChannelConfig, Error>;
}
