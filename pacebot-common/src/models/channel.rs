// File: pacebot-common/src/models/channel.rs

use serde::{Deserialize, Serialize};

use crate::models::platform::Platform;

/// One platform community (Twitch channel or Discord guild) the bot
/// serves, as stored by the central API.
///
/// Removal is a soft delete: `active` flips to `false` on a kick/leave and
/// back to `true` on re-join, so history survives and re-joins are
/// idempotent. At most one record exists per `(platform, id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelConfig {
    /// Platform-native guild/channel id.
    pub id: String,
    pub name: String,
    pub platform: Platform,
    pub active: bool,
    /// Single character that marks a text command, e.g. `!`.
    pub command_prefix: String,
    pub text_command_cooldown_seconds: u32,

    #[serde(default)]
    pub enable_stream_alerts: bool,
    #[serde(default)]
    pub stream_alerts_channel_id: Option<String>,
    #[serde(default)]
    pub enable_weekly_race_alert: bool,
    #[serde(default)]
    pub enable_weekly_race_room_alert: bool,
    #[serde(default)]
    pub weekly_race_alert_channel_id: Option<String>,
    #[serde(default)]
    pub weekly_race_alert_role_id: Option<String>,
}

/// Partial update sent to the API's PATCH endpoint. Absent fields are
/// left untouched server-side.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelConfigPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_command_cooldown_seconds: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_stream_alerts: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_weekly_race_room_alert: Option<bool>,
}
