//! pacebot-bot/src/discord.rs
//!
//! Discord front-end. Guild membership is invite-driven, so reconciliation
//! only converges config and flags; GuildCreate/GuildDelete flow back to
//! the API as `active` flips (soft delete, never a hard delete).

use std::sync::Arc;
use std::time::Duration;

use tokio::time;
use tracing::{debug, error, info, warn};

use pacebot_common::models::channel::ChannelConfigPatch;
use pacebot_common::models::platform::Platform;
use pacebot_common::models::relay::{RaceRoomPayload, RelayEnvelope, RelayEvent, StreamAlertPayload};
use pacebot_common::traits::api_traits::BotApiClient;
use pacebot_core::api::HttpApiClient;
use pacebot_core::membership::MembershipStore;
use pacebot_core::platforms::discord::{DiscordEvent, DiscordPlatform};
use pacebot_core::platforms::{PlatformAuth, PlatformIntegration};
use pacebot_core::relay::RelayClient;
use pacebot_core::services::ChatService;
use pacebot_core::Error;

use crate::health;
use crate::Args;

pub async fn run(args: Args) -> Result<(), Error> {
    let token = std::env::var("DISCORD_BOT_TOKEN")
        .map_err(|_| Error::Config("DISCORD_BOT_TOKEN is not set".into()))?;

    let api: Arc<dyn BotApiClient> = Arc::new(HttpApiClient::new(&args.api_url)?);
    let membership = Arc::new(MembershipStore::new(Platform::Discord));

    let mut platform = DiscordPlatform::new(token);
    platform.authenticate().await?;
    platform.connect().await?;
    let mut gateway_events = platform
        .take_incoming()
        .ok_or_else(|| Error::Platform("discord produced no event stream".into()))?;
    let platform = Arc::new(platform);

    membership
        .reconcile(api.as_ref(), platform.as_ref())
        .await?;
    info!("discord front-end ready; serving {} guild(s)", membership.joined_count());

    let mut relay = RelayClient::connect(&args.relay_url, "discord-bot");
    let relay_events = relay.take_incoming();

    health::spawn(args.health_addr.clone(), relay.status_watch(), membership.clone());

    if let Some(mut events) = relay_events {
        let membership_for_push = membership.clone();
        let platform_for_push = platform.clone();
        tokio::spawn(async move {
            while let Some(envelope) = events.recv().await {
                handle_relay_event(&membership_for_push, &platform_for_push, envelope).await;
            }
            warn!("relay event stream ended");
        });
    }

    {
        let api_for_tick = api.clone();
        let membership_for_tick = membership.clone();
        let platform_for_tick = platform.clone();
        let interval = Duration::from_secs(args.reconcile_interval_secs);
        tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match membership_for_tick
                    .reconcile(api_for_tick.as_ref(), platform_for_tick.as_ref())
                    .await
                {
                    Ok(summary) => debug!("reconcile pass: {summary:?}"),
                    Err(e) => warn!("reconcile pass failed: {e}"),
                }
            }
        });
    }

    let chat = ChatService::new(Platform::Discord, api.clone(), membership.clone());

    loop {
        tokio::select! {
            event = gateway_events.recv() => {
                let Some(event) = event else {
                    error!("discord event stream ended; exiting");
                    break;
                };
                handle_gateway_event(&chat, &api, &platform, event).await;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("ctrl-c received; shutting down discord front-end");
                break;
            }
        }
    }

    relay.shutdown();
    Ok(())
}

async fn handle_gateway_event(
    chat: &ChatService,
    api: &Arc<dyn BotApiClient>,
    platform: &Arc<DiscordPlatform>,
    event: DiscordEvent,
) {
    match event {
        DiscordEvent::Message(msg) => {
            // DMs have no guild config; text commands are guild-only.
            let Some(guild_id) = msg.guild_id else {
                return;
            };
            if let Some(reply) = chat
                .handle_chat_line(&guild_id, &msg.channel_id, &msg.username, &msg.text)
                .await
            {
                if let Err(e) = platform.send_message(&reply.channel, &reply.text).await {
                    warn!("reply to channel '{}' failed: {e}", reply.channel);
                }
            }
        }
        DiscordEvent::GuildAdded { guild_id, name } => {
            info!("added to guild '{name}' ({guild_id})");
            let patch = ChannelConfigPatch {
                name: Some(name),
                active: Some(true),
                ..Default::default()
            };
            match api.update_channel_config(&guild_id, &patch).await {
                Ok(config) => chat.membership().apply_config(config),
                Err(e) => warn!("could not activate guild {guild_id}: {e}"),
            }
        }
        DiscordEvent::GuildRemoved { guild_id } => {
            info!("removed from guild {guild_id}");
            let patch = ChannelConfigPatch {
                active: Some(false),
                ..Default::default()
            };
            if let Err(e) = api.update_channel_config(&guild_id, &patch).await {
                warn!("could not deactivate guild {guild_id}: {e}");
            }
        }
    }
}

async fn handle_relay_event(
    membership: &MembershipStore,
    platform: &Arc<DiscordPlatform>,
    envelope: RelayEnvelope,
) {
    debug!("relay push '{}' from '{}'", envelope.event.event_name(), envelope.source);
    match &envelope.event {
        // Twitch-scoped membership pushes; nothing to do here.
        RelayEvent::JoinChannel(_) | RelayEvent::LeaveChannel(_) => {}
        RelayEvent::ConfigUpdate(update) => {
            membership.apply_config(update.config.clone());
            info!("config updated for '{}'", update.channel_name);
        }
        RelayEvent::StreamAlert(alert) => announce_stream(membership, platform, alert).await,
        RelayEvent::WeeklyRaceRoomCreated(race) => {
            announce_race_room(membership, platform, race).await
        }
    }
}

async fn announce_stream(
    membership: &MembershipStore,
    platform: &Arc<DiscordPlatform>,
    alert: &StreamAlertPayload,
) {
    let text = match &alert.game_name {
        Some(game) => format!("**{}** is live with {}: {} {}", alert.user_name, game, alert.title, alert.stream_url),
        None => format!("**{}** is live: {} {}", alert.user_name, alert.title, alert.stream_url),
    };
    for config in membership.joined_configs() {
        if !config.enable_stream_alerts {
            continue;
        }
        let Some(channel_id) = config.stream_alerts_channel_id else {
            warn!("guild '{}' wants stream alerts but has no alert channel", config.name);
            continue;
        };
        if let Err(e) = platform.send_message(&channel_id, &text).await {
            warn!("stream alert to guild '{}' failed: {e}", config.name);
        }
    }
}

async fn announce_race_room(
    membership: &MembershipStore,
    platform: &Arc<DiscordPlatform>,
    race: &RaceRoomPayload,
) {
    for config in membership.joined_configs() {
        if !config.enable_weekly_race_room_alert {
            continue;
        }
        let Some(channel_id) = config.weekly_race_alert_channel_id else {
            warn!("guild '{}' wants race alerts but has no alert channel", config.name);
            continue;
        };
        let text = match &config.weekly_race_alert_role_id {
            Some(role_id) => format!("<@&{role_id}> Weekly race room is up: {}", race.race_room_url),
            None => format!("Weekly race room is up: {}", race.race_room_url),
        };
        if let Err(e) = platform.send_message(&channel_id, &text).await {
            warn!("race room alert to guild '{}' failed: {e}", config.name);
        }
    }
}
