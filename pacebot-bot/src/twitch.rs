//! pacebot-bot/src/twitch.rs
//!
//! Twitch front-end: IRC session, relay push handling, periodic
//! membership reconciliation, and the chat pipeline.

use std::sync::Arc;
use std::time::Duration;

use tokio::time;
use tracing::{debug, error, info, warn};

use pacebot_common::models::platform::Platform;
use pacebot_common::models::relay::{RaceRoomPayload, RelayEnvelope, RelayEvent, StreamAlertPayload};
use pacebot_common::traits::api_traits::BotApiClient;
use pacebot_core::api::HttpApiClient;
use pacebot_core::membership::MembershipStore;
use pacebot_core::platforms::twitch_irc::{TwitchIrcCredentials, TwitchIrcPlatform};
use pacebot_core::platforms::{PlatformAuth, PlatformIntegration};
use pacebot_core::relay::RelayClient;
use pacebot_core::services::ChatService;
use pacebot_core::Error;

use crate::health;
use crate::Args;

pub async fn run(args: Args) -> Result<(), Error> {
    let login = std::env::var("TWITCH_BOT_LOGIN")
        .map_err(|_| Error::Config("TWITCH_BOT_LOGIN is not set".into()))?;
    let oauth_token = std::env::var("TWITCH_BOT_OAUTH_TOKEN")
        .map_err(|_| Error::Config("TWITCH_BOT_OAUTH_TOKEN is not set".into()))?;

    let api: Arc<dyn BotApiClient> = Arc::new(HttpApiClient::new(&args.api_url)?);
    let membership = Arc::new(MembershipStore::new(Platform::Twitch));

    let mut platform = TwitchIrcPlatform::new(TwitchIrcCredentials { login, oauth_token });
    platform.authenticate().await?;
    platform.connect().await?;
    let mut chat_lines = platform
        .take_incoming()
        .ok_or_else(|| Error::Platform("twitch irc produced no message stream".into()))?;
    let platform = Arc::new(platform);

    // Startup backstop: without an initial channel list there is nothing
    // to serve, so this one is allowed to be fatal.
    membership
        .reconcile(api.as_ref(), platform.as_ref())
        .await?;
    info!("twitch front-end ready; serving {} channel(s)", membership.joined_count());

    let mut relay = RelayClient::connect(&args.relay_url, "twitch-bot");
    let relay_events = relay.take_incoming();

    health::spawn(args.health_addr.clone(), relay.status_watch(), membership.clone());

    // Relay pushes mutate membership immediately, ahead of the reconcile tick.
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

    // Periodic reconciliation: the correctness backstop for any push
    // missed while the relay was down.
    {
        let api_for_tick = api.clone();
        let membership_for_tick = membership.clone();
        let platform_for_tick = platform.clone();
        let interval = Duration::from_secs(args.reconcile_interval_secs);
        tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
            // First tick fires immediately; startup already reconciled.
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

    let chat = ChatService::new(Platform::Twitch, api.clone(), membership.clone());

    loop {
        tokio::select! {
            line = chat_lines.recv() => {
                let Some(line) = line else {
                    error!("twitch irc message stream ended; exiting");
                    break;
                };
                if let Some(reply) = chat
                    .handle_chat_line(&line.channel, &line.channel, &line.login, &line.text)
                    .await
                {
                    if let Err(e) = platform.send_message(&reply.channel, &reply.text).await {
                        warn!("reply to '{}' failed: {e}", reply.channel);
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("ctrl-c received; shutting down twitch front-end");
                break;
            }
        }
    }

    relay.shutdown();
    Ok(())
}

async fn handle_relay_event(
    membership: &MembershipStore,
    platform: &Arc<TwitchIrcPlatform>,
    envelope: RelayEnvelope,
) {
    debug!("relay push '{}' from '{}'", envelope.event.event_name(), envelope.source);
    match &envelope.event {
        RelayEvent::JoinChannel(_) | RelayEvent::LeaveChannel(_) | RelayEvent::ConfigUpdate(_) => {
            if let Err(e) = membership.apply_push(platform.as_ref(), &envelope.event).await {
                warn!(
                    "push '{}' failed: {e}; next reconcile will retry",
                    envelope.event.event_name()
                );
            }
        }
        RelayEvent::StreamAlert(alert) => announce_stream(membership, platform, alert).await,
        RelayEvent::WeeklyRaceRoomCreated(race) => {
            announce_race_room(membership, platform, race).await
        }
    }
}

async fn announce_stream(
    membership: &MembershipStore,
    platform: &Arc<TwitchIrcPlatform>,
    alert: &StreamAlertPayload,
) {
    let text = match &alert.game_name {
        Some(game) => format!("{} is live with {}: {} {}", alert.user_name, game, alert.title, alert.stream_url),
        None => format!("{} is live: {} {}", alert.user_name, alert.title, alert.stream_url),
    };
    for config in membership.joined_configs() {
        if !config.enable_stream_alerts {
            continue;
        }
        if let Err(e) = platform.send_message(&config.name, &text).await {
            warn!("stream alert to '{}' failed: {e}", config.name);
        }
    }
}

async fn announce_race_room(
    membership: &MembershipStore,
    platform: &Arc<TwitchIrcPlatform>,
    race: &RaceRoomPayload,
) {
    let text = format!("Weekly race room is up: {}", race.race_room_url);
    for config in membership.joined_configs() {
        if !config.enable_weekly_race_room_alert {
            continue;
        }
        if let Err(e) = platform.send_message(&config.name, &text).await {
            warn!("race room alert to '{}' failed: {e}", config.name);
        }
    }
}
