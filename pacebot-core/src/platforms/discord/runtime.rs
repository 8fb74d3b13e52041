//! src/platforms/discord/runtime.rs

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use twilight_gateway::{
    self as gateway, CloseFrame, Config, Event, EventTypeFlags, Intents, MessageSender, Shard,
    StreamExt as _,
};
use twilight_http::client::ClientBuilder;
use twilight_http::Client as HttpClient;
use twilight_model::gateway::payload::incoming::GuildCreate;
use twilight_model::id::marker::ChannelMarker;
use twilight_model::id::Id;

use crate::platforms::{ChatPlatform, ConnectionStatus, PlatformAuth, PlatformIntegration};
use crate::Error;

/// Gateway traffic the front-end cares about, already trimmed down.
#[derive(Debug, Clone)]
pub enum DiscordEvent {
    Message(DiscordMessageEvent),
    /// The bot was added to a guild (or the guild came up on connect).
    GuildAdded { guild_id: String, name: String },
    /// The bot was removed from a guild. Gateway outages are filtered out.
    GuildRemoved { guild_id: String },
}

#[derive(Debug, Clone)]
pub struct DiscordMessageEvent {
    pub guild_id: Option<String>,
    pub channel_id: String,
    pub user_id: String,
    pub username: String,
    pub text: String,
}

/// The shard runner: reads gateway events and forwards the trimmed-down
/// subset over `tx`.
async fn shard_runner(mut shard: Shard, tx: UnboundedSender<DiscordEvent>) {
    let shard_id = shard.id().number();
    info!("discord shard {shard_id} started");

    while let Some(item) = shard.next_event(EventTypeFlags::all()).await {
        let event = match item {
            Ok(event) => event,
            Err(e) => {
                error!("discord shard {shard_id}: error receiving event: {e:?}");
                continue;
            }
        };
        match event {
            Event::Ready(ready) => {
                info!("discord shard {shard_id} ready as {}", ready.user.name);
            }
            Event::MessageCreate(msg) => {
                if msg.author.bot {
                    continue;
                }
                let _ = tx.send(DiscordEvent::Message(DiscordMessageEvent {
                    guild_id: msg.guild_id.map(|id| id.to_string()),
                    channel_id: msg.channel_id.to_string(),
                    user_id: msg.author.id.to_string(),
                    username: msg.author.name.clone(),
                    text: msg.content.clone(),
                }));
            }
            Event::GuildCreate(created) => {
                if let GuildCreate::Available(guild) = *created {
                    let _ = tx.send(DiscordEvent::GuildAdded {
                        guild_id: guild.id.to_string(),
                        name: guild.name.clone(),
                    });
                }
            }
            Event::GuildDelete(deleted) => {
                // `unavailable` means a Discord outage, not a kick.
                if !deleted.unavailable.unwrap_or(false) {
                    let _ = tx.send(DiscordEvent::GuildRemoved {
                        guild_id: deleted.id.to_string(),
                    });
                }
            }
            other => {
                debug!("discord shard {shard_id}: unhandled event {:?}", other.kind());
            }
        }
    }

    warn!("discord shard {shard_id} event loop ended");
}

pub struct DiscordPlatform {
    token: String,
    connection_status: ConnectionStatus,
    incoming: Option<UnboundedReceiver<DiscordEvent>>,
    shard_tasks: Vec<JoinHandle<()>>,
    shard_senders: Vec<MessageSender>,
    http: Option<Arc<HttpClient>>,
}

impl DiscordPlatform {
    pub fn new(token: String) -> Self {
        Self {
            token,
            connection_status: ConnectionStatus::Disconnected,
            incoming: None,
            shard_tasks: Vec::new(),
            shard_senders: Vec::new(),
            http: None,
        }
    }

    /// Hands out the inbound event stream; callable once per connect.
    pub fn take_incoming(&mut self) -> Option<UnboundedReceiver<DiscordEvent>> {
        self.incoming.take()
    }
}

#[async_trait]
impl PlatformAuth for DiscordPlatform {
    async fn authenticate(&mut self) -> Result<(), Error> {
        if self.token.is_empty() {
            return Err(Error::Platform("discord token is empty".into()));
        }
        Ok(())
    }

    async fn is_authenticated(&self) -> Result<bool, Error> {
        Ok(!self.token.is_empty())
    }
}

#[async_trait]
impl PlatformIntegration for DiscordPlatform {
    async fn connect(&mut self) -> Result<(), Error> {
        if matches!(self.connection_status, ConnectionStatus::Connected) {
            info!("discord: already connected");
            return Ok(());
        }

        let (tx, rx) = unbounded_channel::<DiscordEvent>();
        self.incoming = Some(rx);

        let http = Arc::new(
            ClientBuilder::new()
                .token(self.token.clone())
                .timeout(Duration::from_secs(10))
                .build(),
        );
        self.http = Some(http.clone());

        let config = Config::new(
            self.token.clone(),
            Intents::GUILDS | Intents::GUILD_MESSAGES | Intents::MESSAGE_CONTENT,
        );
        let shards = gateway::create_recommended(&http, config, |_, builder| builder.build())
            .await
            .map_err(|e| Error::Platform(format!("create_recommended error: {e}")))?;

        for shard in shards {
            self.shard_senders.push(shard.sender());
            let tx_for_shard = tx.clone();
            self.shard_tasks
                .push(tokio::spawn(shard_runner(shard, tx_for_shard)));
        }

        self.connection_status = ConnectionStatus::Connected;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), Error> {
        self.connection_status = ConnectionStatus::Disconnected;

        for sender in &self.shard_senders {
            let _ = sender.close(CloseFrame::NORMAL);
        }
        for task in &mut self.shard_tasks {
            let _ = task.await;
        }
        self.shard_senders.clear();
        self.shard_tasks.clear();
        self.incoming = None;
        Ok(())
    }

    async fn send_message(&self, channel: &str, message: &str) -> Result<(), Error> {
        let channel_id: u64 = channel
            .parse()
            .map_err(|_| Error::Platform(format!("invalid discord channel id: {channel}")))?;
        let http = self
            .http
            .as_ref()
            .ok_or_else(|| Error::Platform("no active discord connection".into()))?;

        http.create_message(Id::<ChannelMarker>::new(channel_id))
            .content(message)
            .await
            .map_err(|e| Error::Platform(format!("discord send failed: {e}")))?;
        Ok(())
    }

    async fn get_connection_status(&self) -> Result<ConnectionStatus, Error> {
        Ok(self.connection_status.clone())
    }
}

#[async_trait]
impl ChatPlatform for DiscordPlatform {
    /// Guild membership is invite-driven on Discord; there is nothing for
    /// the bot to join, so membership ops only acknowledge the request.
    async fn join_channel(&self, _channel: &str) -> Result<(), Error> {
        Ok(())
    }

    async fn leave_channel(&self, _channel: &str) -> Result<(), Error> {
        Ok(())
    }
}
