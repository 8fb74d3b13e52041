//! src/platforms/twitch_irc/runtime.rs

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::info;

use crate::platforms::{ChatPlatform, ConnectionStatus, PlatformAuth, PlatformIntegration};
use crate::Error;

use super::client::{ChatLine, TwitchIrcClient};

/// Credentials for the chat account the bot speaks as.
#[derive(Debug, Clone)]
pub struct TwitchIrcCredentials {
    pub login: String,
    /// Must carry the `oauth:` prefix Twitch expects on PASS.
    pub oauth_token: String,
}

pub struct TwitchIrcPlatform {
    credentials: TwitchIrcCredentials,
    connection_status: ConnectionStatus,
    client: Option<TwitchIrcClient>,
    incoming: Option<mpsc::UnboundedReceiver<ChatLine>>,
}

impl TwitchIrcPlatform {
    pub fn new(credentials: TwitchIrcCredentials) -> Self {
        Self {
            credentials,
            connection_status: ConnectionStatus::Disconnected,
            client: None,
            incoming: None,
        }
    }

    /// Hands out the inbound message stream; callable once per connect.
    pub fn take_incoming(&mut self) -> Option<mpsc::UnboundedReceiver<ChatLine>> {
        self.incoming.take()
    }
}

#[async_trait]
impl PlatformAuth for TwitchIrcPlatform {
    async fn authenticate(&mut self) -> Result<(), Error> {
        if self.credentials.login.is_empty() {
            return Err(Error::Platform("twitch irc credentials missing login".into()));
        }
        if !self.credentials.oauth_token.starts_with("oauth:") {
            return Err(Error::Platform(
                "twitch irc token must start with 'oauth:'".into(),
            ));
        }
        Ok(())
    }

    async fn is_authenticated(&self) -> Result<bool, Error> {
        Ok(self.credentials.oauth_token.starts_with("oauth:"))
    }
}

#[async_trait]
impl PlatformIntegration for TwitchIrcPlatform {
    async fn connect(&mut self) -> Result<(), Error> {
        if self.client.is_some() {
            info!("twitch irc: already connected");
            return Ok(());
        }

        let mut client =
            TwitchIrcClient::connect(&self.credentials.login, &self.credentials.oauth_token)
                .await
                .map_err(|e| {
                    self.connection_status = ConnectionStatus::Error(e.to_string());
                    Error::Platform(format!("twitch irc connect failed: {e}"))
                })?;

        self.incoming = client.incoming.take();
        self.client = Some(client);
        self.connection_status = ConnectionStatus::Connected;
        info!("twitch irc: connected as '{}'", self.credentials.login);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), Error> {
        self.connection_status = ConnectionStatus::Disconnected;
        if let Some(client) = self.client.take() {
            client.shutdown();
        }
        self.incoming = None;
        Ok(())
    }

    async fn send_message(&self, channel: &str, message: &str) -> Result<(), Error> {
        match &self.client {
            Some(client) => {
                client.send_privmsg(channel, message);
                Ok(())
            }
            None => Err(Error::Platform("no active twitch irc connection".into())),
        }
    }

    async fn get_connection_status(&self) -> Result<ConnectionStatus, Error> {
        Ok(self.connection_status.clone())
    }
}

#[async_trait]
impl ChatPlatform for TwitchIrcPlatform {
    async fn join_channel(&self, channel: &str) -> Result<(), Error> {
        match &self.client {
            Some(client) => {
                client.join_channel(channel);
                Ok(())
            }
            None => Err(Error::Platform("no active twitch irc connection".into())),
        }
    }

    async fn leave_channel(&self, channel: &str) -> Result<(), Error> {
        match &self.client {
            Some(client) => {
                client.part_channel(channel);
                Ok(())
            }
            None => Err(Error::Platform("no active twitch irc connection".into())),
        }
    }
}
