//! src/api/mod.rs
//!
//! reqwest-backed implementation of the central API contract. Every call
//! carries a bounded timeout, and reads retry a small bounded number of
//! times with exponential spacing, so a hung API cannot stall message
//! handling. Usage logging never retries: it is fire-and-forget by
//! contract and the caller only logs failures.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::warn;

use pacebot_common::error::Error;
use pacebot_common::models::channel::{ChannelConfig, ChannelConfigPatch};
use pacebot_common::models::command::{Command, CommandUsageLog};
use pacebot_common::models::platform::Platform;
use pacebot_common::traits::api_traits::BotApiClient;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
const RETRY_BASE_DELAY: Duration = Duration::from_millis(250);
const MAX_ATTEMPTS: u32 = 3;

pub struct HttpApiClient {
    base_url: String,
    client: Client,
}

impl HttpApiClient {
    pub fn new(base_url: &str) -> Result<Self, Error> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_channels(&self, url: &str) -> Result<Vec<ChannelConfig>, Error> {
        let resp = self.client.get(url).send().await?.error_for_status()?;
        Ok(resp.json::<Vec<ChannelConfig>>().await?)
    }

    async fn get_command(&self, url: &str) -> Result<Option<Command>, Error> {
        let resp = self.client.get(url).send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resp = resp.error_for_status()?;
        Ok(Some(resp.json::<Command>().await?))
    }
}

/// Connection-level failures and 5xx responses are worth another attempt;
/// anything the server rejected outright (4xx) is not.
fn is_transient(err: &Error) -> bool {
    match err {
        Error::Http(e) => {
            e.is_timeout() || e.is_connect() || e.status().is_none_or(|s| s.is_server_error())
        }
        _ => false,
    }
}

async fn retry_delay(what: &str, attempt: u32, err: &Error) {
    let delay = RETRY_BASE_DELAY * 2u32.pow(attempt - 1);
    warn!("{what}: attempt {attempt} failed ({err}); retrying in {delay:?}");
    tokio::time::sleep(delay).await;
}

#[async_trait]
impl BotApiClient for HttpApiClient {
    async fn active_channels(&self, platform: Platform) -> Result<Vec<ChannelConfig>, Error> {
        let url = self.url(&format!("/channels?platform={platform}&active=true"));
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.get_channels(&url).await {
                Ok(channels) => return Ok(channels),
                Err(e) if attempt < MAX_ATTEMPTS && is_transient(&e) => {
                    retry_delay("active_channels", attempt, &e).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn find_command(&self, name: &str) -> Result<Option<Command>, Error> {
        let url = self.url(&format!("/commands/find?search={}", urlencoding::encode(name)));
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.get_command(&url).await {
                Ok(found) => return Ok(found),
                Err(e) if attempt < MAX_ATTEMPTS && is_transient(&e) => {
                    retry_delay("find_command", attempt, &e).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn log_command_usage(&self, usage: &CommandUsageLog) -> Result<(), Error> {
        let url = self.url("/commands/usage");
        self.client
            .post(&url)
            .json(usage)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn update_channel_config(
        &self,
        id: &str,
        patch: &ChannelConfigPatch,
    ) -> Result<ChannelConfig, Error> {
        let url = self.url(&format!("/channels/{}", urlencoding::encode(id)));
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = async {
                let resp = self
                    .client
                    .patch(&url)
                    .json(patch)
                    .send()
                    .await?
                    .error_for_status()?;
                Ok::<ChannelConfig, Error>(resp.json::<ChannelConfig>().await?)
            }
            .await;
            match result {
                Ok(config) => return Ok(config),
                Err(e) if attempt < MAX_ATTEMPTS && is_transient(&e) => {
                    retry_delay("update_channel_config", attempt, &e).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
