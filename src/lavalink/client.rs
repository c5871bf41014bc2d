use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION},
    Client, Response,
};
use serenity::model::id::GuildId;
use std::time::Duration;
use tracing::debug;

use super::model::{ErrorBody, LoadResult, Track, UpdatePlayer, UpdateSession};
use crate::error::BackendError;

/// Upper bound for any single REST call to the node.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// REST control channel of a Lavalink v4 node.
#[derive(Debug, Clone)]
pub struct LavalinkRest {
    http: Client,
    base_url: String,
}

impl LavalinkRest {
    pub fn new(address: &str, password: &str, secure: bool) -> Result<Self, BackendError> {
        Self::with_timeout(address, password, secure, REQUEST_TIMEOUT)
    }

    pub fn with_timeout(
        address: &str,
        password: &str,
        secure: bool,
        timeout: Duration,
    ) -> Result<Self, BackendError> {
        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(password)
            .map_err(|_| BackendError::Config("password is not a valid header value".into()))?;
        headers.insert(AUTHORIZATION, auth);

        let http = Client::builder()
            .default_headers(headers)
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()?;
        let scheme = if secure { "https" } else { "http" };

        Ok(Self {
            http,
            base_url: format!("{scheme}://{address}/v4"),
        })
    }

    pub async fn load_tracks(&self, identifier: &str) -> Result<LoadResult, BackendError> {
        let response = self
            .http
            .get(format!("{}/loadtracks", self.base_url))
            .query(&[("identifier", identifier)])
            .send()
            .await?;

        let result: LoadResult = check(response).await?.json().await?;
        debug!(identifier, "Tracks cargados");
        Ok(result)
    }

    pub async fn decode_track(&self, encoded: &str) -> Result<Track, BackendError> {
        let response = self
            .http
            .get(format!("{}/decodetrack", self.base_url))
            .query(&[("encodedTrack", encoded)])
            .send()
            .await?;

        Ok(check(response).await?.json().await?)
    }

    pub async fn update_player(
        &self,
        session_id: &str,
        guild_id: GuildId,
        body: &UpdatePlayer,
    ) -> Result<(), BackendError> {
        let response = self
            .http
            .patch(format!(
                "{}/sessions/{}/players/{}",
                self.base_url, session_id, guild_id
            ))
            .json(body)
            .send()
            .await?;

        check(response).await?;
        Ok(())
    }

    pub async fn destroy_player(
        &self,
        session_id: &str,
        guild_id: GuildId,
    ) -> Result<(), BackendError> {
        let response = self
            .http
            .delete(format!(
                "{}/sessions/{}/players/{}",
                self.base_url, session_id, guild_id
            ))
            .send()
            .await?;

        check(response).await?;
        Ok(())
    }

    /// Asks the node to keep `session_id` alive for `timeout_secs` after a disconnect.
    pub async fn enable_resuming(
        &self,
        session_id: &str,
        timeout_secs: u64,
    ) -> Result<(), BackendError> {
        let response = self
            .http
            .patch(format!("{}/sessions/{}", self.base_url, session_id))
            .json(&UpdateSession {
                resuming: true,
                timeout: timeout_secs,
            })
            .send()
            .await?;

        check(response).await?;
        Ok(())
    }
}

async fn check(response: Response) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<ErrorBody>(&text) {
        Ok(body) if !body.message.is_empty() => body.message,
        Ok(body) if !body.error.is_empty() => body.error,
        _ => text,
    };

    Err(BackendError::Status {
        status: status.as_u16(),
        message,
    })
}
