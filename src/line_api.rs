//! LINE Messaging API client
//!
//! Handles:
//! - Reply messages (bound to a single-use reply token)
//! - Push messages (addressed to a user, group or room id)
//! - Profile lookup
//! - Leaving groups and rooms
//! - Downloading message content (images, video, audio)
//!
//! Every call is a single request/response cycle; nothing is retried.

use bytes::Bytes;
use reqwest::{Client, Response};
use tracing::{debug, info, warn};

use crate::config::BotConfig;
use crate::error::{BotError, BotResult};
use crate::types::{MAX_BATCH_MESSAGES, Profile, PushRequest, ReplyMessage, ReplyRequest};

/// LINE Messaging API client
#[derive(Clone)]
pub struct LineApiClient {
    base_url: String,
    access_token: String,
    http: Client,
}

impl LineApiClient {
    /// Create a client from the bot configuration
    pub fn new(config: &BotConfig) -> BotResult<Self> {
        let http = Client::builder().timeout(config.http_timeout()).build()?;
        Ok(Self::with_http(
            config.api_base_url.clone(),
            config.channel_access_token.clone(),
            http,
        ))
    }

    /// Create a client around an existing HTTP client
    pub fn with_http(base_url: impl Into<String>, access_token: impl Into<String>, http: Client) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            access_token: access_token.into(),
            http,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send up to five messages in reply to an event
    pub async fn send_reply(&self, reply_token: &str, messages: &[ReplyMessage]) -> BotResult<()> {
        check_batch(messages)?;
        if reply_token.is_empty() {
            return Err(BotError::InvalidArgument("empty reply token".to_string()));
        }

        let url = format!("{}/message/reply", self.base_url);
        debug!(
            "Sending reply with {} message(s): {}",
            messages.len(),
            messages.iter().map(ReplyMessage::kind).collect::<Vec<_>>().join(", ")
        );

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&ReplyRequest {
                reply_token,
                messages,
            })
            .send()
            .await?;

        check_status(response, "reply").await?;
        info!("Reply sent ({} message(s))", messages.len());
        Ok(())
    }

    /// Push up to five messages to a user, group or room
    pub async fn send_push(&self, to: &str, messages: &[ReplyMessage]) -> BotResult<()> {
        check_batch(messages)?;
        if to.is_empty() {
            return Err(BotError::InvalidArgument("empty push target".to_string()));
        }

        let url = format!("{}/message/push", self.base_url);
        debug!("Pushing {} message(s) to {}", messages.len(), to);

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&PushRequest { to, messages })
            .send()
            .await?;

        check_status(response, "push").await?;
        info!("Push sent to {}", to);
        Ok(())
    }

    /// Look up a user's profile
    pub async fn get_profile(&self, user_id: &str) -> BotResult<Profile> {
        let url = format!("{}/profile/{}", self.base_url, user_id);
        debug!("Fetching profile for {}", user_id);

        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.access_token)
            .send()
            .await?;

        let body = check_status(response, "profile").await?.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| BotError::decode("profile response", e))
    }

    /// Make the bot leave a group or room
    ///
    /// `kind` must be `group` or `room`.
    pub async fn leave_group_or_room(&self, kind: &str, id: &str) -> BotResult<()> {
        let url = match kind {
            "group" | "room" => format!("{}/{}/{}/leave", self.base_url, kind, id),
            other => {
                return Err(BotError::InvalidArgument(format!(
                    "cannot leave a chat of kind '{}'",
                    other
                )));
            }
        };
        debug!("Leaving {} {}", kind, id);

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.access_token)
            .send()
            .await?;

        check_status(response, "leave").await?;
        info!("Left {} {}", kind, id);
        Ok(())
    }

    /// Download the binary content of an image, video or audio message
    pub async fn get_content(&self, message_id: &str) -> BotResult<Bytes> {
        let url = format!("{}/message/{}/content", self.base_url, message_id);
        debug!("Downloading content for message {}", message_id);

        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.access_token)
            .send()
            .await?;

        let data = check_status(response, "content").await?.bytes().await?;
        debug!("Downloaded {} bytes for message {}", data.len(), message_id);
        Ok(data)
    }
}

fn check_batch(messages: &[ReplyMessage]) -> BotResult<()> {
    if messages.is_empty() {
        return Err(BotError::InvalidArgument(
            "a message batch needs at least one message".to_string(),
        ));
    }
    if messages.len() > MAX_BATCH_MESSAGES {
        return Err(BotError::TooManyMessages(messages.len()));
    }
    Ok(())
}

/// Map a non-success response into `BotError::Api`
async fn check_status(response: Response, endpoint: &str) -> BotResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    warn!("LINE {} call failed: {} - {}", endpoint, status, body);
    Err(BotError::Api {
        status: status.as_u16(),
        body,
    })
}
