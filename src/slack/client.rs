//! Slack Web API client over reqwest.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::multipart::{Form, Part};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::{Channel, HistoryMessage, SlackApi, parse_ts};
use crate::config::ReaperConfig;
use crate::error::SlackError;

/// Largest page Slack accepts for `conversations.list`.
const CHANNEL_PAGE_LIMIT: usize = 1000;

/// Bot + admin token pair bound to one workspace.
pub struct SlackClient {
    client: reqwest::Client,
    api_base: String,
    bot_token: SecretString,
    admin_token: Option<SecretString>,
}

impl SlackClient {
    pub fn new(
        api_base: impl Into<String>,
        bot_token: SecretString,
        admin_token: Option<SecretString>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: api_base.into(),
            bot_token,
            admin_token,
        }
    }

    pub fn from_config(config: &ReaperConfig) -> Self {
        Self::new(
            config.api_base.clone(),
            config.bot_token.clone(),
            config.admin_token.clone(),
        )
    }

    fn api_url(&self, method: &str) -> String {
        format!("{}/{method}", self.api_base)
    }

    /// POST a form-encoded call and decode the body once Slack reports `ok`.
    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        token: &SecretString,
        params: &[(&str, String)],
    ) -> Result<T, SlackError> {
        let resp = self
            .client
            .post(self.api_url(method))
            .bearer_auth(token.expose_secret())
            .form(params)
            .send()
            .await
            .map_err(|e| SlackError::RequestFailed {
                method: method.into(),
                reason: e.to_string(),
            })?;

        decode(method, resp).await
    }

    fn admin_token(&self, method: &str) -> Result<&SecretString, SlackError> {
        self.admin_token
            .as_ref()
            .ok_or_else(|| SlackError::MissingToken {
                method: method.into(),
            })
    }
}

async fn decode<T: DeserializeOwned>(
    method: &str,
    resp: reqwest::Response,
) -> Result<T, SlackError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(SlackError::RequestFailed {
            method: method.into(),
            reason: format!("HTTP {status}: {body}"),
        });
    }

    let value: Value = resp
        .json()
        .await
        .map_err(|e| SlackError::InvalidResponse {
            method: method.into(),
            reason: e.to_string(),
        })?;

    if !value.get("ok").and_then(Value::as_bool).unwrap_or(false) {
        let error = value
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("unknown_error");
        return Err(SlackError::Api {
            method: method.into(),
            error: error.to_string(),
        });
    }

    serde_json::from_value(value).map_err(|e| SlackError::InvalidResponse {
        method: method.into(),
        reason: e.to_string(),
    })
}

// ── Response payloads ───────────────────────────────────────────────

#[derive(Deserialize)]
struct AuthTest {
    user_id: String,
}

#[derive(Deserialize)]
struct ChannelList {
    #[serde(default)]
    channels: Vec<Channel>,
}

#[derive(Deserialize)]
struct History {
    #[serde(default)]
    messages: Vec<RawMessage>,
}

#[derive(Deserialize)]
struct RawMessage {
    ts: String,
    #[serde(default)]
    subtype: Option<String>,
}

#[derive(Deserialize)]
struct Members {
    #[serde(default)]
    members: Vec<String>,
}

/// For calls whose payload we do not read.
#[derive(Deserialize)]
struct Ack {}

// ── SlackApi implementation ─────────────────────────────────────────

#[async_trait]
impl SlackApi for SlackClient {
    async fn auth_test(&self) -> Result<String, SlackError> {
        let auth: AuthTest = self.call("auth.test", &self.bot_token, &[]).await?;
        Ok(auth.user_id)
    }

    async fn list_channels(&self, exclude_archived: bool) -> Result<Vec<Channel>, SlackError> {
        let list: ChannelList = self
            .call(
                "conversations.list",
                &self.bot_token,
                &[
                    ("exclude_archived", exclude_archived.to_string()),
                    ("limit", CHANNEL_PAGE_LIMIT.to_string()),
                ],
            )
            .await?;
        Ok(list.channels)
    }

    async fn fetch_history(
        &self,
        channel_id: &str,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<HistoryMessage>, SlackError> {
        let method = "conversations.history";
        let history: History = self
            .call(
                method,
                &self.bot_token,
                &[
                    ("channel", channel_id.to_string()),
                    ("oldest", since.timestamp().to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;

        history
            .messages
            .into_iter()
            .map(|raw| {
                let timestamp =
                    parse_ts(&raw.ts).ok_or_else(|| SlackError::InvalidResponse {
                        method: method.into(),
                        reason: format!("bad message ts {:?}", raw.ts),
                    })?;
                Ok(HistoryMessage {
                    timestamp,
                    subtype: raw.subtype,
                })
            })
            .collect()
    }

    async fn fetch_members(
        &self,
        channel_id: &str,
        limit: usize,
    ) -> Result<Vec<String>, SlackError> {
        let members: Members = self
            .call(
                "conversations.members",
                &self.bot_token,
                &[
                    ("channel", channel_id.to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;
        Ok(members.members)
    }

    async fn grant_access(&self, channel_id: &str, member_id: &str) -> Result<(), SlackError> {
        let method = "admin.conversations.invite";
        let token = self.admin_token(method)?;
        let _: Ack = self
            .call(
                method,
                token,
                &[
                    ("channel_id", channel_id.to_string()),
                    ("user_ids", member_id.to_string()),
                ],
            )
            .await?;
        Ok(())
    }

    async fn archive(&self, channel_id: &str) -> Result<(), SlackError> {
        let _: Ack = self
            .call(
                "conversations.archive",
                &self.bot_token,
                &[("channel", channel_id.to_string())],
            )
            .await?;
        Ok(())
    }

    async fn post_message(&self, channel_id: &str, text: &str) -> Result<(), SlackError> {
        let _: Ack = self
            .call(
                "chat.postMessage",
                &self.bot_token,
                &[
                    ("channel", channel_id.to_string()),
                    ("text", text.to_string()),
                ],
            )
            .await?;
        Ok(())
    }

    async fn upload_file(
        &self,
        channel_id: &str,
        comment: &str,
        file_path: &Path,
    ) -> Result<(), SlackError> {
        let method = "files.upload";
        let file_name = file_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("archived_output.csv")
            .to_string();

        let file_bytes = tokio::fs::read(file_path).await?;
        let part = Part::bytes(file_bytes).file_name(file_name.clone());

        let form = Form::new()
            .text("channels", channel_id.to_string())
            .text("initial_comment", comment.to_string())
            .text("filename", file_name)
            .part("file", part);

        let resp = self
            .client
            .post(self.api_url(method))
            .bearer_auth(self.bot_token.expose_secret())
            .multipart(form)
            .send()
            .await
            .map_err(|e| SlackError::RequestFailed {
                method: method.into(),
                reason: e.to_string(),
            })?;

        let _: Ack = decode(method, resp).await?;
        tracing::info!(channel_id = %channel_id, path = %file_path.display(), "File uploaded");
        Ok(())
    }
}
