//! Messaging platform collaborator.
//!
//! The reaper only talks to Slack through [`SlackApi`], so the workflow
//! drivers can be exercised against an in-memory fake.

pub mod client;
#[cfg(test)]
pub(crate) mod fake;

pub use client::SlackClient;

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::SlackError;

/// Snapshot of a channel as listed at the start of a run.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Channel {
    pub id: String,
    pub name: String,
    #[serde(rename = "created", with = "chrono::serde::ts_seconds")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "num_members", default)]
    pub member_count: u64,
}

/// One entry of a channel's history page, newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryMessage {
    pub timestamp: DateTime<Utc>,
    pub subtype: Option<String>,
}

impl HistoryMessage {
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            subtype: None,
        }
    }

    pub fn with_subtype(mut self, subtype: impl Into<String>) -> Self {
        self.subtype = Some(subtype.into());
        self
    }
}

/// Parse a Slack `ts` value (`"1512085950.000216"`) into an instant.
pub fn parse_ts(ts: &str) -> Option<DateTime<Utc>> {
    let (secs, frac) = ts.split_once('.').unwrap_or((ts, ""));
    if !frac.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let secs: i64 = secs.parse().ok()?;
    let padded = format!("{frac:0<6}");
    let micros: u32 = padded[..6].parse().ok()?;
    DateTime::from_timestamp(secs, micros * 1_000)
}

/// Operations the reaper needs from the messaging platform.
///
/// Every call is a single request; nothing here paginates or retries.
#[async_trait]
pub trait SlackApi: Send + Sync {
    /// User id of the acting bot.
    async fn auth_test(&self) -> Result<String, SlackError>;

    async fn list_channels(&self, exclude_archived: bool) -> Result<Vec<Channel>, SlackError>;

    /// Messages newer than `since`, newest first, at most `limit`.
    async fn fetch_history(
        &self,
        channel_id: &str,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<HistoryMessage>, SlackError>;

    async fn fetch_members(&self, channel_id: &str, limit: usize)
    -> Result<Vec<String>, SlackError>;

    /// Add `member_id` to the channel using admin rights.
    async fn grant_access(&self, channel_id: &str, member_id: &str) -> Result<(), SlackError>;

    async fn archive(&self, channel_id: &str) -> Result<(), SlackError>;

    async fn post_message(&self, channel_id: &str, text: &str) -> Result<(), SlackError>;

    async fn upload_file(
        &self,
        channel_id: &str,
        comment: &str,
        file_path: &Path,
    ) -> Result<(), SlackError>;
}
