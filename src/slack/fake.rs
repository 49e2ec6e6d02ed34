//! Recording in-memory `SlackApi` for workflow tests.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{Channel, HistoryMessage, SlackApi};
use crate::error::SlackError;

/// A call that reached the fake, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    ListChannels,
    History(String),
    Members(String),
    Grant { channel: String, member: String },
    Archive(String),
    Post { channel: String, text: String },
    Upload { channel: String, comment: String },
}

impl Call {
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Self::Grant { .. } | Self::Archive(_) | Self::Post { .. }
        )
    }
}

#[derive(Default)]
pub struct FakeSlack {
    pub bot_user_id: String,
    pub channels: Vec<Channel>,
    pub history: HashMap<String, Vec<HistoryMessage>>,
    pub members: HashMap<String, Vec<String>>,
    /// Channel ids whose calls of the named kind fail.
    pub fail_history: HashSet<String>,
    pub fail_members: HashSet<String>,
    pub fail_grant: HashSet<String>,
    pub fail_archive: HashSet<String>,
    pub fail_post: HashSet<String>,
    calls: Mutex<Vec<Call>>,
}

impl FakeSlack {
    pub fn new(bot_user_id: &str) -> Self {
        Self {
            bot_user_id: bot_user_id.to_string(),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn archived(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Archive(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn fail(method: &str, error: &str) -> SlackError {
        SlackError::Api {
            method: method.into(),
            error: error.into(),
        }
    }
}

#[async_trait]
impl SlackApi for FakeSlack {
    async fn auth_test(&self) -> Result<String, SlackError> {
        Ok(self.bot_user_id.clone())
    }

    async fn list_channels(&self, _exclude_archived: bool) -> Result<Vec<Channel>, SlackError> {
        self.record(Call::ListChannels);
        Ok(self.channels.clone())
    }

    async fn fetch_history(
        &self,
        channel_id: &str,
        _since: DateTime<Utc>,
        _limit: usize,
    ) -> Result<Vec<HistoryMessage>, SlackError> {
        self.record(Call::History(channel_id.into()));
        if self.fail_history.contains(channel_id) {
            return Err(Self::fail("conversations.history", "channel_not_found"));
        }
        Ok(self.history.get(channel_id).cloned().unwrap_or_default())
    }

    async fn fetch_members(
        &self,
        channel_id: &str,
        _limit: usize,
    ) -> Result<Vec<String>, SlackError> {
        self.record(Call::Members(channel_id.into()));
        if self.fail_members.contains(channel_id) {
            return Err(Self::fail("conversations.members", "not_in_channel"));
        }
        Ok(self.members.get(channel_id).cloned().unwrap_or_default())
    }

    async fn grant_access(&self, channel_id: &str, member_id: &str) -> Result<(), SlackError> {
        self.record(Call::Grant {
            channel: channel_id.into(),
            member: member_id.into(),
        });
        if self.fail_grant.contains(channel_id) {
            return Err(Self::fail("admin.conversations.invite", "failed_for_some_users"));
        }
        Ok(())
    }

    async fn archive(&self, channel_id: &str) -> Result<(), SlackError> {
        self.record(Call::Archive(channel_id.into()));
        if self.fail_archive.contains(channel_id) {
            return Err(Self::fail("conversations.archive", "cant_archive_general"));
        }
        Ok(())
    }

    async fn post_message(&self, channel_id: &str, text: &str) -> Result<(), SlackError> {
        self.record(Call::Post {
            channel: channel_id.into(),
            text: text.into(),
        });
        if self.fail_post.contains(channel_id) {
            return Err(Self::fail("chat.postMessage", "not_in_channel"));
        }
        Ok(())
    }

    async fn upload_file(
        &self,
        channel_id: &str,
        comment: &str,
        _file_path: &Path,
    ) -> Result<(), SlackError> {
        self.record(Call::Upload {
            channel: channel_id.into(),
            comment: comment.into(),
        });
        Ok(())
    }
}
