//! Disuse classifier.
//!
//! Pure decision over a channel snapshot and one page of its recent history.
//! Callers fetch that page newest-first, bounded by the run's cutoff.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::config::ReaperConfig;
use crate::slack::{Channel, HistoryMessage};

/// Thresholds that shape the verdict.
#[derive(Debug, Clone, Default)]
pub struct DisuseThresholds {
    /// 0 disables the member override.
    pub min_members: u64,
    /// Subtypes that are not human activity (joins, leaves, ...).
    pub skip_subtypes: HashSet<String>,
}

impl DisuseThresholds {
    pub fn from_config(config: &ReaperConfig) -> Self {
        Self {
            min_members: config.min_members,
            skip_subtypes: config.skip_subtypes.clone(),
        }
    }

    fn is_skipped(&self, message: &HistoryMessage) -> bool {
        message
            .subtype
            .as_ref()
            .is_some_and(|s| self.skip_subtypes.contains(s))
    }

    /// True when the channel is too small for bot activity to keep it alive.
    pub fn min_members_overridden(&self, member_count: u64) -> bool {
        self.min_members == 0 || self.min_members > member_count
    }
}

/// Most recent activity found for a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastActivity {
    /// Timestamp of the first qualifying message, or the channel's creation.
    pub at: DateTime<Utc>,
    /// Whether `at` came from a message that passed the subtype filter.
    pub is_human: bool,
    /// Epoch floor recorded when the page held no messages at all.
    /// Never consulted by the verdict; `at` already falls back to creation.
    pub machine_floor: Option<DateTime<Utc>>,
}

/// Find the newest message that is not an ignored subtype.
pub fn last_activity(
    channel: &Channel,
    history: &[HistoryMessage],
    thresholds: &DisuseThresholds,
) -> LastActivity {
    if let Some(message) = history.iter().find(|m| !thresholds.is_skipped(m)) {
        return LastActivity {
            at: message.timestamp,
            is_human: true,
            machine_floor: None,
        };
    }

    LastActivity {
        at: channel.created_at,
        is_human: false,
        machine_floor: history.is_empty().then_some(DateTime::<Utc>::UNIX_EPOCH),
    }
}

/// A channel is disused when its last activity is at or before `cutoff`
/// and either nothing human was seen or the member override applies.
pub fn is_disused(
    channel: &Channel,
    cutoff: DateTime<Utc>,
    history: &[HistoryMessage],
    thresholds: &DisuseThresholds,
) -> bool {
    let activity = last_activity(channel, history, thresholds);
    activity.at <= cutoff
        && (!activity.is_human || thresholds.min_members_overridden(channel.member_count))
}
