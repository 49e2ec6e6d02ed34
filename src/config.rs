//! Configuration types.
//!
//! Everything is read from the environment once at startup. The inactivity
//! cutoff is computed here and nowhere else, so every channel in a run is
//! judged against the same instant.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::Deserialize;

use crate::error::ConfigError;

pub const DEFAULT_API_BASE: &str = "https://slack.com/api";

const DEFAULT_SKIP_SUBTYPES: &str = "channel_leave,channel_join";

/// Runtime configuration for both the live scanner and the batch processor.
#[derive(Debug, Clone)]
pub struct ReaperConfig {
    /// Bot token used for every call except access grants.
    pub bot_token: SecretString,
    /// Admin token used to invite the bot into private channels.
    pub admin_token: Option<SecretString>,
    /// Slack Web API base URL.
    pub api_base: String,
    /// Channels without qualifying activity for this many days are disused.
    pub days_inactive: u32,
    /// Member threshold; 0 disables it.
    pub min_members: u64,
    /// Skip every mutating call, keep all reads.
    pub dry_run: bool,
    /// Channel that receives run reports.
    pub admin_channel: Option<String>,
    /// Message subtypes that do not count as activity.
    pub skip_subtypes: HashSet<String>,
    /// `now - days_inactive`, fixed for the whole run.
    pub too_old_datetime: DateTime<Utc>,
    pub allowlist_file: PathBuf,
    pub templates_file: PathBuf,
    pub channels_file: PathBuf,
    pub archive_output: PathBuf,
    /// Static pause before access grants and archive calls.
    pub rate_limit_delay: Duration,
    pub history_limit: usize,
    pub member_limit: usize,
    pub log_dir: PathBuf,
}

impl ReaperConfig {
    /// Build config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok(), Utc::now())
    }

    /// Build config from an arbitrary key lookup, anchoring the cutoff at `now`.
    pub fn from_lookup<F>(lookup: F, now: DateTime<Utc>) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bot_token = lookup("SLACK_TOKEN")
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar("SLACK_TOKEN".into()))?;
        let admin_token = lookup("SLACK_ADMIN_TOKEN")
            .filter(|t| !t.is_empty())
            .map(SecretString::from);

        let api_base = lookup("SLACK_API_BASE")
            .map(|b| b.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());

        let days_inactive: u32 = parse_or(&lookup, "DAYS_INACTIVE", 365)?;
        let min_members: u64 = parse_or(&lookup, "MIN_MEMBERS", 0)?;
        let rate_limit_secs: u64 = parse_or(&lookup, "RATE_LIMIT_DELAY_SECS", 3)?;
        let history_limit: usize = parse_or(&lookup, "HISTORY_LIMIT", 100)?;
        let member_limit: usize = parse_or(&lookup, "MEMBER_LIMIT", 8000)?;

        let dry_run = lookup("DRY_RUN").is_some_and(|v| v.eq_ignore_ascii_case("true"));

        let admin_channel = lookup("ADMIN_CHANNEL")
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());

        let skip_subtypes = lookup("SKIP_SUBTYPES")
            .unwrap_or_else(|| DEFAULT_SKIP_SUBTYPES.to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let workspace_name = lookup("WORKSPACE_NAME").unwrap_or_default();
        let archive_output = lookup("ARCHIVE_OUTPUT")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                PathBuf::from("data").join(format!("{workspace_name}archived_output.csv"))
            });

        Ok(Self {
            bot_token: SecretString::from(bot_token),
            admin_token,
            api_base,
            days_inactive,
            min_members,
            dry_run,
            admin_channel,
            skip_subtypes,
            too_old_datetime: now - chrono::Duration::days(i64::from(days_inactive)),
            allowlist_file: path_or(&lookup, "ALLOWLIST_FILE", "allowlist.txt"),
            templates_file: path_or(&lookup, "TEMPLATES_FILE", "templates.json"),
            channels_file: path_or(&lookup, "CHANNELS_FILE", "data/channels.csv"),
            archive_output,
            rate_limit_delay: Duration::from_secs(rate_limit_secs),
            history_limit,
            member_limit,
            log_dir: path_or(&lookup, "LOG_DIR", "."),
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => {
            raw.trim()
                .parse()
                .map_err(|e: T::Err| ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: e.to_string(),
                })
        }
        _ => Ok(default),
    }
}

fn path_or<F>(lookup: &F, key: &str, default: &str) -> PathBuf
where
    F: Fn(&str) -> Option<String>,
{
    PathBuf::from(lookup(key).unwrap_or_else(|| default.to_string()))
}

// ── Notice templates ────────────────────────────────────────────────

const DEFAULT_CHANNEL_TEMPLATE: &str = "\
This channel has had no activity for {days_inactive} days. It is being auto-archived.
If you feel this is a mistake you can <https://get.slack.help/hc/en-us/articles/201563847-Archive-a-channel#unarchive-a-channel|unarchive this channel>.
This will bring it back at any point.";

/// Text posted into a channel right before it is archived.
#[derive(Debug, Clone, Deserialize)]
pub struct NoticeTemplates {
    pub channel_template: String,
}

impl Default for NoticeTemplates {
    fn default() -> Self {
        Self {
            channel_template: DEFAULT_CHANNEL_TEMPLATE.to_string(),
        }
    }
}

impl NoticeTemplates {
    /// Load the override file; a missing file means the built-in text.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.is_file() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Interpolate `days_inactive` into the channel notice.
    pub fn channel_notice(&self, days_inactive: u32) -> String {
        let days = days_inactive.to_string();
        self.channel_template
            .replace("{days_inactive}", &days)
            .replace("{}", &days)
    }
}
