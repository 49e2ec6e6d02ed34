//! Live scanner: classify the current channel directory and archive
//! disused, non-exempt channels as they are found.

use tracing::{debug, error, info, warn};

use crate::config::{NoticeTemplates, ReaperConfig};
use crate::error::SlackError;
use crate::reaper::disuse::{DisuseThresholds, is_disused};
use crate::reaper::exemption::ExemptionList;
use crate::reaper::outcome::{DRY_RUN_BANNER, RunReport};
use crate::slack::{Channel, SlackApi};

/// What happened to one channel during a live scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveVerdict {
    Exempt,
    Active,
    /// History could not be read, so the channel was left alone.
    Unknown,
    Archived,
    ArchiveFailed,
}

pub struct LiveScanner<'a> {
    api: &'a dyn SlackApi,
    config: &'a ReaperConfig,
    exemptions: &'a ExemptionList,
    thresholds: DisuseThresholds,
    notice: String,
}

impl<'a> LiveScanner<'a> {
    pub fn new(
        api: &'a dyn SlackApi,
        config: &'a ReaperConfig,
        exemptions: &'a ExemptionList,
        templates: &NoticeTemplates,
    ) -> Self {
        Self {
            api,
            config,
            exemptions,
            thresholds: DisuseThresholds::from_config(config),
            notice: templates.channel_notice(config.days_inactive),
        }
    }

    /// Scan every non-archived channel in listing order.
    ///
    /// Only a failed listing is an error; per-channel failures are logged
    /// and leave that channel out of the report.
    pub async fn run(&self) -> Result<RunReport, SlackError> {
        if self.config.dry_run {
            info!("{DRY_RUN_BANNER}");
        }

        let channels = self.api.list_channels(true).await?;
        info!(
            channels = channels.len(),
            cutoff = %self.config.too_old_datetime,
            "Scanning channels"
        );

        let mut report = RunReport::default();
        for channel in &channels {
            let verdict = self.process(channel, &mut report).await;
            debug!(channel_id = %channel.id, name = %channel.name, ?verdict, "Channel scanned");
        }
        Ok(report)
    }

    pub async fn process(&self, channel: &Channel, report: &mut RunReport) -> LiveVerdict {
        if self.exemptions.is_exempt(&channel.name) {
            return LiveVerdict::Exempt;
        }

        match self.classify(channel).await {
            Some(true) => {}
            Some(false) => return LiveVerdict::Active,
            None => return LiveVerdict::Unknown,
        }

        if self.archive(channel).await {
            report.record_archived(channel);
            LiveVerdict::Archived
        } else {
            LiveVerdict::ArchiveFailed
        }
    }

    async fn classify(&self, channel: &Channel) -> Option<bool> {
        let history = match self
            .api
            .fetch_history(
                &channel.id,
                self.config.too_old_datetime,
                self.config.history_limit,
            )
            .await
        {
            Ok(history) => history,
            Err(e) => {
                error!(channel_id = %channel.id, error = %e, "Failed to fetch channel history");
                return None;
            }
        };

        Some(is_disused(
            channel,
            self.config.too_old_datetime,
            &history,
            &self.thresholds,
        ))
    }

    async fn archive(&self, channel: &Channel) -> bool {
        info!(channel_id = %channel.id, name = %channel.name, "Archiving channel");
        if self.config.dry_run {
            return true;
        }

        if let Err(e) = self.api.post_message(&channel.id, &self.notice).await {
            warn!(channel_id = %channel.id, error = %e, "Failed to post archive notice");
        }

        tokio::time::sleep(self.config.rate_limit_delay).await;
        match self.api.archive(&channel.id).await {
            Ok(()) => true,
            Err(e) => {
                error!(channel_id = %channel.id, error = %e, "Failed to archive channel");
                false
            }
        }
    }
}
