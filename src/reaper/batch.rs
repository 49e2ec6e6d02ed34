//! Batch processor: two full passes over an exported channel table.
//!
//! Pass 1 grants the bot access and captures every channel's members.
//! Pass 2 archives the rows that came through pass 1 clean. Membership for
//! all rows is on record before the first archive call goes out.

use tracing::{error, info, warn};

use crate::config::ReaperConfig;
use crate::reaper::exemption::ExemptionList;
use crate::reaper::outcome::{ChannelOutcome, DRY_RUN_BANNER, OutcomeLedger, Step};
use crate::slack::SlackApi;
use crate::table::{ChannelRow, ChannelTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchMode {
    /// Membership pass, then archive pass.
    Full,
    /// Archive pass only, over outcomes restored from an earlier output.
    ArchiveOnly,
}

pub struct BatchProcessor<'a> {
    api: &'a dyn SlackApi,
    config: &'a ReaperConfig,
    exemptions: &'a ExemptionList,
    bot_user_id: String,
}

impl<'a> BatchProcessor<'a> {
    pub fn new(
        api: &'a dyn SlackApi,
        config: &'a ReaperConfig,
        exemptions: &'a ExemptionList,
        bot_user_id: impl Into<String>,
    ) -> Self {
        Self {
            api,
            config,
            exemptions,
            bot_user_id: bot_user_id.into(),
        }
    }

    pub async fn run(&self, table: &ChannelTable, mode: BatchMode) -> OutcomeLedger {
        if self.config.dry_run {
            info!("{DRY_RUN_BANNER}");
        }

        let mut ledger = table.initial_ledger();
        flag_invalid_rows(table.rows(), &mut ledger);

        if mode == BatchMode::Full {
            self.membership_pass(table.rows(), &mut ledger).await;
        }
        self.archive_pass(table.rows(), &mut ledger).await;

        let summary = ledger.summary();
        info!(
            total = summary.total,
            exempt = summary.exempt,
            errored = summary.errored,
            archived = summary.archived,
            "Batch run complete"
        );
        ledger
    }

    pub async fn membership_pass(&self, rows: &[ChannelRow], ledger: &mut OutcomeLedger) {
        info!("Name,ID,Members");
        for row in rows {
            let Some(outcome) = ledger.get_mut(row.row) else {
                continue;
            };
            self.capture_membership(row, outcome).await;
        }
    }

    async fn capture_membership(&self, row: &ChannelRow, outcome: &mut ChannelOutcome) {
        if self.exemptions.is_exempt(&row.name) {
            outcome.mark_exempt();
            return;
        }
        if outcome.had_critical_error() {
            return;
        }

        if !self.config.dry_run {
            tokio::time::sleep(self.config.rate_limit_delay).await;
            if let Err(e) = self
                .api
                .grant_access(&row.channel_id, &self.bot_user_id)
                .await
            {
                warn!(channel_id = %row.channel_id, error = %e, "Invite failed");
                outcome.record_failure(Step::Invite, e.to_string());
            }
        }

        match self
            .api
            .fetch_members(&row.channel_id, self.config.member_limit)
            .await
        {
            Ok(members) => {
                // Rollback record: enough to re-invite everyone by hand.
                info!("{},{},\"{}\"", row.name, row.channel_id, members.join(","));
                outcome.record_members(members, &self.bot_user_id);
            }
            Err(e) => {
                error!(channel_id = %row.channel_id, error = %e, "Failed to fetch members");
                outcome.record_failure(Step::MemberFetch, e.to_string());
            }
        }
    }

    pub async fn archive_pass(&self, rows: &[ChannelRow], ledger: &mut OutcomeLedger) {
        for row in rows {
            let Some(outcome) = ledger.get_mut(row.row) else {
                continue;
            };

            if !outcome.archive_eligible() {
                outcome.mark_archive_skipped();
                continue;
            }

            info!(channel_id = %row.channel_id, name = %row.name, "Archiving channel");
            if self.config.dry_run {
                continue;
            }

            tokio::time::sleep(self.config.rate_limit_delay).await;
            if let Err(e) = self.api.archive(&row.channel_id).await {
                error!(channel_id = %row.channel_id, error = %e, "Failed to archive channel");
                outcome.record_failure(Step::Archive, e.to_string());
            }
        }
    }
}

fn flag_invalid_rows(rows: &[ChannelRow], ledger: &mut OutcomeLedger) {
    for row in rows.iter().filter(|r| r.channel_id.is_empty()) {
        if let Some(outcome) = ledger.get_mut(row.row) {
            if !outcome.had_critical_error() {
                warn!(name = %row.name, "Row has no channel id");
                outcome.record_critical("row has no channel id");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use chrono::Utc;

    use super::*;
    use crate::reaper::outcome::RowId;
    use crate::slack::fake::{Call, FakeSlack};

    fn config(dry_run: bool) -> ReaperConfig {
        let mut config = ReaperConfig::from_lookup(
            |key| match key {
                "SLACK_TOKEN" => Some("xoxb-test".into()),
                "RATE_LIMIT_DELAY_SECS" => Some("0".into()),
                _ => None,
            },
            Utc::now(),
        )
        .unwrap();
        config.dry_run = dry_run;
        config
    }

    fn table(dir: &Path, content: &str) -> ChannelTable {
        let path = dir.join("channels.csv");
        std::fs::write(&path, content).unwrap();
        ChannelTable::read(&path).unwrap()
    }

    const ROWS: &str = "Name,ID,Members\nold-proj,C1,2\nkeep-ops,C2,9\nlocked,C3,4\n";

    fn slack() -> FakeSlack {
        let mut slack = FakeSlack::new("UBOT");
        slack.members.insert("C1".into(), vec!["U1".into(), "U2".into()]);
        slack.members.insert("C2".into(), vec!["U3".into()]);
        slack.members.insert("C3".into(), vec!["U4".into()]);
        slack
    }

    #[tokio::test]
    async fn happy_path_archives_non_exempt_rows() {
        let dir = tempfile::tempdir().unwrap();
        let table = table(dir.path(), ROWS);
        let slack = slack();
        let config = config(false);
        let exemptions = ExemptionList::new(["#keep-"]);

        let ledger = BatchProcessor::new(&slack, &config, &exemptions, "UBOT")
            .run(&table, BatchMode::Full)
            .await;

        assert_eq!(slack.archived(), vec!["C1".to_string(), "C3".to_string()]);

        let c1 = ledger.get(RowId(0)).unwrap();
        assert_eq!(c1.member_list().unwrap(), ["U1".to_string(), "U2".to_string()]);
        assert!(!c1.archive_failed());

        let c2 = ledger.get(RowId(1)).unwrap();
        assert!(c2.exempt());
        assert!(c2.member_list().is_none());
        assert!(c2.archive_failed());
        assert!(!slack.calls().iter().any(|c| matches!(
            c,
            Call::Members(id) | Call::Archive(id) if id == "C2"
        )));
    }

    #[tokio::test]
    async fn every_membership_is_captured_before_any_archive() {
        let dir = tempfile::tempdir().unwrap();
        let table = table(dir.path(), ROWS);
        let slack = slack();
        let config = config(false);
        let exemptions = ExemptionList::default();

        BatchProcessor::new(&slack, &config, &exemptions, "UBOT")
            .run(&table, BatchMode::Full)
            .await;

        let calls = slack.calls();
        let last_members = calls
            .iter()
            .rposition(|c| matches!(c, Call::Members(_)))
            .unwrap();
        let first_archive = calls
            .iter()
            .position(|c| matches!(c, Call::Archive(_)))
            .unwrap();
        assert!(last_members < first_archive);
    }

    #[tokio::test]
    async fn invite_failure_cleared_when_bot_already_member() {
        let dir = tempfile::tempdir().unwrap();
        let table = table(dir.path(), ROWS);
        let mut slack = slack();
        slack.fail_grant.insert("C1".into());
        slack
            .members
            .insert("C1".into(), vec!["U1".into(), "UBOT".into()]);
        let config = config(false);
        let exemptions = ExemptionList::default();

        let ledger = BatchProcessor::new(&slack, &config, &exemptions, "UBOT")
            .run(&table, BatchMode::Full)
            .await;

        let c1 = ledger.get(RowId(0)).unwrap();
        assert!(c1.invite_failed());
        assert!(c1.bot_already_member());
        assert!(!c1.had_error());
        assert!(!c1.archive_failed());
        assert!(slack.archived().contains(&"C1".to_string()));
    }

    #[tokio::test]
    async fn invite_failure_without_membership_blocks_archive() {
        let dir = tempfile::tempdir().unwrap();
        let table = table(dir.path(), ROWS);
        let mut slack = slack();
        slack.fail_grant.insert("C3".into());
        let config = config(false);
        let exemptions = ExemptionList::default();

        let ledger = BatchProcessor::new(&slack, &config, &exemptions, "UBOT")
            .run(&table, BatchMode::Full)
            .await;

        let c3 = ledger.get(RowId(2)).unwrap();
        assert!(c3.invite_failed());
        assert!(c3.had_error());
        assert!(c3.member_list().is_some());
        assert!(c3.archive_failed());
        assert!(!slack.archived().contains(&"C3".to_string()));
    }

    #[tokio::test]
    async fn member_fetch_failure_skips_archive_call() {
        let dir = tempfile::tempdir().unwrap();
        let table = table(dir.path(), ROWS);
        let mut slack = slack();
        slack.fail_grant.insert("C1".into());
        slack.fail_members.insert("C1".into());
        let config = config(false);
        let exemptions = ExemptionList::default();

        let ledger = BatchProcessor::new(&slack, &config, &exemptions, "UBOT")
            .run(&table, BatchMode::Full)
            .await;

        let c1 = ledger.get(RowId(0)).unwrap();
        assert!(c1.member_fetch_failed());
        assert!(c1.had_error());
        assert!(c1.archive_failed());
        assert_eq!(c1.errors().len(), 2);
        assert_eq!(c1.errors()[0].step, Step::MemberFetch);
        assert_eq!(c1.errors()[1].step, Step::Invite);
        assert!(!slack.calls().contains(&Call::Archive("C1".into())));
    }

    #[tokio::test]
    async fn archive_failure_is_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let table = table(dir.path(), ROWS);
        let mut slack = slack();
        slack.fail_archive.insert("C3".into());
        let config = config(false);
        let exemptions = ExemptionList::default();

        let ledger = BatchProcessor::new(&slack, &config, &exemptions, "UBOT")
            .run(&table, BatchMode::Full)
            .await;

        let c3 = ledger.get(RowId(2)).unwrap();
        assert!(c3.archive_failed());
        assert!(c3.had_error());
        assert!(c3.error_message().contains("cant_archive_general"));
    }

    #[tokio::test]
    async fn dry_run_reads_but_never_mutates() {
        let dir = tempfile::tempdir().unwrap();
        let table = table(dir.path(), ROWS);
        let slack = slack();
        let exemptions = ExemptionList::new(["#keep-"]);

        let dry_config = config(true);
        let dry = BatchProcessor::new(&slack, &dry_config, &exemptions, "UBOT")
            .run(&table, BatchMode::Full)
            .await;

        assert!(slack.calls().iter().all(|c| !c.is_mutation()));
        assert_eq!(
            slack
                .calls()
                .iter()
                .filter(|c| matches!(c, Call::Members(_)))
                .count(),
            2
        );

        let wet_slack = self::slack();
        let wet_config = config(false);
        let wet = BatchProcessor::new(&wet_slack, &wet_config, &exemptions, "UBOT")
            .run(&table, BatchMode::Full)
            .await;

        for i in 0..3 {
            assert_eq!(dry.get(RowId(i)), wet.get(RowId(i)));
        }
    }

    #[tokio::test]
    async fn rerun_over_errored_output_still_skips_archive() {
        let dir = tempfile::tempdir().unwrap();
        let first_table = table(dir.path(), ROWS);
        let mut slack = slack();
        slack.fail_members.insert("C3".into());
        let config = config(false);
        let exemptions = ExemptionList::default();

        let ledger = BatchProcessor::new(&slack, &config, &exemptions, "UBOT")
            .run(&first_table, BatchMode::Full)
            .await;
        let output = dir.path().join("archived_output.csv");
        first_table.write(&ledger, &output).unwrap();

        // Second run: C3 is now readable and even has the bot in it.
        let mut healed = self::slack();
        healed.members.insert("C3".into(), vec!["UBOT".into()]);
        let rerun_table = ChannelTable::read(&output).unwrap();
        for mode in [BatchMode::Full, BatchMode::ArchiveOnly] {
            let ledger = BatchProcessor::new(&healed, &config, &exemptions, "UBOT")
                .run(&rerun_table, mode)
                .await;
            let c3 = ledger.get(RowId(2)).unwrap();
            assert!(c3.had_error());
            assert!(c3.archive_failed());
        }
        assert!(!healed.archived().contains(&"C3".to_string()));
    }

    #[tokio::test]
    async fn rerun_over_cleared_invite_agrees_across_modes() {
        let dir = tempfile::tempdir().unwrap();
        let first_table = table(dir.path(), "Name,ID\nold-proj,C1\n");
        let mut slack = FakeSlack::new("UBOT");
        slack.fail_grant.insert("C1".into());
        slack
            .members
            .insert("C1".into(), vec!["U1".into(), "UBOT".into()]);
        let config = config(false);
        let exemptions = ExemptionList::default();

        let ledger = BatchProcessor::new(&slack, &config, &exemptions, "UBOT")
            .run(&first_table, BatchMode::Full)
            .await;
        let c1 = ledger.get(RowId(0)).unwrap();
        assert!(c1.invite_failed());
        assert!(!c1.had_error());
        assert!(!c1.error_message().is_empty());
        assert_eq!(slack.archived(), vec!["C1".to_string()]);

        let output = dir.path().join("archived_output.csv");
        first_table.write(&ledger, &output).unwrap();
        let rerun_table = ChannelTable::read(&output).unwrap();

        for mode in [BatchMode::Full, BatchMode::ArchiveOnly] {
            let mut rerun_slack = FakeSlack::new("UBOT");
            rerun_slack.fail_grant.insert("C1".into());
            rerun_slack
                .members
                .insert("C1".into(), vec!["U1".into(), "UBOT".into()]);

            let ledger = BatchProcessor::new(&rerun_slack, &config, &exemptions, "UBOT")
                .run(&rerun_table, mode)
                .await;
            let c1 = ledger.get(RowId(0)).unwrap();
            assert!(!c1.had_error(), "{mode:?}");
            assert!(!c1.archive_failed(), "{mode:?}");
            assert_eq!(rerun_slack.archived(), vec!["C1".to_string()], "{mode:?}");
        }
    }

    #[tokio::test]
    async fn row_without_id_is_critical_and_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let table = table(dir.path(), "Name,ID\norphan,\nold-proj,C1\n");
        let slack = slack();
        let config = config(false);
        let exemptions = ExemptionList::default();

        let ledger = BatchProcessor::new(&slack, &config, &exemptions, "UBOT")
            .run(&table, BatchMode::Full)
            .await;

        let orphan = ledger.get(RowId(0)).unwrap();
        assert!(orphan.had_critical_error());
        assert_eq!(orphan.critical_error(), "row has no channel id");
        assert!(orphan.archive_failed());
        assert!(
            slack
                .calls()
                .iter()
                .all(|c| !matches!(c, Call::Members(id) | Call::Archive(id) if id.is_empty()))
        );
        assert_eq!(slack.archived(), vec!["C1".to_string()]);
    }
}
