//! Outcome recorder.
//!
//! Batch runs keep one [`ChannelOutcome`] per input row in an
//! [`OutcomeLedger`]; live runs collect archived channels in a
//! [`RunReport`]. Both end with a single `finalize` that reports to the
//! admin channel.

use std::path::Path;

use tracing::{error, info};

use crate::error::TableError;
use crate::slack::{Channel, SlackApi};
use crate::table::ChannelTable;

pub const DRY_RUN_BANNER: &str = "THIS IS A DRY RUN. NO CHANNELS ARE ACTUALLY ARCHIVED.";
const UPLOAD_COMMENT: &str = "Please find the list of channels Archived in the attachment.";

/// Separator used when the error list is flattened into a single cell.
pub const ERROR_SEPARATOR: &str = " | ";

/// Workflow step an error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Invite,
    MemberFetch,
    Archive,
    /// Error text carried over from a previous run's output file.
    Restored,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorEntry {
    pub step: Step,
    pub message: String,
}

/// Per-channel result of the batch workflow.
///
/// Flags only ever move from false to true, with one exception: finding the
/// bot already in the member list clears `had_error` when every recorded
/// error is an invite failure, since that failure was expected.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelOutcome {
    exempt: bool,
    member_list: Option<Vec<String>>,
    bot_already_member: bool,
    had_error: bool,
    /// Newest first.
    errors: Vec<ErrorEntry>,
    had_critical_error: bool,
    critical_error: String,
    invite_failed: bool,
    member_fetch_failed: bool,
    archive_failed: bool,
}

impl ChannelOutcome {
    pub fn mark_exempt(&mut self) {
        self.exempt = true;
    }

    /// Record a failed step. Sets the step's flag and `had_error`.
    pub fn record_failure(&mut self, step: Step, message: impl Into<String>) {
        match step {
            Step::Invite => self.invite_failed = true,
            Step::MemberFetch => self.member_fetch_failed = true,
            Step::Archive => self.archive_failed = true,
            Step::Restored => {}
        }
        self.had_error = true;
        self.errors.insert(
            0,
            ErrorEntry {
                step,
                message: message.into(),
            },
        );
    }

    /// A problem with the row itself; the channel is never archived.
    pub fn record_critical(&mut self, message: impl Into<String>) {
        self.had_critical_error = true;
        self.had_error = true;
        self.critical_error = message.into();
    }

    /// Store the fetched member list. Returns whether the bot was in it.
    pub fn record_members(&mut self, members: Vec<String>, bot_user_id: &str) -> bool {
        let bot_present = members.iter().any(|m| m == bot_user_id);
        self.member_list = Some(members);
        if bot_present {
            self.bot_already_member = true;
            if !self.had_critical_error && self.errors.iter().all(|e| e.step == Step::Invite) {
                self.had_error = false;
            }
        }
        bot_present
    }

    /// Not eligible for archival; `archive_failed` doubles as the skip marker.
    pub fn mark_archive_skipped(&mut self) {
        self.archive_failed = true;
    }

    /// The single gate for archival: never exempt rows, never errored rows.
    pub fn archive_eligible(&self) -> bool {
        !self.exempt && !self.had_error && !self.had_critical_error
    }

    pub fn exempt(&self) -> bool {
        self.exempt
    }

    pub fn member_list(&self) -> Option<&[String]> {
        self.member_list.as_deref()
    }

    pub fn bot_already_member(&self) -> bool {
        self.bot_already_member
    }

    pub fn had_error(&self) -> bool {
        self.had_error
    }

    pub fn errors(&self) -> &[ErrorEntry] {
        &self.errors
    }

    pub fn had_critical_error(&self) -> bool {
        self.had_critical_error
    }

    pub fn critical_error(&self) -> &str {
        &self.critical_error
    }

    pub fn invite_failed(&self) -> bool {
        self.invite_failed
    }

    pub fn member_fetch_failed(&self) -> bool {
        self.member_fetch_failed
    }

    pub fn archive_failed(&self) -> bool {
        self.archive_failed
    }

    /// Errors flattened newest first, for the output file.
    pub fn error_message(&self) -> String {
        self.errors
            .iter()
            .map(|e| e.message.as_str())
            .collect::<Vec<_>>()
            .join(ERROR_SEPARATOR)
    }

    /// Rebuild an outcome from a previous run's annotation cells.
    pub fn restore(annotations: &OutcomeAnnotations<'_>) -> Self {
        let mut outcome = Self {
            exempt: annotations.exempt,
            member_list: (!annotations.members.is_empty())
                .then(|| annotations.members.split(',').map(String::from).collect()),
            bot_already_member: annotations.bot_already_member,
            had_error: annotations.had_error,
            errors: Vec::new(),
            had_critical_error: annotations.had_critical_error,
            critical_error: annotations.critical_error.to_string(),
            invite_failed: annotations.invite_failed,
            member_fetch_failed: annotations.member_fetch_failed,
            archive_failed: annotations.archive_failed,
        };
        // A cleared row only ever carries the expected invite failure, so it
        // must stay clearable on the next run.
        let step = if annotations.had_error {
            Step::Restored
        } else {
            Step::Invite
        };
        if annotations.had_error || !annotations.error_message.is_empty() {
            outcome.errors.push(ErrorEntry {
                step,
                message: annotations.error_message.to_string(),
            });
        }
        outcome
    }
}

/// Annotation cells as read back from an output file.
#[derive(Debug, Default)]
pub struct OutcomeAnnotations<'a> {
    pub exempt: bool,
    pub members: &'a str,
    pub bot_already_member: bool,
    pub had_error: bool,
    pub error_message: &'a str,
    pub had_critical_error: bool,
    pub critical_error: &'a str,
    pub invite_failed: bool,
    pub member_fetch_failed: bool,
    pub archive_failed: bool,
}

/// Index of a row in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RowId(pub usize);

/// Outcomes for a batch run, one slot per input row.
#[derive(Debug, Default)]
pub struct OutcomeLedger {
    outcomes: Vec<ChannelOutcome>,
}

impl OutcomeLedger {
    pub fn with_rows(rows: usize) -> Self {
        Self {
            outcomes: vec![ChannelOutcome::default(); rows],
        }
    }

    pub fn from_outcomes(outcomes: Vec<ChannelOutcome>) -> Self {
        Self { outcomes }
    }

    pub fn get(&self, row: RowId) -> Option<&ChannelOutcome> {
        self.outcomes.get(row.0)
    }

    pub fn get_mut(&mut self, row: RowId) -> Option<&mut ChannelOutcome> {
        self.outcomes.get_mut(row.0)
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (RowId, &ChannelOutcome)> {
        self.outcomes.iter().enumerate().map(|(i, o)| (RowId(i), o))
    }

    pub fn summary(&self) -> LedgerSummary {
        let mut summary = LedgerSummary {
            total: self.outcomes.len(),
            ..Default::default()
        };
        for outcome in &self.outcomes {
            if outcome.exempt() {
                summary.exempt += 1;
            } else if outcome.had_error() {
                summary.errored += 1;
            } else if !outcome.archive_failed() {
                summary.archived += 1;
            }
        }
        summary
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerSummary {
    pub total: usize,
    pub exempt: usize,
    pub errored: usize,
    pub archived: usize,
}

// ── Live runs ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivedChannel {
    pub id: String,
    pub name: String,
}

/// Channels archived during one live run.
#[derive(Debug, Default)]
pub struct RunReport {
    archived: Vec<ArchivedChannel>,
}

impl RunReport {
    pub fn record_archived(&mut self, channel: &Channel) {
        self.archived.push(ArchivedChannel {
            id: channel.id.clone(),
            name: channel.name.clone(),
        });
    }

    /// Rows of a batch run that came through both passes clean.
    pub fn from_ledger(table: &ChannelTable, ledger: &OutcomeLedger) -> Self {
        let archived = table
            .rows()
            .iter()
            .filter(|row| {
                ledger
                    .get(row.row)
                    .is_some_and(|o| !o.exempt() && !o.had_error() && !o.archive_failed())
            })
            .map(|row| ArchivedChannel {
                id: row.channel_id.clone(),
                name: row.name.clone(),
            })
            .collect();
        Self { archived }
    }

    pub fn archived(&self) -> &[ArchivedChannel] {
        &self.archived
    }

    /// `Archiving N channels: #a, #b`, marked when nothing really happened.
    pub fn summary(&self, dry_run: bool) -> String {
        let names = self
            .archived
            .iter()
            .map(|c| format!("#{}", c.name))
            .collect::<Vec<_>>()
            .join(", ");
        let msg = format!("Archiving {} channels: {}", self.archived.len(), names);
        if dry_run {
            format!("[DRY RUN] {msg}")
        } else {
            msg
        }
    }

    /// Post the summary to the admin channel, if one is configured.
    pub async fn finalize(&self, api: &dyn SlackApi, admin_channel: Option<&str>, dry_run: bool) {
        let summary = self.summary(dry_run);
        info!(archived = self.archived.len(), "{summary}");

        let Some(admin_channel) = admin_channel else {
            return;
        };
        if let Err(e) = api.post_message(admin_channel, &summary).await {
            error!(channel_id = %admin_channel, error = %e, "Failed to send admin report");
        }
    }
}

/// Write the annotated table and forward it to the admin channel.
pub async fn finalize_batch(
    api: &dyn SlackApi,
    table: &ChannelTable,
    ledger: &OutcomeLedger,
    output: &Path,
    admin_channel: Option<&str>,
    dry_run: bool,
) -> Result<(), TableError> {
    table.write(ledger, output)?;

    let summary = ledger.summary();
    info!(
        path = %output.display(),
        total = summary.total,
        exempt = summary.exempt,
        errored = summary.errored,
        archived = summary.archived,
        "Batch output written"
    );

    if let Some(admin_channel) = admin_channel {
        let comment = upload_comment(&RunReport::from_ledger(table, ledger), dry_run);
        if let Err(e) = api.upload_file(admin_channel, &comment, output).await {
            error!(channel_id = %admin_channel, error = %e, "Failed to upload batch output");
        }
    }
    Ok(())
}

fn upload_comment(report: &RunReport, dry_run: bool) -> String {
    let lead = if dry_run { DRY_RUN_BANNER } else { UPLOAD_COMMENT };
    format!("{lead}\n{}", report.summary(dry_run))
}
