//! Tabular source and sink for batch runs.
//!
//! Input is a channel export with at least `Name` and `ID` columns. Output
//! is the same table with the outcome columns appended. Any outcome columns
//! already present in the input (a re-run over an earlier output) are read
//! back into the ledger instead of being passed through.

use std::path::{Path, PathBuf};

use crate::error::TableError;
use crate::reaper::outcome::{ChannelOutcome, OutcomeAnnotations, OutcomeLedger, RowId};

pub const NAME_COLUMN: &str = "Name";
pub const ID_COLUMN: &str = "ID";

pub const MEMBERS_LIST: &str = "MembersList";
pub const ALLOWLISTED: &str = "Allowlisted";
pub const IS_BOT_MEMBER: &str = "IsBotMember";
pub const IS_ERROR: &str = "IsError";
pub const ERROR_MESSAGE: &str = "ErrorMessage";
pub const IS_CRITICAL_ERROR: &str = "IsCriticalError";
pub const CRITICAL_ERROR_MESSAGE: &str = "CriticalErrorMessage";
pub const INVITE_FAILED: &str = "InviteFailed";
pub const GET_MEMBERS_FAILED: &str = "GetMembersFailed";
pub const ARCHIVE_FAILED: &str = "ArchiveFailed";

/// Outcome columns, in output order.
pub const OUTCOME_COLUMNS: [&str; 10] = [
    MEMBERS_LIST,
    ALLOWLISTED,
    IS_BOT_MEMBER,
    IS_ERROR,
    ERROR_MESSAGE,
    IS_CRITICAL_ERROR,
    CRITICAL_ERROR_MESSAGE,
    INVITE_FAILED,
    GET_MEMBERS_FAILED,
    ARCHIVE_FAILED,
];

/// The columns the workflow reads from each row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRow {
    pub row: RowId,
    pub name: String,
    pub channel_id: String,
}

/// A loaded channel export.
#[derive(Debug)]
pub struct ChannelTable {
    source: PathBuf,
    headers: Vec<String>,
    cells: Vec<Vec<String>>,
    rows: Vec<ChannelRow>,
    prior: Option<Vec<ChannelOutcome>>,
}

impl ChannelTable {
    pub fn read(path: &Path) -> Result<Self, TableError> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_path(path)?;

        let all_headers: Vec<String> = reader.headers()?.iter().map(String::from).collect();
        let position = |name: &str| all_headers.iter().position(|h| h == name);
        let required = |name: &str| {
            position(name).ok_or_else(|| TableError::MissingColumn {
                column: name.to_string(),
                path: path.to_path_buf(),
            })
        };

        let name_idx = required(NAME_COLUMN)?;
        let id_idx = required(ID_COLUMN)?;

        let outcome_idx: Vec<Option<usize>> =
            OUTCOME_COLUMNS.iter().map(|c| position(*c)).collect();
        let annotated = outcome_idx.iter().any(Option::is_some);
        let passthrough: Vec<usize> = (0..all_headers.len())
            .filter(|i| !outcome_idx.contains(&Some(*i)))
            .collect();

        let mut cells = Vec::new();
        let mut rows = Vec::new();
        let mut prior = Vec::new();

        for (i, record) in reader.records().enumerate() {
            let record = record?;
            let cell = |idx: usize| record.get(idx).unwrap_or("");

            rows.push(ChannelRow {
                row: RowId(i),
                name: cell(name_idx).to_string(),
                channel_id: cell(id_idx).to_string(),
            });
            cells.push(passthrough.iter().map(|&idx| cell(idx).to_string()).collect());

            if annotated {
                let column = |c: usize| outcome_idx[c].map(cell).unwrap_or("");
                prior.push(ChannelOutcome::restore(&OutcomeAnnotations {
                    members: column(0),
                    exempt: parse_flag(column(1)),
                    bot_already_member: parse_flag(column(2)),
                    had_error: parse_flag(column(3)),
                    error_message: column(4),
                    had_critical_error: parse_flag(column(5)),
                    critical_error: column(6),
                    invite_failed: parse_flag(column(7)),
                    member_fetch_failed: parse_flag(column(8)),
                    archive_failed: parse_flag(column(9)),
                }));
            }
        }

        tracing::info!(
            path = %path.display(),
            rows = rows.len(),
            annotated,
            "Channel table loaded"
        );

        Ok(Self {
            source: path.to_path_buf(),
            headers: passthrough.iter().map(|&i| all_headers[i].clone()).collect(),
            cells,
            rows,
            prior: annotated.then_some(prior),
        })
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn rows(&self) -> &[ChannelRow] {
        &self.rows
    }

    /// Whether the input already carried outcome columns.
    pub fn is_annotated(&self) -> bool {
        self.prior.is_some()
    }

    /// Fresh outcomes, or the ones restored from annotation columns.
    pub fn initial_ledger(&self) -> OutcomeLedger {
        match &self.prior {
            Some(prior) => OutcomeLedger::from_outcomes(prior.clone()),
            None => OutcomeLedger::with_rows(self.rows.len()),
        }
    }

    /// Write every row with its outcome, replacing any existing file.
    pub fn write(&self, ledger: &OutcomeLedger, path: &Path) -> Result<(), TableError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut writer = csv::Writer::from_path(path)?;

        let header = self
            .headers
            .iter()
            .map(String::as_str)
            .chain(OUTCOME_COLUMNS);
        writer.write_record(header)?;

        let blank = ChannelOutcome::default();
        for (i, passthrough) in self.cells.iter().enumerate() {
            let outcome = ledger.get(RowId(i)).unwrap_or(&blank);
            let record = passthrough.iter().cloned().chain(outcome_cells(outcome));
            writer.write_record(record)?;
        }
        writer.flush()?;
        Ok(())
    }
}

fn outcome_cells(outcome: &ChannelOutcome) -> [String; 10] {
    [
        outcome.member_list().map(|m| m.join(",")).unwrap_or_default(),
        outcome.exempt().to_string(),
        outcome.bot_already_member().to_string(),
        outcome.had_error().to_string(),
        outcome.error_message(),
        outcome.had_critical_error().to_string(),
        outcome.critical_error().to_string(),
        outcome.invite_failed().to_string(),
        outcome.member_fetch_failed().to_string(),
        outcome.archive_failed().to_string(),
    ]
}

fn parse_flag(cell: &str) -> bool {
    matches!(cell.to_ascii_lowercase().as_str(), "true" | "1" | "1.0" | "yes")
}
