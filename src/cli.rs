//! Command-line surface.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::ReaperConfig;

#[derive(Debug, Parser)]
#[command(
    name = "channel-reaper",
    version,
    about = "Find disused Slack channels and archive them"
)]
pub struct Cli {
    /// Log what would happen without inviting, posting or archiving.
    #[arg(long, global = true)]
    pub dry_run: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Scan the live channel directory and archive disused channels.
    Scan,
    /// Process an exported channel table in two passes.
    Batch {
        /// Channel table to read (defaults to CHANNELS_FILE).
        #[arg(long)]
        input: Option<PathBuf>,
        /// Where to write the annotated table (defaults to ARCHIVE_OUTPUT).
        #[arg(long)]
        output: Option<PathBuf>,
        /// Skip the membership pass and archive from a previous output file.
        #[arg(long)]
        archive_only: bool,
    },
}

impl Cli {
    /// Fold flags into the environment-derived config. Flags only ever
    /// widen `dry_run`; they never turn it off.
    pub fn apply(&self, config: &mut ReaperConfig) {
        if self.dry_run {
            config.dry_run = true;
        }
        if let Command::Batch { input, output, .. } = &self.command {
            if let Some(input) = input {
                config.channels_file = input.clone();
            }
            if let Some(output) = output {
                config.archive_output = output.clone();
            }
        }
    }
}
