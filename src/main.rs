use std::process::ExitCode;

use anyhow::{Context, bail};
use clap::Parser;
use tracing::{error, info};

use channel_reaper::cli::{Cli, Command};
use channel_reaper::config::{NoticeTemplates, ReaperConfig};
use channel_reaper::logging;
use channel_reaper::reaper::outcome::finalize_batch;
use channel_reaper::reaper::{BatchMode, BatchProcessor, ExemptionList, LiveScanner};
use channel_reaper::slack::{SlackApi, SlackClient};
use channel_reaper::table::ChannelTable;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match ReaperConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            logging::init_console();
            error!(critical = true, "{e}");
            return ExitCode::FAILURE;
        }
    };
    cli.apply(&mut config);

    let _guard = match logging::init(&config.log_dir) {
        Ok(guard) => guard,
        Err(e) => {
            logging::init_console();
            error!(
                critical = true,
                log_dir = %config.log_dir.display(),
                "Cannot open audit log: {e}"
            );
            return ExitCode::FAILURE;
        }
    };
    info!(
        version = env!("CARGO_PKG_VERSION"),
        dry_run = config.dry_run,
        days_inactive = config.days_inactive,
        min_members = config.min_members,
        "Channel reaper starting"
    );

    match run(&cli.command, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(critical = true, "{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: &Command, config: &ReaperConfig) -> anyhow::Result<()> {
    match command {
        Command::Scan => scan(config).await,
        Command::Batch { archive_only, .. } => {
            let mode = if *archive_only {
                BatchMode::ArchiveOnly
            } else {
                BatchMode::Full
            };
            batch(config, mode).await
        }
    }
}

async fn scan(config: &ReaperConfig) -> anyhow::Result<()> {
    let exemptions = ExemptionList::load(&config.allowlist_file)?;
    let templates = NoticeTemplates::load(&config.templates_file)?;
    let slack = SlackClient::from_config(config);

    let report = LiveScanner::new(&slack, config, &exemptions, &templates)
        .run()
        .await
        .context("failed to list channels")?;

    report
        .finalize(&slack, config.admin_channel.as_deref(), config.dry_run)
        .await;
    Ok(())
}

async fn batch(config: &ReaperConfig, mode: BatchMode) -> anyhow::Result<()> {
    let exemptions = ExemptionList::load_required(&config.allowlist_file)?;
    if config.admin_token.is_none() && !config.dry_run {
        bail!("SLACK_ADMIN_TOKEN is required for batch runs");
    }

    let slack = SlackClient::from_config(config);
    let bot_user_id = slack
        .auth_test()
        .await
        .context("failed to identify the bot user")?;
    info!(bot_user_id = %bot_user_id, "Authenticated");

    let table = ChannelTable::read(&config.channels_file)
        .with_context(|| format!("failed to read {}", config.channels_file.display()))?;
    if mode == BatchMode::ArchiveOnly && !table.is_annotated() {
        bail!(
            "--archive-only needs a previous output file, {} has no outcome columns",
            table.source().display()
        );
    }

    let ledger = BatchProcessor::new(&slack, config, &exemptions, bot_user_id)
        .run(&table, mode)
        .await;

    finalize_batch(
        &slack,
        &table,
        &ledger,
        &config.archive_output,
        config.admin_channel.as_deref(),
        config.dry_run,
    )
    .await
    .with_context(|| format!("failed to write {}", config.archive_output.display()))?;
    Ok(())
}
