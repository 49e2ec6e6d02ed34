//! Channel Reaper: classify disused Slack channels and archive them.

pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod reaper;
pub mod slack;
pub mod table;
