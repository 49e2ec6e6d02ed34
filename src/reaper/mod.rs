//! Disuse classification and archival workflows.
//!
//! Two drivers share one classifier, one exemption filter and one outcome
//! recorder:
//! 1. `LiveScanner` walks the current channel directory and archives as it goes.
//! 2. `BatchProcessor` works an exported table in two passes: capture
//!    membership for every row, then archive the rows that came through clean.

pub mod batch;
pub mod disuse;
pub mod exemption;
pub mod live;
pub mod outcome;

pub use batch::{BatchMode, BatchProcessor};
pub use exemption::ExemptionList;
pub use live::LiveScanner;
