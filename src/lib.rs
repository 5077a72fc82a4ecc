//! Background job-processing core for the mapping-sheet extraction workers.
//!
//! A worker process dequeues extraction jobs (outside this crate), then
//! drives each one through [`jobs::JobProcessor`]: resolve the scan's
//! storage location, download it, extract structured content through the
//! retry executor, and persist results plus a cost-ledger row, landing the
//! job in exactly one terminal state. The HTTP/CLI scaffolding that starts
//! a worker, the dequeue loop, and the relational schema beyond the calls
//! made here are external collaborators.

pub mod config;
pub mod extraction;
pub mod jobs;
pub mod monitor;
pub mod retry;
pub mod storage;

use tracing_subscriber::EnvFilter;

/// Initialize tracing for a worker process. Safe to call more than once;
/// later calls are ignored.
pub fn init_telemetry() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .try_init();
}
