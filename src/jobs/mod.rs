//! Job-processing core: status state machine, input-location resolution,
//! the persistence seam, and the processor that orchestrates one job from
//! `pending` to a terminal state.

pub mod error;
pub mod location;
pub mod processor;
pub mod store;
pub mod types;

pub use error::JobError;
pub use location::{resolve_storage_path, LocationError};
pub use processor::JobProcessor;
pub use store::{JobStore, SqliteJobStore, StoreError};
pub use types::{BatchOutcome, CostRecord, Job, JobStatus, ScanRecord};
