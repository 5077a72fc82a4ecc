//! Core types for the extraction job lifecycle.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::extraction::{Extraction, PageHints};

/// Job status state machine:
/// `pending → processing → {completed | review_new_project | failed}`.
///
/// The three right-hand states are terminal; the processor never moves a job
/// backward. `pending` is set by the external enqueuer, never by this core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    ReviewNewProject,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::ReviewNewProject => "review_new_project",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "review_new_project" => Some(Self::ReviewNewProject),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// True for states from which no further automatic transition occurs.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::ReviewNewProject | Self::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One dequeued unit of work. The row itself is owned by the external
/// queue/store; this core only reads it and updates status/result fields.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: Uuid,
    /// The scan this job extracts. Opaque to the retry executor.
    pub scan_id: Uuid,
    /// Retry counter carried from the outer dequeue mechanism — distinct
    /// from the retry executor's own attempt count.
    pub attempts: u32,
    pub status: JobStatus,
}

/// The job's associated scan record: where the file lives, what pages to
/// read, and the discriminator choosing the terminal success status.
#[derive(Debug, Clone)]
pub struct ScanRecord {
    pub id: Uuid,
    pub file_path: Option<String>,
    pub file_url: Option<String>,
    pub page_hints: Option<PageHints>,
    /// `None` means the scan targets a new project: success lands in
    /// `review_new_project` instead of `completed`.
    pub project_id: Option<Uuid>,
}

/// Append-only cost-ledger entry, written once per committed extraction
/// (the attempt that ultimately succeeds, not every retry).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostRecord {
    pub job_id: Uuid,
    pub provider: String,
    pub model: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub pages_processed: u32,
    pub cost_usd: f64,
    pub processing_time_ms: u64,
}

impl CostRecord {
    pub fn from_extraction(job_id: Uuid, extraction: &Extraction) -> Self {
        Self {
            job_id,
            provider: extraction.provider.clone(),
            model: extraction.model.clone(),
            input_tokens: extraction.input_tokens,
            output_tokens: extraction.output_tokens,
            pages_processed: extraction.pages_processed,
            cost_usd: extraction.cost_usd,
            processing_time_ms: extraction.processing_time_ms,
        }
    }
}

/// Aggregate counts returned to the caller for batch bookkeeping.
/// Both fields are 0/1 for a single-job invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    pub succeeded: u32,
    pub failed: u32,
}

impl BatchOutcome {
    pub fn success() -> Self {
        Self {
            succeeded: 1,
            failed: 0,
        }
    }

    pub fn failure() -> Self {
        Self {
            succeeded: 0,
            failed: 1,
        }
    }

    pub fn absorb(&mut self, other: BatchOutcome) {
        self.succeeded += other.succeeded;
        self.failed += other.failed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            JobStatus::Pending,
            JobStatus::Processing,
            JobStatus::Completed,
            JobStatus::ReviewNewProject,
            JobStatus::Failed,
        ] {
            assert_eq!(JobStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(JobStatus::from_str("cancelled"), None);
    }

    #[test]
    fn only_right_hand_states_are_terminal() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::ReviewNewProject.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }

    #[test]
    fn cost_record_projects_all_extraction_fields() {
        let extraction = crate::extraction::MockExtractor::sample_extraction();
        let job_id = Uuid::new_v4();
        let cost = CostRecord::from_extraction(job_id, &extraction);
        assert_eq!(cost.job_id, job_id);
        assert_eq!(cost.provider, extraction.provider);
        assert_eq!(cost.model, extraction.model);
        assert_eq!(cost.input_tokens, extraction.input_tokens);
        assert_eq!(cost.output_tokens, extraction.output_tokens);
        assert_eq!(cost.cost_usd, extraction.cost_usd);
    }

    #[test]
    fn batch_outcome_absorbs_counts() {
        let mut total = BatchOutcome::default();
        total.absorb(BatchOutcome::success());
        total.absorb(BatchOutcome::failure());
        total.absorb(BatchOutcome::success());
        assert_eq!(
            total,
            BatchOutcome {
                succeeded: 2,
                failed: 1
            }
        );
    }
}
