//! Job processor — drives one dequeued job through the extraction pipeline.
//!
//! Sequence per job: resolve the scan's input location, mark `processing`,
//! download the bytes, extract through the retry executor, persist the cost
//! record and result, then write the terminal status. Side effects are
//! strictly ordered: no success status without a prior cost-record write,
//! and no `failed` write once a terminal state is reached.

use std::sync::Arc;

use super::error::JobError;
use super::location::resolve_storage_path;
use super::store::JobStore;
use super::types::{BatchOutcome, CostRecord, Job, JobStatus};
use crate::extraction::DocumentExtractor;
use crate::monitor::{MonitoringSink, SinkContext};
use crate::retry::{self, RetryConfig};
use crate::storage::ObjectStore;

/// Orchestrates job execution. Generic over its seams so tests plug in
/// mocks; shares one read-only retry policy and one monitoring sink across
/// all concurrent invocations.
pub struct JobProcessor<S, O, X> {
    store: S,
    objects: O,
    extractor: X,
    retry: RetryConfig,
    bucket: String,
    monitor: Arc<MonitoringSink>,
}

impl<S, O, X> JobProcessor<S, O, X>
where
    S: JobStore,
    O: ObjectStore,
    X: DocumentExtractor,
{
    pub fn new(
        store: S,
        objects: O,
        extractor: X,
        retry: RetryConfig,
        bucket: &str,
        monitor: Arc<MonitoringSink>,
    ) -> Self {
        Self {
            store,
            objects,
            extractor,
            retry,
            bucket: bucket.to_string(),
            monitor,
        }
    }

    /// Process a single job to a terminal state. Returns 0/1 aggregate
    /// counts for the caller's batch bookkeeping; errors are fully handled
    /// here (terminal `failed` write plus monitoring), never propagated.
    pub async fn process_job(&self, job: &Job) -> BatchOutcome {
        match self.run(job).await {
            Ok(status) => {
                tracing::info!(job_id = %job.id, status = %status, "Job reached terminal state");
                self.monitor
                    .record_success(&SinkContext::stage("job").with_job(job.id));
                BatchOutcome::success()
            }
            Err(JobError::StatusTransition(e)) => {
                // The processing mark never landed: abort with no side
                // effects and leave the job for the external re-drive.
                tracing::warn!(
                    job_id = %job.id,
                    error = %e,
                    "Could not mark job processing; aborting attempt"
                );
                self.monitor.record_failure(
                    &e.to_string(),
                    &SinkContext::stage("status").with_job(job.id),
                );
                BatchOutcome::failure()
            }
            Err(e) => {
                let message = e.to_string();
                tracing::error!(job_id = %job.id, stage = e.stage(), error = %message, "Job failed");
                self.monitor
                    .record_failure(&message, &SinkContext::stage(e.stage()).with_job(job.id));
                if let Err(write_err) = self.store.fail_job(job.id, &message, job.attempts).await {
                    tracing::error!(
                        job_id = %job.id,
                        error = %write_err,
                        "Could not record job failure"
                    );
                }
                BatchOutcome::failure()
            }
        }
    }

    /// Drive a slice of jobs sequentially, aggregating counts. Concurrency
    /// across worker slots is the caller's concern.
    pub async fn process_batch(&self, jobs: &[Job]) -> BatchOutcome {
        let mut total = BatchOutcome::default();
        for job in jobs {
            total.absorb(self.process_job(job).await);
        }
        tracing::info!(
            succeeded = total.succeeded,
            failed = total.failed,
            "Batch finished"
        );
        total
    }

    async fn run(&self, job: &Job) -> Result<JobStatus, JobError> {
        // Step 1: resolve the input location before touching the job row.
        let scan = self.store.get_scan(job.scan_id).await?;
        let path = resolve_storage_path(
            scan.file_path.as_deref(),
            scan.file_url.as_deref(),
            &self.bucket,
        )?;

        // Step 2: durable processing mark.
        self.store
            .mark_processing(job.id)
            .await
            .map_err(JobError::StatusTransition)?;

        // Step 3: download the scan bytes.
        let bytes = self.objects.download(&path).await?;

        // Step 4: extract through the retry executor.
        let result = retry::execute_with(
            || self.extractor.extract(&bytes, scan.page_hints.as_ref()),
            &self.retry,
            |outcome| {
                tracing::warn!(
                    job_id = %job.id,
                    attempt = outcome.attempt,
                    total_delay_ms = outcome.total_delay.as_millis() as u64,
                    error = %outcome.error,
                    "Extraction attempt failed; backing off"
                );
            },
        )
        .await;
        let extraction = match result.outcome {
            Ok(extraction) => extraction,
            Err(source) => {
                return Err(JobError::ExtractionExhausted {
                    attempts: result.attempts,
                    source,
                })
            }
        };

        tracing::debug!(
            job_id = %job.id,
            attempts = result.attempts,
            cost_usd = extraction.cost_usd,
            input_tokens = extraction.input_tokens,
            output_tokens = extraction.output_tokens,
            "Extraction succeeded"
        );

        // Step 5: cost ledger first, then the terminal success write.
        let cost = CostRecord::from_extraction(job.id, &extraction);
        self.store.record_cost(&cost).await?;

        let status = if scan.project_id.is_none() {
            JobStatus::ReviewNewProject
        } else {
            JobStatus::Completed
        };
        self.store
            .complete_job(job.id, status, &extraction.data)
            .await?;

        Ok(status)
    }
}
