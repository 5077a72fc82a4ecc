//! Best-effort monitoring sink.
//!
//! Forwards failure/success breadcrumbs to an external observability
//! collector. The sink is an explicit object with an `open`/`close`
//! lifecycle, constructed once per process and shared by reference; when no
//! collector endpoint is configured every call is a no-op. Sink failures are
//! logged at debug level and otherwise ignored — they must never fail the
//! job they are reporting on.

use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

/// Where in the pipeline an event was recorded.
#[derive(Debug, Clone, Serialize)]
pub struct SinkContext {
    pub stage: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<Uuid>,
}

impl SinkContext {
    pub fn stage(stage: &str) -> Self {
        Self {
            stage: stage.to_string(),
            job_id: None,
        }
    }

    pub fn with_job(mut self, job_id: Uuid) -> Self {
        self.job_id = Some(job_id);
        self
    }
}

#[derive(Debug, Serialize)]
struct SinkEvent {
    level: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(flatten)]
    context: SinkContext,
    timestamp: String,
}

enum SinkMessage {
    Event(SinkEvent),
    Flush(oneshot::Sender<()>),
}

/// Shared, thread-safe monitoring sink. Cheap to call from any job slot.
pub struct MonitoringSink {
    tx: Option<mpsc::UnboundedSender<SinkMessage>>,
    forwarder: Option<tokio::task::JoinHandle<()>>,
}

impl MonitoringSink {
    /// Open a sink. `endpoint = None` (collector not configured) yields an
    /// inactive sink whose calls all no-op. Must be called from within a
    /// tokio runtime when an endpoint is present.
    pub fn open(endpoint: Option<&str>) -> Self {
        let Some(endpoint) = endpoint.filter(|e| !e.trim().is_empty()) else {
            tracing::debug!("Monitoring sink inactive: no collector endpoint configured");
            return Self {
                tx: None,
                forwarder: None,
            };
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let forwarder = tokio::spawn(forward_events(endpoint.to_string(), rx));
        tracing::info!(endpoint = %endpoint, "Monitoring sink opened");
        Self {
            tx: Some(tx),
            forwarder: Some(forwarder),
        }
    }

    /// Inactive sink, for tests and collectors-off deployments.
    pub fn disabled() -> Self {
        Self::open(None)
    }

    pub fn is_active(&self) -> bool {
        self.tx.is_some()
    }

    /// Record a failure breadcrumb. Fire-and-forget.
    pub fn record_failure(&self, error: &str, context: &SinkContext) {
        self.send(SinkEvent {
            level: "error",
            message: Some(error.to_string()),
            context: context.clone(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        });
    }

    /// Record a success breadcrumb. Fire-and-forget.
    pub fn record_success(&self, context: &SinkContext) {
        self.send(SinkEvent {
            level: "info",
            message: None,
            context: context.clone(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        });
    }

    fn send(&self, event: SinkEvent) {
        if let Some(tx) = &self.tx {
            // A closed channel means the forwarder is gone; drop the event.
            let _ = tx.send(SinkMessage::Event(event));
        }
    }

    /// Wait until every event recorded so far has been forwarded, up to
    /// `timeout`. Returns false if the timeout elapsed; shutdown proceeds
    /// anyway in that case.
    pub async fn flush(&self, timeout: Duration) -> bool {
        let Some(tx) = &self.tx else {
            return true;
        };
        let (ack_tx, ack_rx) = oneshot::channel();
        if tx.send(SinkMessage::Flush(ack_tx)).is_err() {
            return true;
        }
        match tokio::time::timeout(timeout, ack_rx).await {
            Ok(_) => true,
            Err(_) => {
                tracing::warn!(timeout_ms = timeout.as_millis() as u64, "Monitoring sink flush timed out");
                false
            }
        }
    }

    /// Flush and shut the forwarder down. Bounded by `timeout` twice over
    /// (flush, then join); elapsed timeouts abandon the forwarder task.
    pub async fn close(mut self, timeout: Duration) {
        let _ = self.flush(timeout).await;
        self.tx = None;
        if let Some(handle) = self.forwarder.take() {
            if tokio::time::timeout(timeout, handle).await.is_err() {
                tracing::warn!("Monitoring sink forwarder did not stop in time");
            }
        }
    }
}

async fn forward_events(endpoint: String, mut rx: mpsc::UnboundedReceiver<SinkMessage>) {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build();
    let client = match client {
        Ok(c) => c,
        Err(e) => {
            tracing::debug!(error = %e, "Monitoring sink disabled: HTTP client build failed");
            while let Some(message) = rx.recv().await {
                if let SinkMessage::Flush(ack) = message {
                    let _ = ack.send(());
                }
            }
            return;
        }
    };

    while let Some(message) = rx.recv().await {
        match message {
            SinkMessage::Event(event) => {
                if let Err(e) = client.post(&endpoint).json(&event).send().await {
                    tracing::debug!(error = %e, "Monitoring event dropped");
                }
            }
            // Channel order guarantees all prior events were attempted.
            SinkMessage::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_sink_noops_and_flushes_immediately() {
        let sink = MonitoringSink::disabled();
        assert!(!sink.is_active());
        sink.record_failure("boom", &SinkContext::stage("download"));
        sink.record_success(&SinkContext::stage("extract"));
        assert!(sink.flush(Duration::from_millis(10)).await);
        sink.close(Duration::from_millis(10)).await;
    }

    #[tokio::test]
    async fn empty_endpoint_counts_as_unconfigured() {
        let sink = MonitoringSink::open(Some("  "));
        assert!(!sink.is_active());
    }

    #[tokio::test]
    async fn unreachable_collector_never_fails_the_caller() {
        // Port 9 is unassigned on loopback: every post fails, and the sink
        // must swallow that.
        let sink = MonitoringSink::open(Some("http://127.0.0.1:9/events"));
        assert!(sink.is_active());
        let ctx = SinkContext::stage("extract").with_job(Uuid::new_v4());
        sink.record_failure("provider 503", &ctx);
        sink.record_success(&ctx);
        assert!(sink.flush(Duration::from_secs(10)).await);
        sink.close(Duration::from_secs(1)).await;
    }

    #[test]
    fn event_serializes_with_flattened_context() {
        let event = SinkEvent {
            level: "error",
            message: Some("boom".into()),
            context: SinkContext::stage("download"),
            timestamp: "2026-01-01T00:00:00Z".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["level"], "error");
        assert_eq!(json["stage"], "download");
        assert!(json.get("job_id").is_none());
    }
}
