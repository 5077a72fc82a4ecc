//! Types crossing the extraction-provider boundary.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::retry::TransientError;

/// Advisory page selection passed with an extraction request.
///
/// Pages are 1-based positive indices; the provider is free to ignore the
/// hint (e.g. for single-page scans).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageHints {
    pub pages: Vec<u32>,
}

impl PageHints {
    /// Keep only positive page numbers; returns `None` if nothing survives.
    pub fn new(pages: Vec<u32>) -> Option<Self> {
        let pages: Vec<u32> = pages.into_iter().filter(|&p| p > 0).collect();
        if pages.is_empty() {
            None
        } else {
            Some(Self { pages })
        }
    }
}

/// Successful outcome of one extraction call.
///
/// Ephemeral: consumed immediately by the job processor, which projects it
/// into a cost-ledger row and the job's result field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Extraction {
    pub provider: String,
    pub model: String,
    /// Structured document content as returned by the provider.
    pub data: serde_json::Value,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub pages_processed: u32,
    pub cost_usd: f64,
    pub processing_time_ms: u64,
}

/// Failure modes of the extraction boundary, classifiable for retry.
#[derive(thiserror::Error, Debug)]
pub enum ExtractError {
    #[error("Provider returned HTTP {status}: {body}")]
    Provider {
        status: u16,
        body: String,
        retry_after: Option<Duration>,
    },

    #[error("Extraction request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Network error: {message}")]
    Network {
        /// System error code when one could be recovered (e.g. "ECONNRESET").
        code: Option<String>,
        message: String,
    },

    #[error("Provider response could not be parsed: {0}")]
    ResponseParsing(String),

    /// Semantic failure: the provider read the request fine but rejected
    /// the document. Never retried unless the message matches a transient
    /// pattern.
    #[error("Document rejected by provider: {0}")]
    Unreadable(String),
}

impl TransientError for ExtractError {
    fn status_code(&self) -> Option<u16> {
        match self {
            Self::Provider { status, .. } => Some(*status),
            _ => None,
        }
    }

    fn error_code(&self) -> Option<&str> {
        match self {
            Self::Network { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Provider { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}
