//! Job-processing error taxonomy.
//!
//! Separate variants per pipeline step so the terminal failure message names
//! what actually broke: resolving the input, downloading it, extracting
//! content, or persisting results.

use thiserror::Error;

use super::location::LocationError;
use super::store::StoreError;
use crate::extraction::ExtractError;
use crate::storage::StorageError;

#[derive(Error, Debug)]
pub enum JobError {
    #[error(transparent)]
    Location(#[from] LocationError),

    #[error("Download failed: {0}")]
    Download(#[from] StorageError),

    #[error("Extraction failed after {attempts} attempt(s): {source}")]
    ExtractionExhausted {
        attempts: u32,
        #[source]
        source: ExtractError,
    },

    /// The durable `processing` mark could not be written. The attempt is
    /// aborted without side effects — no `failed` write follows.
    #[error("Could not mark job processing: {0}")]
    StatusTransition(StoreError),

    #[error("Persistence error: {0}")]
    Store(#[from] StoreError),
}

impl JobError {
    /// Pipeline stage name for monitoring breadcrumbs.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Location(_) => "resolve",
            Self::Download(_) => "download",
            Self::ExtractionExhausted { .. } => "extract",
            Self::StatusTransition(_) => "status",
            Self::Store(_) => "persist",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_messages_name_the_step() {
        let err = JobError::Download(StorageError::Network("connection reset".into()));
        assert!(err.to_string().starts_with("Download failed"));
        assert_eq!(err.stage(), "download");

        let err = JobError::ExtractionExhausted {
            attempts: 5,
            source: ExtractError::Timeout(std::time::Duration::from_secs(120)),
        };
        assert!(err.to_string().contains("after 5 attempt(s)"));
        assert_eq!(err.stage(), "extract");
    }
}
