//! Extraction-provider boundary: normalized result types and the HTTP
//! adapter the job processor calls through the retry executor.

pub mod client;
pub mod types;

pub use client::{cost_for_tokens, DocumentExtractor, HttpExtractionClient, MockExtractor};
pub use types::{ExtractError, Extraction, PageHints};
