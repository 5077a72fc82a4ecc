//! Input-location resolution.
//!
//! A scan record points at its uploaded file in one of three shapes: a plain
//! storage-relative path, a public URL containing the literal bucket segment,
//! or a signed/opaque URL whose path must be scanned for the bucket token.
//! One parsing function unifies all three behind a typed result so it can be
//! tested independently of the download step.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LocationError {
    #[error("Scan record has neither a storage path nor a file URL")]
    Missing,

    #[error("Could not derive a storage path from URL (no '{bucket}' segment): {url}")]
    UnrecognizedUrl { bucket: String, url: String },

    #[error("File URL has no path after the '{bucket}' segment: {url}")]
    EmptyPath { bucket: String, url: String },
}

/// Resolve the storage-relative path of a scan's uploaded file.
///
/// `file_path` wins when present; otherwise `file_url` is parsed. Both
/// absent, or a URL that does not contain the bucket segment, is a fatal
/// resolution error — never retried.
pub fn resolve_storage_path(
    file_path: Option<&str>,
    file_url: Option<&str>,
    bucket: &str,
) -> Result<String, LocationError> {
    if let Some(path) = file_path.map(str::trim).filter(|p| !p.is_empty()) {
        return Ok(path.trim_start_matches('/').to_string());
    }

    let url = file_url
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .ok_or(LocationError::Missing)?;

    path_from_url(url, bucket)
}

/// Extract everything after the bucket segment of a URL path, with query
/// string and fragment stripped (signed URLs carry their token as a query).
fn path_from_url(url: &str, bucket: &str) -> Result<String, LocationError> {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);

    let mut segments = without_query.split('/').peekable();
    while let Some(segment) = segments.next() {
        if segment == bucket {
            let rest: Vec<&str> = segments.filter(|s| !s.is_empty()).collect();
            if rest.is_empty() {
                return Err(LocationError::EmptyPath {
                    bucket: bucket.to_string(),
                    url: url.to_string(),
                });
            }
            return Ok(rest.join("/"));
        }
    }

    Err(LocationError::UnrecognizedUrl {
        bucket: bucket.to_string(),
        url: url.to_string(),
    })
}
