// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Error types for the ingestion pipeline and its collaborators.

/// Storage collaborator failure.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Write failed: {0}")]
    Write(String),
}

/// Failure reported by an enrichment provider (geocoder, cell locator,
/// notification gateway).
///
/// These never escape the pipeline: they are logged at the call site and
/// turned into "no enrichment performed".
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    #[error("Provider refused slow operation")]
    Slow,

    #[error("Provider failed: {0}")]
    Failed(String),
}

/// Error returned by `IngestionPipeline::submit`.
///
/// Only persistence failures reach the caller; everything else degrades.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("Persistence failed: {0}")]
    Persistence(#[from] StorageError),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IngestError {
    /// True if the event was not stored and the transport may retry it.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            IngestError::Persistence(StorageError::Unavailable(_) | StorageError::Write(_))
        )
    }
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, IngestError>;
