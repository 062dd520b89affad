// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Fleet-Ingest replay tool
//!
//! Reads JSON-lines telemetry events from a file (or stdin) and runs each one
//! through the ingestion pipeline backed by in-memory storage and the
//! configured geozone file.

use anyhow::Context;
use fleet_ingest::{
    config::Config,
    db::{MemoryStorage, Storage},
    models::Event,
    services::{Collaborators, GeozoneIndex, GeozoneLookup, IngestOutcome, IngestionPipeline},
    time_utils::SystemClock,
};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured JSON logging
    init_logging();

    // Load configuration from environment
    let config = Config::from_env();
    tracing::info!(
        workers = config.background_workers,
        queue_size = config.background_queue_size,
        "Starting Fleet-Ingest replay"
    );

    // Load geozone boundaries
    let mut collaborators = Collaborators::default();
    if let Some(path) = config.geozones_file.as_ref() {
        tracing::info!(path = %path.display(), "Loading geozones");
        let index = GeozoneIndex::load_from_file(path)
            .with_context(|| format!("Failed to load geozones from {}", path.display()))?;
        tracing::info!(count = index.len(), "Geozones loaded");
        let lookup: Arc<dyn GeozoneLookup> = Arc::new(index);
        collaborators.geozones = Some(lookup);
    }

    let memory = Arc::new(MemoryStorage::new());
    let storage: Arc<dyn Storage> = memory.clone();
    let pipeline =
        IngestionPipeline::new(config, storage, collaborators, Arc::new(SystemClock));

    let stats = match std::env::args().nth(1) {
        Some(path) => {
            let file = tokio::fs::File::open(&path)
                .await
                .with_context(|| format!("Failed to open {path}"))?;
            replay(&pipeline, BufReader::new(file)).await?
        }
        None => replay(&pipeline, BufReader::new(tokio::io::stdin())).await?,
    };

    pipeline.shutdown().await;
    tracing::info!(
        accepted = stats.accepted,
        synthesized = stats.synthesized,
        heartbeats = stats.heartbeats,
        rejected = stats.rejected,
        malformed = stats.malformed,
        failed = stats.failed,
        stored = memory.event_count(),
        "Replay complete"
    );
    Ok(())
}

#[derive(Debug, Default)]
struct ReplayStats {
    accepted: usize,
    synthesized: usize,
    heartbeats: usize,
    rejected: usize,
    malformed: usize,
    failed: usize,
}

/// Ingest one event per non-blank line. Malformed lines are logged and
/// skipped.
async fn replay<R>(pipeline: &IngestionPipeline, reader: R) -> anyhow::Result<ReplayStats>
where
    R: AsyncBufRead + Unpin,
{
    let mut stats = ReplayStats::default();
    let mut lines = reader.lines();
    let mut line_no = 0usize;

    while let Some(line) = lines.next_line().await.context("Failed to read input")? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }
        let event: Event = match serde_json::from_str(&line) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(line = line_no, error = %e, "Skipping malformed event");
                stats.malformed += 1;
                continue;
            }
        };

        match pipeline.submit(event).await {
            Ok(IngestOutcome::Accepted { synthesized, .. }) => {
                stats.accepted += 1;
                stats.synthesized += synthesized;
            }
            Ok(IngestOutcome::Heartbeat) => stats.heartbeats += 1,
            Ok(IngestOutcome::Rejected(reason)) => {
                tracing::info!(line = line_no, reason = %reason, "Event rejected");
                stats.rejected += 1;
            }
            Err(e) => {
                tracing::error!(
                    line = line_no,
                    retryable = e.is_retryable(),
                    error = %e,
                    "Event ingestion failed"
                );
                stats.failed += 1;
            }
        }
    }

    tracing::debug!(lines = line_no, "Input exhausted");
    Ok(stats)
}

/// Initialize structured JSON logging.
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    for directive in ["fleet_ingest=debug", "info"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    tracing_subscriber::registry().with(filter).with(format).init();
}
