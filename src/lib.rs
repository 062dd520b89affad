// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Fleet-Ingest: telemetry event ingestion and enrichment
//!
//! This crate validates telemetry events reported by tracked assets, enriches
//! them with address, geozone and corridor state, evaluates notification
//! rules, and defers slow enrichment to a background worker pool.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod time_utils;

pub use config::Config;
pub use error::{IngestError, Result};
pub use services::{Collaborators, IngestOutcome, IngestionPipeline};
