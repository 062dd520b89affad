// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Storage layer.
//!
//! The pipeline only sees the [`Storage`] trait. [`MemoryStorage`] is the
//! reference implementation used by tests and the replay binary.

pub mod memory;

pub use memory::MemoryStorage;

use crate::error::StorageError;
use crate::models::{AccountProfile, AssetFields, AssetState, Event, EventFields};
use async_trait::async_trait;

/// Persistence contract for events, asset state and account profiles.
///
/// Implementations need single-record atomicity only. Field-scoped writes
/// (`persist_event_fields`, `save_asset_fields`) must not overwrite fields
/// outside the given set.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Insert (or replace) an event record.
    async fn persist_event(&self, event: &Event) -> Result<(), StorageError>;

    /// Update only `fields` on an already persisted event.
    async fn persist_event_fields(
        &self,
        event: &Event,
        fields: EventFields,
    ) -> Result<(), StorageError>;

    async fn load_asset_state(
        &self,
        account_id: &str,
        asset_id: &str,
    ) -> Result<Option<AssetState>, StorageError>;

    /// Write the whole asset record.
    async fn save_asset_state(&self, state: &AssetState) -> Result<(), StorageError>;

    /// Write only `fields` of the asset record.
    async fn save_asset_fields(
        &self,
        state: &AssetState,
        fields: AssetFields,
    ) -> Result<(), StorageError>;

    async fn load_account(&self, account_id: &str)
        -> Result<Option<AccountProfile>, StorageError>;
}
