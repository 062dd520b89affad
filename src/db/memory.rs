// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-memory storage backed by `DashMap`.

use crate::db::Storage;
use crate::error::StorageError;
use crate::models::{AccountProfile, AssetFields, AssetState, Event, EventFields, EventKey};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

type AssetKey = (String, String);

/// In-memory [`Storage`].
///
/// Counts every call so tests can assert that storage was (or was not)
/// touched, and can be switched into a failing mode.
#[derive(Default)]
pub struct MemoryStorage {
    events: DashMap<EventKey, Event>,
    assets: DashMap<AssetKey, AssetState>,
    accounts: DashMap<String, AccountProfile>,
    calls: AtomicUsize,
    fail_writes: AtomicBool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write return `StorageError::Unavailable`.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Total number of storage calls (reads and writes).
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn insert_account(&self, profile: AccountProfile) {
        self.accounts.insert(profile.account_id.clone(), profile);
    }

    pub fn insert_asset(&self, state: AssetState) {
        let key = (state.account_id().to_string(), state.asset_id().to_string());
        self.assets.insert(key, state);
    }

    pub fn event(&self, key: &EventKey) -> Option<Event> {
        self.events.get(key).map(|e| e.value().clone())
    }

    pub fn asset(&self, account_id: &str, asset_id: &str) -> Option<AssetState> {
        self.assets
            .get(&(account_id.to_string(), asset_id.to_string()))
            .map(|a| a.value().clone())
    }

    /// All events for an asset, ordered by (timestamp, status code).
    pub fn events_for(&self, account_id: &str, asset_id: &str) -> Vec<Event> {
        let mut events: Vec<Event> = self
            .events
            .iter()
            .filter(|e| e.key().account_id == account_id && e.key().asset_id == asset_id)
            .map(|e| e.value().clone())
            .collect();
        events.sort_by(|a, b| a.key().cmp(&b.key()));
        events
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    fn touch(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<(), StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("writes disabled".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn persist_event(&self, event: &Event) -> Result<(), StorageError> {
        self.touch();
        self.check_writable()?;
        self.events.insert(event.key(), event.clone());
        Ok(())
    }

    async fn persist_event_fields(
        &self,
        event: &Event,
        fields: EventFields,
    ) -> Result<(), StorageError> {
        self.touch();
        self.check_writable()?;
        let key = event.key();
        let mut stored = self
            .events
            .get_mut(&key)
            .ok_or_else(|| StorageError::NotFound(key.to_string()))?;
        stored.copy_fields_from(event, fields);
        Ok(())
    }

    async fn load_asset_state(
        &self,
        account_id: &str,
        asset_id: &str,
    ) -> Result<Option<AssetState>, StorageError> {
        self.touch();
        Ok(self.asset(account_id, asset_id))
    }

    async fn save_asset_state(&self, state: &AssetState) -> Result<(), StorageError> {
        self.touch();
        self.check_writable()?;
        self.insert_asset(state.clone());
        Ok(())
    }

    async fn save_asset_fields(
        &self,
        state: &AssetState,
        fields: AssetFields,
    ) -> Result<(), StorageError> {
        self.touch();
        self.check_writable()?;
        let key = (state.account_id().to_string(), state.asset_id().to_string());
        let mut stored = self
            .assets
            .entry(key)
            .or_insert_with(|| AssetState::new(state.account_id(), state.asset_id()));
        copy_asset_fields(stored.value_mut(), state, fields);
        Ok(())
    }

    async fn load_account(
        &self,
        account_id: &str,
    ) -> Result<Option<AccountProfile>, StorageError> {
        self.touch();
        Ok(self.accounts.get(account_id).map(|a| a.value().clone()))
    }
}

/// Copy the `fields` groups of `src` onto `dst`.
fn copy_asset_fields(dst: &mut AssetState, src: &AssetState, fields: AssetFields) {
    if fields.contains(AssetFields::LOCATION) {
        dst.last_valid_latitude = src.last_valid_latitude;
        dst.last_valid_longitude = src.last_valid_longitude;
        dst.last_valid_heading = src.last_valid_heading;
        dst.last_gps_timestamp = src.last_gps_timestamp;
    }
    if fields.contains(AssetFields::ODOMETER) {
        dst.last_odometer_km = src.last_odometer_km;
        dst.odometer_offset_km = src.odometer_offset_km;
    }
    if fields.contains(AssetFields::ENGINE_HOURS) {
        dst.last_engine_hours = src.last_engine_hours;
    }
    if fields.contains(AssetFields::FUEL) {
        dst.last_fuel_level = src.last_fuel_level;
        dst.last_fuel_total = src.last_fuel_total;
    }
    if fields.contains(AssetFields::BATTERY) {
        dst.last_battery_level = src.last_battery_level;
    }
    if fields.contains(AssetFields::OIL) {
        dst.last_oil_level = src.last_oil_level;
    }
    if fields.contains(AssetFields::INPUT_STATE) {
        dst.last_input_state = src.last_input_state;
    }
    if fields.contains(AssetFields::LAST_NOTIFY) {
        dst.last_notify_time = src.last_notify_time;
        dst.last_notify_code = src.last_notify_code;
    }
    if fields.contains(AssetFields::ACTIVE_CORRIDOR) {
        dst.active_corridor = src.active_corridor.clone();
    }
    if fields.contains(AssetFields::SERVING_CELL) {
        dst.last_serving_cell = src.last_serving_cell.clone();
    }
    if fields.contains(AssetFields::PING) {
        dst.total_ping_count = src.total_ping_count;
        dst.last_ping_time = src.last_ping_time;
    }
    if fields.contains(AssetFields::ACK) {
        dst.expect_ack = src.expect_ack;
        dst.last_ack_command = src.last_ack_command.clone();
        dst.last_ack_time = src.last_ack_time;
    }
}
