// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Last-known state of a tracked asset.
//!
//! Every setter records the touched field in a dirty mask so the pipeline can
//! save exactly the fields an ingestion changed.

use crate::models::event::{normalize_id, CellTower, Event, GeoPoint, MobileLocation};
use crate::models::status::StatusCode;
use serde::{Deserialize, Serialize};
use std::ops::{BitOr, BitOrAssign};

/// Typed set of asset-state fields, used for field-scoped saves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AssetFields(u32);

impl AssetFields {
    pub const NONE: AssetFields = AssetFields(0);
    pub const LOCATION: AssetFields = AssetFields(1 << 0);
    pub const ODOMETER: AssetFields = AssetFields(1 << 1);
    pub const ENGINE_HOURS: AssetFields = AssetFields(1 << 2);
    pub const FUEL: AssetFields = AssetFields(1 << 3);
    pub const BATTERY: AssetFields = AssetFields(1 << 4);
    pub const OIL: AssetFields = AssetFields(1 << 5);
    pub const INPUT_STATE: AssetFields = AssetFields(1 << 6);
    pub const LAST_NOTIFY: AssetFields = AssetFields(1 << 7);
    pub const ACTIVE_CORRIDOR: AssetFields = AssetFields(1 << 8);
    pub const SERVING_CELL: AssetFields = AssetFields(1 << 9);
    pub const PING: AssetFields = AssetFields(1 << 10);
    pub const ACK: AssetFields = AssetFields(1 << 11);
    pub const ALL: AssetFields = AssetFields((1 << 12) - 1);

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, other: AssetFields) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for AssetFields {
    type Output = AssetFields;

    fn bitor(self, rhs: AssetFields) -> AssetFields {
        AssetFields(self.0 | rhs.0)
    }
}

impl BitOrAssign for AssetFields {
    fn bitor_assign(&mut self, rhs: AssetFields) {
        self.0 |= rhs.0;
    }
}

/// Ignition state derived from inputs or ignition status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnitionState {
    Unknown,
    Off,
    On,
}

/// Last serving cell and the location resolved for it (if any).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedCell {
    pub cell: CellTower,
    pub location: Option<MobileLocation>,
}

/// Mutable "last known state" of one asset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetState {
    account_id: String,
    asset_id: String,
    pub description: String,
    /// Comma-separated recipients for geozone auto-notify
    pub notify_email: String,

    pub last_valid_latitude: f64,
    pub last_valid_longitude: f64,
    pub last_valid_heading: f64,
    pub last_gps_timestamp: i64,
    pub last_odometer_km: f64,
    pub odometer_offset_km: f64,
    pub last_engine_hours: f64,
    pub last_fuel_level: f64,
    pub last_fuel_total: f64,
    pub last_battery_level: f64,
    pub last_oil_level: f64,
    pub last_input_state: u32,
    /// Input bit that carries ignition; `None` if not wired
    pub ignition_index: Option<u8>,

    pub last_notify_time: i64,
    pub last_notify_code: StatusCode,
    pub allow_notify: bool,
    pub notify_selector: String,
    pub notify_action: u32,

    pub active_corridor: String,

    pub total_ping_count: u32,
    pub max_ping_count: u32,
    pub last_ping_time: i64,
    pub expect_ack: bool,
    pub last_ack_command: String,
    pub last_ack_time: i64,

    pub last_serving_cell: Option<CachedCell>,

    #[serde(skip)]
    dirty: AssetFields,
}

impl AssetState {
    /// Fresh state for an asset with notifications allowed.
    pub fn new(account_id: &str, asset_id: &str) -> Self {
        Self {
            account_id: normalize_id(account_id),
            asset_id: normalize_id(asset_id),
            allow_notify: true,
            ..Default::default()
        }
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    pub fn asset_id(&self) -> &str {
        &self.asset_id
    }

    /// Display name used in notifications.
    pub fn display_name(&self) -> &str {
        if self.description.trim().is_empty() {
            &self.asset_id
        } else {
            &self.description
        }
    }

    fn mark(&mut self, fields: AssetFields) {
        self.dirty |= fields;
    }

    /// Return and reset the set of fields changed since the last call.
    pub fn take_dirty(&mut self) -> AssetFields {
        std::mem::take(&mut self.dirty)
    }

    pub fn dirty(&self) -> AssetFields {
        self.dirty
    }

    // ─── Location ────────────────────────────────────────────────

    pub fn last_valid_location(&self) -> Option<GeoPoint> {
        let point = GeoPoint::new(self.last_valid_latitude, self.last_valid_longitude);
        point.is_valid().then_some(point)
    }

    pub fn set_last_valid_location(&mut self, timestamp: i64, point: GeoPoint, heading: f64) {
        if !point.is_valid() {
            return;
        }
        self.last_valid_latitude = point.latitude;
        self.last_valid_longitude = point.longitude;
        self.last_valid_heading = heading;
        self.last_gps_timestamp = timestamp;
        self.mark(AssetFields::LOCATION);
    }

    // ─── Counters ────────────────────────────────────────────────

    /// Update the odometer. Values that would move it backwards or reach
    /// `max_km` are ignored. Returns whether the value was stored.
    pub fn set_last_odometer_km(&mut self, value_km: f64, max_km: f64) -> bool {
        if !(value_km > 0.0 && value_km < max_km) || value_km < self.last_odometer_km {
            return false;
        }
        self.last_odometer_km = value_km;
        self.mark(AssetFields::ODOMETER);
        true
    }

    pub fn set_last_engine_hours(&mut self, hours: f64) {
        self.last_engine_hours = hours;
        self.mark(AssetFields::ENGINE_HOURS);
    }

    pub fn set_last_fuel_level(&mut self, level: f64) {
        self.last_fuel_level = level;
        self.mark(AssetFields::FUEL);
    }

    pub fn set_last_fuel_total(&mut self, total: f64) {
        self.last_fuel_total = total;
        self.mark(AssetFields::FUEL);
    }

    pub fn set_last_battery_level(&mut self, level: f64) {
        self.last_battery_level = level;
        self.mark(AssetFields::BATTERY);
    }

    pub fn set_last_oil_level(&mut self, level: f64) {
        self.last_oil_level = level;
        self.mark(AssetFields::OIL);
    }

    pub fn set_last_input_state(&mut self, mask: u32) {
        if self.last_input_state != mask {
            self.last_input_state = mask;
            self.mark(AssetFields::INPUT_STATE);
        }
    }

    // ─── Notification / corridor ─────────────────────────────────

    pub fn set_last_notify(&mut self, timestamp: i64, code: StatusCode) {
        self.last_notify_time = timestamp;
        self.last_notify_code = code;
        self.mark(AssetFields::LAST_NOTIFY);
    }

    pub fn has_active_corridor(&self) -> bool {
        !self.active_corridor.trim().is_empty()
    }

    /// Set (or clear, with `""`) the active corridor.
    pub fn set_active_corridor(&mut self, corridor_id: &str) {
        let corridor_id = corridor_id.trim();
        if self.active_corridor != corridor_id {
            self.active_corridor = corridor_id.to_string();
            self.mark(AssetFields::ACTIVE_CORRIDOR);
        }
    }

    pub fn set_last_serving_cell(&mut self, cell: CellTower, location: Option<MobileLocation>) {
        self.last_serving_cell = Some(CachedCell { cell, location });
        self.mark(AssetFields::SERVING_CELL);
    }

    // ─── Ping / ack ──────────────────────────────────────────────

    pub fn increment_ping_count(&mut self, ping_time: i64) {
        self.total_ping_count = self.total_ping_count.saturating_add(1);
        if ping_time > 0 {
            self.last_ping_time = ping_time;
        }
        self.mark(AssetFields::PING);
    }

    pub fn exceeds_max_ping_count(&self) -> bool {
        self.max_ping_count > 0 && self.total_ping_count >= self.max_ping_count
    }

    pub fn is_expecting_command_ack(&self) -> bool {
        self.expect_ack && self.last_ack_time <= 0
    }

    /// Record that `command` expects an acknowledgement. Returns false for a
    /// blank command.
    pub fn set_expect_command_ack(&mut self, command: &str) -> bool {
        let command = command.trim();
        if command.is_empty() {
            return false;
        }
        if self.is_expecting_command_ack() {
            tracing::warn!(
                asset_id = %self.asset_id,
                pending = %self.last_ack_command,
                "Already expecting an ACK"
            );
        }
        self.expect_ack = true;
        self.last_ack_command = command.to_string();
        self.last_ack_time = 0;
        self.mark(AssetFields::ACK);
        true
    }

    /// Clear a pending acknowledgement, stamping `now`. Returns false if no
    /// acknowledgement was expected.
    pub fn clear_expect_command_ack(&mut self, now: i64) -> bool {
        if !self.is_expecting_command_ack() {
            return false;
        }
        self.expect_ack = false;
        self.last_ack_time = now;
        self.mark(AssetFields::ACK);
        true
    }

    // ─── Ignition ────────────────────────────────────────────────

    /// Ignition state from the last known input mask.
    pub fn ignition_state(&self) -> IgnitionState {
        match self.ignition_index {
            Some(bit) if bit < 32 => {
                if self.last_input_state & (1 << bit) != 0 {
                    IgnitionState::On
                } else {
                    IgnitionState::Off
                }
            }
            _ => IgnitionState::Unknown,
        }
    }

    /// Ignition state as of `event`: explicit ignition codes win, then the
    /// event's input mask.
    pub fn ignition_state_at(&self, event: &Event) -> IgnitionState {
        match event.status_code {
            StatusCode::IGNITION_ON => IgnitionState::On,
            StatusCode::IGNITION_OFF => IgnitionState::Off,
            _ => match self.ignition_index {
                Some(bit) if bit < 32 => {
                    if event.input_mask & (1 << bit) != 0 {
                        IgnitionState::On
                    } else {
                        IgnitionState::Off
                    }
                }
                _ => IgnitionState::Unknown,
            },
        }
    }
}
