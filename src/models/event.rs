// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Telemetry event model and typed field masks.

use crate::models::status::StatusCode;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Coordinates closer than this to 0/0 are treated as "unset".
const ZERO_EPSILON: f64 = 0.0001;

/// WGS84 point. `0/0` means "no fix".
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// True if the point is inside WGS84 ranges and not the 0/0 placeholder.
    pub fn is_valid(&self) -> bool {
        let in_range = (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude);
        let is_zero = self.latitude.abs() < ZERO_EPSILON && self.longitude.abs() < ZERO_EPSILON;
        in_range && !is_zero
    }
}

impl From<GeoPoint> for geo::Point<f64> {
    fn from(p: GeoPoint) -> Self {
        geo::Point::new(p.longitude, p.latitude)
    }
}

impl fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.5}/{:.5}", self.latitude, self.longitude)
    }
}

/// GSM/LTE cell descriptor reported by the device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellTower {
    pub cell_id: i64,
    pub mobile_country_code: i32,
    pub mobile_network_code: i32,
    #[serde(default)]
    pub location_area_code: i32,
}

impl CellTower {
    /// Cell id must be positive; MCC/MNC may be zero but not negative.
    pub fn is_valid(&self) -> bool {
        self.cell_id > 0 && self.mobile_country_code >= 0 && self.mobile_network_code >= 0
    }
}

/// Location resolved for a cell tower by a mobile-location provider.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MobileLocation {
    pub point: GeoPoint,
    /// Accuracy radius in meters, if the provider reports one.
    pub accuracy_m: Option<f64>,
}

/// Typed set of event fields, used for field-scoped updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct EventFields(u32);

impl EventFields {
    pub const NONE: EventFields = EventFields(0);
    pub const ADDRESS: EventFields = EventFields(1 << 0);
    pub const STREET_ADDRESS: EventFields = EventFields(1 << 1);
    pub const CITY: EventFields = EventFields(1 << 2);
    pub const STATE_PROVINCE: EventFields = EventFields(1 << 3);
    pub const POSTAL_CODE: EventFields = EventFields(1 << 4);
    pub const COUNTRY: EventFields = EventFields(1 << 5);
    pub const SUBDIVISION: EventFields = EventFields(1 << 6);
    pub const SPEED_LIMIT: EventFields = EventFields(1 << 7);
    pub const TOLL_ROAD: EventFields = EventFields(1 << 8);
    pub const GEOZONE_ID: EventFields = EventFields(1 << 9);
    pub const GEOZONE_INDEX: EventFields = EventFields(1 << 10);
    pub const CELL_LOCATION: EventFields = EventFields(1 << 11);
    pub const CELL_ACCURACY: EventFields = EventFields(1 << 12);

    const NAMES: [(EventFields, &'static str); 13] = [
        (Self::ADDRESS, "address"),
        (Self::STREET_ADDRESS, "streetAddress"),
        (Self::CITY, "city"),
        (Self::STATE_PROVINCE, "stateProvince"),
        (Self::POSTAL_CODE, "postalCode"),
        (Self::COUNTRY, "country"),
        (Self::SUBDIVISION, "subdivision"),
        (Self::SPEED_LIMIT, "speedLimitKPH"),
        (Self::TOLL_ROAD, "isTollRoad"),
        (Self::GEOZONE_ID, "geozoneID"),
        (Self::GEOZONE_INDEX, "geozoneIndex"),
        (Self::CELL_LOCATION, "cellLocation"),
        (Self::CELL_ACCURACY, "cellAccuracy"),
    ];

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, other: EventFields) -> bool {
        self.0 & other.0 == other.0
    }

    /// Field names, for log output.
    pub fn names(self) -> Vec<&'static str> {
        Self::NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect()
    }
}

impl BitOr for EventFields {
    type Output = EventFields;

    fn bitor(self, rhs: EventFields) -> EventFields {
        EventFields(self.0 | rhs.0)
    }
}

impl BitOrAssign for EventFields {
    fn bitor_assign(&mut self, rhs: EventFields) {
        self.0 |= rhs.0;
    }
}

/// Normalize an account or asset id (trimmed, lower-case).
pub fn normalize_id(id: &str) -> String {
    id.trim().to_lowercase()
}

/// One telemetry sample.
///
/// Keyed by (account, asset, timestamp, status code). Multiple status codes
/// may share a timestamp.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Event {
    pub account_id: String,
    pub asset_id: String,
    /// Unix seconds
    pub timestamp: i64,
    pub status_code: StatusCode,

    pub point: GeoPoint,
    pub speed_kph: f64,
    pub heading: f64,
    pub altitude_m: f64,
    pub odometer_km: f64,
    /// Fuel level as a fraction (0.0..=1.0)
    pub fuel_level: f64,
    pub fuel_total: f64,
    pub engine_hours: f64,
    pub battery_level: f64,
    pub oil_level: f64,
    pub input_mask: u32,

    pub address: String,
    pub street_address: String,
    pub city: String,
    pub state_province: String,
    pub postal_code: String,
    pub country: String,
    pub subdivision: String,
    pub speed_limit_kph: f64,
    pub is_toll_road: bool,

    pub geozone_id: String,
    /// Client-assigned numeric geozone id (0 = none)
    pub geozone_index: u64,

    pub serving_cell: Option<CellTower>,
    pub neighbor_cells: Vec<CellTower>,
    pub cell_point: GeoPoint,
    pub cell_accuracy_m: f64,

    /// Generated by the pipeline rather than reported by hardware.
    pub is_synthesized: bool,
}

impl Event {
    pub fn new(account_id: &str, asset_id: &str, timestamp: i64, status_code: StatusCode) -> Self {
        Self {
            account_id: normalize_id(account_id),
            asset_id: normalize_id(asset_id),
            timestamp,
            status_code,
            ..Default::default()
        }
    }

    pub fn with_point(mut self, latitude: f64, longitude: f64) -> Self {
        self.point = GeoPoint::new(latitude, longitude);
        self
    }

    pub fn has_valid_point(&self) -> bool {
        self.point.is_valid()
    }

    pub fn has_address(&self) -> bool {
        !self.address.trim().is_empty()
    }

    /// Copy of this event under a new status code (and optionally a new
    /// timestamp), flagged as synthesized. All non-key fields are copied.
    pub fn copy_synthesized(&self, status_code: StatusCode, timestamp: Option<i64>) -> Event {
        Event {
            timestamp: timestamp.unwrap_or(self.timestamp),
            status_code,
            is_synthesized: true,
            ..self.clone()
        }
    }

    /// Copy exactly the `fields` from `other` onto this event.
    pub fn copy_fields_from(&mut self, other: &Event, fields: EventFields) {
        if fields.contains(EventFields::ADDRESS) {
            self.address = other.address.clone();
        }
        if fields.contains(EventFields::STREET_ADDRESS) {
            self.street_address = other.street_address.clone();
        }
        if fields.contains(EventFields::CITY) {
            self.city = other.city.clone();
        }
        if fields.contains(EventFields::STATE_PROVINCE) {
            self.state_province = other.state_province.clone();
        }
        if fields.contains(EventFields::POSTAL_CODE) {
            self.postal_code = other.postal_code.clone();
        }
        if fields.contains(EventFields::COUNTRY) {
            self.country = other.country.clone();
        }
        if fields.contains(EventFields::SUBDIVISION) {
            self.subdivision = other.subdivision.clone();
        }
        if fields.contains(EventFields::SPEED_LIMIT) {
            self.speed_limit_kph = other.speed_limit_kph;
        }
        if fields.contains(EventFields::TOLL_ROAD) {
            self.is_toll_road = other.is_toll_road;
        }
        if fields.contains(EventFields::GEOZONE_ID) {
            self.geozone_id = other.geozone_id.clone();
        }
        if fields.contains(EventFields::GEOZONE_INDEX) {
            self.geozone_index = other.geozone_index;
        }
        if fields.contains(EventFields::CELL_LOCATION) {
            self.cell_point = other.cell_point;
        }
        if fields.contains(EventFields::CELL_ACCURACY) {
            self.cell_accuracy_m = other.cell_accuracy_m;
        }
    }

    /// Storage key for this event.
    pub fn key(&self) -> EventKey {
        EventKey {
            account_id: self.account_id.clone(),
            asset_id: self.asset_id.clone(),
            timestamp: self.timestamp,
            status_code: self.status_code,
        }
    }
}

/// Composite event key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventKey {
    pub account_id: String,
    pub asset_id: String,
    pub timestamp: i64,
    pub status_code: StatusCode,
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.account_id, self.asset_id, self.timestamp, self.status_code
        )
    }
}
