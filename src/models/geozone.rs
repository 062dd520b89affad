// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Geozone model and boundary geometry.

use crate::models::event::GeoPoint;
use geo::{Area, Contains, MultiPolygon, Polygon};

/// A named boundary used for arrival/departure detection and address
/// substitution.
#[derive(Debug, Clone, Default)]
pub struct Geozone {
    pub account_id: String,
    pub geozone_id: String,
    /// Client-assigned numeric id (0 = none)
    pub client_id: u64,
    /// Zone was uploaded to the device, so `client_id` is meaningful on events
    pub client_upload: bool,
    pub description: String,

    pub street_address: String,
    pub city: String,
    pub state_province: String,
    pub postal_code: String,
    pub country: String,
    pub subdivision: String,

    /// Substitute this zone's address for reverse-geocoding
    pub reverse_geocode: bool,
    pub arrival_zone: bool,
    pub departure_zone: bool,
    pub auto_notify: bool,

    pub corridor_id: String,
    pub corridor_start_selector: String,
    pub corridor_end_selector: String,

    pub geometry: ZoneGeometry,
}

impl Geozone {
    pub fn contains(&self, point: GeoPoint) -> bool {
        self.geometry.contains(point)
    }

    pub fn has_corridor_id(&self) -> bool {
        !self.corridor_id.trim().is_empty()
    }
}

/// Zone geometry - either a simple polygon or multi-polygon.
#[derive(Debug, Clone)]
pub enum ZoneGeometry {
    Polygon(Polygon<f64>),
    MultiPolygon(MultiPolygon<f64>),
}

impl Default for ZoneGeometry {
    fn default() -> Self {
        ZoneGeometry::MultiPolygon(MultiPolygon::new(Vec::new()))
    }
}

impl ZoneGeometry {
    /// Check if a point lies inside this geometry.
    pub fn contains(&self, point: GeoPoint) -> bool {
        let point: geo::Point<f64> = point.into();
        match self {
            ZoneGeometry::Polygon(p) => p.contains(&point),
            ZoneGeometry::MultiPolygon(mp) => mp.contains(&point),
        }
    }

    /// Planar area in square degrees; only used to rank overlapping zones.
    pub fn area(&self) -> f64 {
        match self {
            ZoneGeometry::Polygon(p) => p.unsigned_area(),
            ZoneGeometry::MultiPolygon(mp) => mp.unsigned_area(),
        }
    }
}
