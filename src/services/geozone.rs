// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Geozone loading, point lookup and per-ingestion memoization.

use crate::models::{Event, GeoPoint, Geozone, ZoneGeometry};
use geo::{MultiPolygon, Polygon};
use geojson::{Feature, GeoJson};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Zone lookup contract. Lookups are in-memory and synchronous.
pub trait GeozoneLookup: Send + Sync {
    /// Most specific zone containing `point`.
    fn by_point(&self, account_id: &str, point: GeoPoint) -> Option<Arc<Geozone>>;

    fn by_id(&self, account_id: &str, geozone_id: &str) -> Option<Arc<Geozone>>;

    fn by_client_id(&self, account_id: &str, client_id: u64) -> Option<Arc<Geozone>>;
}

struct IndexedZone {
    zone: Arc<Geozone>,
    area: f64,
}

/// In-memory zone index, grouped by account.
#[derive(Default)]
pub struct GeozoneIndex {
    zones: HashMap<String, Vec<IndexedZone>>,
}

impl GeozoneIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load zones from a GeoJSON file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, GeozoneError> {
        let json_data =
            fs::read_to_string(path.as_ref()).map_err(|e| GeozoneError::IoError(e.to_string()))?;
        Self::load_from_json(&json_data)
    }

    /// Load zones from a GeoJSON FeatureCollection string.
    ///
    /// Each feature needs `account_id` and `geozone_id` properties; features
    /// without them are skipped.
    pub fn load_from_json(json_data: &str) -> Result<Self, GeozoneError> {
        let geojson: GeoJson = json_data
            .parse()
            .map_err(|e: geojson::Error| GeozoneError::ParseError(e.to_string()))?;

        let GeoJson::FeatureCollection(collection) = geojson else {
            return Err(GeozoneError::ParseError(
                "expected a FeatureCollection".to_string(),
            ));
        };

        let mut index = Self::new();
        for feature in collection.features {
            let account_id = prop_str(&feature, "account_id").trim().to_lowercase();
            let geozone_id = prop_str(&feature, "geozone_id").trim().to_string();
            if account_id.is_empty() || geozone_id.is_empty() {
                tracing::warn!(
                    account_id = %account_id,
                    geozone_id = %geozone_id,
                    "Skipping geozone without account or id"
                );
                continue;
            }

            let Some(geom) = feature.geometry.clone() else {
                tracing::warn!(
                    account_id = %account_id,
                    geozone_id = %geozone_id,
                    "Skipping geozone without geometry"
                );
                continue;
            };
            let geometry = convert_geometry(geom.value)?;

            index.insert(Geozone {
                account_id,
                geozone_id,
                client_id: prop_u64(&feature, "client_id"),
                client_upload: prop_bool(&feature, "client_upload", false),
                description: prop_str(&feature, "description"),
                street_address: prop_str(&feature, "street_address"),
                city: prop_str(&feature, "city"),
                state_province: prop_str(&feature, "state_province"),
                postal_code: prop_str(&feature, "postal_code"),
                country: prop_str(&feature, "country"),
                subdivision: prop_str(&feature, "subdivision"),
                reverse_geocode: prop_bool(&feature, "reverse_geocode", false),
                arrival_zone: prop_bool(&feature, "arrival_zone", true),
                departure_zone: prop_bool(&feature, "departure_zone", true),
                auto_notify: prop_bool(&feature, "auto_notify", false),
                corridor_id: prop_str(&feature, "corridor_id"),
                corridor_start_selector: prop_str(&feature, "corridor_start_selector"),
                corridor_end_selector: prop_str(&feature, "corridor_end_selector"),
                geometry,
            });
        }

        tracing::info!(count = index.len(), "Loaded geozones");
        Ok(index)
    }

    /// Add a zone. Lookup order is insertion order.
    pub fn insert(&mut self, zone: Geozone) {
        let area = zone.geometry.area();
        self.zones
            .entry(zone.account_id.clone())
            .or_default()
            .push(IndexedZone {
                zone: Arc::new(zone),
                area,
            });
    }

    pub fn len(&self) -> usize {
        self.zones.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn account_zones(&self, account_id: &str) -> &[IndexedZone] {
        self.zones.get(account_id).map(Vec::as_slice).unwrap_or(&[])
    }
}

impl GeozoneLookup for GeozoneIndex {
    fn by_point(&self, account_id: &str, point: GeoPoint) -> Option<Arc<Geozone>> {
        if !point.is_valid() {
            return None;
        }
        let mut best: Option<&IndexedZone> = None;
        for candidate in self.account_zones(account_id) {
            if !candidate.zone.contains(point) {
                continue;
            }
            // Strictly smaller only, so ties keep lookup order.
            if best.map_or(true, |b| candidate.area < b.area) {
                best = Some(candidate);
            }
        }
        best.map(|b| Arc::clone(&b.zone))
    }

    fn by_id(&self, account_id: &str, geozone_id: &str) -> Option<Arc<Geozone>> {
        let geozone_id = geozone_id.trim();
        if geozone_id.is_empty() {
            return None;
        }
        self.account_zones(account_id)
            .iter()
            .find(|z| z.zone.geozone_id == geozone_id)
            .map(|z| Arc::clone(&z.zone))
    }

    fn by_client_id(&self, account_id: &str, client_id: u64) -> Option<Arc<Geozone>> {
        if client_id == 0 {
            return None;
        }
        self.account_zones(account_id)
            .iter()
            .find(|z| z.zone.client_id == client_id)
            .map(|z| Arc::clone(&z.zone))
    }
}

/// Convert GeoJSON geometry to our internal format.
fn convert_geometry(value: geojson::Value) -> Result<ZoneGeometry, GeozoneError> {
    use std::convert::TryInto;

    let poly_result: Result<Polygon<f64>, _> = value.clone().try_into();
    if let Ok(poly) = poly_result {
        return Ok(ZoneGeometry::Polygon(poly));
    }

    let multi_result: Result<MultiPolygon<f64>, _> = value.try_into();
    if let Ok(multi) = multi_result {
        return Ok(ZoneGeometry::MultiPolygon(multi));
    }

    Err(GeozoneError::UnsupportedGeometry)
}

fn prop_str(feature: &Feature, name: &str) -> String {
    feature
        .property(name)
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string()
}

fn prop_bool(feature: &Feature, name: &str, default: bool) -> bool {
    feature
        .property(name)
        .and_then(|v| v.as_bool())
        .unwrap_or(default)
}

fn prop_u64(feature: &Feature, name: &str) -> u64 {
    feature
        .property(name)
        .and_then(|v| v.as_u64())
        .unwrap_or(0)
}

/// Errors from geozone loading.
#[derive(Debug, thiserror::Error)]
pub enum GeozoneError {
    #[error("Failed to read file: {0}")]
    IoError(String),

    #[error("Failed to parse GeoJSON: {0}")]
    ParseError(String),

    #[error("Unsupported geometry type (expected Polygon or MultiPolygon)")]
    UnsupportedGeometry,
}

/// Zone lookups memoized for the duration of one ingestion.
///
/// Created per `submit` call and dropped with it, so repeated lookups of the
/// same point or id across validation, address resolution, transition
/// detection and notification hit the index once.
pub struct ZoneCache {
    lookup: Option<Arc<dyn GeozoneLookup>>,
    account_id: String,
    by_point: HashMap<(u64, u64), Option<Arc<Geozone>>>,
    by_id: HashMap<String, Option<Arc<Geozone>>>,
    by_client_id: HashMap<u64, Option<Arc<Geozone>>>,
}

impl ZoneCache {
    pub fn new(lookup: Option<Arc<dyn GeozoneLookup>>, account_id: &str) -> Self {
        Self {
            lookup,
            account_id: account_id.to_string(),
            by_point: HashMap::new(),
            by_id: HashMap::new(),
            by_client_id: HashMap::new(),
        }
    }

    pub fn has_lookup(&self) -> bool {
        self.lookup.is_some()
    }

    pub fn by_point(&mut self, point: GeoPoint) -> Option<Arc<Geozone>> {
        let lookup = self.lookup.as_ref()?;
        let key = (point.latitude.to_bits(), point.longitude.to_bits());
        self.by_point
            .entry(key)
            .or_insert_with(|| lookup.by_point(&self.account_id, point))
            .clone()
    }

    pub fn by_id(&mut self, geozone_id: &str) -> Option<Arc<Geozone>> {
        let lookup = self.lookup.as_ref()?;
        if let Some(hit) = self.by_id.get(geozone_id) {
            return hit.clone();
        }
        let zone = lookup.by_id(&self.account_id, geozone_id);
        self.by_id.insert(geozone_id.to_string(), zone.clone());
        zone
    }

    pub fn by_client_id(&mut self, client_id: u64) -> Option<Arc<Geozone>> {
        let lookup = self.lookup.as_ref()?;
        self.by_client_id
            .entry(client_id)
            .or_insert_with(|| lookup.by_client_id(&self.account_id, client_id))
            .clone()
    }

    /// Zone an ARRIVE/DEPART event refers to: client index first, then id.
    pub fn zone_for_event(&mut self, event: &Event) -> Option<Arc<Geozone>> {
        if event.geozone_index > 0 {
            if let Some(zone) = self.by_client_id(event.geozone_index) {
                return Some(zone);
            }
        }
        self.by_id(&event.geozone_id)
    }
}
