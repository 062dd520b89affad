// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Address and cell-tower location enrichment.
//!
//! The fast path never blocks on a slow provider: it reports `Deferred` and
//! the caller queues the work on the background pool.

use crate::models::{
    AccountProfile, AssetState, Event, EventFields, GeocoderMode, Geozone, MobileLocation,
    StatusCode,
};
use crate::services::geozone::ZoneCache;
use crate::services::providers::{AddressResult, GeocodeProvider, MobileLocationProvider};
use std::sync::Arc;

/// Outcome of [`AddressResolver::resolve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressResolution {
    /// Nothing to do, or nothing found.
    Unchanged,
    /// These event fields were set.
    Updated(EventFields),
    /// Provider is slow and `fast_only` was requested; event untouched.
    Deferred,
}

/// Outcome of [`AddressResolver::resolve_cell_location`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellResolution {
    /// Event has a GPS fix, no usable serving cell, or no enabled provider.
    NotApplicable,
    /// Serving cell matched the asset's cached cell; cached location applied.
    Cached(EventFields),
    /// Cache miss with `fast_only`; event untouched.
    Deferred,
    /// Provider was queried. Fields may be empty if the cell is unknown.
    Located(EventFields),
}

/// Resolves addresses from geozones or a reverse-geocoder, and positions from
/// a mobile-location provider.
#[derive(Clone, Default)]
pub struct AddressResolver {
    geocoder: Option<Arc<dyn GeocodeProvider>>,
    cell_locator: Option<Arc<dyn MobileLocationProvider>>,
    high_priority_codes: Vec<StatusCode>,
}

impl AddressResolver {
    pub fn new(
        geocoder: Option<Arc<dyn GeocodeProvider>>,
        cell_locator: Option<Arc<dyn MobileLocationProvider>>,
        high_priority_codes: Vec<StatusCode>,
    ) -> Self {
        Self {
            geocoder,
            cell_locator,
            high_priority_codes,
        }
    }

    /// Attach an address to `event`.
    pub async fn resolve(
        &self,
        event: &mut Event,
        account: &AccountProfile,
        fast_only: bool,
        zones: &mut ZoneCache,
    ) -> AddressResolution {
        if event.has_address() || !event.has_valid_point() {
            return AddressResolution::Unchanged;
        }
        if account.geocoder_mode == GeocoderMode::None {
            return AddressResolution::Unchanged;
        }

        // Transition events name their zone explicitly; the point may sit
        // just outside it.
        if event.status_code.is_geozone_transition() {
            if let Some(zone) = zones.zone_for_event(event) {
                if zone.reverse_geocode {
                    let fields = copy_zone_address(event, &zone, zone.client_upload);
                    return AddressResolution::Updated(fields);
                }
            }
        }

        if let Some(zone) = zones.by_point(event.point) {
            if zone.reverse_geocode {
                tracing::debug!(
                    asset_id = %event.asset_id,
                    geozone_id = %zone.geozone_id,
                    "Using geozone address"
                );
                let set_index = zone.client_upload && event.geozone_index == 0;
                let fields = copy_zone_address(event, &zone, set_index);
                return AddressResolution::Updated(fields);
            }
        }

        match account.geocoder_mode {
            GeocoderMode::None | GeocoderMode::Geozone => return AddressResolution::Unchanged,
            GeocoderMode::Partial if !self.high_priority_codes.contains(&event.status_code) => {
                tracing::debug!(
                    account_id = %event.account_id,
                    status_code = %event.status_code,
                    "Skipping reverse-geocode for low-priority code"
                );
                return AddressResolution::Unchanged;
            }
            GeocoderMode::Partial | GeocoderMode::Full => {}
        }

        let Some(geocoder) = self.geocoder.as_ref() else {
            return AddressResolution::Unchanged;
        };
        if !geocoder.is_enabled() {
            tracing::debug!(provider = geocoder.name(), "Reverse-geocoder disabled");
            return AddressResolution::Unchanged;
        }
        if fast_only && !geocoder.is_fast_operation() {
            return AddressResolution::Deferred;
        }

        match geocoder.reverse_geocode(event.point, &account.locale).await {
            Ok(result) => {
                let fields = copy_geocode_result(event, &result);
                if fields.is_empty() {
                    tracing::info!(
                        provider = geocoder.name(),
                        point = %event.point,
                        "No address found"
                    );
                    AddressResolution::Unchanged
                } else {
                    AddressResolution::Updated(fields)
                }
            }
            Err(e) => {
                tracing::warn!(
                    provider = geocoder.name(),
                    asset_id = %event.asset_id,
                    point = %event.point,
                    error = %e,
                    "Reverse-geocode failed"
                );
                AddressResolution::Unchanged
            }
        }
    }

    /// Set the event's cell location when it has no GPS fix.
    pub async fn resolve_cell_location(
        &self,
        event: &mut Event,
        asset: &AssetState,
        fast_only: bool,
    ) -> CellResolution {
        if event.has_valid_point() {
            return CellResolution::NotApplicable;
        }
        let Some(serving) = event.serving_cell.clone().filter(|c| c.is_valid()) else {
            return CellResolution::NotApplicable;
        };
        let Some(locator) = self.cell_locator.as_ref().filter(|l| l.is_enabled()) else {
            return CellResolution::NotApplicable;
        };

        if let Some(cached) = asset.last_serving_cell.as_ref() {
            if cached.cell == serving {
                let fields = match cached.location {
                    Some(location) if location.point.is_valid() => {
                        tracing::debug!(
                            asset_id = %event.asset_id,
                            point = %location.point,
                            "Using cached cell location"
                        );
                        apply_cell_location(event, location)
                    }
                    _ => EventFields::NONE,
                };
                return CellResolution::Cached(fields);
            }
        }

        if fast_only {
            return CellResolution::Deferred;
        }

        match locator.locate(&serving, &event.neighbor_cells).await {
            Ok(Some(location)) if location.point.is_valid() => {
                tracing::info!(
                    provider = locator.name(),
                    asset_id = %event.asset_id,
                    point = %location.point,
                    accuracy_m = ?location.accuracy_m,
                    "Cell location resolved"
                );
                CellResolution::Located(apply_cell_location(event, location))
            }
            Ok(_) => CellResolution::Located(EventFields::NONE),
            Err(e) => {
                tracing::warn!(
                    provider = locator.name(),
                    asset_id = %event.asset_id,
                    error = %e,
                    "Cell location failed"
                );
                CellResolution::NotApplicable
            }
        }
    }
}

fn apply_cell_location(event: &mut Event, location: MobileLocation) -> EventFields {
    event.cell_point = location.point;
    let mut fields = EventFields::CELL_LOCATION;
    if let Some(accuracy) = location.accuracy_m {
        event.cell_accuracy_m = accuracy;
        fields |= EventFields::CELL_ACCURACY;
    }
    fields
}

/// Copy a zone's address onto the event. The zone description becomes the
/// address line.
fn copy_zone_address(event: &mut Event, zone: &Geozone, set_index: bool) -> EventFields {
    let mut fields = EventFields::GEOZONE_ID
        | EventFields::ADDRESS
        | EventFields::STREET_ADDRESS
        | EventFields::CITY
        | EventFields::STATE_PROVINCE
        | EventFields::POSTAL_CODE
        | EventFields::COUNTRY
        | EventFields::SUBDIVISION;
    if set_index {
        event.geozone_index = zone.client_id;
        fields |= EventFields::GEOZONE_INDEX;
    }
    event.geozone_id = zone.geozone_id.clone();
    event.address = zone.description.trim().to_string();
    event.street_address = zone.street_address.clone();
    event.city = zone.city.clone();
    event.state_province = zone.state_province.clone();
    event.postal_code = zone.postal_code.clone();
    event.country = zone.country.clone();
    event.subdivision = zone.subdivision.clone();
    fields
}

/// Copy the fields the provider actually returned.
fn copy_geocode_result(event: &mut Event, result: &AddressResult) -> EventFields {
    let mut fields = EventFields::NONE;
    let mut set = |value: &str, target: &mut String, flag: EventFields| {
        let value = value.trim();
        if !value.is_empty() {
            *target = value.to_string();
            fields |= flag;
        }
    };
    set(&result.address, &mut event.address, EventFields::ADDRESS);
    set(
        &result.street_address,
        &mut event.street_address,
        EventFields::STREET_ADDRESS,
    );
    set(&result.city, &mut event.city, EventFields::CITY);
    set(
        &result.state_province,
        &mut event.state_province,
        EventFields::STATE_PROVINCE,
    );
    set(
        &result.postal_code,
        &mut event.postal_code,
        EventFields::POSTAL_CODE,
    );
    set(&result.country, &mut event.country, EventFields::COUNTRY);
    set(
        &result.subdivision,
        &mut event.subdivision,
        EventFields::SUBDIVISION,
    );

    if let Some(limit) = result.speed_limit_kph {
        event.speed_limit_kph = limit;
        fields |= EventFields::SPEED_LIMIT;
    }
    if let Some(toll) = result.is_toll_road {
        event.is_toll_road = toll;
        fields |= EventFields::TOLL_ROAD;
    }
    fields
}
