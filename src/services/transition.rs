// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Geozone arrival/departure detection and corridor bookkeeping.

use crate::models::{AssetState, Event, GeoPoint, Geozone, StatusCode};
use crate::services::geozone::ZoneCache;
use crate::services::providers::RuleFactory;
use std::sync::Arc;

/// Synthesized DEPART events are stamped this many seconds before the source
/// event, ARRIVE events one second later, so a same-second DEPART+ARRIVE pair
/// keeps its order.
const DEPART_OFFSET_SEC: i64 = 2;
const ARRIVE_OFFSET_SEC: i64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionDirection {
    Arrive,
    Depart,
}

/// A detected zone boundary crossing. Never persisted directly.
#[derive(Debug, Clone)]
pub struct GeozoneTransition {
    pub timestamp: i64,
    pub direction: TransitionDirection,
    pub zone: Arc<Geozone>,
}

impl GeozoneTransition {
    pub fn status_code(&self) -> StatusCode {
        match self.direction {
            TransitionDirection::Arrive => StatusCode::GEOFENCE_ARRIVE,
            TransitionDirection::Depart => StatusCode::GEOFENCE_DEPART,
        }
    }

    /// Synthesized ARRIVE/DEPART event built from the triggering event.
    pub fn to_event(&self, source: &Event) -> Event {
        let mut event = source.copy_synthesized(self.status_code(), Some(self.timestamp));
        event.geozone_id = self.zone.geozone_id.clone();
        event.geozone_index = self.zone.client_id;
        event
    }
}

/// Compares the previous and current location against zone membership.
#[derive(Debug, Default, Clone, Copy)]
pub struct GeozoneTransitionDetector;

impl GeozoneTransitionDetector {
    /// Transitions between `previous` and `current`, DEPART first.
    pub fn check(
        &self,
        previous: Option<GeoPoint>,
        current: GeoPoint,
        event_time: i64,
        zones: &mut ZoneCache,
    ) -> Vec<GeozoneTransition> {
        if !current.is_valid() {
            return Vec::new();
        }
        let prev_zone = previous
            .filter(GeoPoint::is_valid)
            .and_then(|p| zones.by_point(p));
        let this_zone = zones.by_point(current);

        let mut transitions = Vec::new();
        match (prev_zone, this_zone) {
            (Some(prev), None) => {
                if prev.departure_zone {
                    transitions.push(depart(prev, event_time));
                }
            }
            (None, Some(this)) => {
                if this.arrival_zone {
                    transitions.push(arrive(this, event_time));
                }
            }
            (Some(prev), Some(this)) if prev.geozone_id != this.geozone_id => {
                if prev.departure_zone {
                    transitions.push(depart(prev, event_time));
                }
                if this.arrival_zone {
                    transitions.push(arrive(this, event_time));
                }
            }
            _ => {}
        }
        transitions
    }
}

fn depart(zone: Arc<Geozone>, event_time: i64) -> GeozoneTransition {
    GeozoneTransition {
        timestamp: event_time - DEPART_OFFSET_SEC,
        direction: TransitionDirection::Depart,
        zone,
    }
}

fn arrive(zone: Arc<Geozone>, event_time: i64) -> GeozoneTransition {
    GeozoneTransition {
        timestamp: event_time - ARRIVE_OFFSET_SEC,
        direction: TransitionDirection::Arrive,
        zone,
    }
}

/// Active-corridor state change caused by one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorridorChange {
    Activated(String),
    Deactivated(String),
}

impl CorridorChange {
    /// Status code of the synthesized corridor event.
    pub fn status_code(&self) -> StatusCode {
        match self {
            CorridorChange::Activated(_) => StatusCode::CORRIDOR_ACTIVE,
            CorridorChange::Deactivated(_) => StatusCode::CORRIDOR_INACTIVE,
        }
    }
}

/// Corridor state machine, driven by persisted ARRIVE/DEPART events.
///
/// DEPART from a corridor start zone activates the zone's corridor; ARRIVE
/// at an end zone of the active corridor clears it.
#[derive(Clone, Default)]
pub struct CorridorTracker {
    rules: Option<Arc<dyn RuleFactory>>,
}

impl CorridorTracker {
    pub fn new(rules: Option<Arc<dyn RuleFactory>>) -> Self {
        Self { rules }
    }

    pub async fn apply(
        &self,
        event: &Event,
        asset: &mut AssetState,
        zones: &mut ZoneCache,
    ) -> Option<CorridorChange> {
        let code = event.status_code;
        if !code.is_geozone_transition() {
            return None;
        }
        let zone = zones.zone_for_event(event)?;

        if code == StatusCode::GEOFENCE_ARRIVE {
            if !asset.has_active_corridor() {
                return None;
            }
            let active = asset.active_corridor.clone();
            // A zone naming a different corridor does not end this one.
            if zone.has_corridor_id() && zone.corridor_id.trim() != active {
                return None;
            }
            if !self.is_corridor_end(&zone, event).await {
                return None;
            }
            asset.set_active_corridor("");
            tracing::info!(
                asset_id = %asset.asset_id(),
                corridor_id = %active,
                geozone_id = %zone.geozone_id,
                "Corridor deactivated"
            );
            Some(CorridorChange::Deactivated(active))
        } else {
            if !self.is_corridor_start(&zone, event).await {
                return None;
            }
            let corridor_id = zone.corridor_id.trim().to_string();
            if asset.active_corridor == corridor_id {
                return None;
            }
            asset.set_active_corridor(&corridor_id);
            tracing::info!(
                asset_id = %asset.asset_id(),
                corridor_id = %corridor_id,
                geozone_id = %zone.geozone_id,
                "Corridor activated"
            );
            Some(CorridorChange::Activated(corridor_id))
        }
    }

    async fn is_corridor_start(&self, zone: &Geozone, event: &Event) -> bool {
        if event.status_code != StatusCode::GEOFENCE_DEPART || !zone.has_corridor_id() {
            return false;
        }
        self.selector_matches(&zone.corridor_start_selector, event)
            .await
    }

    async fn is_corridor_end(&self, zone: &Geozone, event: &Event) -> bool {
        if event.status_code != StatusCode::GEOFENCE_ARRIVE {
            return false;
        }
        self.selector_matches(&zone.corridor_end_selector, event)
            .await
    }

    /// Blank selectors never match. Without a rule engine any non-blank
    /// selector matches.
    async fn selector_matches(&self, selector: &str, event: &Event) -> bool {
        let selector = selector.trim();
        if selector.is_empty() {
            return false;
        }
        match self.rules.as_ref() {
            Some(rules) => rules.is_selector_match(selector, event).await,
            None => true,
        }
    }
}
