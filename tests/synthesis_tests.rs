// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Synthesized event tests: geozone transitions, fuel refill/theft and
//! corridor activation.
//!
//! Synthesized events re-enter the pipeline at most one level deep and are
//! processed before the event that caused them.

mod common;

use common::*;
use fleet_ingest::config::Config;
use fleet_ingest::models::StatusCode;
use fleet_ingest::services::{ActionMask, Collaborators, IngestOutcome, LevelChange};
use std::sync::atomic::Ordering;

fn synthesized_count(outcome: &IngestOutcome) -> usize {
    match outcome {
        IngestOutcome::Accepted { synthesized, .. } => *synthesized,
        other => panic!("Expected accepted, got {:?}", other),
    }
}

#[tokio::test]
async fn test_first_fix_in_zone_synthesizes_arrival() {
    let h = harness(
        test_config(),
        Collaborators {
            geozones: Some(test_geozones()),
            ..Default::default()
        },
    );

    let outcome = h
        .pipeline
        .submit(event_at(NOW, StatusCode::LOCATION, IN_YARD))
        .await
        .unwrap();

    assert_eq!(synthesized_count(&outcome), 1);
    assert_eq!(
        h.codes(),
        vec![
            (NOW - 1, StatusCode::GEOFENCE_ARRIVE),
            (NOW, StatusCode::LOCATION)
        ]
    );
}

#[tokio::test]
async fn test_zone_to_zone_departs_before_arriving() {
    let config = Config {
        synthesize_corridor_events: false,
        ..test_config()
    };
    let rules = FakeRules::new(ActionMask::NONE);
    let h = harness(
        config,
        Collaborators {
            geozones: Some(test_geozones()),
            rules: Some(rules.clone()),
            ..Default::default()
        },
    );

    h.pipeline
        .submit(event_at(NOW, StatusCode::LOCATION, IN_YARD))
        .await
        .unwrap();
    let outcome = h
        .pipeline
        .submit(event_at(NOW + 600, StatusCode::LOCATION, IN_CUSTOMER))
        .await
        .unwrap();

    assert_eq!(synthesized_count(&outcome), 2);
    assert_eq!(
        h.codes(),
        vec![
            (NOW - 1, StatusCode::GEOFENCE_ARRIVE),
            (NOW, StatusCode::LOCATION),
            (NOW + 598, StatusCode::GEOFENCE_DEPART),
            (NOW + 599, StatusCode::GEOFENCE_ARRIVE),
            (NOW + 600, StatusCode::LOCATION),
        ]
    );
    // Transitions are processed before the event that caused them.
    assert_eq!(
        rules.evaluated(),
        vec![
            StatusCode::GEOFENCE_ARRIVE,
            StatusCode::LOCATION,
            StatusCode::GEOFENCE_DEPART,
            StatusCode::GEOFENCE_ARRIVE,
            StatusCode::LOCATION,
        ]
    );
}

#[tokio::test]
async fn test_transition_event_carries_zone_and_address() {
    let h = harness(
        test_config(),
        Collaborators {
            geozones: Some(test_geozones()),
            geocoder: Some(FakeGeocoder::fast()),
            ..Default::default()
        },
    );

    h.pipeline
        .submit(event_at(NOW, StatusCode::LOCATION, IN_YARD))
        .await
        .unwrap();
    h.pipeline
        .submit(event_at(NOW + 300, StatusCode::LOCATION, OPEN_ROAD))
        .await
        .unwrap();

    let depart = h
        .events()
        .into_iter()
        .find(|e| e.status_code == StatusCode::GEOFENCE_DEPART)
        .unwrap();
    assert!(depart.is_synthesized);
    assert_eq!(depart.timestamp, NOW + 298);
    assert_eq!(depart.point.latitude, OPEN_ROAD.0);
    assert_eq!(depart.geozone_id, "yard");
    assert_eq!(depart.geozone_index, 7);
    // Named zone supplies the address even though the point is outside it.
    assert_eq!(depart.address, "Main Yard");
}

#[tokio::test]
async fn test_transitions_can_be_disabled() {
    let config = Config {
        synthesize_geozone_transitions: false,
        ..test_config()
    };
    let h = harness(
        config,
        Collaborators {
            geozones: Some(test_geozones()),
            ..Default::default()
        },
    );

    h.pipeline
        .submit(event_at(NOW, StatusCode::LOCATION, IN_YARD))
        .await
        .unwrap();

    assert_eq!(h.codes(), vec![(NOW, StatusCode::LOCATION)]);
}

#[tokio::test]
async fn test_fuel_refill_synthesized_once() {
    let fuel = FakeFuel::new(LevelChange::Increase);
    let h = harness(
        test_config(),
        Collaborators {
            fuel: Some(fuel.clone()),
            ..Default::default()
        },
    );

    let mut event = event_at(NOW, StatusCode::LOCATION, OPEN_ROAD);
    event.fuel_level = 0.95;
    let outcome = h.pipeline.submit(event).await.unwrap();

    assert_eq!(synthesized_count(&outcome), 1);
    assert_eq!(
        h.codes(),
        vec![(NOW, StatusCode::LOCATION), (NOW, StatusCode::FUEL_REFILL)]
    );
    // The refill itself is never classified, so there is no second level.
    assert_eq!(fuel.calls(), 1);
    let refill = h
        .events()
        .into_iter()
        .find(|e| e.status_code == StatusCode::FUEL_REFILL)
        .unwrap();
    assert!(refill.is_synthesized);
    assert_eq!(refill.fuel_level, 0.95);
}

#[tokio::test]
async fn test_fuel_theft_not_duplicated() {
    let fuel = FakeFuel::new(LevelChange::Decrease);
    let h = harness(
        test_config(),
        Collaborators {
            fuel: Some(fuel.clone()),
            ..Default::default()
        },
    );

    let outcome = h
        .pipeline
        .submit(event_at(NOW, StatusCode::FUEL_THEFT, OPEN_ROAD))
        .await
        .unwrap();

    assert_eq!(synthesized_count(&outcome), 0);
    assert_eq!(h.codes(), vec![(NOW, StatusCode::FUEL_THEFT)]);
}

#[tokio::test]
async fn test_corridor_activated_and_deactivated() {
    let h = harness(
        test_config(),
        Collaborators {
            geozones: Some(test_geozones()),
            ..Default::default()
        },
    );

    h.pipeline
        .submit(event_at(NOW, StatusCode::LOCATION, IN_YARD))
        .await
        .unwrap();
    assert!(!h.storage.asset(ACCOUNT, ASSET).unwrap().has_active_corridor());

    // Leaving the yard starts its corridor.
    let outcome = h
        .pipeline
        .submit(event_at(NOW + 300, StatusCode::LOCATION, OPEN_ROAD))
        .await
        .unwrap();
    assert_eq!(synthesized_count(&outcome), 2);
    assert_eq!(
        h.storage.asset(ACCOUNT, ASSET).unwrap().active_corridor,
        "route-1"
    );

    // Arriving at the customer ends it.
    h.pipeline
        .submit(event_at(NOW + 900, StatusCode::LOCATION, IN_CUSTOMER))
        .await
        .unwrap();
    assert!(!h.storage.asset(ACCOUNT, ASSET).unwrap().has_active_corridor());

    assert_eq!(
        h.codes(),
        vec![
            (NOW - 1, StatusCode::GEOFENCE_ARRIVE),
            (NOW, StatusCode::LOCATION),
            (NOW + 298, StatusCode::GEOFENCE_DEPART),
            (NOW + 298, StatusCode::CORRIDOR_ACTIVE),
            (NOW + 300, StatusCode::LOCATION),
            (NOW + 899, StatusCode::GEOFENCE_ARRIVE),
            (NOW + 899, StatusCode::CORRIDOR_INACTIVE),
            (NOW + 900, StatusCode::LOCATION),
        ]
    );
}

#[tokio::test]
async fn test_nested_synthesis_drained_in_order() {
    let rules = FakeRules::new(ActionMask::NONE);
    let h = harness(
        test_config(),
        Collaborators {
            geozones: Some(test_geozones()),
            rules: Some(rules.clone()),
            ..Default::default()
        },
    );

    h.pipeline
        .submit(event_at(NOW, StatusCode::LOCATION, IN_YARD))
        .await
        .unwrap();
    let outcome = h
        .pipeline
        .submit(event_at(NOW + 600, StatusCode::LOCATION, IN_CUSTOMER))
        .await
        .unwrap();

    // DEPART, its corridor event, ARRIVE, its corridor event
    assert_eq!(synthesized_count(&outcome), 4);
    assert_eq!(
        rules.evaluated()[2..],
        [
            StatusCode::GEOFENCE_DEPART,
            StatusCode::CORRIDOR_ACTIVE,
            StatusCode::GEOFENCE_ARRIVE,
            StatusCode::CORRIDOR_INACTIVE,
            StatusCode::LOCATION,
        ]
    );
    assert!(!h.storage.asset(ACCOUNT, ASSET).unwrap().has_active_corridor());
}

#[tokio::test]
async fn test_corridor_requires_selector_match() {
    let rules = FakeRules::new(ActionMask::NONE);
    rules.selectors_match.store(false, Ordering::SeqCst);
    let h = harness(
        test_config(),
        Collaborators {
            geozones: Some(test_geozones()),
            rules: Some(rules.clone()),
            ..Default::default()
        },
    );

    h.pipeline
        .submit(event_at(NOW, StatusCode::LOCATION, IN_YARD))
        .await
        .unwrap();
    h.pipeline
        .submit(event_at(NOW + 300, StatusCode::LOCATION, OPEN_ROAD))
        .await
        .unwrap();

    assert!(!h.storage.asset(ACCOUNT, ASSET).unwrap().has_active_corridor());
    assert!(!h
        .codes()
        .iter()
        .any(|(_, code)| *code == StatusCode::CORRIDOR_ACTIVE));
}

#[tokio::test]
async fn test_entity_manager_sees_hardware_events_only() {
    let entities = RecordingEntities::new();
    let h = harness(
        test_config(),
        Collaborators {
            geozones: Some(test_geozones()),
            entities: Some(entities.clone()),
            ..Default::default()
        },
    );

    h.pipeline
        .submit(event_at(NOW, StatusCode::LOCATION, IN_YARD))
        .await
        .unwrap();

    let keys = entities.keys();
    assert_eq!(keys.len(), 1);
    assert_eq!(keys[0].status_code, StatusCode::LOCATION);
    assert_eq!(keys[0].timestamp, NOW);
}
