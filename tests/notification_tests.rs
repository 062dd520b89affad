// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Rule dispatch and geozone auto-notify tests.

mod common;

use common::*;
use fleet_ingest::config::Config;
use fleet_ingest::models::{AccountProfile, AssetState, GeocoderMode, StatusCode};
use fleet_ingest::services::{ActionMask, Collaborators};
use std::sync::atomic::Ordering;
use std::sync::Arc;

fn with_rules(rules: Arc<FakeRules>) -> Collaborators {
    Collaborators {
        rules: Some(rules),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_save_last_records_notification() {
    let rules = FakeRules::new(ActionMask::NOTIFY_ACCOUNT | ActionMask::SAVE_LAST);
    let h = harness(test_config(), with_rules(rules.clone()));

    h.pipeline
        .submit(event_at(NOW, StatusCode::LOCATION, OPEN_ROAD))
        .await
        .unwrap();

    let asset = h.storage.asset(ACCOUNT, ASSET).unwrap();
    assert_eq!(asset.last_notify_time, NOW);
    assert_eq!(asset.last_notify_code, StatusCode::LOCATION);
}

#[tokio::test]
async fn test_fired_rule_without_save_last_leaves_bookkeeping() {
    let rules = FakeRules::new(ActionMask::NOTIFY_ACCOUNT | ActionMask::VIA_EMAIL);
    let h = harness(test_config(), with_rules(rules.clone()));

    h.pipeline
        .submit(event_at(NOW, StatusCode::LOCATION, OPEN_ROAD))
        .await
        .unwrap();

    assert_eq!(rules.evaluated(), vec![StatusCode::LOCATION]);
    assert_eq!(h.storage.asset(ACCOUNT, ASSET).unwrap().last_notify_time, 0);
}

#[tokio::test]
async fn test_notifications_disabled_for_asset() {
    let rules = FakeRules::new(ActionMask::NOTIFY_ACCOUNT | ActionMask::SAVE_LAST);
    let h = harness(test_config(), with_rules(rules.clone()));
    let mut asset = AssetState::new(ACCOUNT, ASSET);
    asset.allow_notify = false;
    h.storage.insert_asset(asset);

    h.pipeline
        .submit(event_at(NOW, StatusCode::LOCATION, OPEN_ROAD))
        .await
        .unwrap();

    assert!(rules.evaluated().is_empty());
    assert_eq!(h.storage.asset(ACCOUNT, ASSET).unwrap().last_notify_time, 0);
}

#[tokio::test]
async fn test_rule_trigger_codes_are_not_evaluated() {
    let rules = FakeRules::new(ActionMask::NOTIFY_ACCOUNT | ActionMask::SAVE_LAST);
    let h = harness(test_config(), with_rules(rules.clone()));

    h.pipeline
        .submit(event_at(NOW, StatusCode::RULE_TRIGGER_0, OPEN_ROAD))
        .await
        .unwrap();

    assert!(rules.evaluated().is_empty());
    assert_eq!(h.events().len(), 1);
}

#[tokio::test]
async fn test_asset_selector_checked_when_enabled() {
    let rules = FakeRules::with_selector(
        ActionMask::NONE,
        ActionMask::NOTIFY_DEVICE | ActionMask::SAVE_LAST,
    );
    let config = Config {
        check_notify_selector: true,
        ..test_config()
    };
    let h = harness(config, with_rules(rules.clone()));
    let mut asset = AssetState::new(ACCOUNT, ASSET);
    asset.notify_selector = " speed > 100 ".to_string();
    h.storage.insert_asset(asset);

    h.pipeline
        .submit(event_at(NOW, StatusCode::LOCATION, OPEN_ROAD))
        .await
        .unwrap();

    assert_eq!(rules.selectors(), vec!["speed > 100".to_string()]);
    // Account rules still run after the asset selector.
    assert_eq!(rules.evaluated(), vec![StatusCode::LOCATION]);
    assert_eq!(h.storage.asset(ACCOUNT, ASSET).unwrap().last_notify_time, NOW);
}

#[tokio::test]
async fn test_invalid_asset_selector_not_executed() {
    let rules = FakeRules::with_selector(ActionMask::NONE, ActionMask::SAVE_LAST);
    rules.syntax_valid.store(false, Ordering::SeqCst);
    let config = Config {
        check_notify_selector: true,
        ..test_config()
    };
    let h = harness(config, with_rules(rules.clone()));
    let mut asset = AssetState::new(ACCOUNT, ASSET);
    asset.notify_selector = "speed >".to_string();
    h.storage.insert_asset(asset);

    h.pipeline
        .submit(event_at(NOW, StatusCode::LOCATION, OPEN_ROAD))
        .await
        .unwrap();

    assert!(rules.selectors().is_empty());
    assert_eq!(rules.evaluated(), vec![StatusCode::LOCATION]);
    assert_eq!(h.storage.asset(ACCOUNT, ASSET).unwrap().last_notify_time, 0);
}

#[tokio::test]
async fn test_asset_selector_skipped_by_default() {
    let rules = FakeRules::with_selector(ActionMask::NONE, ActionMask::SAVE_LAST);
    let h = harness(test_config(), with_rules(rules.clone()));
    let mut asset = AssetState::new(ACCOUNT, ASSET);
    asset.notify_selector = "speed > 100".to_string();
    h.storage.insert_asset(asset);

    h.pipeline
        .submit(event_at(NOW, StatusCode::LOCATION, OPEN_ROAD))
        .await
        .unwrap();

    assert!(rules.selectors().is_empty());
    assert_eq!(h.storage.asset(ACCOUNT, ASSET).unwrap().last_notify_time, 0);
}

fn auto_notify_setup(config: Config, notify_from: &str) -> (Harness, Arc<RecordingGateway>) {
    let gateway = RecordingGateway::new();
    let h = harness(
        Config {
            date_format: "%Y-%m-%d %H:%M:%S".to_string(),
            ..config
        },
        Collaborators {
            geozones: Some(test_geozones()),
            notifier: Some(gateway.clone()),
            ..Default::default()
        },
    );

    let mut account = AccountProfile::new(ACCOUNT, GeocoderMode::Full);
    account.notify_email = "ops@acme.test, sms:+15551230000".to_string();
    account.notify_from = notify_from.to_string();
    h.storage.insert_account(account);

    let mut asset = AssetState::new(ACCOUNT, ASSET);
    asset.description = "Truck Seven".to_string();
    asset.notify_email = "dispatch@acme.test,ops@acme.test, SMS:+15559870000".to_string();
    h.storage.insert_asset(asset);

    (h, gateway)
}

#[tokio::test]
async fn test_auto_notify_partitions_email_and_sms() {
    let (h, gateway) = auto_notify_setup(test_config(), "alerts@acme.test");

    h.pipeline
        .submit(event_at(NOW, StatusCode::LOCATION, IN_YARD))
        .await
        .unwrap();

    let message = "2023-11-14 22:13:19: \"Truck Seven\" arrived \"Main Yard\"";
    let emails = gateway.emails();
    assert_eq!(emails.len(), 1);
    assert_eq!(emails[0].from, "alerts@acme.test");
    assert_eq!(emails[0].to, vec!["ops@acme.test", "dispatch@acme.test"]);
    assert_eq!(emails[0].subject, message);

    let sms = gateway.sms();
    assert_eq!(sms.len(), 2);
    assert_eq!(sms[0].phone, "+15551230000");
    assert_eq!(sms[1].phone, "+15559870000");
    assert!(sms.iter().all(|s| s.gateway == "default" && s.message == message));
}

#[tokio::test]
async fn test_auto_notify_from_falls_back_to_config() {
    let config = Config {
        notify_from: "fleet@example.test".to_string(),
        ..test_config()
    };
    let (h, gateway) = auto_notify_setup(config, "");

    h.pipeline
        .submit(event_at(NOW, StatusCode::LOCATION, IN_YARD))
        .await
        .unwrap();

    let emails = gateway.emails();
    assert_eq!(emails.len(), 1);
    assert_eq!(emails[0].from, "fleet@example.test");
}

#[tokio::test]
async fn test_auto_notify_without_from_address_still_sends_sms() {
    let (h, gateway) = auto_notify_setup(test_config(), "");

    h.pipeline
        .submit(event_at(NOW, StatusCode::LOCATION, IN_YARD))
        .await
        .unwrap();

    assert!(gateway.emails().is_empty());
    assert_eq!(gateway.sms().len(), 2);
}

#[tokio::test]
async fn test_departure_message_and_quiet_zones() {
    let (h, gateway) = auto_notify_setup(test_config(), "alerts@acme.test");

    // Warehouse has no auto-notify: arriving there sends nothing.
    h.pipeline
        .submit(event_at(NOW, StatusCode::LOCATION, IN_WAREHOUSE))
        .await
        .unwrap();
    assert!(gateway.emails().is_empty());

    h.pipeline
        .submit(event_at(NOW + 600, StatusCode::LOCATION, IN_YARD))
        .await
        .unwrap();
    h.pipeline
        .submit(event_at(NOW + 1200, StatusCode::LOCATION, OPEN_ROAD))
        .await
        .unwrap();

    let subjects: Vec<String> = gateway.emails().into_iter().map(|e| e.subject).collect();
    assert_eq!(
        subjects,
        vec![
            "2023-11-14 22:23:19: \"Truck Seven\" arrived \"Main Yard\"".to_string(),
            "2023-11-14 22:33:18: \"Truck Seven\" departed \"Main Yard\"".to_string(),
        ]
    );
}
