// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use async_trait::async_trait;
use fleet_ingest::config::Config;
use fleet_ingest::db::{MemoryStorage, Storage};
use fleet_ingest::error::ProviderError;
use fleet_ingest::models::{CellTower, Event, EventKey, GeoPoint, MobileLocation, StatusCode};
use fleet_ingest::services::{
    ActionMask, AddressResult, Collaborators, EntityManager, FuelManager, GeocodeProvider,
    GeozoneIndex, GeozoneLookup, IngestionPipeline, LevelChange, MobileLocationProvider,
    NotificationGateway, RuleFactory,
};
use fleet_ingest::time_utils::FixedClock;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

pub const ACCOUNT: &str = "acme";
pub const ASSET: &str = "truck-7";
pub const NOW: i64 = 1_700_000_000;

// Points relative to data/geozones.geojson.
#[allow(dead_code)]
pub const IN_YARD: (f64, f64) = (37.45, -122.05);
#[allow(dead_code)]
pub const IN_CUSTOMER: (f64, f64) = (37.35, -121.85);
#[allow(dead_code)]
pub const OPEN_ROAD: (f64, f64) = (37.20, -121.95);
#[allow(dead_code)]
pub const IN_WAREHOUSE: (f64, f64) = (37.62, -122.28);
#[allow(dead_code)]
pub const IN_LOADING_BAY: (f64, f64) = (37.65, -122.25);

/// Load the committed geozone fixture.
#[allow(dead_code)]
pub fn test_geozones() -> Arc<dyn GeozoneLookup> {
    Arc::new(
        GeozoneIndex::load_from_file("data/geozones.geojson")
            .expect("Failed to load geozones - is data/ committed?"),
    )
}

/// Test configuration with a small background pool.
#[allow(dead_code)]
pub fn test_config() -> Config {
    Config {
        background_workers: 2,
        background_queue_size: 16,
        ..Config::default()
    }
}

/// A location event for the test asset.
#[allow(dead_code)]
pub fn event_at(timestamp: i64, code: StatusCode, point: (f64, f64)) -> Event {
    Event::new(ACCOUNT, ASSET, timestamp, code).with_point(point.0, point.1)
}

/// Pipeline wired to in-memory storage and a fixed clock.
pub struct Harness {
    pub pipeline: IngestionPipeline,
    pub storage: Arc<MemoryStorage>,
    #[allow(dead_code)]
    pub clock: Arc<FixedClock>,
}

/// Build a harness. Must be called from within a tokio runtime.
#[allow(dead_code)]
pub fn harness(config: Config, collaborators: Collaborators) -> Harness {
    let storage = Arc::new(MemoryStorage::new());
    let clock = Arc::new(FixedClock::new(NOW));
    let dyn_storage: Arc<dyn Storage> = storage.clone();
    let pipeline = IngestionPipeline::new(config, dyn_storage, collaborators, clock.clone());
    Harness {
        pipeline,
        storage,
        clock,
    }
}

impl Harness {
    #[allow(dead_code)]
    pub fn events(&self) -> Vec<Event> {
        self.storage.events_for(ACCOUNT, ASSET)
    }

    #[allow(dead_code)]
    pub fn codes(&self) -> Vec<(i64, StatusCode)> {
        self.events()
            .iter()
            .map(|e| (e.timestamp, e.status_code))
            .collect()
    }
}

// ─── Fakes ───────────────────────────────────────────────────────────

/// Reverse-geocoder that records every lookup.
pub struct FakeGeocoder {
    fast: bool,
    delay: Duration,
    gate: Option<Semaphore>,
    pub enabled: AtomicBool,
    pub fail: AtomicBool,
    calls: AtomicUsize,
    points: Mutex<Vec<GeoPoint>>,
}

#[allow(dead_code)]
impl FakeGeocoder {
    fn build(fast: bool, delay: Duration, gate: Option<Semaphore>) -> Arc<Self> {
        Arc::new(Self {
            fast,
            delay,
            gate,
            enabled: AtomicBool::new(true),
            fail: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
            points: Mutex::new(Vec::new()),
        })
    }

    pub fn fast() -> Arc<Self> {
        Self::build(true, Duration::ZERO, None)
    }

    pub fn slow() -> Arc<Self> {
        Self::build(false, Duration::ZERO, None)
    }

    pub fn slow_with_delay(delay: Duration) -> Arc<Self> {
        Self::build(false, delay, None)
    }

    /// Slow geocoder that blocks every lookup until [`Self::release`].
    pub fn gated() -> Arc<Self> {
        Self::build(false, Duration::ZERO, Some(Semaphore::new(0)))
    }

    pub fn release(&self) {
        if let Some(gate) = self.gate.as_ref() {
            gate.add_permits(1);
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn points(&self) -> Vec<GeoPoint> {
        self.points.lock().unwrap().clone()
    }

    /// Address this fake returns for `point`.
    pub fn address_for(point: GeoPoint) -> String {
        format!("{:.2},{:.2} Geocoded Rd", point.latitude, point.longitude)
    }
}

#[async_trait]
impl GeocodeProvider for FakeGeocoder {
    fn name(&self) -> &str {
        "fake-geocoder"
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn is_fast_operation(&self) -> bool {
        self.fast
    }

    async fn reverse_geocode(
        &self,
        point: GeoPoint,
        _locale: &str,
    ) -> Result<AddressResult, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.points.lock().unwrap().push(point);
        if let Some(gate) = self.gate.as_ref() {
            let _permit = gate.acquire().await.unwrap();
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(ProviderError::Failed("geocoder down".to_string()));
        }
        Ok(AddressResult {
            address: Self::address_for(point),
            city: "Mountain View".to_string(),
            country: "US".to_string(),
            speed_limit_kph: Some(88.0),
            ..Default::default()
        })
    }
}

/// Cell locator that resolves every valid cell to a fixed point.
pub struct FakeCellLocator {
    pub location: MobileLocation,
    calls: AtomicUsize,
}

#[allow(dead_code)]
impl FakeCellLocator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            location: MobileLocation {
                point: GeoPoint::new(37.21, -121.96),
                accuracy_m: Some(850.0),
            },
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MobileLocationProvider for FakeCellLocator {
    fn name(&self) -> &str {
        "fake-cells"
    }

    async fn locate(
        &self,
        _serving: &CellTower,
        _neighbors: &[CellTower],
    ) -> Result<Option<MobileLocation>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Some(self.location))
    }
}

#[allow(dead_code)]
pub fn test_cell() -> CellTower {
    CellTower {
        cell_id: 40_321,
        mobile_country_code: 310,
        mobile_network_code: 410,
        location_area_code: 7,
    }
}

/// Rule engine returning fixed masks and recording what it saw.
pub struct FakeRules {
    pub rules_mask: ActionMask,
    pub selector_mask: ActionMask,
    pub selectors_match: AtomicBool,
    pub syntax_valid: AtomicBool,
    evaluated: Mutex<Vec<StatusCode>>,
    selectors: Mutex<Vec<String>>,
}

#[allow(dead_code)]
impl FakeRules {
    pub fn new(rules_mask: ActionMask) -> Arc<Self> {
        Self::with_selector(rules_mask, ActionMask::NONE)
    }

    pub fn with_selector(rules_mask: ActionMask, selector_mask: ActionMask) -> Arc<Self> {
        Arc::new(Self {
            rules_mask,
            selector_mask,
            selectors_match: AtomicBool::new(true),
            syntax_valid: AtomicBool::new(true),
            evaluated: Mutex::new(Vec::new()),
            selectors: Mutex::new(Vec::new()),
        })
    }

    /// Status codes passed to `execute_rules`, in order.
    pub fn evaluated(&self) -> Vec<StatusCode> {
        self.evaluated.lock().unwrap().clone()
    }

    pub fn selectors(&self) -> Vec<String> {
        self.selectors.lock().unwrap().clone()
    }
}

#[async_trait]
impl RuleFactory for FakeRules {
    async fn execute_selector(&self, selector: &str, _event: &Event) -> ActionMask {
        self.selectors.lock().unwrap().push(selector.to_string());
        self.selector_mask
    }

    async fn execute_rules(&self, event: &Event) -> ActionMask {
        self.evaluated.lock().unwrap().push(event.status_code);
        self.rules_mask
    }

    fn check_selector_syntax(&self, selector: &str) -> bool {
        !selector.trim().is_empty() && self.syntax_valid.load(Ordering::SeqCst)
    }

    async fn is_selector_match(&self, _selector: &str, _event: &Event) -> bool {
        self.selectors_match.load(Ordering::SeqCst)
    }
}

/// Fuel manager that classifies every event the same way.
pub struct FakeFuel {
    pub change: LevelChange,
    calls: AtomicUsize,
}

#[allow(dead_code)]
impl FakeFuel {
    pub fn new(change: LevelChange) -> Arc<Self> {
        Arc::new(Self {
            change,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FuelManager for FakeFuel {
    async fn classify(&self, _event: &Event) -> LevelChange {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.change
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SentEmail {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SentSms {
    pub gateway: String,
    pub phone: String,
    pub message: String,
}

/// Notification gateway that records instead of sending.
#[derive(Default)]
pub struct RecordingGateway {
    emails: Mutex<Vec<SentEmail>>,
    sms: Mutex<Vec<SentSms>>,
}

#[allow(dead_code)]
impl RecordingGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn emails(&self) -> Vec<SentEmail> {
        self.emails.lock().unwrap().clone()
    }

    pub fn sms(&self) -> Vec<SentSms> {
        self.sms.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationGateway for RecordingGateway {
    async fn send_email(
        &self,
        from: &str,
        to: &[String],
        subject: &str,
        _body: &str,
    ) -> Result<(), ProviderError> {
        self.emails.lock().unwrap().push(SentEmail {
            from: from.to_string(),
            to: to.to_vec(),
            subject: subject.to_string(),
        });
        Ok(())
    }

    async fn send_sms(
        &self,
        gateway: &str,
        phone: &str,
        message: &str,
    ) -> Result<(), ProviderError> {
        self.sms.lock().unwrap().push(SentSms {
            gateway: gateway.to_string(),
            phone: phone.to_string(),
            message: message.to_string(),
        });
        Ok(())
    }
}

/// Entity manager that records the keys it was given.
#[derive(Default)]
pub struct RecordingEntities {
    keys: Mutex<Vec<EventKey>>,
}

#[allow(dead_code)]
impl RecordingEntities {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn keys(&self) -> Vec<EventKey> {
        self.keys.lock().unwrap().clone()
    }
}

#[async_trait]
impl EntityManager for RecordingEntities {
    async fn insert_entity_change(&self, event: &Event) -> Result<(), ProviderError> {
        self.keys.lock().unwrap().push(event.key());
        Ok(())
    }
}
