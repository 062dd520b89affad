// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Per-event orchestration: validate, enrich, persist, detect, notify,
//! update last-known state, and hand slow enrichment to the background pool.
//!
//! Synthesized events (geozone transitions, fuel refill/theft, corridor
//! changes) re-enter the pipeline inline. The submitted event runs at depth
//! 0 and its synthesized events at depth 1. Events synthesized at depth 1 are
//! queued and run by the depth-0 frame once the current one finishes, still
//! at depth 1; anything a queued event would synthesize is dropped.

use crate::config::Config;
use crate::db::Storage;
use crate::error::{IngestError, Result};
use crate::models::{AccountProfile, AssetState, Event};
use crate::services::address::{AddressResolution, AddressResolver, CellResolution};
use crate::services::background::{
    BackgroundDispatcher, BackgroundJob, EnrichmentRequest, JobHandle,
};
use crate::services::fuel::FuelChangeDetector;
use crate::services::geozone::{GeozoneLookup, ZoneCache};
use crate::services::notify::NotificationDispatcher;
use crate::services::providers::{
    EntityManager, FuelManager, GeocodeProvider, MobileLocationProvider, NotificationGateway,
    RuleFactory,
};
use crate::services::transition::{CorridorTracker, GeozoneTransitionDetector};
use crate::services::validator::{EventValidator, RejectReason, Verdict};
use crate::time_utils::{epoch_rfc3339, Clock};
use futures_util::future::{BoxFuture, FutureExt};
use std::collections::VecDeque;
use std::sync::Arc;

/// Deepest level at which synthesized events are processed.
pub const MAX_SYNTHESIS_DEPTH: usize = 1;

/// Optional collaborators. Anything left `None` is simply skipped.
#[derive(Clone, Default)]
pub struct Collaborators {
    pub geocoder: Option<Arc<dyn GeocodeProvider>>,
    pub cell_locator: Option<Arc<dyn MobileLocationProvider>>,
    pub rules: Option<Arc<dyn RuleFactory>>,
    pub fuel: Option<Arc<dyn FuelManager>>,
    pub notifier: Option<Arc<dyn NotificationGateway>>,
    pub entities: Option<Arc<dyn EntityManager>>,
    pub geozones: Option<Arc<dyn GeozoneLookup>>,
}

/// Result of a successful `submit`.
#[derive(Debug)]
pub enum IngestOutcome {
    /// Persisted and evaluated. `deferred` resolves when background
    /// enrichment of this event finishes.
    Accepted {
        deferred: Option<JobHandle>,
        synthesized: usize,
    },
    /// Status code NONE; nothing stored.
    Heartbeat,
    Rejected(RejectReason),
}

impl IngestOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, IngestOutcome::Accepted { .. })
    }
}

/// State shared by all frames of one `submit`.
struct IngestContext {
    zones: ZoneCache,
    pending: VecDeque<Event>,
    draining: bool,
    synthesized: usize,
}

pub struct IngestionPipeline {
    config: Config,
    storage: Arc<dyn Storage>,
    validator: EventValidator,
    resolver: AddressResolver,
    detector: GeozoneTransitionDetector,
    corridors: CorridorTracker,
    fuel: FuelChangeDetector,
    notifier: NotificationDispatcher,
    geozones: Option<Arc<dyn GeozoneLookup>>,
    background: BackgroundDispatcher,
}

impl IngestionPipeline {
    /// Build the pipeline and start its background workers. Must be called
    /// from within a tokio runtime.
    pub fn new(
        config: Config,
        storage: Arc<dyn Storage>,
        collaborators: Collaborators,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let resolver = AddressResolver::new(
            collaborators.geocoder,
            collaborators.cell_locator,
            config.high_priority_codes.clone(),
        );
        let background = BackgroundDispatcher::new(
            config.background_workers,
            config.background_queue_size,
            Arc::clone(&storage),
            resolver.clone(),
            collaborators.geozones.clone(),
        );

        Self {
            validator: EventValidator::new(&config, clock),
            detector: GeozoneTransitionDetector,
            corridors: CorridorTracker::new(collaborators.rules.clone()),
            fuel: FuelChangeDetector::new(collaborators.fuel),
            notifier: NotificationDispatcher::new(
                &config,
                collaborators.rules,
                collaborators.notifier,
                collaborators.entities,
            ),
            geozones: collaborators.geozones,
            resolver,
            background,
            storage,
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Ingest one event: load the asset and account, process, then save the
    /// asset fields that changed.
    ///
    /// Rejected and heartbeat events never touch storage.
    pub async fn submit(&self, event: Event) -> Result<IngestOutcome> {
        let event = match self.validator.validate(event) {
            Verdict::Accept(event) => event,
            Verdict::Heartbeat(_) => return Ok(IngestOutcome::Heartbeat),
            Verdict::Reject(reason) => return Ok(IngestOutcome::Rejected(reason)),
        };

        let mut asset = match self
            .storage
            .load_asset_state(&event.account_id, &event.asset_id)
            .await?
        {
            Some(asset) => asset,
            None => {
                tracing::info!(
                    account_id = %event.account_id,
                    asset_id = %event.asset_id,
                    "Creating asset state"
                );
                let asset = AssetState::new(&event.account_id, &event.asset_id);
                // Saved up front so background jobs only ever patch fields.
                self.storage.save_asset_state(&asset).await?;
                asset
            }
        };
        let account = self.load_account(&event.account_id).await?;

        let outcome = self.run(&mut asset, &account, event).await?;

        let dirty = asset.take_dirty();
        if !dirty.is_empty() {
            self.storage.save_asset_fields(&asset, dirty).await?;
        }

        Ok(outcome)
    }

    /// Process an event against caller-owned state. Nothing is saved for the
    /// asset; the caller reads `asset.take_dirty()` afterwards.
    pub async fn process(
        &self,
        asset: &mut AssetState,
        account: &AccountProfile,
        event: Event,
    ) -> Result<IngestOutcome> {
        let event = match self.validator.validate(event) {
            Verdict::Accept(event) => event,
            Verdict::Heartbeat(_) => return Ok(IngestOutcome::Heartbeat),
            Verdict::Reject(reason) => return Ok(IngestOutcome::Rejected(reason)),
        };
        if event.account_id != asset.account_id() || event.asset_id != asset.asset_id() {
            return Err(IngestError::Internal(anyhow::anyhow!(
                "event for {}/{} submitted to asset {}/{}",
                event.account_id,
                event.asset_id,
                asset.account_id(),
                asset.asset_id()
            )));
        }
        self.run(asset, account, event).await
    }

    /// Stop accepting background work and wait for queued jobs to finish.
    pub async fn shutdown(self) {
        self.background.shutdown().await;
    }

    async fn load_account(&self, account_id: &str) -> Result<AccountProfile> {
        Ok(match self.storage.load_account(account_id).await? {
            Some(profile) => profile,
            None => AccountProfile::new(account_id, self.config.default_geocoder_mode),
        })
    }

    async fn run(
        &self,
        asset: &mut AssetState,
        account: &AccountProfile,
        event: Event,
    ) -> Result<IngestOutcome> {
        let mut ctx = IngestContext {
            zones: ZoneCache::new(self.geozones.clone(), &event.account_id),
            pending: VecDeque::new(),
            draining: false,
            synthesized: 0,
        };
        let deferred = self.ingest(asset, account, event, &mut ctx, 0).await?;
        Ok(IngestOutcome::Accepted {
            deferred,
            synthesized: ctx.synthesized,
        })
    }

    /// Process one validated event at `depth`.
    fn ingest<'a>(
        &'a self,
        asset: &'a mut AssetState,
        account: &'a AccountProfile,
        mut event: Event,
        ctx: &'a mut IngestContext,
        depth: usize,
    ) -> BoxFuture<'a, Result<Option<JobHandle>>> {
        async move {
            // Transitions are stamped before this event, so they go first.
            if !event.is_synthesized
                && event.has_valid_point()
                && self.config.synthesize_geozone_transitions
            {
                let transitions = self.detector.check(
                    asset.last_valid_location(),
                    event.point,
                    event.timestamp,
                    &mut ctx.zones,
                );
                for transition in transitions {
                    tracing::info!(
                        asset_id = %event.asset_id,
                        geozone_id = %transition.zone.geozone_id,
                        direction = ?transition.direction,
                        "Geozone transition"
                    );
                    let child = transition.to_event(&event);
                    self.emit(asset, account, child, ctx, depth).await;
                }
            }

            let mut request = EnrichmentRequest::default();
            match self
                .resolver
                .resolve_cell_location(&mut event, asset, true)
                .await
            {
                CellResolution::Deferred => request.cell_location = true,
                CellResolution::Cached(fields) | CellResolution::Located(fields) => {
                    tracing::debug!(
                        asset_id = %event.asset_id,
                        fields = ?fields.names(),
                        "Cell location applied"
                    );
                }
                CellResolution::NotApplicable => {}
            }

            match self
                .resolver
                .resolve(&mut event, account, true, &mut ctx.zones)
                .await
            {
                AddressResolution::Deferred if self.config.allow_slow_geocode => {
                    request.address = true;
                }
                AddressResolution::Deferred => {
                    tracing::debug!(
                        asset_id = %event.asset_id,
                        "Slow reverse-geocode not allowed, skipping"
                    );
                }
                AddressResolution::Updated(_) => {
                    tracing::info!(
                        account_id = %event.account_id,
                        asset_id = %event.asset_id,
                        point = %event.point,
                        address = %event.address,
                        "Event address"
                    );
                }
                AddressResolution::Unchanged => {}
            }

            if let Err(e) = self.storage.persist_event(&event).await {
                tracing::error!(
                    account_id = %event.account_id,
                    asset_id = %event.asset_id,
                    time = %epoch_rfc3339(event.timestamp),
                    status_code = %event.status_code,
                    error = %e,
                    "Event save failed"
                );
                return Err(e.into());
            }
            tracing::debug!(
                key = %event.key(),
                synthesized = event.is_synthesized,
                "Event persisted"
            );

            let deferred = if request.is_empty() {
                None
            } else {
                self.defer(asset, account, &event, request)
            };

            self.notifier.record_entity_change(&event).await;
            if let Some(child) = self.fuel.check(&event).await {
                self.emit(asset, account, child, ctx, depth).await;
            }

            self.notifier
                .evaluate(&event, asset, account, &mut ctx.zones)
                .await;

            self.update_last_known(asset, &event);

            if let Some(change) = self.corridors.apply(&event, asset, &mut ctx.zones).await {
                if self.config.synthesize_corridor_events {
                    let child = event.copy_synthesized(change.status_code(), None);
                    self.emit(asset, account, child, ctx, depth).await;
                }
            }

            Ok(deferred)
        }
        .boxed()
    }

    /// Run a synthesized event inline at `depth + 1`, queue it for the root
    /// frame, or drop it if that would exceed the depth cap.
    async fn emit(
        &self,
        asset: &mut AssetState,
        account: &AccountProfile,
        child: Event,
        ctx: &mut IngestContext,
        depth: usize,
    ) {
        if depth < MAX_SYNTHESIS_DEPTH {
            self.run_synthesized(asset, account, child, ctx, depth + 1)
                .await;
            // Drain whatever the child queued, in order.
            if depth == 0 && !ctx.draining {
                ctx.draining = true;
                while let Some(next) = ctx.pending.pop_front() {
                    self.run_synthesized(asset, account, next, ctx, MAX_SYNTHESIS_DEPTH)
                        .await;
                }
                ctx.draining = false;
            }
        } else if !ctx.draining {
            ctx.pending.push_back(child);
        } else {
            tracing::error!(
                key = %child.key(),
                depth,
                "Synthesis depth exceeded, dropping event"
            );
        }
    }

    async fn run_synthesized(
        &self,
        asset: &mut AssetState,
        account: &AccountProfile,
        child: Event,
        ctx: &mut IngestContext,
        depth: usize,
    ) {
        let child = match self.validator.validate(child) {
            Verdict::Accept(child) => child,
            Verdict::Heartbeat(_) | Verdict::Reject(_) => return,
        };
        let key = child.key();
        match self.ingest(asset, account, child, ctx, depth).await {
            Ok(_) => {
                ctx.synthesized += 1;
                tracing::info!(key = %key, depth, "Synthesized event ingested");
            }
            Err(e) => {
                tracing::error!(key = %key, error = %e, "Synthesized event failed");
            }
        }
    }

    fn defer(
        &self,
        asset: &AssetState,
        account: &AccountProfile,
        event: &Event,
        request: EnrichmentRequest,
    ) -> Option<JobHandle> {
        let job = BackgroundJob {
            event: event.clone(),
            account: account.clone(),
            asset: asset.clone(),
            request,
        };
        match self.background.submit(job) {
            Ok(handle) => {
                tracing::debug!(
                    key = %event.key(),
                    cell_location = request.cell_location,
                    address = request.address,
                    "Enrichment queued for background operation"
                );
                Some(handle)
            }
            Err(e) => {
                tracing::warn!(
                    key = %event.key(),
                    error = %e,
                    "Unable to queue background enrichment"
                );
                None
            }
        }
    }

    /// Fold an accepted event into the asset's last-known state.
    fn update_last_known(&self, asset: &mut AssetState, event: &Event) {
        if event.has_valid_point() {
            asset.set_last_valid_location(event.timestamp, event.point, event.heading);
        }
        if event.odometer_km > 0.0
            && !asset.set_last_odometer_km(event.odometer_km, self.config.max_odometer_km)
        {
            tracing::debug!(
                asset_id = %asset.asset_id(),
                odometer_km = event.odometer_km,
                last_odometer_km = asset.last_odometer_km,
                "Odometer value not stored"
            );
        }
        if event.fuel_total > 0.0 {
            asset.set_last_fuel_total(event.fuel_total);
        }
        if event.engine_hours > 0.0 {
            asset.set_last_engine_hours(event.engine_hours);
        }
        if event.battery_level > 0.0 {
            asset.set_last_battery_level(event.battery_level);
        }
        if event.fuel_level > 0.0 {
            asset.set_last_fuel_level(event.fuel_level);
        }
        if event.oil_level > 0.0 {
            asset.set_last_oil_level(event.oil_level);
        }
        asset.set_last_input_state(event.input_mask);
    }
}
