// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - ingestion and enrichment logic.

pub mod address;
pub mod background;
pub mod fuel;
pub mod geozone;
pub mod notify;
pub mod pipeline;
pub mod providers;
pub mod transition;
pub mod validator;

pub use address::{AddressResolution, AddressResolver, CellResolution};
pub use background::{BackgroundDispatcher, DispatchError, JobError, JobHandle, JobReport};
pub use fuel::FuelChangeDetector;
pub use geozone::{GeozoneError, GeozoneIndex, GeozoneLookup, ZoneCache};
pub use notify::{NotificationDispatcher, Recipients};
pub use pipeline::{Collaborators, IngestOutcome, IngestionPipeline};
pub use providers::{
    ActionMask, AddressResult, EntityManager, FuelManager, GeocodeProvider, LevelChange,
    MobileLocationProvider, NotificationGateway, RuleFactory,
};
pub use transition::{CorridorChange, CorridorTracker, GeozoneTransitionDetector};
pub use validator::{EventValidator, RejectReason, Verdict};
