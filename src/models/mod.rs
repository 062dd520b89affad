// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the pipeline.

pub mod account;
pub mod asset;
pub mod event;
pub mod geozone;
pub mod status;

pub use account::{AccountProfile, GeocoderMode};
pub use asset::{AssetFields, AssetState, CachedCell, IgnitionState};
pub use event::{CellTower, Event, EventFields, EventKey, GeoPoint, MobileLocation};
pub use geozone::{Geozone, ZoneGeometry};
pub use status::StatusCode;
