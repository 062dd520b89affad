// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Fuel refill/theft detection.

use crate::models::{Event, StatusCode};
use crate::services::providers::{FuelManager, LevelChange};
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct FuelChangeDetector {
    manager: Option<Arc<dyn FuelManager>>,
}

impl FuelChangeDetector {
    pub fn new(manager: Option<Arc<dyn FuelManager>>) -> Self {
        Self { manager }
    }

    /// Classify the event's fuel level and build the REFILL/THEFT event to
    /// synthesize, if any. Synthesized events are never classified.
    pub async fn check(&self, event: &Event) -> Option<Event> {
        if event.is_synthesized {
            return None;
        }
        let manager = self.manager.as_ref()?;

        let code = match manager.classify(event).await {
            LevelChange::Increase => StatusCode::FUEL_REFILL,
            LevelChange::Decrease => StatusCode::FUEL_THEFT,
            LevelChange::None => return None,
        };
        if event.status_code == code {
            return None;
        }

        tracing::info!(
            asset_id = %event.asset_id,
            timestamp = event.timestamp,
            status_code = %code,
            fuel_level = event.fuel_level,
            "Fuel level change detected"
        );
        Some(event.copy_synthesized(code, None))
    }
}
