// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Contracts for the pluggable collaborators the pipeline consumes.
//!
//! Implementations live outside this crate; tests use in-memory fakes.

use crate::error::ProviderError;
use crate::models::{CellTower, Event, GeoPoint, MobileLocation};
use async_trait::async_trait;
use std::ops::{BitOr, BitOrAssign};

/// Address returned by a reverse-geocode provider. Empty strings and `None`
/// mean "not provided".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AddressResult {
    pub address: String,
    pub street_address: String,
    pub city: String,
    pub state_province: String,
    pub postal_code: String,
    pub country: String,
    pub subdivision: String,
    pub speed_limit_kph: Option<f64>,
    pub is_toll_road: Option<bool>,
}

#[async_trait]
pub trait GeocodeProvider: Send + Sync {
    fn name(&self) -> &str;

    fn is_enabled(&self) -> bool {
        true
    }

    /// True if `reverse_geocode` completes within the fast-path budget.
    fn is_fast_operation(&self) -> bool;

    async fn reverse_geocode(
        &self,
        point: GeoPoint,
        locale: &str,
    ) -> Result<AddressResult, ProviderError>;
}

#[async_trait]
pub trait MobileLocationProvider: Send + Sync {
    fn name(&self) -> &str;

    fn is_enabled(&self) -> bool {
        true
    }

    /// Resolve a cell-tower fix. `Ok(None)` means the cell is unknown.
    async fn locate(
        &self,
        serving: &CellTower,
        neighbors: &[CellTower],
    ) -> Result<Option<MobileLocation>, ProviderError>;
}

/// Action bits returned by the rule engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ActionMask(pub u32);

impl ActionMask {
    pub const NONE: ActionMask = ActionMask(0x0000_0000);
    pub const NOTIFY_ACCOUNT: ActionMask = ActionMask(0x0000_0001);
    pub const NOTIFY_DEVICE: ActionMask = ActionMask(0x0000_0002);
    pub const NOTIFY_RULE: ActionMask = ActionMask(0x0000_0004);
    pub const VIA_EMAIL: ActionMask = ActionMask(0x0000_0100);
    pub const VIA_QUEUE: ActionMask = ActionMask(0x0000_0200);
    pub const VIA_LISTENER: ActionMask = ActionMask(0x0000_0400);
    /// Record last-notify time/code on the asset.
    pub const SAVE_LAST: ActionMask = ActionMask(0x0001_0000);

    /// No rule fired.
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, other: ActionMask) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for ActionMask {
    type Output = ActionMask;

    fn bitor(self, rhs: ActionMask) -> ActionMask {
        ActionMask(self.0 | rhs.0)
    }
}

impl BitOrAssign for ActionMask {
    fn bitor_assign(&mut self, rhs: ActionMask) {
        self.0 |= rhs.0;
    }
}

/// Rule engine. Expressions are opaque to the pipeline.
#[async_trait]
pub trait RuleFactory: Send + Sync {
    /// Evaluate one selector expression and run its actions.
    async fn execute_selector(&self, selector: &str, event: &Event) -> ActionMask;

    /// Evaluate the full configured rule set.
    async fn execute_rules(&self, event: &Event) -> ActionMask;

    /// Whether `selector` parses. Asset selectors that fail are skipped.
    fn check_selector_syntax(&self, selector: &str) -> bool;

    /// Evaluate a selector without running actions.
    async fn is_selector_match(&self, selector: &str, event: &Event) -> bool;
}

/// Result of fuel-level classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelChange {
    None,
    Increase,
    Decrease,
}

/// Fuel-level history keeper.
#[async_trait]
pub trait FuelManager: Send + Sync {
    /// Record the event's fuel level and classify the change.
    async fn classify(&self, event: &Event) -> LevelChange;
}

/// Outbound email/SMS delivery.
#[async_trait]
pub trait NotificationGateway: Send + Sync {
    async fn send_email(
        &self,
        from: &str,
        to: &[String],
        subject: &str,
        body: &str,
    ) -> Result<(), ProviderError>;

    async fn send_sms(&self, gateway: &str, phone: &str, message: &str)
        -> Result<(), ProviderError>;
}

/// Entity attach/detach tracking (trailers, drivers).
#[async_trait]
pub trait EntityManager: Send + Sync {
    async fn insert_entity_change(&self, event: &Event) -> Result<(), ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_mask_bits() {
        let mask = ActionMask::NOTIFY_ACCOUNT | ActionMask::SAVE_LAST;
        assert!(mask.contains(ActionMask::SAVE_LAST));
        assert!(!mask.contains(ActionMask::VIA_QUEUE));
        assert!(ActionMask::NONE.is_empty());
    }
}
