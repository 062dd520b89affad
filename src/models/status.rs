// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Event status codes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status code attached to every event (part of the event key).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct StatusCode(pub u32);

impl StatusCode {
    /// Heartbeat: accepted but never persisted or evaluated.
    pub const NONE: StatusCode = StatusCode(0x0000);
    pub const LOCATION: StatusCode = StatusCode(0xF020);
    pub const GEOFENCE_ARRIVE: StatusCode = StatusCode(0xF210);
    pub const GEOFENCE_DEPART: StatusCode = StatusCode(0xF230);
    pub const CORRIDOR_ACTIVE: StatusCode = StatusCode(0xF278);
    pub const CORRIDOR_INACTIVE: StatusCode = StatusCode(0xF288);
    pub const IGNITION_ON: StatusCode = StatusCode(0xF401);
    pub const IGNITION_OFF: StatusCode = StatusCode(0xF403);
    pub const FUEL_REFILL: StatusCode = StatusCode(0xF951);
    pub const FUEL_THEFT: StatusCode = StatusCode(0xF952);
    pub const RULE_TRIGGER_0: StatusCode = StatusCode(0xFF00);
    pub const RULE_TRIGGER_7: StatusCode = StatusCode(0xFF07);

    pub fn is_none(self) -> bool {
        self == Self::NONE
    }

    /// Codes emitted by the rule engine itself. Rules are never evaluated
    /// against these.
    pub fn is_rule_trigger(self) -> bool {
        (Self::RULE_TRIGGER_0.0..=Self::RULE_TRIGGER_7.0).contains(&self.0)
    }

    pub fn is_geozone_transition(self) -> bool {
        self == Self::GEOFENCE_ARRIVE || self == Self::GEOFENCE_DEPART
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::NONE => "None",
            Self::LOCATION => "Location",
            Self::GEOFENCE_ARRIVE => "Arrive",
            Self::GEOFENCE_DEPART => "Depart",
            Self::CORRIDOR_ACTIVE => "Corridor Active",
            Self::CORRIDOR_INACTIVE => "Corridor Inactive",
            Self::IGNITION_ON => "Ignition On",
            Self::IGNITION_OFF => "Ignition Off",
            Self::FUEL_REFILL => "Fuel Refill",
            Self::FUEL_THEFT => "Fuel Theft",
            code if code.is_rule_trigger() => "Rule Trigger",
            _ => "Unknown",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04X}", self.0)
    }
}
