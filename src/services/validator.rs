// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Event validation and policy normalization.

use crate::config::{Config, PolicyAction};
use crate::models::event::normalize_id;
use crate::models::Event;
use crate::time_utils::Clock;
use std::fmt;
use std::sync::Arc;

/// Timestamps above this were almost certainly sent in milliseconds.
pub const MAX_PLAUSIBLE_TIMESTAMP: i64 = 5_000_000_000;

/// Why an event was dropped. Expected outcome, not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum RejectReason {
    BlankIdentity,
    InvalidTimestamp(i64),
    FutureTimestamp { timestamp: i64, now: i64 },
    InvalidSpeed { speed_kph: f64, max_kph: f64 },
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::BlankIdentity => write!(f, "blank account or asset id"),
            RejectReason::InvalidTimestamp(ts) => write!(f, "invalid timestamp {}", ts),
            RejectReason::FutureTimestamp { timestamp, now } => {
                write!(f, "timestamp {} is {}s in the future", timestamp, timestamp - now)
            }
            RejectReason::InvalidSpeed { speed_kph, max_kph } => {
                write!(f, "speed {:.1} km/h exceeds {:.1} km/h", speed_kph, max_kph)
            }
        }
    }
}

/// Validator output.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// Continue processing the (possibly normalized) event.
    Accept(Event),
    /// Status code NONE: accepted, but nothing else happens.
    Heartbeat(Event),
    Reject(RejectReason),
}

/// Rejects malformed events and applies the future-date and speed policies.
pub struct EventValidator {
    future_date_action: PolicyAction,
    future_date_max_sec: i64,
    invalid_speed_action: PolicyAction,
    invalid_speed_max_kph: f64,
    clock: Arc<dyn Clock>,
}

impl EventValidator {
    pub fn new(config: &Config, clock: Arc<dyn Clock>) -> Self {
        Self {
            future_date_action: config.future_date_action,
            future_date_max_sec: config.future_date_max_sec,
            invalid_speed_action: config.invalid_speed_action,
            invalid_speed_max_kph: config.invalid_speed_max_kph,
            clock,
        }
    }

    /// Validate one event. Never fails; every rejection is logged.
    pub fn validate(&self, mut event: Event) -> Verdict {
        event.account_id = normalize_id(&event.account_id);
        event.asset_id = normalize_id(&event.asset_id);

        match self.check(&mut event) {
            Ok(()) if event.status_code.is_none() => Verdict::Heartbeat(event),
            Ok(()) => Verdict::Accept(event),
            Err(reason) => {
                tracing::warn!(
                    account_id = %event.account_id,
                    asset_id = %event.asset_id,
                    timestamp = event.timestamp,
                    status_code = %event.status_code,
                    reason = %reason,
                    "Event rejected"
                );
                Verdict::Reject(reason)
            }
        }
    }

    fn check(&self, event: &mut Event) -> Result<(), RejectReason> {
        if event.account_id.is_empty() || event.asset_id.is_empty() {
            return Err(RejectReason::BlankIdentity);
        }

        if event.timestamp <= 0 || event.timestamp > MAX_PLAUSIBLE_TIMESTAMP {
            return Err(RejectReason::InvalidTimestamp(event.timestamp));
        }

        if self.future_date_action != PolicyAction::Disabled && self.future_date_max_sec > 0 {
            let now = self.clock.now_secs();
            if event.timestamp > now.saturating_add(self.future_date_max_sec) {
                match self.future_date_action {
                    PolicyAction::Ignore => {
                        return Err(RejectReason::FutureTimestamp {
                            timestamp: event.timestamp,
                            now,
                        });
                    }
                    PolicyAction::Truncate => {
                        tracing::info!(
                            asset_id = %event.asset_id,
                            timestamp = event.timestamp,
                            now,
                            "Truncating future timestamp"
                        );
                        event.timestamp = now;
                    }
                    PolicyAction::Disabled => {}
                }
            }
        }

        if self.invalid_speed_action != PolicyAction::Disabled
            && self.invalid_speed_max_kph > 0.0
            && event.speed_kph > self.invalid_speed_max_kph
        {
            match self.invalid_speed_action {
                PolicyAction::Ignore => {
                    return Err(RejectReason::InvalidSpeed {
                        speed_kph: event.speed_kph,
                        max_kph: self.invalid_speed_max_kph,
                    });
                }
                PolicyAction::Truncate => {
                    tracing::info!(
                        asset_id = %event.asset_id,
                        speed_kph = event.speed_kph,
                        max_kph = self.invalid_speed_max_kph,
                        "Truncating invalid speed"
                    );
                    event.speed_kph = self.invalid_speed_max_kph;
                }
                PolicyAction::Disabled => {}
            }
        }

        Ok(())
    }
}
