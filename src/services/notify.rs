// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Rule dispatch, last-notify bookkeeping and geozone auto-notify.

use crate::config::Config;
use crate::models::{AccountProfile, AssetState, Event, Geozone, StatusCode};
use crate::services::geozone::ZoneCache;
use crate::services::providers::{ActionMask, EntityManager, NotificationGateway, RuleFactory};
use crate::time_utils::format_epoch;
use std::sync::Arc;

/// Recipients with this prefix are SMS numbers.
pub const SMS_PREFIX: &str = "sms:";

/// Auto-notify recipients split by delivery channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Recipients {
    pub email: Vec<String>,
    pub sms: Vec<String>,
}

impl Recipients {
    /// Parse comma-separated recipient lists, de-duplicating across lists.
    pub fn parse<'a>(lists: impl IntoIterator<Item = &'a str>) -> Self {
        let mut recipients = Self::default();
        for list in lists {
            for entry in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                let (target, value) = match strip_prefix_ignore_case(entry, SMS_PREFIX) {
                    Some(phone) => (&mut recipients.sms, phone.trim()),
                    None => (&mut recipients.email, entry),
                };
                if !value.is_empty() && !target.iter().any(|v| v == value) {
                    target.push(value.to_string());
                }
            }
        }
        recipients
    }

    pub fn is_empty(&self) -> bool {
        self.email.is_empty() && self.sms.is_empty()
    }
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &s[prefix.len()..])
}

/// Runs the rule engine for accepted events and sends geozone auto-notify
/// messages.
#[derive(Clone)]
pub struct NotificationDispatcher {
    rules: Option<Arc<dyn RuleFactory>>,
    gateway: Option<Arc<dyn NotificationGateway>>,
    entities: Option<Arc<dyn EntityManager>>,
    check_notify_selector: bool,
    notify_from: String,
    sms_gateway: String,
    date_format: String,
}

impl NotificationDispatcher {
    pub fn new(
        config: &Config,
        rules: Option<Arc<dyn RuleFactory>>,
        gateway: Option<Arc<dyn NotificationGateway>>,
        entities: Option<Arc<dyn EntityManager>>,
    ) -> Self {
        Self {
            rules,
            gateway,
            entities,
            check_notify_selector: config.check_notify_selector,
            notify_from: config.notify_from.clone(),
            sms_gateway: config.sms_gateway.clone(),
            date_format: config.date_format.clone(),
        }
    }

    /// Pass a hardware event to the entity manager, if installed.
    pub async fn record_entity_change(&self, event: &Event) {
        if event.is_synthesized {
            return;
        }
        let Some(entities) = self.entities.as_ref() else {
            return;
        };
        if let Err(e) = entities.insert_entity_change(event).await {
            tracing::warn!(
                asset_id = %event.asset_id,
                timestamp = event.timestamp,
                error = %e,
                "Entity change failed"
            );
        }
    }

    /// Evaluate notification rules for `event`. Returns whether any rule
    /// fired. May update the asset's last-notify fields.
    pub async fn evaluate(
        &self,
        event: &Event,
        asset: &mut AssetState,
        account: &AccountProfile,
        zones: &mut ZoneCache,
    ) -> bool {
        if event.status_code.is_rule_trigger() {
            return false;
        }
        if !asset.allow_notify {
            return false;
        }

        let mut triggered = false;
        if let Some(rules) = self.rules.as_ref() {
            let mut accumulated = ActionMask::NONE;

            let selector = asset.notify_selector.trim().to_string();
            if self.check_notify_selector && !selector.is_empty() {
                if rules.check_selector_syntax(&selector) {
                    tracing::debug!(
                        asset_id = %asset.asset_id(),
                        selector = %selector,
                        "Processing asset rule selector"
                    );
                    let mask = rules.execute_selector(&selector, event).await;
                    if apply_actions(asset, mask, event) {
                        triggered = true;
                        accumulated |= mask;
                    }
                } else {
                    tracing::warn!(
                        asset_id = %asset.asset_id(),
                        selector = %selector,
                        "Invalid asset rule selector, skipping"
                    );
                }
            }

            let mask = rules.execute_rules(event).await;
            if apply_actions(asset, mask, event) {
                triggered = true;
                accumulated |= mask;
            }

            if triggered {
                tracing::info!(
                    asset_id = %asset.asset_id(),
                    status_code = %event.status_code,
                    action_mask = accumulated.0,
                    "Notification rules triggered"
                );
            }
        }

        if event.status_code.is_geozone_transition() {
            if let Some(zone) = zones.zone_for_event(event) {
                if zone.auto_notify {
                    self.send_auto_notify(event, asset, account, &zone).await;
                }
            }
        }

        triggered
    }

    async fn send_auto_notify(
        &self,
        event: &Event,
        asset: &AssetState,
        account: &AccountProfile,
        zone: &Geozone,
    ) {
        let Some(gateway) = self.gateway.as_ref() else {
            tracing::warn!(
                geozone_id = %zone.geozone_id,
                "Geozone auto-notify requested but no notification gateway"
            );
            return;
        };

        let recipients = Recipients::parse([
            account.notify_email.as_str(),
            asset.notify_email.as_str(),
        ]);
        if recipients.is_empty() {
            tracing::debug!(
                asset_id = %asset.asset_id(),
                geozone_id = %zone.geozone_id,
                "No auto-notify recipients"
            );
            return;
        }

        let message = auto_notify_message(event, asset, zone, &self.date_format);

        if !recipients.email.is_empty() {
            let from = if account.notify_from.trim().is_empty() {
                self.notify_from.trim()
            } else {
                account.notify_from.trim()
            };
            if from.is_empty() {
                tracing::warn!(
                    account_id = %account.account_id,
                    "No 'from' address for geozone auto-notify email"
                );
            } else if let Err(e) = gateway
                .send_email(from, &recipients.email, &message, &message)
                .await
            {
                tracing::warn!(
                    asset_id = %asset.asset_id(),
                    recipients = recipients.email.len(),
                    error = %e,
                    "Auto-notify email failed"
                );
            }
        }

        for phone in &recipients.sms {
            if let Err(e) = gateway.send_sms(&self.sms_gateway, phone, &message).await {
                tracing::warn!(
                    asset_id = %asset.asset_id(),
                    phone = %phone,
                    error = %e,
                    "Auto-notify SMS failed"
                );
            }
        }
    }
}

/// Interpret one rule result. Returns false if no rule fired.
fn apply_actions(asset: &mut AssetState, mask: ActionMask, event: &Event) -> bool {
    if mask.is_empty() {
        return false;
    }
    if mask.contains(ActionMask::SAVE_LAST) {
        asset.set_last_notify(event.timestamp, event.status_code);
    }
    true
}

/// `{time}: "{asset}" arrived|departed "{zone}"`
pub fn auto_notify_message(
    event: &Event,
    asset: &AssetState,
    zone: &Geozone,
    date_format: &str,
) -> String {
    let verb = if event.status_code == StatusCode::GEOFENCE_ARRIVE {
        "arrived"
    } else {
        "departed"
    };
    let zone_name = if zone.description.trim().is_empty() {
        zone.geozone_id.as_str()
    } else {
        zone.description.trim()
    };
    format!(
        "{}: \"{}\" {} \"{}\"",
        format_epoch(event.timestamp, date_format),
        asset.display_name(),
        verb,
        zone_name
    )
}
