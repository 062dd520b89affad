// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Account-level settings consumed by the pipeline.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// How much reverse-geocoding an account is allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeocoderMode {
    /// No address resolution at all
    None,
    /// Geozone address substitution only
    Geozone,
    /// Provider lookups for high-priority status codes only
    Partial,
    /// Provider lookups for every event
    #[default]
    Full,
}

impl FromStr for GeocoderMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" => Ok(GeocoderMode::None),
            "geozone" => Ok(GeocoderMode::Geozone),
            "partial" => Ok(GeocoderMode::Partial),
            "full" => Ok(GeocoderMode::Full),
            other => Err(format!("unknown geocoder mode: {}", other)),
        }
    }
}

/// Account profile.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountProfile {
    pub account_id: String,
    pub description: String,
    pub geocoder_mode: GeocoderMode,
    /// Comma-separated recipients for geozone auto-notify
    pub notify_email: String,
    /// "From" address for outbound notification email
    pub notify_from: String,
    /// Locale passed to the reverse-geocoder
    pub locale: String,
}

impl AccountProfile {
    pub fn new(account_id: &str, geocoder_mode: GeocoderMode) -> Self {
        Self {
            account_id: crate::models::event::normalize_id(account_id),
            geocoder_mode,
            ..Default::default()
        }
    }
}
