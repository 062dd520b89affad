//! Pipeline configuration loaded from environment variables.
//!
//! Malformed values never abort startup: each one is logged once at warn
//! level and replaced by its default.

use crate::models::{GeocoderMode, StatusCode};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// Odometer values at or above this are treated as bogus (1,000,000 miles).
pub const DEFAULT_MAX_ODOMETER_KM: f64 = 1_609_344.0;

/// Largest accepted future-timestamp grace window (one year).
pub const MAX_FUTURE_DATE_WINDOW_SEC: i64 = 365 * 24 * 3600;

/// What to do with an event outside a configured limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PolicyAction {
    /// No check
    #[default]
    Disabled,
    /// Drop the event
    Ignore,
    /// Clamp the offending value to the limit
    Truncate,
}

impl FromStr for PolicyAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "disabled" | "disable" | "none" | "0" => Ok(PolicyAction::Disabled),
            "ignore" | "skip" | "1" => Ok(PolicyAction::Ignore),
            "truncate" | "clamp" | "2" => Ok(PolicyAction::Truncate),
            other => Err(format!("unknown policy action: {}", other)),
        }
    }
}

/// Pipeline configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Validation policies ---
    pub future_date_action: PolicyAction,
    /// Grace window for future timestamps (0 = policy not applied)
    pub future_date_max_sec: i64,
    pub invalid_speed_action: PolicyAction,
    /// Maximum plausible speed (0 = policy not applied)
    pub invalid_speed_max_kph: f64,
    pub max_odometer_km: f64,

    // --- Background pool ---
    pub background_workers: usize,
    /// Queue depth per worker
    pub background_queue_size: usize,

    // --- Enrichment ---
    /// Queue slow reverse-geocodes on the background pool instead of skipping them
    pub allow_slow_geocode: bool,
    /// Geocoder mode for accounts without a stored profile
    pub default_geocoder_mode: GeocoderMode,
    /// Codes that get provider lookups in PARTIAL mode
    pub high_priority_codes: Vec<StatusCode>,

    // --- Notifications ---
    pub check_notify_selector: bool,
    /// Fallback "from" address for auto-notify email
    pub notify_from: String,
    /// SMS gateway name passed through to the notification gateway
    pub sms_gateway: String,
    /// `strftime` pattern for notification timestamps
    pub date_format: String,

    // --- Synthesis ---
    pub synthesize_geozone_transitions: bool,
    pub synthesize_corridor_events: bool,

    /// GeoJSON geozone file used by the replay binary
    pub geozones_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            future_date_action: PolicyAction::Disabled,
            future_date_max_sec: 0,
            invalid_speed_action: PolicyAction::Disabled,
            invalid_speed_max_kph: 0.0,
            max_odometer_km: DEFAULT_MAX_ODOMETER_KM,
            background_workers: 30,
            background_queue_size: 256,
            allow_slow_geocode: true,
            default_geocoder_mode: GeocoderMode::Full,
            high_priority_codes: vec![
                StatusCode::GEOFENCE_ARRIVE,
                StatusCode::GEOFENCE_DEPART,
                StatusCode::IGNITION_ON,
                StatusCode::IGNITION_OFF,
            ],
            check_notify_selector: false,
            notify_from: String::new(),
            sms_gateway: "default".to_string(),
            date_format: "%Y/%m/%d %H:%M:%S %Z".to_string(),
            synthesize_geozone_transitions: true,
            synthesize_corridor_events: true,
            geozones_file: None,
        }
    }
}

impl Config {
    /// Load configuration from the process environment (and `.env` if present).
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok(); // Load .env file if present
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_vars<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &'static str| lookup(key).filter(|v| !v.trim().is_empty());

        let mut config = Self {
            future_date_action: or_default(
                get("INGEST_FUTURE_DATE_ACTION"),
                "INGEST_FUTURE_DATE_ACTION",
                defaults.future_date_action,
            ),
            future_date_max_sec: or_default(
                get("INGEST_FUTURE_DATE_MAX_SEC"),
                "INGEST_FUTURE_DATE_MAX_SEC",
                defaults.future_date_max_sec,
            ),
            invalid_speed_action: or_default(
                get("INGEST_INVALID_SPEED_ACTION"),
                "INGEST_INVALID_SPEED_ACTION",
                defaults.invalid_speed_action,
            ),
            invalid_speed_max_kph: or_default(
                get("INGEST_INVALID_SPEED_MAX_KPH"),
                "INGEST_INVALID_SPEED_MAX_KPH",
                defaults.invalid_speed_max_kph,
            ),
            max_odometer_km: or_default(
                get("INGEST_MAX_ODOMETER_KM"),
                "INGEST_MAX_ODOMETER_KM",
                defaults.max_odometer_km,
            ),
            background_workers: or_default(
                get("INGEST_BACKGROUND_WORKERS"),
                "INGEST_BACKGROUND_WORKERS",
                defaults.background_workers,
            ),
            background_queue_size: or_default(
                get("INGEST_BACKGROUND_QUEUE_SIZE"),
                "INGEST_BACKGROUND_QUEUE_SIZE",
                defaults.background_queue_size,
            ),
            allow_slow_geocode: or_default(
                get("INGEST_ALLOW_SLOW_GEOCODE"),
                "INGEST_ALLOW_SLOW_GEOCODE",
                defaults.allow_slow_geocode,
            ),
            default_geocoder_mode: or_default(
                get("INGEST_GEOCODER_MODE"),
                "INGEST_GEOCODER_MODE",
                defaults.default_geocoder_mode,
            ),
            high_priority_codes: match get("INGEST_HIGH_PRIORITY_CODES") {
                Some(raw) => match parse_status_codes(&raw) {
                    Ok(codes) => codes,
                    Err(err) => {
                        tracing::warn!(error = %err, "Using default high-priority codes");
                        defaults.high_priority_codes.clone()
                    }
                },
                None => defaults.high_priority_codes.clone(),
            },
            check_notify_selector: or_default(
                get("INGEST_CHECK_NOTIFY_SELECTOR"),
                "INGEST_CHECK_NOTIFY_SELECTOR",
                defaults.check_notify_selector,
            ),
            notify_from: get("INGEST_NOTIFY_FROM")
                .map(|v| v.trim().to_string())
                .unwrap_or_else(|| defaults.notify_from.clone()),
            sms_gateway: get("INGEST_SMS_GATEWAY")
                .map(|v| v.trim().to_string())
                .unwrap_or_else(|| defaults.sms_gateway.clone()),
            date_format: get("INGEST_DATE_FORMAT").unwrap_or_else(|| defaults.date_format.clone()),
            synthesize_geozone_transitions: or_default(
                get("INGEST_SYNTHESIZE_GEOZONE_TRANSITIONS"),
                "INGEST_SYNTHESIZE_GEOZONE_TRANSITIONS",
                defaults.synthesize_geozone_transitions,
            ),
            synthesize_corridor_events: or_default(
                get("INGEST_SYNTHESIZE_CORRIDOR_EVENTS"),
                "INGEST_SYNTHESIZE_CORRIDOR_EVENTS",
                defaults.synthesize_corridor_events,
            ),
            geozones_file: get("INGEST_GEOZONES_FILE").map(PathBuf::from),
        };

        if config.future_date_max_sec < 0 {
            tracing::warn!(
                value = config.future_date_max_sec,
                "INGEST_FUTURE_DATE_MAX_SEC must not be negative, using default"
            );
            config.future_date_max_sec = defaults.future_date_max_sec;
        } else if config.future_date_max_sec > MAX_FUTURE_DATE_WINDOW_SEC {
            tracing::warn!(
                value = config.future_date_max_sec,
                max = MAX_FUTURE_DATE_WINDOW_SEC,
                "INGEST_FUTURE_DATE_MAX_SEC too large, clamping"
            );
            config.future_date_max_sec = MAX_FUTURE_DATE_WINDOW_SEC;
        }
        if !config.invalid_speed_max_kph.is_finite() || config.invalid_speed_max_kph < 0.0 {
            tracing::warn!(
                value = config.invalid_speed_max_kph,
                "INGEST_INVALID_SPEED_MAX_KPH must be a non-negative number, using default"
            );
            config.invalid_speed_max_kph = defaults.invalid_speed_max_kph;
        }
        if !config.max_odometer_km.is_finite() || config.max_odometer_km <= 0.0 {
            tracing::warn!(
                value = config.max_odometer_km,
                "INGEST_MAX_ODOMETER_KM must be a positive number, using default"
            );
            config.max_odometer_km = defaults.max_odometer_km;
        }
        if config.background_workers == 0 {
            tracing::warn!("INGEST_BACKGROUND_WORKERS must be positive, using 1");
            config.background_workers = 1;
        }
        if config.background_queue_size == 0 {
            tracing::warn!("INGEST_BACKGROUND_QUEUE_SIZE must be positive, using 1");
            config.background_queue_size = 1;
        }

        config
    }
}

/// Parse one configuration value.
pub fn parse_value<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
{
    raw.trim().parse().map_err(|_| ConfigError::Invalid {
        key,
        value: raw.to_string(),
    })
}

fn or_default<T>(raw: Option<String>, key: &'static str, default: T) -> T
where
    T: FromStr + std::fmt::Debug,
{
    let Some(raw) = raw else {
        return default;
    };
    match parse_value(key, &raw) {
        Ok(value) => value,
        Err(err) => {
            tracing::warn!(error = %err, default = ?default, "Using default configuration value");
            default
        }
    }
}

/// Parse a comma-separated list of status codes (`0xF020` or decimal).
fn parse_status_codes(raw: &str) -> Result<Vec<StatusCode>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
                Some(hex) => u32::from_str_radix(hex, 16),
                None => s.parse::<u32>(),
            };
            parsed.map(StatusCode).map_err(|_| ConfigError::Invalid {
                key: "INGEST_HIGH_PRIORITY_CODES",
                value: s.to_string(),
            })
        })
        .collect()
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}
