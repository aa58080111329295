use chrono_tz::Tz;

use crate::app_config::{
    AppConfig, DEFAULT_API_URL, DEFAULT_ASSUME_TZ, DEFAULT_BATCH_SIZE, MAX_BATCH_SIZE,
};
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Blank values are treated exactly like absent ones: a blank required
/// variable is missing, a blank optional variable takes its default.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    let present = |var: &str| -> Option<String> {
        lookup(var)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    let require = |var: &str| -> Result<String, ConfigError> {
        present(var).ok_or_else(|| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default =
        |var: &str, default: &str| -> String { present(var).unwrap_or_else(|| default.to_string()) };

    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
    };

    let parse_i64 = |var: &str, default: &str| -> Result<i64, ConfigError> {
        or_default(var, default)
            .parse::<i64>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        or_default(var, default)
            .parse::<u32>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        or_default(var, default)
            .parse::<u64>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_usize = |var: &str, default: &str| -> Result<usize, ConfigError> {
        or_default(var, default)
            .parse::<usize>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let librelink_email = require("LIBRELINK_EMAIL")?;
    let librelink_password = require("LIBRELINK_PASSWORD")?;
    let firebase_service_account = require("FIREBASE_SERVICE_ACCOUNT")?;

    let librelink_api_url = or_default("LIBRELINK_API_URL", DEFAULT_API_URL);
    let librelink_patient_id = present("LIBRELINK_PATIENT_ID");
    let librelink_patient_index = parse_i64("LIBRELINK_PATIENT_INDEX", "0")?;
    let assume_tz = parse_timezone(&or_default("LIBRELINK_ASSUME_TZ", DEFAULT_ASSUME_TZ))?;
    let debug_intervals = present("DEBUG_INTERVALS").as_deref() == Some("1");

    let librelink_client_version = or_default("LIBRELINK_CLIENT_VERSION", "4.12.0");
    let librelink_request_timeout_secs = parse_u64("LIBRELINK_REQUEST_TIMEOUT_SECS", "30")?;
    let librelink_max_retries = parse_u32("LIBRELINK_MAX_RETRIES", "2")?;

    let firestore_collection = or_default("FIRESTORE_COLLECTION", "glucose");
    let firestore_batch_size = parse_usize("FIRESTORE_BATCH_SIZE", &DEFAULT_BATCH_SIZE.to_string())?;
    if firestore_batch_size == 0 || firestore_batch_size > MAX_BATCH_SIZE {
        return Err(invalid(
            "FIRESTORE_BATCH_SIZE",
            format!("must be between 1 and {MAX_BATCH_SIZE}, got {firestore_batch_size}"),
        ));
    }
    let firestore_emulator_host = present("FIRESTORE_EMULATOR_HOST");

    let log_level = or_default("GLUCOSYNC_LOG_LEVEL", "info");

    Ok(AppConfig {
        librelink_email,
        librelink_password,
        firebase_service_account,
        librelink_api_url,
        librelink_patient_id,
        librelink_patient_index,
        assume_tz,
        debug_intervals,
        librelink_client_version,
        librelink_request_timeout_secs,
        librelink_max_retries,
        firestore_collection,
        firestore_batch_size,
        firestore_emulator_host,
        log_level,
    })
}

/// Parse an IANA zone name such as `Asia/Tokyo`.
fn parse_timezone(s: &str) -> Result<Tz, ConfigError> {
    s.parse::<Tz>().map_err(|e| ConfigError::InvalidEnvVar {
        var: "LIBRELINK_ASSUME_TZ".to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
