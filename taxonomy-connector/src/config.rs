//! Runtime configuration resolution
//!
//! Vendor credentials and tuning values are resolved Database → ENV → TOML.
//! Verification thresholds additionally accept a command-line override
//! ahead of the database, and fall back to built-in defaults.

use crate::db::settings::{self, get_setting};
use crate::vendor::{VendorClient, VendorCredentials, VendorSettings};
use sqlx::{Pool, Sqlite};
use std::fmt::Display;
use std::str::FromStr;
use taxonomy_common::config::TomlConfig;
use taxonomy_common::{Error, Result};
use tracing::{info, warn};

pub const ENV_VENDOR_CLIENT_ID: &str = "TAXONOMY_VENDOR_CLIENT_ID";
pub const ENV_VENDOR_CLIENT_SECRET: &str = "TAXONOMY_VENDOR_CLIENT_SECRET";
pub const ENV_TOKEN_EXPIRY_THRESHOLD: &str = "ACCESS_TOKEN_EXPIRY_THRESHOLD_IN_SECONDS";
pub const ENV_MIN_VOTES_FOR_SKILLS: &str = "MIN_VOTES_FOR_SKILLS";
pub const ENV_RATIO_THRESHOLD_FOR_SKILLS: &str = "RATIO_THRESHOLD_FOR_SKILLS";
pub const ENV_API_THROTTLE_PER_MINUTE: &str = "TAXONOMY_API_THROTTLE_PER_MINUTE";

pub const DEFAULT_MIN_VOTES_FOR_SKILLS: i64 = 10;
pub const DEFAULT_RATIO_THRESHOLD_FOR_SKILLS: f64 = 0.7;

/// Validate a credential (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

fn env_value<T>(var: &str) -> Option<T>
where
    T: FromStr,
    T::Err: Display,
{
    let raw = std::env::var(var).ok()?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Ignoring {}={:?}: {}", var, raw, e);
            None
        }
    }
}

/// First of Database → ENV → TOML that holds a value
async fn resolve_value<T>(
    db: &Pool<Sqlite>,
    key: &str,
    env_var: &str,
    toml_value: Option<T>,
) -> Result<Option<(T, &'static str)>>
where
    T: FromStr,
    T::Err: Display,
{
    if let Some(value) = get_setting::<T>(db, key).await? {
        return Ok(Some((value, "database")));
    }
    if let Some(value) = env_value::<T>(env_var) {
        return Ok(Some((value, "environment")));
    }
    Ok(toml_value.map(|value| (value, "TOML")))
}

async fn resolve_secret(
    db: &Pool<Sqlite>,
    key: &str,
    env_var: &str,
    toml_value: Option<&String>,
) -> Result<Option<String>> {
    let db_value = get_setting::<String>(db, key).await?.filter(|v| is_valid_key(v));
    let env_value = std::env::var(env_var).ok().filter(|v| is_valid_key(v));
    let toml_value = toml_value.filter(|v| is_valid_key(v)).cloned();

    let sources: Vec<&str> = [
        db_value.as_ref().map(|_| "database"),
        env_value.as_ref().map(|_| "environment"),
        toml_value.as_ref().map(|_| "TOML"),
    ]
    .into_iter()
    .flatten()
    .collect();

    if sources.len() > 1 {
        warn!(
            "{} found in multiple sources: {}. Using {} (highest priority).",
            key,
            sources.join(", "),
            sources[0]
        );
    }
    if let Some(source) = sources.first() {
        info!("{} loaded from {}", key, source);
    }

    Ok(db_value.or(env_value).or(toml_value))
}

/// Resolve vendor OAuth client credentials
///
/// Missing credentials are a configuration error: every vendor-backed
/// command aborts instead of skipping items one by one.
pub async fn resolve_vendor_credentials(
    db: &Pool<Sqlite>,
    toml_config: &TomlConfig,
) -> Result<VendorCredentials> {
    let client_id = resolve_secret(
        db,
        settings::VENDOR_CLIENT_ID,
        ENV_VENDOR_CLIENT_ID,
        toml_config.vendor.client_id.as_ref(),
    )
    .await?;
    let client_secret = resolve_secret(
        db,
        settings::VENDOR_CLIENT_SECRET,
        ENV_VENDOR_CLIENT_SECRET,
        toml_config.vendor.client_secret.as_ref(),
    )
    .await?;

    match (client_id, client_secret) {
        (Some(client_id), Some(client_secret)) => Ok(VendorCredentials {
            client_id,
            client_secret,
        }),
        _ => Err(Error::Config(format!(
            "Vendor client credentials not configured. Please configure using one of:\n\
             1. Settings table: {} / {}\n\
             2. Environment: {} / {}\n\
             3. TOML config: [vendor] client_id / client_secret",
            settings::VENDOR_CLIENT_ID,
            settings::VENDOR_CLIENT_SECRET,
            ENV_VENDOR_CLIENT_ID,
            ENV_VENDOR_CLIENT_SECRET,
        ))),
    }
}

/// Seconds before expiry at which a cached token is treated as stale
pub async fn resolve_token_expiry_threshold(
    db: &Pool<Sqlite>,
    toml_config: &TomlConfig,
) -> Result<i64> {
    let resolved = resolve_value(
        db,
        settings::TOKEN_EXPIRY_THRESHOLD,
        ENV_TOKEN_EXPIRY_THRESHOLD,
        Some(toml_config.vendor.access_token_expiry_threshold_in_seconds),
    )
    .await?;

    Ok(resolved
        .map(|(v, _)| v)
        .unwrap_or(toml_config.vendor.access_token_expiry_threshold_in_seconds))
}

/// Requests per minute per API client
pub async fn resolve_throttle_per_minute(
    db: &Pool<Sqlite>,
    toml_config: &TomlConfig,
) -> Result<u32> {
    let resolved = resolve_value(
        db,
        settings::API_THROTTLE_PER_MINUTE,
        ENV_API_THROTTLE_PER_MINUTE,
        Some(toml_config.api.throttle_per_minute),
    )
    .await?;

    Ok(resolved.map(|(v, _)| v).unwrap_or(toml_config.api.throttle_per_minute))
}

/// Vendor client from resolved credentials and the `[vendor]` TOML section
pub async fn build_vendor_client(db: &Pool<Sqlite>, toml_config: &TomlConfig) -> Result<VendorClient> {
    let credentials = resolve_vendor_credentials(db, toml_config).await?;
    let mut vendor_settings = VendorSettings::from(&toml_config.vendor);
    vendor_settings.token_expiry_threshold_secs = resolve_token_expiry_threshold(db, toml_config).await?;

    VendorClient::new(vendor_settings, credentials)
        .map_err(|e| Error::Config(format!("Vendor client setup failed: {}", e)))
}

/// Vote thresholds applied by finalization
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VerificationThresholds {
    pub min_votes: i64,
    pub ratio_threshold: f64,
}

impl Default for VerificationThresholds {
    fn default() -> Self {
        Self {
            min_votes: DEFAULT_MIN_VOTES_FOR_SKILLS,
            ratio_threshold: DEFAULT_RATIO_THRESHOLD_FOR_SKILLS,
        }
    }
}

/// Resolve thresholds: CLI → Database → ENV → TOML → defaults
pub async fn resolve_verification_thresholds(
    db: &Pool<Sqlite>,
    toml_config: &TomlConfig,
    cli_min_votes: Option<i64>,
    cli_ratio_threshold: Option<f64>,
) -> Result<VerificationThresholds> {
    let min_votes = match cli_min_votes {
        Some(v) => v,
        None => resolve_value(
            db,
            settings::MIN_VOTES_FOR_SKILLS,
            ENV_MIN_VOTES_FOR_SKILLS,
            toml_config.verification.min_votes_for_skills,
        )
        .await?
        .map(|(v, _)| v)
        .unwrap_or(DEFAULT_MIN_VOTES_FOR_SKILLS),
    };

    let ratio_threshold = match cli_ratio_threshold {
        Some(v) => v,
        None => resolve_value(
            db,
            settings::RATIO_THRESHOLD_FOR_SKILLS,
            ENV_RATIO_THRESHOLD_FOR_SKILLS,
            toml_config.verification.ratio_threshold_for_skills,
        )
        .await?
        .map(|(v, _)| v)
        .unwrap_or(DEFAULT_RATIO_THRESHOLD_FOR_SKILLS),
    };

    if min_votes < 1 {
        return Err(Error::InvalidInput(format!("min votes must be at least 1, got {}", min_votes)));
    }
    if !(0.0..=1.0).contains(&ratio_threshold) {
        return Err(Error::InvalidInput(format!(
            "ratio threshold must be within 0.0..=1.0, got {}",
            ratio_threshold
        )));
    }

    Ok(VerificationThresholds {
        min_votes,
        ratio_threshold,
    })
}
