//! Settings database operations
//!
//! Key-value accessors for the `settings` table. Values stored here take
//! priority over environment variables and the TOML file.

use sqlx::{Pool, Sqlite};
use taxonomy_common::{Error, Result};

pub const VENDOR_CLIENT_ID: &str = "vendor_client_id";
pub const VENDOR_CLIENT_SECRET: &str = "vendor_client_secret";
pub const TOKEN_EXPIRY_THRESHOLD: &str = "access_token_expiry_threshold_in_seconds";
pub const MIN_VOTES_FOR_SKILLS: &str = "min_votes_for_skills";
pub const RATIO_THRESHOLD_FOR_SKILLS: &str = "ratio_threshold_for_skills";
pub const API_THROTTLE_PER_MINUTE: &str = "taxonomy_api_throttle_per_minute";

/// Read and parse a setting; `None` when the key is absent or NULL
pub async fn get_setting<T>(db: &Pool<Sqlite>, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let row: Option<(Option<String>,)> = sqlx::query_as("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(db)
        .await
        .map_err(Error::Database)?;

    match row {
        Some((Some(value),)) => {
            let parsed = value
                .trim()
                .parse::<T>()
                .map_err(|e| Error::Config(format!("Parse setting {} failed: {}", key, e)))?;
            Ok(Some(parsed))
        }
        _ => Ok(None),
    }
}

pub async fn set_setting<T>(db: &Pool<Sqlite>, key: &str, value: T) -> Result<()>
where
    T: std::fmt::Display,
{
    sqlx::query(
        "INSERT INTO settings (key, value) VALUES (?, ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP",
    )
    .bind(key)
    .bind(value.to_string())
    .execute(db)
    .await
    .map_err(Error::Database)?;

    Ok(())
}
