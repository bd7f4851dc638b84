use std::env;
use std::str::FromStr;
use std::time::Duration;

use dotenvy::dotenv;

use crate::errors::{ConfigSnafu, CustomResult};
use crate::modules::exporter::DEFAULT_PUSH_POOL_SIZE;
use crate::modules::fpvscores_api::BASE_API_URL as BASE_MIRROR_URL;
use crate::modules::racesync_api::BASE_API_URL;

/// # Settings
/// runtime configuration read from the environment (and `.env`)
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub racesync_api_url: String,
    pub racesync_api_key: Option<String>,
    pub fpvscores_api_url: String,
    pub push_pool_size: usize,
    pub request_timeout: Duration,
    pub seat_count: usize,
}

fn parse_or<T: FromStr, F: Fn(&str) -> Option<String>>(lookup: &F, key: &str, default: T) -> CustomResult<T> {
    match lookup(key) {
        Some(value) => value.trim().parse::<T>().map_err(|_| {
            ConfigSnafu {
                key,
                message: format!("'{}' is not a valid number", value),
            }
            .build()
        }),
        None => Ok(default),
    }
}

impl Settings {
    /// # from env
    /// load `.env` when present and read the settings from the environment
    pub fn from_env() -> CustomResult<Settings> {
        dotenv().ok();
        Settings::from_lookup(|key| env::var(key).ok())
    }

    /// # from lookup
    /// read the settings through a key lookup, unset keys take their default
    ///
    /// ## Arguments
    /// * `lookup` - returns the raw value of a key
    ///
    /// ## Returns
    /// * `Settings` - the settings, or a config error for malformed values
    pub fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> CustomResult<Settings> {
        let push_pool_size = parse_or(&lookup, "PUSH_POOL_SIZE", DEFAULT_PUSH_POOL_SIZE)?;
        if push_pool_size == 0 {
            return ConfigSnafu {
                key: "PUSH_POOL_SIZE",
                message: "at least one concurrent push is required",
            }
            .fail();
        }

        Ok(Settings {
            racesync_api_url: lookup("RACESYNC_API_URL").unwrap_or_else(|| BASE_API_URL.to_string()),
            racesync_api_key: lookup("RACESYNC_API_KEY").filter(|api_key| !api_key.trim().is_empty()),
            fpvscores_api_url: lookup("FPVSCORES_API_URL").unwrap_or_else(|| BASE_MIRROR_URL.to_string()),
            push_pool_size,
            request_timeout: Duration::from_secs(parse_or(&lookup, "REQUEST_TIMEOUT_SECS", 5u64)?),
            seat_count: parse_or(&lookup, "SEAT_COUNT", 8usize)?,
        })
    }
}
