// Copyright 2026 The Chatrelay Project
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use super::defaults::*;
use super::error::ConfigError;
use super::source::ConfigSource;
use super::types::Config;

/// Load and validate the relay config from the given source.
///
/// Only malformed values are errors. A missing credential is accepted here
/// and reported per request, so the process still starts without one.
pub fn load_config(source: &dyn ConfigSource) -> Result<Config, ConfigError> {
    let idle_timeout = duration_secs(source, IDLE_TIMEOUT_VAR, DEFAULT_IDLE_TIMEOUT_SECS)?;
    let session_timeout =
        duration_secs(source, SESSION_TIMEOUT_VAR, DEFAULT_SESSION_TIMEOUT_SECS)?;

    if session_timeout < idle_timeout {
        return Err(ConfigError::Validation(format!(
            "{SESSION_TIMEOUT_VAR} ({}s) must not be shorter than {IDLE_TIMEOUT_VAR} ({}s)",
            session_timeout.as_secs(),
            idle_timeout.as_secs()
        )));
    }

    let upstream_url = source
        .get(UPSTREAM_URL_VAR)
        .unwrap_or_else(|| DEFAULT_UPSTREAM_URL.to_string());
    if !(upstream_url.starts_with("http://") || upstream_url.starts_with("https://")) {
        return Err(ConfigError::Invalid {
            key: UPSTREAM_URL_VAR,
            value: upstream_url,
            reason: "expected an http:// or https:// URL".into(),
        });
    }

    let cors_origins = source
        .get(CORS_ORIGINS_VAR)
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default();

    Ok(Config {
        api_key: source.get(API_KEY_VAR).map(|k| k.trim().to_string()),
        upstream_url,
        model: source
            .get(MODEL_VAR)
            .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        redis_url: source.get(REDIS_URL_VAR),
        cache_ttl: duration_secs(source, CACHE_TTL_VAR, DEFAULT_CACHE_TTL_SECS)?,
        connect_timeout: duration_secs(source, CONNECT_TIMEOUT_VAR, DEFAULT_CONNECT_TIMEOUT_SECS)?,
        idle_timeout,
        session_timeout,
        cors_origins,
    })
}

/// Parse a positive number of seconds, falling back to `default` when unset.
fn duration_secs(
    source: &dyn ConfigSource,
    key: &'static str,
    default: u64,
) -> Result<Duration, ConfigError> {
    let Some(raw) = source.get(key) else {
        return Ok(Duration::from_secs(default));
    };
    let secs: u64 = raw.trim().parse().map_err(|e: std::num::ParseIntError| {
        ConfigError::Invalid {
            key,
            value: raw.clone(),
            reason: e.to_string(),
        }
    })?;
    if secs == 0 {
        return Err(ConfigError::Invalid {
            key,
            value: raw,
            reason: "must be greater than zero".into(),
        });
    }
    Ok(Duration::from_secs(secs))
}
