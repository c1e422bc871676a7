// Copyright 2026 The Chatrelay Project
// SPDX-License-Identifier: Apache-2.0

use std::fmt;
use std::time::Duration;

/// Fully validated runtime configuration.
#[derive(Clone)]
pub struct Config {
    /// Upstream bearer credential. `None` makes every chat request fail
    /// with a configuration error instead of preventing startup.
    pub api_key: Option<String>,
    pub upstream_url: String,
    pub model: String,
    /// Optional side-channel cache connection string.
    pub redis_url: Option<String>,
    pub cache_ttl: Duration,
    pub connect_timeout: Duration,
    pub idle_timeout: Duration,
    pub session_timeout: Duration,
    /// Allowed CORS origins. Empty means any origin.
    pub cors_origins: Vec<String>,
}

// Hand-written so the credential never lands in logs.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("upstream_url", &self.upstream_url)
            .field("model", &self.model)
            .field("redis_url", &self.redis_url.as_ref().map(|_| "<redacted>"))
            .field("cache_ttl", &self.cache_ttl)
            .field("connect_timeout", &self.connect_timeout)
            .field("idle_timeout", &self.idle_timeout)
            .field("session_timeout", &self.session_timeout)
            .field("cors_origins", &self.cors_origins)
            .finish()
    }
}
