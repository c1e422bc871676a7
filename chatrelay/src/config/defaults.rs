// Copyright 2026 The Chatrelay Project
// SPDX-License-Identifier: Apache-2.0

// Environment keys and their defaults.

pub const API_KEY_VAR: &str = "DEEPSEEK_API_KEY";
pub const REDIS_URL_VAR: &str = "REDIS_URL";
pub const UPSTREAM_URL_VAR: &str = "CHATRELAY_UPSTREAM_URL";
pub const MODEL_VAR: &str = "CHATRELAY_MODEL";
pub const CONNECT_TIMEOUT_VAR: &str = "CHATRELAY_CONNECT_TIMEOUT_SECS";
pub const IDLE_TIMEOUT_VAR: &str = "CHATRELAY_IDLE_TIMEOUT_SECS";
pub const SESSION_TIMEOUT_VAR: &str = "CHATRELAY_SESSION_TIMEOUT_SECS";
pub const CACHE_TTL_VAR: &str = "CHATRELAY_CACHE_TTL_SECS";
pub const CORS_ORIGINS_VAR: &str = "CHATRELAY_CORS_ORIGINS";

/// DeepSeek's OpenAI-compatible chat completions endpoint.
pub const DEFAULT_UPSTREAM_URL: &str = "https://api.deepseek.com/chat/completions";
pub const DEFAULT_MODEL: &str = "deepseek-chat";

pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_SESSION_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_CACHE_TTL_SECS: u64 = 3600;
