// Copyright 2026 The Chatrelay Project
// SPDX-License-Identifier: Apache-2.0

// Process configuration.
//
// Values come from the environment (after an optional `.env` file has been
// loaded by the binary). Everything is read once at startup into `Config`.

mod defaults;
mod error;
mod loader;
mod source;
mod types;

pub use defaults::{API_KEY_VAR, DEFAULT_MODEL, DEFAULT_UPSTREAM_URL};
pub use error::ConfigError;
pub use loader::load_config;
pub use source::{ConfigSource, EnvSource, MapSource};
pub use types::Config;
