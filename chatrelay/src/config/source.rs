// Copyright 2026 The Chatrelay Project
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;

/// Abstraction over where configuration values come from.
///
/// `EnvSource` reads the process environment; `MapSource` provides values
/// directly (used in tests to avoid touching global state).
pub trait ConfigSource {
    /// Look up a key. Empty values count as unset.
    fn get(&self, key: &str) -> Option<String>;
}

/// Reads configuration from process environment variables.
pub struct EnvSource;

impl ConfigSource for EnvSource {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|v| !v.trim().is_empty())
    }
}

/// Provides configuration values from an in-memory map. Used for testing.
#[derive(Default)]
pub struct MapSource {
    pub values: HashMap<String, String>,
}

impl MapSource {
    pub fn new<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl ConfigSource for MapSource {
    fn get(&self, key: &str) -> Option<String> {
        self.values
            .get(key)
            .filter(|v| !v.trim().is_empty())
            .cloned()
    }
}
