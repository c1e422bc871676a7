// Copyright 2026 The Chatrelay Project
// SPDX-License-Identifier: Apache-2.0

pub mod cache;
pub mod config;
pub mod proxy;
pub mod stream;
pub mod upstream;
