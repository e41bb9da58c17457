// SPDX-FileCopyrightText: 2026 Labfold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration system for the Labfold research-data tool.
//!
//! TOML config files merged through Figment with environment variable
//! overrides. See [`loader::load_config`] for the merge order.

pub mod loader;
pub mod model;

pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::{format_base_url, LabfoldConfig, RemoteConfig, VaultConfig};
