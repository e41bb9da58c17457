// SPDX-FileCopyrightText: 2026 Labfold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Labfold research-data tool.
//!
//! Provides the shared error type used throughout the Labfold workspace.
//! Domain crates (labfold-vault, labfold-remote) build on top of this.

pub mod error;

pub use error::LabfoldError;
