// SPDX-License-Identifier: Apache-2.0
//! Configuration storage port and the typed settings the working-copy
//! engine consults: commit-time mtimes, the external three-way merge
//! command, preserved conflict-file extensions, and auto-unlock on commit.
#![deny(missing_docs, rust_2018_idioms, unused_must_use)]
#![deny(unsafe_code)]

mod config;
mod fs;
mod settings;

pub use config::{ConfigError, ConfigService, ConfigStore};
pub use fs::FsConfigStore;
pub use settings::{WcSettings, SETTINGS_KEY};
