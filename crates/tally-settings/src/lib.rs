//! # tally-settings
//!
//! Configuration for the tally server, loaded from three layers (in priority
//! order):
//! 1. **Compiled defaults**: [`TallySettings::default()`]
//! 2. **Settings file**: `~/.tally/settings.json` or an explicit path
//!    (deep-merged over defaults)
//! 3. **Environment variables**: `PORT`, `PG_*` and `TALLY_*` overrides
//!
//! # Usage
//!
//! ```no_run
//! let loaded = tally_settings::load_settings().unwrap_or_default();
//! let settings = loaded.settings;
//! println!("listening on port {}", settings.server.port);
//! ```

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{RejectedOverride, Result, SettingsError};
pub use loader::{
    LoadedSettings, apply_env_overrides, deep_merge, load_settings, load_settings_from_path,
    load_with_env, settings_path,
};
pub use types::*;
