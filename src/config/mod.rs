//! Layered configuration
//!
//! Settings are merged from four layers, later layers winning:
//! 1. Built-in defaults
//! 2. TOML file (`--config` or `DATA_BAITS_CONFIG`)
//! 3. Environment variables prefixed `DATA_BAITS_`
//! 4. CLI flags

mod defaults;
mod effective;
mod merge;
mod settings;

pub use defaults::BuiltinDefaults;
pub use effective::{
    env_layer, ConfigError, ConfigOrigin, ConfigSource, EffectiveConfig, CONFIG_PATH_ENV,
    ENV_PREFIX,
};
pub use merge::{deep_merge, merge_layers};
pub use settings::{DeletionPollSettings, Environment, RegistrySettings, Settings};
