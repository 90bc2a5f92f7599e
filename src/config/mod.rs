//! Configuration system for Pacer.
//!
//! Two layers:
//! 1. Global config file (~/.config/pacer/pacer.yml or .pacer.yml), loosely typed
//!    with per-field defaults
//! 2. [`MonitorConfig`], the fully resolved view the capacity functions consume,
//!    re-read from a [`ConfigSource`] on every tick

pub use self::global::{
    CapacityMonitorConfig, DaemonConfig, GlobalConfig, LimitsConfig, TimeBasedUsageConfig, UsageConfig,
};
pub use self::monitor::{ConfigSource, FileConfigSource, MonitorConfig, SharedConfig};

mod global;
mod monitor;

/// Load the global configuration from the standard search paths.
///
/// Search order:
/// 1. Explicit path if provided
/// 2. .pacer.yml in current directory (project config)
/// 3. ~/.config/pacer/pacer.yml (user config)
/// 4. Default values
pub fn load_config(explicit_path: Option<&std::path::PathBuf>) -> eyre::Result<GlobalConfig> {
    GlobalConfig::load(explicit_path)
}
