//! `[scripts]` and `[watch]` section configuration.

use super::defaults;
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// `[scripts]` section in site.toml - hook scripts and sandbox limits.
///
/// # Example
/// ```toml
/// [scripts]
/// pre_generate = "hooks/pre-generate.rhai"
/// watchdog_ms = 5000
/// max_operations = 1000000
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(default, deny_unknown_fields)]
pub struct ScriptsConfig {
    /// Runs once before page generation; its `global` response replaces
    /// the global data snapshot. Skipped when the file does not exist.
    #[serde(default = "defaults::scripts::pre_generate")]
    #[educe(Default = defaults::scripts::pre_generate())]
    pub pre_generate: PathBuf,

    /// Runs once after every page of a run has settled.
    #[serde(default = "defaults::scripts::post_generate")]
    #[educe(Default = defaults::scripts::post_generate())]
    pub post_generate: PathBuf,

    /// Interval of the stall warning while a script has not resolved.
    #[serde(default = "defaults::scripts::watchdog_ms")]
    #[educe(Default = defaults::scripts::watchdog_ms())]
    pub watchdog_ms: u64,

    /// Operation limit per script invocation (0 = unlimited).
    #[serde(default = "defaults::scripts::max_operations")]
    #[educe(Default = defaults::scripts::max_operations())]
    pub max_operations: u64,
}

impl ScriptsConfig {
    pub const fn watchdog(&self) -> Duration {
        Duration::from_millis(self.watchdog_ms)
    }
}

/// `[watch]` section in site.toml.
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(default, deny_unknown_fields)]
pub struct WatchConfig {
    /// Quiet period before accumulated changes are applied as one batch.
    #[serde(default = "defaults::watch::debounce_ms")]
    #[educe(Default = defaults::watch::debounce_ms())]
    pub debounce_ms: u64,
}

impl WatchConfig {
    pub const fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::super::SiteConfig;
    use std::time::Duration;

    #[test]
    fn test_scripts_config() {
        let config: SiteConfig = toml::from_str(
            r#"
            [scripts]
            pre_generate = "scripts/global.rhai"
            watchdog_ms = 500

            [watch]
            debounce_ms = 50
            "#,
        )
        .unwrap();

        assert_eq!(
            config.scripts.pre_generate,
            std::path::PathBuf::from("scripts/global.rhai")
        );
        assert_eq!(config.scripts.watchdog(), Duration::from_millis(500));
        assert_eq!(config.scripts.max_operations, 0);
        assert_eq!(config.watch.debounce(), Duration::from_millis(50));
    }
}
