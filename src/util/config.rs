use anyhow::Result;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    pub poll_interval_secs: u64,
    pub poll_fetch_limit: usize,
    pub materialized_key_cap: usize,
    pub fingerprint_cap: usize,
    pub overlay_feed_cap: usize,
    pub toast_ttl_ms: i64,
    pub reminder_toast_ttl_ms: i64,
    pub dispatch_tick_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 30,
            poll_fetch_limit: 20,
            materialized_key_cap: 100,
            fingerprint_cap: 100,
            overlay_feed_cap: 50,
            toast_ttl_ms: 5_000,
            reminder_toast_ttl_ms: 10_000,
            dispatch_tick_ms: 250,
        }
    }
}

impl EngineConfig {
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder()
            .set_default("poll_interval_secs", 30)?
            .set_default("poll_fetch_limit", 20)?
            .set_default("materialized_key_cap", 100)?
            .set_default("fingerprint_cap", 100)?
            .set_default("overlay_feed_cap", 50)?
            .set_default("toast_ttl_ms", 5_000)?
            .set_default("reminder_toast_ttl_ms", 10_000)?
            .set_default("dispatch_tick_ms", 250)?;

        if let Some(path) = config_path {
            if path.exists() {
                builder = builder.add_source(File::from(path.to_path_buf()));
            }
        }

        // Allow environment variables to override config
        builder = builder.add_source(Environment::with_prefix("CLINIC_NOTIFY"));

        let config = builder.build()?;
        let engine_config: EngineConfig = config.try_deserialize()?;

        Ok(engine_config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_builder_defaults() {
        let loaded = EngineConfig::load(None).unwrap();
        let defaults = EngineConfig::default();
        assert_eq!(loaded.poll_interval_secs, defaults.poll_interval_secs);
        assert_eq!(loaded.overlay_feed_cap, defaults.overlay_feed_cap);
        assert_eq!(loaded.toast_ttl_ms, defaults.toast_ttl_ms);
        assert_eq!(loaded.reminder_toast_ttl_ms, defaults.reminder_toast_ttl_ms);
    }
}
