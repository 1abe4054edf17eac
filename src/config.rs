//! Environment-driven configuration with sensible defaults.

use std::env;
use std::path::PathBuf;

use tracing::{info, warn};
use url::Url;

use crate::collect::ColumnIndices;

#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP listen port (PORT, default 8080).
    pub port: u16,
    /// Trend document directory (TRENDS_DATA_DIR, default ./trends_data).
    pub data_dir: PathBuf,
    /// Base URL of the 15-minute GKG feed (GDELT_BASE_URL).
    pub gdelt_base_url: String,
    /// Base URL of the daily GKG rollups (GDELT_DAILY_BASE_URL).
    pub gdelt_daily_base_url: String,
    /// Realtime ingest interval in minutes (REALTIME_INTERVAL_MIN, default 15).
    pub realtime_interval_min: u64,
    /// UTC hour of the daily rollup job (DAILY_HOUR_UTC, default 0).
    pub daily_hour_utc: u32,
    /// Keyword list truncation (TOP_N, default 50).
    pub top_n: usize,
    /// Default GKG column positions (V2THEMES_INDEX and friends).
    pub columns: ColumnIndices,
    /// Read timeout for realtime/fallback fetches (FETCH_TIMEOUT_SECS, default 300).
    pub fetch_timeout_secs: u64,
    /// Per-file timeout on the daily rollup path (DAILY_FETCH_TIMEOUT_SECS, default 60).
    pub daily_fetch_timeout_secs: u64,
    /// In-flight fetches per backfill batch (MAX_PARALLEL_BACKFILL, default 8).
    pub max_parallel_backfill: usize,
    /// Cache entry capacity (CACHE_CAPACITY, default 1024).
    pub cache_capacity: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: 8080,
            data_dir: PathBuf::from("./trends_data"),
            gdelt_base_url: "http://data.gdeltproject.org/gdeltv2".to_string(),
            gdelt_daily_base_url: "http://data.gdeltproject.org/gkg".to_string(),
            realtime_interval_min: 15,
            daily_hour_utc: 0,
            top_n: 50,
            columns: ColumnIndices::default(),
            fetch_timeout_secs: 300,
            daily_fetch_timeout_secs: 60,
            max_parallel_backfill: 8,
            cache_capacity: 1024,
        }
    }
}

impl Config {
    /// Load configuration from environment variables with defaults.
    pub fn from_env() -> Self {
        let mut config = Config::default();

        if let Ok(val) = env::var("PORT") {
            if let Ok(port) = val.parse() {
                config.port = port;
            }
        }
        if let Ok(val) = env::var("TRENDS_DATA_DIR") {
            config.data_dir = PathBuf::from(val);
        }
        if let Ok(val) = env::var("GDELT_BASE_URL") {
            config.gdelt_base_url = checked_url(val, &config.gdelt_base_url);
        }
        if let Ok(val) = env::var("GDELT_DAILY_BASE_URL") {
            config.gdelt_daily_base_url = checked_url(val, &config.gdelt_daily_base_url);
        }
        if let Ok(val) = env::var("REALTIME_INTERVAL_MIN") {
            if let Ok(n) = val.parse::<u64>() {
                config.realtime_interval_min = n.max(1);
            }
        }
        if let Ok(val) = env::var("DAILY_HOUR_UTC") {
            if let Ok(n) = val.parse::<u32>() {
                config.daily_hour_utc = n.min(23);
            }
        }
        if let Ok(val) = env::var("TOP_N") {
            if let Ok(n) = val.parse::<usize>() {
                config.top_n = n.max(1);
            }
        }
        if let Ok(val) = env::var("V2THEMES_INDEX") {
            if let Ok(n) = val.parse() {
                config.columns.themes = n;
            }
        }
        if let Ok(val) = env::var("V2PERSONS_INDEX") {
            if let Ok(n) = val.parse() {
                config.columns.persons = n;
            }
        }
        if let Ok(val) = env::var("V2ORGS_INDEX") {
            if let Ok(n) = val.parse() {
                config.columns.orgs = n;
            }
        }
        if let Ok(val) = env::var("DOCUMENTIDENTIFIER_INDEX") {
            if let Ok(n) = val.parse() {
                config.columns.document_identifier = n;
            }
        }
        if let Ok(val) = env::var("FETCH_TIMEOUT_SECS") {
            if let Ok(n) = val.parse::<u64>() {
                config.fetch_timeout_secs = n.max(1);
            }
        }
        if let Ok(val) = env::var("DAILY_FETCH_TIMEOUT_SECS") {
            if let Ok(n) = val.parse::<u64>() {
                config.daily_fetch_timeout_secs = n.max(1);
            }
        }
        if let Ok(val) = env::var("MAX_PARALLEL_BACKFILL") {
            if let Ok(n) = val.parse::<usize>() {
                config.max_parallel_backfill = n.max(1);
            }
        }
        if let Ok(val) = env::var("CACHE_CAPACITY") {
            if let Ok(n) = val.parse() {
                config.cache_capacity = n;
            }
        }

        config
    }

    /// Log the effective configuration at startup.
    pub fn log(&self) {
        info!("Configuration:");
        info!("   Port: {}", self.port);
        info!("   Data dir: {}", self.data_dir.display());
        info!("   GDELT 15-min base: {}", self.gdelt_base_url);
        info!("   GDELT daily base: {}", self.gdelt_daily_base_url);
        info!(
            "   Realtime interval: {}min, daily hour: {:02}:00 UTC",
            self.realtime_interval_min, self.daily_hour_utc
        );
        info!("   Top-N: {}", self.top_n);
        info!(
            "   Columns: themes={}, persons={}, orgs={}, document_identifier={}",
            self.columns.themes,
            self.columns.persons,
            self.columns.orgs,
            self.columns.document_identifier
        );
        info!(
            "   Timeouts: fetch={}s, daily={}s, backfill batch={}",
            self.fetch_timeout_secs, self.daily_fetch_timeout_secs, self.max_parallel_backfill
        );
    }
}

fn checked_url(candidate: String, fallback: &str) -> String {
    if Url::parse(&candidate).is_ok() {
        candidate
    } else {
        warn!("Ignoring malformed base URL - value={}", candidate);
        fallback.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.realtime_interval_min, 15);
        assert_eq!(config.top_n, 50);
        assert_eq!(config.columns, ColumnIndices::default());
    }

    #[test]
    fn env_overrides_apply() {
        // SAFETY: test-only env mutation; no other thread reads these vars
        // concurrently.
        unsafe {
            env::set_var("TOP_N", "25");
            env::set_var("V2THEMES_INDEX", "3");
            env::set_var("REALTIME_INTERVAL_MIN", "30");
        }

        let config = Config::from_env();
        assert_eq!(config.top_n, 25);
        assert_eq!(config.columns.themes, 3);
        assert_eq!(config.realtime_interval_min, 30);

        // SAFETY: same as above.
        unsafe {
            env::remove_var("TOP_N");
            env::remove_var("V2THEMES_INDEX");
            env::remove_var("REALTIME_INTERVAL_MIN");
        }
    }

    #[test]
    fn malformed_base_url_falls_back() {
        // SAFETY: test-only env mutation; no other thread reads this var
        // concurrently.
        unsafe {
            env::set_var("GDELT_BASE_URL", "not a url");
        }
        let config = Config::from_env();
        assert_eq!(config.gdelt_base_url, Config::default().gdelt_base_url);
        // SAFETY: same as above.
        unsafe {
            env::remove_var("GDELT_BASE_URL");
        }
    }
}
