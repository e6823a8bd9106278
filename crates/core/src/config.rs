use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub binance: BinanceConfig,
    pub ingestion: IngestionConfig,
    pub resampler: ResamplerConfig,
    pub analytics: AnalyticsConfig,
    pub alerts: AlertsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinanceConfig {
    pub ws_url: String,
    pub rest_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionConfig {
    /// Symbols to subscribe to on the trade stream.
    pub symbols: Vec<String>,
    /// Buffer size that forces a synchronous flush.
    pub buffer_size: usize,
    /// Seconds between timed buffer flushes.
    pub flush_interval_secs: u64,
    /// Base delay for reconnect backoff, in seconds.
    pub reconnect_base_delay_secs: u64,
    /// Cap applied to the reconnect backoff, in seconds.
    pub reconnect_max_delay_secs: u64,
    /// Reconnect attempts before the stream is considered dead.
    pub max_reconnect_attempts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResamplerConfig {
    /// Timeframe strings to resample into (e.g. "1s", "1m", "5m").
    pub timeframes: Vec<String>,
    /// Seconds between resampling runs.
    pub interval_secs: u64,
    /// How far back each run re-reads ticks, in seconds. Overlapping runs
    /// are safe because bar writes are idempotent upserts.
    pub lookback_secs: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    /// Default rolling window for z-score and rolling correlation.
    pub default_rolling_window: usize,
    /// Upper bound on any requested rolling window.
    pub max_rolling_window: usize,
    /// Minimum aligned points required before a pair is analyzed.
    pub min_aligned_points: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertsConfig {
    /// Seconds between alert evaluation sweeps.
    pub check_interval_secs: u64,
    /// Bars fetched per symbol for each rule evaluation.
    pub bar_fetch_limit: i64,
    /// Per-channel notification dispatch timeout, in seconds.
    pub notify_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "postgresql://localhost/pairwatch".to_string(),
                max_connections: 10,
            },
            binance: BinanceConfig {
                ws_url: "wss://stream.binance.com:9443".to_string(),
                rest_url: "https://api.binance.com/api/v3".to_string(),
            },
            ingestion: IngestionConfig {
                symbols: vec![
                    "BTCUSDT".to_string(),
                    "ETHUSDT".to_string(),
                    "BNBUSDT".to_string(),
                ],
                buffer_size: 1000,
                flush_interval_secs: 1,
                reconnect_base_delay_secs: 1,
                reconnect_max_delay_secs: 60,
                max_reconnect_attempts: 10,
            },
            resampler: ResamplerConfig {
                timeframes: vec!["1s".to_string(), "1m".to_string(), "5m".to_string()],
                interval_secs: 60,
                lookback_secs: 300,
            },
            analytics: AnalyticsConfig {
                default_rolling_window: 20,
                max_rolling_window: 200,
                min_aligned_points: 20,
            },
            alerts: AlertsConfig {
                check_interval_secs: 60,
                bar_fetch_limit: 100,
                notify_timeout_secs: 10,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_sane() {
        let config = AppConfig::default();

        assert!(config.ingestion.buffer_size > 0);
        assert!(!config.ingestion.symbols.is_empty());
        assert!(config.analytics.default_rolling_window <= config.analytics.max_rolling_window);
        assert!(config.alerts.notify_timeout_secs > 0);
    }

    #[test]
    fn test_default_timeframes_parse() {
        let config = AppConfig::default();
        for tf in &config.resampler.timeframes {
            assert!(tf.parse::<crate::Timeframe>().is_ok(), "bad timeframe {tf}");
        }
    }

    #[test]
    fn test_config_roundtrips_through_json() {
        let config = AppConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: AppConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(back.database.url, config.database.url);
        assert_eq!(back.ingestion.symbols, config.ingestion.symbols);
        assert_eq!(back.alerts.check_interval_secs, config.alerts.check_interval_secs);
    }
}
