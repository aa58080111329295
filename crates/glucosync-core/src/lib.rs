pub mod app_config;
pub mod config;
pub mod dedup;
pub mod error;
pub mod intervals;
pub mod measurement;

pub use app_config::{
    AppConfig, DEFAULT_API_URL, DEFAULT_ASSUME_TZ, DEFAULT_BATCH_SIZE, MAX_BATCH_SIZE,
};
pub use config::{load_app_config, load_app_config_from_env};
pub use dedup::{dedupe_by_minute, merge_feeds};
pub use error::ConfigError;
pub use intervals::{interval_stats, IntervalStats};
pub use measurement::{minute_bucket, FeedSource, Measurement, HI_VALUE, MINUTE_MS};
