//! Process-wide configuration, loaded once from the environment at
//! startup and shared read-only via `Arc<Config>` in `AppContext`.
//!
//! Required variables panic via `.expect()` on startup (there is no
//! sensible default for a broker or database URL); everything else parses
//! with a typed default matching §6 of the external-interfaces surface.

use std::env;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u16(key: &str, default: u16) -> u16 {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub enabled: bool,
    pub batch_size: usize,
    pub flush_interval: Duration,
    pub write_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct StalenessThresholds {
    pub temp_hum: Duration,
    pub rfid: Duration,
}

#[derive(Debug, Clone)]
pub struct SmartHeartbeatConfig {
    pub enabled: bool,
    pub stagger_delay: Duration,
    pub staleness_thresholds: StalenessThresholds,
}

#[derive(Debug, Clone)]
pub struct NormalizerConfig {
    pub smart_heartbeat: SmartHeartbeatConfig,
    pub heartbeat_timeout: Duration,
    pub check_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct ApiFeatures {
    pub management: bool,
    pub history: bool,
}

#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    pub port: u16,
    pub features: ApiFeatures,
}

#[derive(Debug, Clone)]
pub struct PushStreamConfig {
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct DebugConfig {
    pub log_raw_frame: bool,
    pub log_decoded: bool,
    pub log_normalized: bool,
    pub log_shadow: bool,
    pub log_db: bool,
}

#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub url: String,
    pub client_id: String,
    pub family_b_topic_root: String,
    pub family_j_topic_root: String,
}

/// Top-level configuration. Every field is recognized per the external
/// interfaces list; `GET /api/config` serializes a redacted copy of this.
#[derive(Debug, Clone)]
pub struct Config {
    pub environment: String,
    pub rust_log: String,
    pub broker: BrokerConfig,
    pub database_url: String,
    pub db_pool_size: u32,
    pub storage: StorageConfig,
    pub normalizer: NormalizerConfig,
    pub api_server: ApiServerConfig,
    pub push_stream: PushStreamConfig,
    pub debug: DebugConfig,
}

impl Config {
    /// Loads configuration from the environment, pulling in a `.env` file
    /// first if one is present (development convenience only).
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let broker_url = env::var("BROKER_URL").expect("BROKER_URL must be set");

        Self {
            environment: env_string("ENVIRONMENT", "development"),
            rust_log: env_string("RUST_LOG", "info"),
            broker: BrokerConfig {
                url: broker_url,
                client_id: env_string("BROKER_CLIENT_ID", "racksense-middleware"),
                family_b_topic_root: env_string("BROKER_FAMILY_B_TOPIC_ROOT", "B"),
                family_j_topic_root: env_string("BROKER_FAMILY_J_TOPIC_ROOT", "J"),
            },
            database_url,
            db_pool_size: env_u32("DB_POOL_SIZE", 10),
            storage: StorageConfig {
                enabled: env_bool("STORAGE_ENABLED", true),
                batch_size: env_u64("STORAGE_BATCH_SIZE", 100) as usize,
                flush_interval: Duration::from_millis(env_u64("STORAGE_FLUSH_INTERVAL_MS", 1_000)),
                write_timeout: Duration::from_millis(env_u64("STORAGE_WRITE_TIMEOUT_MS", 5_000)),
            },
            normalizer: NormalizerConfig {
                smart_heartbeat: SmartHeartbeatConfig {
                    enabled: env_bool("NORMALIZER_SMART_HEARTBEAT_ENABLED", true),
                    stagger_delay: Duration::from_millis(env_u64(
                        "NORMALIZER_SMART_HEARTBEAT_STAGGER_DELAY_MS",
                        500,
                    )),
                    staleness_thresholds: StalenessThresholds {
                        temp_hum: Duration::from_secs(env_u64(
                            "NORMALIZER_STALENESS_TEMP_HUM_SECS",
                            5 * 60,
                        )),
                        rfid: Duration::from_secs(env_u64("NORMALIZER_STALENESS_RFID_SECS", 60 * 60)),
                    },
                },
                heartbeat_timeout: Duration::from_secs(env_u64("NORMALIZER_HEARTBEAT_TIMEOUT_SECS", 120)),
                check_interval: Duration::from_secs(env_u64("NORMALIZER_CHECK_INTERVAL_SECS", 30)),
            },
            api_server: ApiServerConfig {
                port: env_u16("API_SERVER_PORT", 8080),
                features: ApiFeatures {
                    management: env_bool("API_SERVER_FEATURES_MANAGEMENT", true),
                    history: env_bool("API_SERVER_FEATURES_HISTORY", true),
                },
            },
            push_stream: PushStreamConfig { port: env_u16("PUSH_STREAM_PORT", 8081) },
            debug: DebugConfig {
                log_raw_frame: env_bool("DEBUG_LOG_RAW_FRAME", false),
                log_decoded: env_bool("DEBUG_LOG_DECODED", false),
                log_normalized: env_bool("DEBUG_LOG_NORMALIZED", false),
                log_shadow: env_bool("DEBUG_LOG_SHADOW", false),
                log_db: env_bool("DEBUG_LOG_DB", false),
            },
        }
    }
}

/// Builds the warmup controller's config shape from the loaded `Config`,
/// so the normalizer doesn't need to know about env vars at all.
impl From<&Config> for crate::warmup::domain::WarmupConfig {
    fn from(config: &Config) -> Self {
        Self {
            enabled: config.normalizer.smart_heartbeat.enabled,
            stagger_delay: config.normalizer.smart_heartbeat.stagger_delay,
            temp_hum_staleness: chrono::Duration::from_std(
                config.normalizer.smart_heartbeat.staleness_thresholds.temp_hum,
            )
            .unwrap_or(chrono::Duration::minutes(5)),
            rfid_staleness: chrono::Duration::from_std(
                config.normalizer.smart_heartbeat.staleness_thresholds.rfid,
            )
            .unwrap_or(chrono::Duration::hours(1)),
        }
    }
}

/// Initializes the global `tracing` subscriber: structured JSON in
/// production (so log aggregators downstream get parseable records),
/// pretty-printed console output in every other environment.
pub fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.rust_log).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.environment == "production" {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).pretty().init();
    }
}
