//! Configuration loading for the climb-sync pipeline.
//!
//! Loads layered `.env` files and environment variables prefixed with
//! `CLIMBSYNC_`, producing a typed [`AppConfig`].

use std::{collections::BTreeMap, env, path::PathBuf, str::FromStr, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

const ENV_PREFIX: &str = "CLIMBSYNC_";

/// Application configuration derived from `CLIMBSYNC_*` environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct AppConfig {
    #[serde(default = "default_profile")]
    pub profile: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: String,
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,
    #[serde(default = "default_db_acquire_timeout_ms")]
    pub db_acquire_timeout_ms: u64,
    #[serde(default = "default_kaya_api_base")]
    pub kaya_api_base: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kaya_api_token: Option<String>,
    #[serde(default = "default_kaya_request_timeout_ms")]
    pub kaya_request_timeout_ms: u64,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub progress: ProgressConfig,
    #[serde(default)]
    pub priority: PriorityConfig,
    #[serde(default)]
    pub matcher: MatcherConfig,
    #[serde(default)]
    pub job: JobConfig,
}

/// Location sync parameters used by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct SyncConfig {
    /// Items requested per page from the external platform (default: 20)
    ///
    /// Environment variable: `CLIMBSYNC_SYNC_PAGE_SIZE`
    #[serde(default = "default_sync_page_size")]
    pub page_size: u32,

    /// Upper bound on ascents fetched for a single location (default: 500)
    ///
    /// Environment variable: `CLIMBSYNC_SYNC_MAX_ASCENTS_PER_LOCATION`
    #[serde(default = "default_sync_max_ascents_per_location")]
    pub max_ascents_per_location: u32,

    /// How many levels of sub-locations a recursive sync descends (default: 1)
    ///
    /// Environment variable: `CLIMBSYNC_SYNC_MAX_DEPTH`
    #[serde(default = "default_sync_max_depth")]
    pub max_depth: u32,

    /// Hours until a synced location is next due (default: 24)
    ///
    /// Environment variable: `CLIMBSYNC_SYNC_RESYNC_INTERVAL_HOURS`
    #[serde(default = "default_sync_resync_interval_hours")]
    pub resync_interval_hours: u64,
}

/// Progress reporter throttling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct ProgressConfig {
    #[serde(default = "default_progress_batch_size")]
    pub batch_size: u32,
    #[serde(default = "default_progress_flush_interval_seconds")]
    pub flush_interval_seconds: u64,
}

/// Re-sync intervals per priority tier and the recompute cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct PriorityConfig {
    #[serde(default = "default_priority_high_interval_hours")]
    pub high_interval_hours: u64,
    #[serde(default = "default_priority_medium_interval_hours")]
    pub medium_interval_hours: u64,
    #[serde(default = "default_priority_low_interval_hours")]
    pub low_interval_hours: u64,
    #[serde(default = "default_priority_recompute_interval_seconds")]
    pub recompute_interval_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct MatcherConfig {
    /// Minimum confidence a pair needs before it is persisted (default: 0.6)
    #[serde(default = "default_matcher_min_confidence")]
    pub min_confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct JobConfig {
    /// Interrupted jobs older than this are not resumed automatically (default: 24)
    #[serde(default = "default_job_recovery_window_hours")]
    pub recovery_window_hours: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            profile: default_profile(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            database_url: default_database_url(),
            db_max_connections: default_db_max_connections(),
            db_acquire_timeout_ms: default_db_acquire_timeout_ms(),
            kaya_api_base: default_kaya_api_base(),
            kaya_api_token: None,
            kaya_request_timeout_ms: default_kaya_request_timeout_ms(),
            sync: SyncConfig::default(),
            progress: ProgressConfig::default(),
            priority: PriorityConfig::default(),
            matcher: MatcherConfig::default(),
            job: JobConfig::default(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            page_size: default_sync_page_size(),
            max_ascents_per_location: default_sync_max_ascents_per_location(),
            max_depth: default_sync_max_depth(),
            resync_interval_hours: default_sync_resync_interval_hours(),
        }
    }
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            batch_size: default_progress_batch_size(),
            flush_interval_seconds: default_progress_flush_interval_seconds(),
        }
    }
}

impl Default for PriorityConfig {
    fn default() -> Self {
        Self {
            high_interval_hours: default_priority_high_interval_hours(),
            medium_interval_hours: default_priority_medium_interval_hours(),
            low_interval_hours: default_priority_low_interval_hours(),
            recompute_interval_seconds: default_priority_recompute_interval_seconds(),
        }
    }
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            min_confidence: default_matcher_min_confidence(),
        }
    }
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            recovery_window_hours: default_job_recovery_window_hours(),
        }
    }
}

impl AppConfig {
    /// Returns a redacted JSON representation (secrets are redacted).
    pub fn redacted_json(&self) -> serde_json::Result<String> {
        let mut config = self.clone();
        if config.kaya_api_token.is_some() {
            config.kaya_api_token = Some("[REDACTED]".to_string());
        }
        serde_json::to_string_pretty(&config)
    }

    /// Request timeout for calls to the external platform.
    pub fn kaya_request_timeout(&self) -> Duration {
        Duration::from_millis(self.kaya_request_timeout_ms)
    }

    /// Validates the configuration, returning the first violation found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !matches!(self.log_format.as_str(), "json" | "pretty") {
            return Err(ConfigError::InvalidLogFormat {
                value: self.log_format.clone(),
            });
        }

        if self.db_max_connections == 0 {
            return Err(ConfigError::InvalidDbMaxConnections {
                value: self.db_max_connections,
            });
        }

        Url::parse(&self.kaya_api_base).map_err(|source| ConfigError::InvalidKayaApiBase {
            value: self.kaya_api_base.clone(),
            source,
        })?;

        if self.kaya_request_timeout_ms == 0 {
            return Err(ConfigError::InvalidKayaRequestTimeout {
                value: self.kaya_request_timeout_ms,
            });
        }

        self.sync.validate()?;
        self.progress.validate()?;
        self.priority.validate()?;
        self.matcher.validate()?;
        self.job.validate()?;

        Ok(())
    }
}

impl SyncConfig {
    /// Validate sync configuration bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size == 0 || self.page_size > 100 {
            return Err(ConfigError::InvalidSyncPageSize {
                value: self.page_size,
            });
        }

        if self.max_ascents_per_location == 0 {
            return Err(ConfigError::InvalidSyncMaxAscents {
                value: self.max_ascents_per_location,
            });
        }

        if self.max_depth > 5 {
            return Err(ConfigError::InvalidSyncMaxDepth {
                value: self.max_depth,
            });
        }

        if self.resync_interval_hours == 0 {
            return Err(ConfigError::InvalidSyncResyncInterval {
                value: self.resync_interval_hours,
            });
        }

        Ok(())
    }
}

impl ProgressConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::InvalidProgressBatchSize {
                value: self.batch_size,
            });
        }
        if self.flush_interval_seconds == 0 {
            return Err(ConfigError::InvalidProgressFlushInterval {
                value: self.flush_interval_seconds,
            });
        }
        Ok(())
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_seconds)
    }
}

impl PriorityConfig {
    /// Validate that tier intervals are positive and ordered high <= medium <= low.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.high_interval_hours == 0
            || self.high_interval_hours > self.medium_interval_hours
            || self.medium_interval_hours > self.low_interval_hours
        {
            return Err(ConfigError::InvalidPriorityIntervals {
                high: self.high_interval_hours,
                medium: self.medium_interval_hours,
                low: self.low_interval_hours,
            });
        }

        if self.recompute_interval_seconds < 60 {
            return Err(ConfigError::InvalidPriorityRecomputeInterval {
                value: self.recompute_interval_seconds,
            });
        }

        Ok(())
    }
}

impl MatcherConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(ConfigError::InvalidMatcherMinConfidence {
                value: self.min_confidence,
            });
        }
        Ok(())
    }
}

impl JobConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.recovery_window_hours == 0 {
            return Err(ConfigError::InvalidJobRecoveryWindow {
                value: self.recovery_window_hours,
            });
        }
        Ok(())
    }

    pub fn recovery_window(&self) -> chrono::Duration {
        chrono::Duration::hours(self.recovery_window_hours as i64)
    }
}

fn default_profile() -> String {
    "local".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_database_url() -> String {
    "postgresql://localhost:5432/climb_sync".to_string()
}

fn default_db_max_connections() -> u32 {
    10
}

fn default_db_acquire_timeout_ms() -> u64 {
    5000
}

fn default_kaya_api_base() -> String {
    "https://kaya-beta.kayaclimb.com".to_string()
}

fn default_kaya_request_timeout_ms() -> u64 {
    30_000
}

fn default_sync_page_size() -> u32 {
    20
}

fn default_sync_max_ascents_per_location() -> u32 {
    500
}

fn default_sync_max_depth() -> u32 {
    1
}

fn default_sync_resync_interval_hours() -> u64 {
    24
}

fn default_progress_batch_size() -> u32 {
    10
}

fn default_progress_flush_interval_seconds() -> u64 {
    5
}

fn default_priority_high_interval_hours() -> u64 {
    24
}

fn default_priority_medium_interval_hours() -> u64 {
    24 * 7
}

fn default_priority_low_interval_hours() -> u64 {
    24 * 30
}

fn default_priority_recompute_interval_seconds() -> u64 {
    6 * 60 * 60
}

fn default_matcher_min_confidence() -> f64 {
    0.6
}

fn default_job_recovery_window_hours() -> u64 {
    24
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load environment file {path}: {source}")]
    EnvFile {
        path: PathBuf,
        source: dotenvy::Error,
    },
    #[error("invalid value '{value}' for {key}")]
    InvalidValue { key: String, value: String },
    #[error("log format must be 'json' or 'pretty', got '{value}'")]
    InvalidLogFormat { value: String },
    #[error("database max connections must be positive, got {value}")]
    InvalidDbMaxConnections { value: u32 },
    #[error("invalid Kaya API base '{value}': {source}")]
    InvalidKayaApiBase {
        value: String,
        source: url::ParseError,
    },
    #[error("Kaya request timeout must be positive, got {value}")]
    InvalidKayaRequestTimeout { value: u64 },
    #[error("sync page size must be between 1 and 100, got {value}")]
    InvalidSyncPageSize { value: u32 },
    #[error("sync max ascents per location must be positive, got {value}")]
    InvalidSyncMaxAscents { value: u32 },
    #[error("sync max depth must be at most 5, got {value}")]
    InvalidSyncMaxDepth { value: u32 },
    #[error("sync re-sync interval must be positive, got {value}")]
    InvalidSyncResyncInterval { value: u64 },
    #[error("progress batch size must be positive, got {value}")]
    InvalidProgressBatchSize { value: u32 },
    #[error("progress flush interval must be positive, got {value}")]
    InvalidProgressFlushInterval { value: u64 },
    #[error(
        "priority intervals must be positive and ordered high <= medium <= low (high: {high}, medium: {medium}, low: {low})"
    )]
    InvalidPriorityIntervals { high: u64, medium: u64, low: u64 },
    #[error("priority recompute interval must be at least 60 seconds, got {value}")]
    InvalidPriorityRecomputeInterval { value: u64 },
    #[error("matcher min confidence must be between 0.0 and 1.0, got {value}")]
    InvalidMatcherMinConfidence { value: f64 },
    #[error("job recovery window must be positive, got {value}")]
    InvalidJobRecoveryWindow { value: u64 },
}

/// Loads configuration using layered `.env` files and `CLIMBSYNC_*` env vars.
pub struct ConfigLoader {
    base_dir: PathBuf,
}

impl ConfigLoader {
    /// Creates a new loader rooted at the current working directory.
    pub fn new() -> Self {
        Self {
            base_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    /// Creates a loader rooted at the provided directory (useful for tests).
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Loads and validates the configuration.
    ///
    /// Precedence, lowest first: `.env`, `.env.local`, `.env.<profile>`,
    /// `.env.<profile>.local`, process environment.
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let (mut layered, profile_hint) = self.collect_layered_env()?;

        // Overlay process environment last so it wins.
        for (key, value) in env::vars() {
            if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                layered.insert(stripped.to_string(), value);
            }
        }

        let profile = take_string(&mut layered, "PROFILE").unwrap_or(profile_hint);
        let log_level = take_string(&mut layered, "LOG_LEVEL").unwrap_or_else(default_log_level);
        let log_format =
            take_string(&mut layered, "LOG_FORMAT").unwrap_or_else(default_log_format);
        let database_url =
            take_string(&mut layered, "DATABASE_URL").unwrap_or_else(default_database_url);
        let db_max_connections = take_parsed(&mut layered, "DB_MAX_CONNECTIONS")?
            .unwrap_or_else(default_db_max_connections);
        let db_acquire_timeout_ms = take_parsed(&mut layered, "DB_ACQUIRE_TIMEOUT_MS")?
            .unwrap_or_else(default_db_acquire_timeout_ms);

        let kaya_api_base =
            take_string(&mut layered, "KAYA_API_BASE").unwrap_or_else(default_kaya_api_base);
        let kaya_api_token = take_string(&mut layered, "KAYA_API_TOKEN")
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty());
        let kaya_request_timeout_ms = take_parsed(&mut layered, "KAYA_REQUEST_TIMEOUT_MS")?
            .unwrap_or_else(default_kaya_request_timeout_ms);

        let sync = SyncConfig {
            page_size: take_parsed(&mut layered, "SYNC_PAGE_SIZE")?
                .unwrap_or_else(default_sync_page_size),
            max_ascents_per_location: take_parsed(&mut layered, "SYNC_MAX_ASCENTS_PER_LOCATION")?
                .unwrap_or_else(default_sync_max_ascents_per_location),
            max_depth: take_parsed(&mut layered, "SYNC_MAX_DEPTH")?
                .unwrap_or_else(default_sync_max_depth),
            resync_interval_hours: take_parsed(&mut layered, "SYNC_RESYNC_INTERVAL_HOURS")?
                .unwrap_or_else(default_sync_resync_interval_hours),
        };

        let progress = ProgressConfig {
            batch_size: take_parsed(&mut layered, "PROGRESS_BATCH_SIZE")?
                .unwrap_or_else(default_progress_batch_size),
            flush_interval_seconds: take_parsed(&mut layered, "PROGRESS_FLUSH_INTERVAL_SECONDS")?
                .unwrap_or_else(default_progress_flush_interval_seconds),
        };

        let priority = PriorityConfig {
            high_interval_hours: take_parsed(&mut layered, "PRIORITY_HIGH_INTERVAL_HOURS")?
                .unwrap_or_else(default_priority_high_interval_hours),
            medium_interval_hours: take_parsed(&mut layered, "PRIORITY_MEDIUM_INTERVAL_HOURS")?
                .unwrap_or_else(default_priority_medium_interval_hours),
            low_interval_hours: take_parsed(&mut layered, "PRIORITY_LOW_INTERVAL_HOURS")?
                .unwrap_or_else(default_priority_low_interval_hours),
            recompute_interval_seconds: take_parsed(
                &mut layered,
                "PRIORITY_RECOMPUTE_INTERVAL_SECONDS",
            )?
            .unwrap_or_else(default_priority_recompute_interval_seconds),
        };

        let matcher = MatcherConfig {
            min_confidence: take_parsed(&mut layered, "MATCHER_MIN_CONFIDENCE")?
                .unwrap_or_else(default_matcher_min_confidence),
        };

        let job = JobConfig {
            recovery_window_hours: take_parsed(&mut layered, "JOB_RECOVERY_WINDOW_HOURS")?
                .unwrap_or_else(default_job_recovery_window_hours),
        };

        let config = AppConfig {
            profile,
            log_level,
            log_format,
            database_url,
            db_max_connections,
            db_acquire_timeout_ms,
            kaya_api_base,
            kaya_api_token,
            kaya_request_timeout_ms,
            sync,
            progress,
            priority,
            matcher,
            job,
        };

        config.validate()?;
        Ok(config)
    }

    fn collect_layered_env(&self) -> Result<(BTreeMap<String, String>, String), ConfigError> {
        let mut values = BTreeMap::new();

        self.merge_dotenv(self.base_dir.join(".env"), &mut values)?;
        self.merge_dotenv(self.base_dir.join(".env.local"), &mut values)?;

        let profile = env::var(format!("{ENV_PREFIX}PROFILE"))
            .ok()
            .or_else(|| values.get("PROFILE").cloned())
            .unwrap_or_else(default_profile);

        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}", &profile)),
            &mut values,
        )?;
        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}.local", &profile)),
            &mut values,
        )?;

        Ok((values, profile))
    }

    fn merge_dotenv(
        &self,
        path: PathBuf,
        values: &mut BTreeMap<String, String>,
    ) -> Result<(), ConfigError> {
        match dotenvy::from_path_iter(&path) {
            Ok(iter) => {
                for item in iter {
                    let (key, value) = item.map_err(|source| ConfigError::EnvFile {
                        path: path.clone(),
                        source,
                    })?;
                    if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                        values.insert(stripped.to_string(), value);
                    }
                }
                Ok(())
            }
            Err(dotenvy::Error::Io(ref io_err))
                if io_err.kind() == std::io::ErrorKind::NotFound =>
            {
                Ok(())
            }
            Err(err) => Err(ConfigError::EnvFile { path, source: err }),
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn take_string(values: &mut BTreeMap<String, String>, key: &str) -> Option<String> {
    values.remove(key).filter(|v| !v.is_empty())
}

/// Numeric keys that are present but unparseable are rejected rather than
/// silently replaced by their defaults.
fn take_parsed<T: FromStr>(
    values: &mut BTreeMap<String, String>,
    key: &str,
) -> Result<Option<T>, ConfigError> {
    match take_string(values, key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                key: format!("{ENV_PREFIX}{key}"),
                value: raw,
            }),
    }
}
