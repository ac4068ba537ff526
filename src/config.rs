use std::{env, net::SocketAddr, time::Duration};

use thiserror::Error;

use crate::publish::PublishType;

#[cfg(test)]
pub(crate) static ENV_MUTEX: std::sync::LazyLock<std::sync::Mutex<()>> =
    std::sync::LazyLock::new(|| std::sync::Mutex::new(()));

/// コンテンツの永続化先。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    http_bind: SocketAddr,
    store_backend: StoreBackend,
    db_dsn: Option<String>,
    db_max_connections: u32,
    db_min_connections: u32,
    db_acquire_timeout: Duration,
    db_idle_timeout: Duration,
    db_max_lifetime: Duration,
    db_run_migrations: bool,
    post_publish_type: PublishType,
    comment_publish_type: PublishType,
    member_service_base_url: String,
    timeline_service_base_url: String,
    activity_service_base_url: String,
    activity_service_token: Option<String>,
    remote_connect_timeout: Duration,
    remote_total_timeout: Duration,
    http_max_retries: usize,
    http_backoff_base_ms: u64,
    http_backoff_cap_ms: u64,
    activity_topic_prefix: String,
    activity_topic_date_format: String,
    activity_topic_retention: Duration,
    max_comment_depth: i32,
    dead_letter_replay_enabled: bool,
    dead_letter_replay_interval: Duration,
    dead_letter_replay_batch: u32,
    dead_letter_max_attempts: u32,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing environment variable: {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {source}")]
    Invalid {
        name: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl Config {
    /// 環境変数からコンテンツサービスの設定値を読み込み、検証する。
    ///
    /// # Errors
    /// 必須の環境変数が未設定、もしくは各種値のパースに失敗した場合は [`ConfigError`] を返す。
    /// `CONTENT_STORE_BACKEND=postgres` のときは `CONTENT_DB_DSN` が必須。
    pub fn from_env() -> Result<Self, ConfigError> {
        let http_bind = parse_socket_addr("CONTENT_HTTP_BIND", "0.0.0.0:8080")?;
        let store_backend = parse_store_backend("CONTENT_STORE_BACKEND")?;
        let db_dsn = match store_backend {
            StoreBackend::Postgres => Some(env_var("CONTENT_DB_DSN")?),
            StoreBackend::Memory => env::var("CONTENT_DB_DSN").ok(),
        };

        // Database connection pool settings
        let db_max_connections = parse_u32("CONTENT_DB_MAX_CONNECTIONS", 20)?;
        let db_min_connections = parse_u32("CONTENT_DB_MIN_CONNECTIONS", 2)?;
        let db_acquire_timeout = parse_duration_secs("CONTENT_DB_ACQUIRE_TIMEOUT_SECS", 30)?;
        let db_idle_timeout = parse_duration_secs("CONTENT_DB_IDLE_TIMEOUT_SECS", 600)?;
        let db_max_lifetime = parse_duration_secs("CONTENT_DB_MAX_LIFETIME_SECS", 1800)?;
        let db_run_migrations = parse_bool("CONTENT_DB_RUN_MIGRATIONS", true)?;

        let post_publish_type = parse_publish_type("CONTENT_POST_PUBLISH_TYPE")?;
        let comment_publish_type = parse_publish_type("CONTENT_COMMENT_PUBLISH_TYPE")?;

        let member_service_base_url = env_var("MEMBER_SERVICE_BASE_URL")?;
        let timeline_service_base_url = env_var("TIMELINE_SERVICE_BASE_URL")?;
        let activity_service_base_url = env_var("ACTIVITY_SERVICE_BASE_URL")?;
        let activity_service_token = env::var("ACTIVITY_SERVICE_TOKEN").ok();

        // HTTP timeout and retry settings (exponential backoff + jitter)
        let remote_connect_timeout = parse_duration_ms("REMOTE_CONNECT_TIMEOUT_MS", 3000)?;
        let remote_total_timeout = parse_duration_ms("REMOTE_TOTAL_TIMEOUT_MS", 10000)?;
        let http_max_retries = parse_usize("HTTP_MAX_RETRIES", 3)?;
        let http_backoff_base_ms = parse_u64("HTTP_BACKOFF_BASE_MS", 250)?;
        let http_backoff_cap_ms = parse_u64("HTTP_BACKOFF_CAP_MS", 10000)?;

        // Activity topic settings
        let activity_topic_prefix =
            env::var("ACTIVITY_TOPIC_PREFIX").unwrap_or_else(|_| "post-activity-".to_string());
        let activity_topic_date_format = parse_date_format("ACTIVITY_TOPIC_DATE_FORMAT", "%Y%m%d")?;
        let activity_topic_retention =
            parse_duration_ms("ACTIVITY_TOPIC_RETENTION_MS", 604_800_000)?;

        let max_comment_depth = parse_depth("CONTENT_MAX_COMMENT_DEPTH", 3)?;

        // Dead letter replay settings
        let dead_letter_replay_enabled = parse_bool("DEAD_LETTER_REPLAY_ENABLED", true)?;
        let dead_letter_replay_interval =
            parse_duration_secs("DEAD_LETTER_REPLAY_INTERVAL_SECS", 60)?;
        let dead_letter_replay_batch = parse_u32("DEAD_LETTER_REPLAY_BATCH", 50)?;
        let dead_letter_max_attempts = parse_u32("DEAD_LETTER_MAX_ATTEMPTS", 5)?;

        Ok(Self {
            http_bind,
            store_backend,
            db_dsn,
            db_max_connections,
            db_min_connections,
            db_acquire_timeout,
            db_idle_timeout,
            db_max_lifetime,
            db_run_migrations,
            post_publish_type,
            comment_publish_type,
            member_service_base_url,
            timeline_service_base_url,
            activity_service_base_url,
            activity_service_token,
            remote_connect_timeout,
            remote_total_timeout,
            http_max_retries,
            http_backoff_base_ms,
            http_backoff_cap_ms,
            activity_topic_prefix,
            activity_topic_date_format,
            activity_topic_retention,
            max_comment_depth,
            dead_letter_replay_enabled,
            dead_letter_replay_interval,
            dead_letter_replay_batch,
            dead_letter_max_attempts,
        })
    }

    #[must_use]
    pub fn http_bind(&self) -> SocketAddr {
        self.http_bind
    }

    #[must_use]
    pub fn store_backend(&self) -> StoreBackend {
        self.store_backend
    }

    #[must_use]
    pub fn db_dsn(&self) -> Option<&str> {
        self.db_dsn.as_deref()
    }

    #[must_use]
    pub fn db_max_connections(&self) -> u32 {
        self.db_max_connections
    }

    #[must_use]
    pub fn db_min_connections(&self) -> u32 {
        self.db_min_connections
    }

    #[must_use]
    pub fn db_acquire_timeout(&self) -> Duration {
        self.db_acquire_timeout
    }

    #[must_use]
    pub fn db_idle_timeout(&self) -> Duration {
        self.db_idle_timeout
    }

    #[must_use]
    pub fn db_max_lifetime(&self) -> Duration {
        self.db_max_lifetime
    }

    #[must_use]
    pub fn db_run_migrations(&self) -> bool {
        self.db_run_migrations
    }

    #[must_use]
    pub fn post_publish_type(&self) -> PublishType {
        self.post_publish_type
    }

    #[must_use]
    pub fn comment_publish_type(&self) -> PublishType {
        self.comment_publish_type
    }

    #[must_use]
    pub fn member_service_base_url(&self) -> &str {
        &self.member_service_base_url
    }

    #[must_use]
    pub fn timeline_service_base_url(&self) -> &str {
        &self.timeline_service_base_url
    }

    #[must_use]
    pub fn activity_service_base_url(&self) -> &str {
        &self.activity_service_base_url
    }

    #[must_use]
    pub fn activity_service_token(&self) -> Option<&str> {
        self.activity_service_token.as_deref()
    }

    #[must_use]
    pub fn remote_connect_timeout(&self) -> Duration {
        self.remote_connect_timeout
    }

    #[must_use]
    pub fn remote_total_timeout(&self) -> Duration {
        self.remote_total_timeout
    }

    #[must_use]
    pub fn http_max_retries(&self) -> usize {
        self.http_max_retries
    }

    #[must_use]
    pub fn http_backoff_base_ms(&self) -> u64 {
        self.http_backoff_base_ms
    }

    #[must_use]
    pub fn http_backoff_cap_ms(&self) -> u64 {
        self.http_backoff_cap_ms
    }

    #[must_use]
    pub fn activity_topic_prefix(&self) -> &str {
        &self.activity_topic_prefix
    }

    #[must_use]
    pub fn activity_topic_date_format(&self) -> &str {
        &self.activity_topic_date_format
    }

    #[must_use]
    pub fn activity_topic_retention(&self) -> Duration {
        self.activity_topic_retention
    }

    #[must_use]
    pub fn max_comment_depth(&self) -> i32 {
        self.max_comment_depth
    }

    #[must_use]
    pub fn dead_letter_replay_enabled(&self) -> bool {
        self.dead_letter_replay_enabled
    }

    #[must_use]
    pub fn dead_letter_replay_interval(&self) -> Duration {
        self.dead_letter_replay_interval
    }

    #[must_use]
    pub fn dead_letter_replay_batch(&self) -> u32 {
        self.dead_letter_replay_batch
    }

    #[must_use]
    pub fn dead_letter_max_attempts(&self) -> u32 {
        self.dead_letter_max_attempts
    }
}

fn env_var(name: &'static str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::Missing(name))
}

fn parse_socket_addr(name: &'static str, default: &str) -> Result<SocketAddr, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());

    raw.parse().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })
}

fn parse_store_backend(name: &'static str) -> Result<StoreBackend, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| "postgres".to_string());
    match raw.to_lowercase().as_str() {
        "postgres" | "postgresql" => Ok(StoreBackend::Postgres),
        "memory" => Ok(StoreBackend::Memory),
        _ => Err(ConfigError::Invalid {
            name,
            source: anyhow::anyhow!("unknown store backend: {raw}"),
        }),
    }
}

fn parse_publish_type(name: &'static str) -> Result<PublishType, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| "queue".to_string());
    raw.parse().map_err(|error| ConfigError::Invalid { name, source: error })
}

fn parse_date_format(name: &'static str, default: &str) -> Result<String, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    // chrono は不正な書式を format 時まで検出しないため、ここで検証する。
    let invalid = chrono::format::StrftimeItems::new(&raw)
        .any(|item| matches!(item, chrono::format::Item::Error));
    if invalid || raw.is_empty() {
        return Err(ConfigError::Invalid {
            name,
            source: anyhow::anyhow!("invalid date format: {raw}"),
        });
    }
    Ok(raw)
}

fn parse_depth(name: &'static str, default: i32) -> Result<i32, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    let parsed = raw.parse::<i32>().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })?;
    if parsed < 0 {
        return Err(ConfigError::Invalid {
            name,
            source: anyhow::anyhow!("must not be negative"),
        });
    }
    Ok(parsed)
}

fn parse_duration_secs(name: &'static str, default_secs: u64) -> Result<Duration, ConfigError> {
    let value = parse_u64(name, default_secs)?;
    Ok(Duration::from_secs(value))
}

fn parse_duration_ms(name: &'static str, default_ms: u64) -> Result<Duration, ConfigError> {
    let value = parse_u64(name, default_ms)?;
    Ok(Duration::from_millis(value))
}

fn parse_usize(name: &'static str, default: usize) -> Result<usize, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.parse::<usize>().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })
}

fn parse_u32(name: &'static str, default: u32) -> Result<u32, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.parse::<u32>().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })
}

fn parse_u64(name: &'static str, default: u64) -> Result<u64, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.parse::<u64>().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })
}

fn parse_bool(name: &'static str, default: bool) -> Result<bool, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    match raw.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            name,
            source: anyhow::anyhow!("invalid boolean value: {raw}"),
        }),
    }
}
