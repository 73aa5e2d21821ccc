use {
    std::{fs, net::SocketAddr, path::Path, str::FromStr},
    serde::Deserialize,
    tracing::Level,
    crate::error::ConfigError,
};

pub const CONFIG_PATH_ENV: &str = "VISITOR_COUNTER_CONFIG";
pub const TABLE_ENV: &str = "VISITOR_COUNTER_TABLE";
pub const LISTEN_ENV: &str = "VISITOR_COUNTER_LISTEN";
pub const ERROR_POLICY_ENV: &str = "VISITOR_COUNTER_ERROR_POLICY";
pub const LOG_LEVEL_ENV: &str = "VISITOR_COUNTER_LOG_LEVEL";

pub const DEFAULT_TABLE: &str = "visitor_counter";
pub const DEFAULT_SQLITE_PATH: &str = "data/visitor_counter.sqlite";
pub const DEFAULT_REDIS_CONNECT_TIMEOUT_MS: u64 = 2000;

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub listen: SocketAddr,
    pub log_level: LogLevel,
    pub error_policy: ErrorPolicy,
    pub store: StoreConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 8080)),
            log_level: LogLevel::Info,
            error_policy: ErrorPolicy::Guarded,
            store: StoreConfig::default(),
        }
    }
}

impl Config {
    /// Reads the config file (if any), applies environment overrides and validates the result.
    pub fn load(file_path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match file_path {
            Some(path) => Self::from_yaml(
                &fs::read_to_string(path).map_err(ConfigError::FailedToRead)?
            )?,
            None => Self::default(),
        };

        let config = config.with_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(config_str: &str) -> Result<Self, ConfigError> {
        if config_str.trim().is_empty() {
            return Ok(Self::default());
        }

        serde_yml::from_str(config_str)
            .map_err(|err| ConfigError::FailedToParse { reason: err.to_string() })
    }

    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        if let Some(table) = lookup(TABLE_ENV) {
            self.store.table = table;
        }

        if let Some(listen) = lookup(LISTEN_ENV) {
            self.listen = listen.parse()
                .map_err(|err| ConfigError::Invalid { reason: format!("{LISTEN_ENV} is not a socket address: {err}") })?;
        }

        if let Some(error_policy) = lookup(ERROR_POLICY_ENV) {
            self.error_policy = error_policy.parse()?;
        }

        if let Some(log_level) = lookup(LOG_LEVEL_ENV) {
            self.log_level = log_level.parse()?;
        }

        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_table_name(&self.store.table)?;

        match self.store.driver {
            StoreDriver::Sqlite => {
                if !self.store.in_memory && self.store.path.is_none() {
                    return Err(ConfigError::Invalid { reason: "sqlite store needs either `path` or `in_memory: true`".to_owned() });
                }
            },
            StoreDriver::Redis => {
                if self.store.url.is_none() {
                    return Err(ConfigError::Invalid { reason: "redis store needs `url`".to_owned() });
                }
            },
        }

        Ok(())
    }
}

/// What happens when the store call or value coercion fails.
#[derive(Deserialize, Debug, Clone, Copy, Default, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ErrorPolicy {
    /// Failure is logged and turned into a 500 response with a JSON error body.
    #[default]
    Guarded,
    /// Failure is handed to the host, which reports an invocation fault.
    Unguarded,
}

impl FromStr for ErrorPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "guarded" => Ok(Self::Guarded),
            "unguarded" => Ok(Self::Unguarded),
            other => Err(ConfigError::Invalid { reason: format!("unknown error policy: {other:?}") }),
        }
    }
}

#[derive(Deserialize, Debug, Clone, Copy, Default, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_tracing_level(&self) -> Level {
        match self {
            Self::Trace => Level::TRACE,
            Self::Debug => Level::DEBUG,
            Self::Info => Level::INFO,
            Self::Warn => Level::WARN,
            Self::Error => Level::ERROR,
        }
    }
}

impl FromStr for LogLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            other => Err(ConfigError::Invalid { reason: format!("unknown log level: {other:?}") }),
        }
    }
}

#[derive(Deserialize, Debug, Clone, Copy, Default, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum StoreDriver {
    #[default]
    Sqlite,
    Redis,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    pub driver: StoreDriver,
    pub table: String,

    // sqlite
    pub path: Option<String>,
    pub in_memory: bool,
    pub busy_timeout_ms: Option<u64>,

    // redis
    pub url: Option<String>,
    /// Upper bound on how long an invocation waits for a redis connection.
    pub connect_timeout_ms: Option<u64>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            driver: StoreDriver::Sqlite,
            table: DEFAULT_TABLE.to_owned(),
            path: Some(DEFAULT_SQLITE_PATH.to_owned()),
            in_memory: false,
            busy_timeout_ms: Some(5000),
            url: None,
            connect_timeout_ms: None,
        }
    }
}

impl StoreConfig {
    pub fn sqlite_in_memory(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            path: None,
            in_memory: true,
            ..Self::default()
        }
    }

    pub fn redis(url: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            driver: StoreDriver::Redis,
            table: table.into(),
            path: None,
            url: Some(url.into()),
            ..Self::default()
        }
    }
}

/// Table names end up inside sql statements and redis keys, so only plain identifiers are accepted.
pub fn validate_table_name(table: &str) -> Result<(), ConfigError> {
    let mut chars = table.chars();
    let valid = match chars.next() {
        Some(first) => (first.is_ascii_alphabetic() || first == '_')
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_'),
        None => false,
    };

    if valid {
        Ok(())
    } else {
        Err(ConfigError::Invalid { reason: format!("table name is not a valid identifier: {table:?}") })
    }
}
