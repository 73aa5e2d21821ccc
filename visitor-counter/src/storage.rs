use {
    std::{fs, path::Path, sync::{Arc, Mutex}, time::Duration},
    once_cell::sync::OnceCell,
    tracing::info,
    rusqlite::{Connection, ErrorCode, params, types::ValueRef},
    crate::{
        config::{StoreConfig, StoreDriver, DEFAULT_REDIS_CONNECT_TIMEOUT_MS, validate_table_name},
        error::StorageError,
    },
};

/// Keyed store with a native atomic add on numeric attributes.
pub trait CounterStore {
    /// Atomically adds `delta` to `attribute` of the record `id` and returns the value after the update.
    /// A missing record or attribute starts from zero. The update is either applied in full or not at all.
    fn add(&self, id: &str, attribute: &str, delta: i64) -> Result<AttributeValue, StorageError>;
}

/// Numeric attribute as the store hands it back.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Null,
    Integer(i64),
    Real(f64),
    /// Decimal number carried as text.
    Decimal(String),
    Text(String),
}

impl From<ValueRef<'_>> for AttributeValue {
    fn from(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => Self::Null,
            ValueRef::Integer(v) => Self::Integer(v),
            ValueRef::Real(v) => Self::Real(v),
            ValueRef::Text(v) | ValueRef::Blob(v) => Self::Text(String::from_utf8_lossy(v).into_owned()),
        }
    }
}

impl<T: CounterStore + ?Sized> CounterStore for Arc<T> {
    fn add(&self, id: &str, attribute: &str, delta: i64) -> Result<AttributeValue, StorageError> {
        self.as_ref().add(id, attribute, delta)
    }
}

#[derive(Clone)]
pub struct BoxedCounterStore {
    inner: Arc<dyn CounterStore + Send + Sync>,
}

impl BoxedCounterStore {
    pub fn new<T: CounterStore + Send + Sync + 'static>(inner: T) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }
}

impl CounterStore for BoxedCounterStore {
    fn add(&self, id: &str, attribute: &str, delta: i64) -> Result<AttributeValue, StorageError> {
        self.inner.add(id, attribute, delta)
    }
}

static SHARED_STORE: OnceCell<BoxedCounterStore> = OnceCell::new();

/// Process-wide store handle. Built from `config` on first call; later calls return the same handle.
pub fn shared_store(config: &StoreConfig) -> Result<BoxedCounterStore, StorageError> {
    SHARED_STORE.get_or_try_init(|| store_from_config(config)).cloned()
}

pub fn store_from_config(config: &StoreConfig) -> Result<BoxedCounterStore, StorageError> {
    let store = match config.driver {
        StoreDriver::Sqlite => {
            let store = if config.in_memory {
                SqliteCounterStore::in_memory(&config.table)?
            } else {
                let path = config.path.as_ref()
                    .ok_or_else(|| StorageError::Misconfigured { reason: "sqlite store has no path".to_owned() })?;
                SqliteCounterStore::new(path, &config.table)?
            };

            let store = match config.busy_timeout_ms {
                Some(timeout_ms) => store.with_busy_timeout(Duration::from_millis(timeout_ms))?,
                None => store,
            };

            info!(table = config.table.as_str(), in_memory = config.in_memory, "using sqlite counter store");
            BoxedCounterStore::new(store)
        },
        StoreDriver::Redis => {
            let url = config.url.as_ref()
                .ok_or_else(|| StorageError::Misconfigured { reason: "redis store has no url".to_owned() })?;
            let connect_timeout = Duration::from_millis(config.connect_timeout_ms.unwrap_or(DEFAULT_REDIS_CONNECT_TIMEOUT_MS));
            info!(table = config.table.as_str(), connect_timeout_ms = connect_timeout.as_millis() as u64, "using redis counter store");
            BoxedCounterStore::new(RedisCounterStore::new(url, &config.table, connect_timeout)?)
        },
    };

    Ok(store)
}

#[derive(Clone)]
pub struct SqliteCounterStore {
    connection: Arc<Mutex<Connection>>,
    add_stmt: String,
}

impl SqliteCounterStore {
    pub fn new(path: impl AsRef<Path>, table: &str) -> Result<Self, StorageError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .map_err(|err| StorageError::Unavailable { reason: format!("failed to create directory for sqlite database: {err:?}") })?;
            }
        }

        Self::from_connection(
            Connection::open(path)
                .map_err(|err| StorageError::Unavailable { reason: format!("failed to open sqlite database: {err:?}") })?,
            table,
        )
    }

    pub fn in_memory(table: &str) -> Result<Self, StorageError> {
        Self::from_connection(
            Connection::open_in_memory()
                .map_err(|err| StorageError::Unavailable { reason: format!("failed to open in memory sqlite: {err:?}") })?,
            table,
        )
    }

    fn from_connection(connection: Connection, table: &str) -> Result<Self, StorageError> {
        validate_table_name(table)
            .map_err(|err| StorageError::Misconfigured { reason: err.to_string() })?;

        // sqlite turns an overflowing integer sum into a real, the check makes that update fail instead
        connection.execute(
            &format!(
                "create table if not exists \"{table}\" (\
                id text not null, \
                attribute text not null, \
                value numeric not null check (typeof(value) = 'integer'), \
                primary key (id, attribute))"
            ),
            (),
        ).map_err(|err| StorageError::Unavailable { reason: format!("failed to create counter table: {err:?}") })?;

        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
            add_stmt: format!(
                "insert into \"{table}\" (id, attribute, value) values (?1, ?2, ?3) \
                on conflict (id, attribute) do update set value = value + excluded.value \
                returning value"
            ),
        })
    }

    pub fn with_busy_timeout(self, timeout: Duration) -> Result<Self, StorageError> {
        {
            let connection = self.connection.lock()
                .map_err(|err| StorageError::InternalError { reason: format!("failed to acquire sqlite connection: {err:?}") })?;
            connection.busy_timeout(timeout)
                .map_err(|err| StorageError::Unavailable { reason: format!("failed to set sqlite busy timeout: {err:?}") })?;
        }
        Ok(self)
    }
}

impl CounterStore for SqliteCounterStore {
    fn add(&self, id: &str, attribute: &str, delta: i64) -> Result<AttributeValue, StorageError> {
        let connection = self.connection.lock()
            .map_err(|err| StorageError::InternalError { reason: format!("failed to acquire sqlite connection: {err:?}") })?;
        let mut stmt = connection.prepare_cached(&self.add_stmt)
            .map_err(|err| StorageError::Unavailable { reason: format!("failed to prepare sqlite query: {err:?}") })?;

        stmt.query_row(params![id, attribute, delta], |row| row.get_ref(0).map(AttributeValue::from))
            .map_err(|err| match err.sqlite_error_code() {
                Some(ErrorCode::ConstraintViolation) => StorageError::MalformedValue {
                    reason: format!("update of `{attribute}` on `{id}` does not fit an integer: {err}"),
                },
                _ => StorageError::Unavailable { reason: format!("failed to execute sqlite query: {err:?}") },
            })
    }
}

/// Counter records live in redis hashes named `<table>:<id>`.
pub struct RedisCounterStore {
    pool: r2d2::Pool<redis::Client>,
    table: String,
}

impl RedisCounterStore {
    /// Connections are opened on first use, so an unreachable server shows up as a failed invocation
    /// after at most `connect_timeout`.
    pub fn new(url: &str, table: &str, connect_timeout: Duration) -> Result<Self, StorageError> {
        validate_table_name(table)
            .map_err(|err| StorageError::Misconfigured { reason: err.to_string() })?;
        let client = redis::Client::open(url)
            .map_err(|err| StorageError::Misconfigured { reason: format!("invalid redis url: {err}") })?;

        Ok(Self {
            pool: r2d2::Pool::builder()
                .connection_timeout(connect_timeout)
                .min_idle(Some(0))
                .build_unchecked(client),
            table: table.to_owned(),
        })
    }

    fn record_key(&self, id: &str) -> String {
        format!("{}:{id}", self.table)
    }
}

impl CounterStore for RedisCounterStore {
    fn add(&self, id: &str, attribute: &str, delta: i64) -> Result<AttributeValue, StorageError> {
        let mut connection = self.pool.get()
            .map_err(|err| StorageError::Unavailable { reason: format!("failed to get redis connection: {err}") })?;

        redis::cmd("HINCRBY")
            .arg(self.record_key(id))
            .arg(attribute)
            .arg(delta)
            .query::<i64>(&mut *connection)
            .map(AttributeValue::Integer)
            .map_err(StorageError::from)
    }
}
