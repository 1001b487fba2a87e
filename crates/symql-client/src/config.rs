//! Connection configuration.

use std::sync::Arc;
use std::time::Duration;

use symql_lang::StatementCache;

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default interval between readiness checks while a request is in flight.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Default maximum message size (64 MB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = symql_proto::framing::MAX_MESSAGE_SIZE;

/// Transaction isolation level applied when a session opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationLevel {
    /// Reads see only committed data.
    ReadCommitted,
    /// Reads may see uncommitted data.
    ReadUncommitted,
    /// Full serializability.
    #[default]
    Serializable,
}

/// Settings a backend applies to every new session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    /// Isolation level.
    pub isolation: IsolationLevel,
    /// Whether each statement commits on its own.
    pub autocommit: bool,
    /// Whether foreign keys are enforced.
    pub foreign_keys: bool,
    /// How long the engine waits on a locked database before reporting
    /// contention.
    pub busy_timeout: Option<Duration>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            isolation: IsolationLevel::Serializable,
            autocommit: true,
            foreign_keys: true,
            busy_timeout: None,
        }
    }
}

impl SessionSettings {
    /// Set the isolation level.
    pub fn with_isolation(mut self, isolation: IsolationLevel) -> Self {
        self.isolation = isolation;
        self
    }

    /// Enable or disable autocommit.
    pub fn with_autocommit(mut self, autocommit: bool) -> Self {
        self.autocommit = autocommit;
        self
    }

    /// Enable or disable foreign key enforcement.
    pub fn with_foreign_keys(mut self, foreign_keys: bool) -> Self {
        self.foreign_keys = foreign_keys;
        self
    }

    /// Set the engine busy timeout.
    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = Some(timeout);
        self
    }
}

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// How long `execute` waits for a reply.
    pub timeout: Duration,

    /// How often a pending request checks for a reply or a close.
    pub poll_interval: Duration,

    /// Maximum request size in bytes.
    pub max_message_size: usize,

    /// Settings applied when the session opens.
    pub session: SessionSettings,

    /// Statement cache; the process-wide cache when `None`.
    pub cache: Option<Arc<StatementCache>>,
}

impl ConnectionConfig {
    /// Create a configuration with default settings.
    pub fn new() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            session: SessionSettings::default(),
            cache: None,
        }
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the maximum message size.
    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    /// Set the session settings.
    pub fn with_session(mut self, session: SessionSettings) -> Self {
        self.session = session;
        self
    }

    /// Use a dedicated statement cache instead of the process-wide one.
    pub fn with_cache(mut self, cache: Arc<StatementCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// The statement cache this configuration selects.
    pub fn statement_cache(&self) -> &StatementCache {
        match &self.cache {
            Some(cache) => cache,
            None => StatementCache::global(),
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ConnectionConfig::default();
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
        assert_eq!(config.poll_interval, DEFAULT_POLL_INTERVAL);
        assert_eq!(config.max_message_size, DEFAULT_MAX_MESSAGE_SIZE);
        assert!(config.cache.is_none());
    }

    #[test]
    fn test_default_session() {
        let session = SessionSettings::default();
        assert_eq!(session.isolation, IsolationLevel::Serializable);
        assert!(session.autocommit);
        assert!(session.foreign_keys);
        assert_eq!(session.busy_timeout, None);
    }

    #[test]
    fn test_config_builder() {
        let cache = Arc::new(StatementCache::new());
        let config = ConnectionConfig::new()
            .with_timeout(Duration::from_secs(60))
            .with_poll_interval(Duration::from_millis(5))
            .with_max_message_size(1024 * 1024)
            .with_session(
                SessionSettings::default()
                    .with_autocommit(false)
                    .with_busy_timeout(Duration::from_millis(250)),
            )
            .with_cache(Arc::clone(&cache));

        assert_eq!(config.timeout, Duration::from_secs(60));
        assert_eq!(config.poll_interval, Duration::from_millis(5));
        assert_eq!(config.max_message_size, 1024 * 1024);
        assert!(!config.session.autocommit);
        assert_eq!(config.session.busy_timeout, Some(Duration::from_millis(250)));
        assert!(std::ptr::eq(config.statement_cache(), &*cache));
    }

    #[test]
    fn test_global_cache_by_default() {
        let config = ConnectionConfig::default();
        assert!(std::ptr::eq(config.statement_cache(), StatementCache::global()));
    }
}
