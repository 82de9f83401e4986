use std::fmt;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::EngineConfig;
use crate::driver::{Connector, RawConnection};
use crate::error::DbError;
use crate::types::DatabaseType;

static NEXT_ENGINE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-wide registry used by [`create_engine`] and [`engine`].
static REGISTRY: EngineRegistry = EngineRegistry::new();

/// Immutable connection factory.
///
/// The connector captures its configuration when the engine is built; the
/// engine itself never changes afterwards and is safe to share across
/// threads.
pub struct Engine {
    connector: Connector,
    id: u64,
}

impl Engine {
    #[must_use]
    pub fn new(connector: Connector) -> Self {
        Self {
            connector,
            id: NEXT_ENGINE_ID.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Build an engine for the driver named in `cfg`.
    ///
    /// # Errors
    /// Returns `DbError::ConfigError` if the config is invalid or names a
    /// driver that needs an explicit connector.
    pub fn from_config(cfg: &EngineConfig) -> Result<Self, DbError> {
        cfg.validate()?;
        match cfg.driver {
            #[cfg(feature = "sqlite")]
            DatabaseType::Sqlite => Ok(Self::new(crate::sqlite::connector(cfg)?)),
            DatabaseType::Custom => Err(DbError::ConfigError(
                "custom driver needs a connector; use create_engine_with".into(),
            )),
        }
    }

    /// Open a new raw connection. No retry is attempted.
    ///
    /// # Errors
    /// Any connector failure is reported as `DbError::ConnectionError`.
    pub fn connect(&self) -> Result<Box<dyn RawConnection>, DbError> {
        (self.connector)().map_err(|err| match err {
            DbError::ConnectionError(_) => err,
            other => DbError::ConnectionError(other.to_string()),
        })
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("id", &self.id)
            .field("connector", &"<Connector>")
            .finish()
    }
}

/// Set-once slot holding a single [`Engine`].
#[derive(Debug, Default)]
pub struct EngineRegistry {
    slot: OnceLock<Engine>,
}

impl EngineRegistry {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slot: OnceLock::new(),
        }
    }

    /// Store `engine` unless one is already registered.
    ///
    /// # Errors
    /// Returns `DbError::ConfigError` if an engine is already registered; the
    /// registered engine is left untouched.
    pub fn register(&self, engine: Engine) -> Result<&Engine, DbError> {
        let id = engine.id();
        self.slot
            .set(engine)
            .map_err(|_| DbError::ConfigError("Engine is already initialized.".into()))?;
        tracing::info!("init engine <{id}> ok");
        self.get()
    }

    /// # Errors
    /// Returns `DbError::ConfigError` if no engine has been registered.
    pub fn get(&self) -> Result<&Engine, DbError> {
        self.slot
            .get()
            .ok_or_else(|| DbError::ConfigError("Engine is not initialized.".into()))
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.slot.get().is_some()
    }
}

/// Build the process engine from configuration and register it.
///
/// # Errors
/// Returns `DbError::ConfigError` if an engine already exists or the config is
/// invalid.
pub fn create_engine(cfg: &EngineConfig) -> Result<&'static Engine, DbError> {
    if REGISTRY.is_initialized() {
        return Err(DbError::ConfigError("Engine is already initialized.".into()));
    }
    REGISTRY.register(Engine::from_config(cfg)?)
}

/// Register the process engine around a caller-supplied connector.
///
/// # Errors
/// Returns `DbError::ConfigError` if an engine already exists.
pub fn create_engine_with(connector: Connector) -> Result<&'static Engine, DbError> {
    REGISTRY.register(Engine::new(connector))
}

/// The registered process engine.
///
/// # Errors
/// Returns `DbError::ConfigError` if [`create_engine`] has not run yet.
pub fn engine() -> Result<&'static Engine, DbError> {
    REGISTRY.get()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::connector;

    fn failing() -> Connector {
        connector(|| Err(DbError::ExecutionError("host unreachable".into())))
    }

    #[test]
    fn second_registration_fails_and_first_survives() {
        let registry = EngineRegistry::new();
        let first = registry.register(Engine::new(failing())).expect("first").id();

        let err = registry.register(Engine::new(failing())).unwrap_err();
        assert!(matches!(err, DbError::ConfigError(_)));
        assert_eq!(registry.get().expect("still there").id(), first);
    }

    #[test]
    fn empty_registry_reports_config_error() {
        let registry = EngineRegistry::new();
        assert!(!registry.is_initialized());
        assert!(matches!(registry.get(), Err(DbError::ConfigError(_))));
    }

    #[test]
    fn connect_failures_become_connection_errors() {
        let engine = Engine::new(failing());
        let Err(err) = engine.connect() else {
            panic!("connector should fail");
        };
        match err {
            DbError::ConnectionError(msg) => assert!(msg.contains("host unreachable")),
            other => panic!("expected connection error, got {other:?}"),
        }
    }

    #[test]
    fn custom_driver_cannot_be_built_from_config() {
        let mut cfg = EngineConfig::new("db");
        cfg.driver = DatabaseType::Custom;
        assert!(matches!(
            Engine::from_config(&cfg),
            Err(DbError::ConfigError(_))
        ));
    }
}
