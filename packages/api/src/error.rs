//! Facade error types.

use crate::ConfigError;

/// Errors surfaced by [`Engine`](crate::Engine) operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("failed to spawn engine actor: {0}")]
    Spawn(#[from] actors::SpawnErr),

    #[error("engine unavailable: {0}")]
    Actor(String),

    #[error(transparent)]
    Lock(#[from] fs_lock::LockError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl EngineError {
    pub(crate) fn stopped() -> Self {
        EngineError::Actor("engine has been stopped".into())
    }
}
