pub type Result<T> = core::result::Result<T, SchedError>;

/// Error kinds recognized by the scheduler core.
#[derive(thiserror::Error, Debug)]
pub enum SchedError {
    #[error("config error: {0}")]
    ConfigError(String),

    #[error("protocol error: {0}")]
    ProtocolError(String),

    #[error("capacity error: {0}")]
    CapacityError(String),

    /// Invariant violation. Fatal: the scheduler thread aborts rather than continue
    /// with a cache or slot table it can no longer trust.
    #[error("state error: {0}")]
    StateError(String),

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("external error: {0}")]
    ExternalError(String),
}

impl SchedError {
    pub fn capacity(msg: impl Into<String>) -> Self {
        Self::CapacityError(msg.into())
    }

    pub fn state(msg: impl Into<String>) -> Self {
        Self::StateError(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::ProtocolError(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn external(msg: impl Into<String>) -> Self {
        Self::ExternalError(msg.into())
    }

    /// True for the one kind that's locally recoverable during admission:
    /// the caller should leave the request pending, not propagate.
    pub fn is_capacity(&self) -> bool {
        matches!(self, Self::CapacityError(_))
    }

    /// True for the kind that must abort the scheduler thread.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::StateError(_))
    }
}
