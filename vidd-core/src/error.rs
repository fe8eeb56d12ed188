//! Error types for vidd

use thiserror::Error;

use crate::types::ConnectorIndex;

/// Result type alias using ViddError
pub type Result<T> = std::result::Result<T, ViddError>;

/// Main error type for vidd operations
#[derive(Debug, Error)]
pub enum ViddError {
    /// Malformed capability block, descriptor or mode list
    #[error("Configuration error: {0}")]
    Config(String),

    /// Monitor count would exceed the adapter capability
    #[error("Adapter supports at most {max} monitor(s)")]
    Capacity {
        /// Maximum number of monitors the adapter advertises
        max: u32,
    },

    /// Lifecycle operation not permitted in the current state
    #[error("Cannot {operation} while {state}")]
    InvalidState {
        /// What was attempted
        operation: &'static str,
        /// State the object was in
        state: String,
    },

    /// No monitor at the given connector
    #[error("No monitor on connector {0}")]
    MonitorNotFound(ConnectorIndex),

    /// Connector already occupied by a live monitor
    #[error("Connector {0} is already in use")]
    ConnectorInUse(ConnectorIndex),

    /// OS resource could not be obtained (thread, memory)
    #[error("Resource exhausted: {0}")]
    Resource(String),

    /// Swap-chain acquire/release contract violated
    #[error("Swap-chain error: {0}")]
    SwapChain(String),

    /// Downstream frame sink failure
    #[error("Frame sink error: {0}")]
    Sink(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<ViddError>,
    },
}

impl ViddError {
    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid-state error
    pub fn invalid_state(operation: &'static str, state: impl std::fmt::Display) -> Self {
        Self::InvalidState {
            operation,
            state: state.to_string(),
        }
    }

    /// Create a resource error
    pub fn resource(msg: impl Into<String>) -> Self {
        Self::Resource(msg.into())
    }

    /// Create a swap-chain error
    pub fn swap_chain(msg: impl Into<String>) -> Self {
        Self::SwapChain(msg.into())
    }

    /// Create a sink error
    pub fn sink(msg: impl Into<String>) -> Self {
        Self::Sink(msg.into())
    }

    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, with context layers stripped
    pub fn root(&self) -> &ViddError {
        match self {
            Self::WithContext { source, .. } => source.root(),
            other => other,
        }
    }

    /// Whether this is a configuration error (never retried)
    pub fn is_configuration(&self) -> bool {
        matches!(self.root(), Self::Config(_) | Self::Capacity { .. })
    }

    /// Whether the caller can fix this without a code change
    pub fn is_user_recoverable(&self) -> bool {
        matches!(
            self.root(),
            Self::Config(_)
                | Self::Capacity { .. }
                | Self::InvalidState { .. }
                | Self::MonitorNotFound(_)
                | Self::ConnectorInUse(_)
                | Self::Io(_)
        )
    }

    /// A short hint for the operator, when one applies
    pub fn user_hint(&self) -> Option<&'static str> {
        match self.root() {
            Self::Config(_) => Some("Check the [adapter] and [monitor] sections of config.toml"),
            Self::Capacity { .. } => {
                Some("Depart an existing monitor or raise max_monitors in config.toml")
            }
            Self::InvalidState { .. } => {
                Some("Monitors must signal arrival before a swap-chain can be assigned")
            }
            Self::MonitorNotFound(_) => Some("Run 'vidd modes' to see the configured monitor"),
            Self::Resource(_) => Some("The system is low on threads or memory; retry the assignment"),
            _ => None,
        }
    }
}

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }
}

impl From<toml::de::Error> for ViddError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("Failed to parse config file: {}", err))
    }
}

impl From<toml::ser::Error> for ViddError {
    fn from(err: toml::ser::Error) -> Self {
        Self::Config(format!("Failed to serialize config: {}", err))
    }
}
