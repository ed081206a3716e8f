//! Error types for epidrive.
//!
//! All errors are strongly typed using thiserror, layered as a small set of
//! fine-grained enums folded into one top-level [`DriverError`]. This enables
//! pattern matching on specific error conditions and provides clear error
//! messages at the protocol boundary.

use thiserror::Error;

/// Errors raised while validating a run configuration or its policy list.
///
/// These are fatal for the `INIT` that carried them: the driver surfaces the
/// error to the consumer and does not start a run.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    /// The engine rejected the supplied configuration.
    #[error("engine rejected configuration: {reason}")]
    EngineRejected {
        /// Engine-supplied rejection reason.
        reason: String,
    },

    /// A trigger names a variable that is neither `time` nor a known counter
    /// category.
    #[error("unknown trigger variable '{variable}'")]
    UnknownTriggerVariable {
        /// The offending variable name.
        variable: String,
    },

    /// `==` used on a variable that does not advance in unit steps.
    ///
    /// Discrete stepping can cross any other variable between two ticks, so
    /// equality there would silently never fire.
    #[error("operator '==' is only valid for unit-step variables, not '{variable}'")]
    EqualityOnNonUnitVariable {
        /// The offending variable name.
        variable: String,
    },

    /// A shutdown specification could not be interpreted.
    #[error("invalid shutdown specification: {reason}")]
    InvalidShutdown {
        /// Why the specification was rejected.
        reason: String,
    },
}

/// Errors crossing the consumer/driver channel boundary.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProtocolError {
    /// The peer end of a channel is gone.
    #[error("channel disconnected: {channel}")]
    Disconnected {
        /// Which channel observed the disconnect.
        channel: String,
    },

    /// Waited too long for an event.
    #[error("timed out after {duration_ms}ms waiting for an event")]
    Timeout {
        /// The timeout that elapsed.
        duration_ms: u64,
    },
}

/// Top-level error type for epidrive.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DriverError {
    /// Configuration or policy validation failure.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Channel-level failure.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl DriverError {
    /// Returns true if this is a configuration error.
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Returns true if this is a protocol error.
    #[must_use]
    pub const fn is_protocol(&self) -> bool {
        matches!(self, Self::Protocol(_))
    }
}

/// Result type alias for epidrive operations.
pub type DriverResult<T> = Result<T, DriverError>;
