//! Error types for the campaign lifecycle engine
//!
//! Failure categories:
//! - **Input errors**: invalid caller input, surfaced and never retried
//! - **Readiness errors**: launch attempted from the wrong status
//! - **Transient external errors**: network/5xx/timeouts, retried by the job scheduler
//! - **Permanent external errors**: 4xx/schema mismatch, surfaced without retry
//! - **State errors**: forbidden state-machine transitions (logic bug or race)
//! - **Agent schema errors**: handled locally by pipeline degradation

use thiserror::Error;

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Error types for the campaign engine
#[derive(Error, Debug)]
pub enum EngineError {
    /// Invalid caller input
    #[error("Invalid input: {reason}")]
    InvalidInput {
        /// Reason the input was rejected
        reason: String,
    },

    /// Campaign already has schedules registered
    #[error("Campaign already exists: {name}")]
    CampaignExists {
        /// Campaign name that collided
        name: String,
    },

    /// Campaign not found
    #[error("Campaign not found: {name}")]
    CampaignNotFound {
        /// Campaign name that was looked up
        name: String,
    },

    /// Schedule not found
    #[error("Schedule not found: {schedule_id}")]
    ScheduleNotFound {
        /// Schedule ID that was looked up
        schedule_id: String,
    },

    /// Launch attempted on a round that is not READY
    #[error("Schedule {schedule_id} is not ready to launch (status: {status})")]
    NotReady {
        /// Schedule ID
        schedule_id: String,
        /// Status the round was in
        status: String,
    },

    /// Metrics collection attempted before launch
    #[error("Schedule {schedule_id} has not launched: no external campaign id")]
    NotLaunched {
        /// Schedule ID
        schedule_id: String,
    },

    /// Forbidden state-machine transition
    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition {
        /// Source status
        from: String,
        /// Target status
        to: String,
    },

    /// Recoverable failure from an external collaborator (network, 5xx, timeout)
    #[error("Transient external error: {message}")]
    Transient {
        /// Failure description
        message: String,
    },

    /// Unrecoverable failure from an external collaborator (4xx, contract violation)
    #[error("Permanent external error: {message}")]
    Permanent {
        /// Failure description
        message: String,
    },

    /// Language-model response failed structural validation
    #[error("Agent '{agent}' returned a malformed response: {reason}")]
    AgentSchema {
        /// Agent that produced the response
        agent: String,
        /// Validation failure
        reason: String,
    },

    /// Agent or stage deadline exceeded
    #[error("Deadline exceeded during {operation}")]
    DeadlineExceeded {
        /// Operation that ran over budget
        operation: String,
    },

    /// Persistence failure
    #[error("Storage error: {message}")]
    Storage {
        /// Underlying failure
        message: String,
    },

    /// Configuration error
    #[error("Configuration error: {reason}")]
    Config {
        /// What was wrong with the configuration
        reason: String,
    },

    /// Internal invariant violation
    #[error("Internal error: {message}")]
    Internal {
        /// Invariant that broke
        message: String,
    },
}

impl EngineError {
    /// Whether the job scheduler should retry the operation that produced this error.
    ///
    /// Deadline overruns count as transient per the retry accounting rules; storage
    /// failures are retried because the store is an external collaborator.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::Transient { .. }
                | EngineError::DeadlineExceeded { .. }
                | EngineError::Storage { .. }
        )
    }

    /// Shorthand for a transient external error
    pub fn transient(message: impl Into<String>) -> Self {
        EngineError::Transient {
            message: message.into(),
        }
    }

    /// Shorthand for a permanent external error
    pub fn permanent(message: impl Into<String>) -> Self {
        EngineError::Permanent {
            message: message.into(),
        }
    }

    /// Shorthand for a storage error
    pub fn storage(message: impl std::fmt::Display) -> Self {
        EngineError::Storage {
            message: message.to_string(),
        }
    }
}
