//! Error types for component lifecycle operations.

use crate::types::ComponentState;
use thiserror::Error;

/// Errors produced by the component manager.
#[derive(Error, Debug)]
pub enum ComponentError {
    /// A component with this name is already registered.
    #[error("component '{name}' already loaded")]
    AlreadyLoaded {
        /// The duplicate name.
        name: String,
    },

    /// No component with this name is registered.
    #[error("component '{name}' not found")]
    NotFound {
        /// The missing name.
        name: String,
    },

    /// The requested state transition is not allowed.
    #[error("invalid state transition {from} -> {to}")]
    LifecycleViolation {
        /// Current state.
        from: ComponentState,
        /// Requested state.
        to: ComponentState,
    },

    /// The component is disabled; only re-enabling is allowed.
    #[error("component '{name}' is disabled")]
    Disabled {
        /// The disabled component.
        name: String,
    },

    /// The module loader could not load or resolve the component's module.
    #[error("module load failed for '{name}': {detail}")]
    ModuleLoad {
        /// Component name.
        name: String,
        /// Loader diagnostic.
        detail: String,
    },

    /// The component instance pool is exhausted.
    #[error("component instance pool exhausted")]
    PoolExhausted,

    /// A bounded operation exceeded its time budget.
    #[error("operation '{operation}' on '{name}' timed out after {millis}ms")]
    Timeout {
        /// Component name.
        name: String,
        /// The operation that expired.
        operation: String,
        /// The configured budget.
        millis: u64,
    },

    /// The load parameters were malformed.
    #[error("invalid load parameters: {0}")]
    InvalidParams(String),

    /// A dependency-graph operation failed.
    #[error(transparent)]
    Graph(#[from] meridian_graph::GraphError),

    /// A file-tracker operation failed.
    #[error(transparent)]
    Tracker(#[from] meridian_tracker::TrackerError),

    /// A version string failed to parse.
    #[error(transparent)]
    Version(#[from] meridian_core::Error),

    /// A background task died before completing.
    #[error("background task failed: {0}")]
    TaskFailed(String),
}

/// Result type for component operations.
pub type Result<T> = std::result::Result<T, ComponentError>;
