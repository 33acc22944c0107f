//! Component lifecycle states, events and options.

use crate::error::{ComponentError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a component.
///
/// The integer encoding is stable and used in serialized component info.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComponentState {
    /// Created but not yet initialized.
    Created = 0,
    /// Initialized and ready to run.
    Initialized = 1,
    /// Currently running.
    Running = 2,
    /// Paused.
    Paused = 3,
    /// Stopped.
    Stopped = 4,
    /// In an error state; unload or disable to leave it.
    Error = 5,
    /// Being unloaded.
    Unloading = 6,
    /// Disabled; blocks every transition until re-enabled.
    Disabled = 7,
}

impl ComponentState {
    /// The stable integer encoding.
    #[must_use]
    pub fn code(self) -> i32 {
        self as i32
    }
}

impl fmt::Display for ComponentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Initialized => "initialized",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Stopped => "stopped",
            Self::Error => "error",
            Self::Unloading => "unloading",
            Self::Disabled => "disabled",
        };
        write!(f, "{name}")
    }
}

/// Events emitted over a component's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComponentEvent {
    /// About to load.
    PreLoad,
    /// Finished loading.
    PostLoad,
    /// About to unload.
    PreUnload,
    /// Finished unloading.
    PostUnload,
    /// Configuration was replaced.
    ConfigChanged,
    /// Lifecycle state changed.
    StateChanged,
    /// An operation failed.
    Error,
    /// Dependency resolution completed.
    DependencyResolved,
    /// Periodic health check.
    HealthCheck,
}

/// Per-component configuration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ComponentOptions {
    /// Start automatically after load.
    pub auto_start: bool,
    /// Defer loading until first use.
    pub lazy: bool,
    /// Scheduling priority; higher loads earlier in batches.
    pub priority: i32,
    /// Group membership.
    pub group: String,
    /// Free-form component configuration.
    pub config: serde_json::Value,
    /// Budget for load/start operations, in milliseconds.
    pub timeout_ms: u64,
    /// Restart automatically after an error.
    pub restart_on_error: bool,
    /// Retry budget for failed operations.
    pub max_retries: u32,
}

impl Default for ComponentOptions {
    fn default() -> Self {
        Self {
            auto_start: true,
            lazy: false,
            priority: 0,
            group: String::new(),
            config: serde_json::Value::Null,
            timeout_ms: 30_000,
            restart_on_error: false,
            max_retries: 3,
        }
    }
}

/// Validate a lifecycle transition.
///
/// The machine is `Created -> Initialized -> Running <-> Paused -> Stopped`,
/// with `Stopped -> Running` restart, `Running -> Running` resume
/// re-entry, any state able to fall into `Error` or leave via `Unloading`,
/// and `Disabled` blocking everything until an explicit re-enable
/// (`Disabled -> Created`).
///
/// # Errors
/// [`ComponentError::LifecycleViolation`] when the transition is not
/// permitted.
pub fn validate_transition(from: ComponentState, to: ComponentState) -> Result<()> {
    use ComponentState as S;

    let valid = match (from, to) {
        // Disabled blocks everything except explicit re-enable.
        (S::Disabled, S::Created) => true,
        (S::Disabled, _) => false,
        // Any live state may be disabled, fail, or begin unloading.
        (_, S::Disabled | S::Error | S::Unloading) => true,

        (S::Created, S::Initialized) => true,
        (S::Initialized, S::Running) => true,
        (S::Running, S::Paused | S::Stopped | S::Running) => true,
        (S::Paused, S::Running | S::Stopped) => true,
        (S::Stopped, S::Running) => true,

        _ => false,
    };

    if valid {
        Ok(())
    } else {
        Err(ComponentError::LifecycleViolation { from, to })
    }
}
