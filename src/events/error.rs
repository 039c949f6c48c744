//--------------------------------------------------------------------------------------------------
// ENUMS
//--------------------------------------------------------------------------------------------------
// | Name            | Description                                      | Key Methods         |
// |-----------------|--------------------------------------------------|---------------------|
// | CommandError    | Errors returned by command bus operations        | as_label            |
// | ListenerError   | Failure raised by a single listener              | from_panic          |
// | ListenerFailure | One failed invocation inside an isolated dispatch|                     |
//--------------------------------------------------------------------------------------------------

use std::any::Any;
use std::fmt;

use thiserror::Error;
use uuid::Uuid;

use super::types::EventKey;

/// Type alias for Result with CommandError
pub type CommandResult<T> = Result<T, CommandError>;

/// Type alias for the value a listener returns
pub type ListenerResult<T = ()> = Result<T, ListenerError>;

/// Errors a listener can report back to the bus
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ListenerError {
    /// The listener rejected or failed to process the event
    #[error("listener failed: {0}")]
    Failed(String),

    /// The listener panicked; the panic was caught at the dispatch boundary
    #[error("listener panicked: {0}")]
    Panicked(String),
}

impl ListenerError {
    /// Shorthand for `ListenerError::Failed`
    pub fn failed(message: impl Into<String>) -> Self {
        ListenerError::Failed(message.into())
    }

    /// Converts a caught panic payload into a listener error.
    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        ListenerError::Panicked(message)
    }
}

impl From<String> for ListenerError {
    fn from(message: String) -> Self {
        ListenerError::Failed(message)
    }
}

impl From<&str> for ListenerError {
    fn from(message: &str) -> Self {
        ListenerError::Failed(message.to_string())
    }
}

/// A single failed listener invocation recorded during an isolated dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerFailure {
    /// Subscription of the listener that failed
    pub subscription: Uuid,
    /// Position of the listener in registration order
    pub position: usize,
    /// What the listener reported
    pub error: ListenerError,
}

impl fmt::Display for ListenerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} ({}): {}", self.position, self.subscription, self.error)
    }
}

/// Errors that can occur in the command system
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum CommandError {
    /// Unlisten was called for a subscription the bus does not hold
    #[error("subscription {subscription} is not registered for {key}")]
    NotRegistered {
        key: EventKey,
        subscription: Uuid,
    },

    /// A registry entry could not be treated as the requested callback shape
    #[error("registry entry for {key} is not a {expected} callback")]
    TypeMismatch {
        key: EventKey,
        expected: &'static str,
    },

    /// A listener failed and delivery to the remaining listeners was aborted
    #[error("listener {subscription} failed while handling {key}: {source}")]
    ListenerFailed {
        key: EventKey,
        subscription: Uuid,
        #[source]
        source: ListenerError,
    },

    /// Every listener was invoked but at least one of them failed
    #[error(
        "{count} of {delivered} listeners failed while handling {key}: [{list}]",
        count = .failures.len(),
        list = join_failures(.failures)
    )]
    DispatchFailed {
        key: EventKey,
        delivered: usize,
        failures: Vec<ListenerFailure>,
    },

    /// A synchronous trigger reached an async listener, which only `trigger_async` can drive
    #[error("{key} has async listener {subscription}; use trigger_async")]
    RequiresAsync {
        key: EventKey,
        subscription: Uuid,
    },

    /// The task an async variant was offloaded to could not be joined
    #[error("offloaded command task failed: {0}")]
    TaskJoin(String),

    /// An async variant needing the blocking pool was awaited outside a tokio runtime
    #[error("no tokio runtime to offload onto: {0}")]
    NoRuntime(String),
}

impl CommandError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            CommandError::NotRegistered { .. } => "not_registered",
            CommandError::TypeMismatch { .. } => "type_mismatch",
            CommandError::ListenerFailed { .. } => "listener_failed",
            CommandError::DispatchFailed { .. } => "dispatch_failed",
            CommandError::RequiresAsync { .. } => "requires_async",
            CommandError::TaskJoin(_) => "task_join",
            CommandError::NoRuntime(_) => "no_runtime",
        }
    }

    /// The key the failed operation targeted, if any.
    pub fn key(&self) -> Option<&EventKey> {
        match self {
            CommandError::NotRegistered { key, .. }
            | CommandError::TypeMismatch { key, .. }
            | CommandError::ListenerFailed { key, .. }
            | CommandError::DispatchFailed { key, .. }
            | CommandError::RequiresAsync { key, .. } => Some(key),
            CommandError::TaskJoin(_) | CommandError::NoRuntime(_) => None,
        }
    }
}

impl From<tokio::task::JoinError> for CommandError {
    fn from(err: tokio::task::JoinError) -> Self {
        CommandError::TaskJoin(err.to_string())
    }
}

impl From<tokio::runtime::TryCurrentError> for CommandError {
    fn from(err: tokio::runtime::TryCurrentError) -> Self {
        CommandError::NoRuntime(err.to_string())
    }
}

fn join_failures(failures: &[ListenerFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
