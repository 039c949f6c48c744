// Expose the modules
pub mod config;
pub mod events;

// Re-export key types for easier usage
pub use config::{CommandBusConfig, FailurePolicy};
pub use events::{
    AsyncListener, CommandBus, CommandError, CommandResult, EventKey, EventLogger, Listener,
    ListenerError, ListenerFailure, ListenerResult, LoggedEvent, Responder, Subscription,
    TracingListener,
};
