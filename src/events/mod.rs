//--------------------------------------------------------------------------------------------------
// MODULE OVERVIEW
//--------------------------------------------------------------------------------------------------
// This module implements a typed, in-process command system: callers register callbacks
// against value-type event structs and other callers trigger those events, either
// fire-and-forget (one-way) or collecting one response per registered handler (two-way).
//
// | Component                | Description                                                |
// |--------------------------|-----------------------------------------------------------|
// | CommandBus               | Registration, removal and dispatch of typed callbacks     |
// | EventKey                 | Registry key: payload type or (request, response) pair    |
// | Subscription             | Handle returned by listen and consumed by unlisten        |
// | Listener / Responder     | Traits for one-way and two-way callbacks                  |
// | AsyncListener            | Trait for one-way callbacks that await                    |
// | EventLogger              | Built-in listener keeping a bounded event history         |
// | TracingListener          | Built-in listener reporting events through tracing        |
// | CommandError             | Errors returned by bus operations                         |
//--------------------------------------------------------------------------------------------------

mod bus;
mod error;
mod handlers;
mod registry;
mod types;


// Re-exports
pub use bus::CommandBus;
pub use error::{CommandError, CommandResult, ListenerError, ListenerFailure, ListenerResult};
pub use handlers::{
    AsyncListener, EventLogger, Listener, LoggedEvent, Responder, TracingListener,
};
pub use types::{EventKey, Subscription};
