//--------------------------------------------------------------------------------------------------
// STRUCTS & TRAITS
//--------------------------------------------------------------------------------------------------
// | Name              | Description                                         | Key Methods     |
// |-------------------|-----------------------------------------------------|-----------------|
// | Listener          | One-way event callback                              | on_event        |
// | AsyncListener     | One-way event callback that awaits                  | on_event        |
// | Responder         | Two-way request callback                            | respond         |
// | EventLogger       | In-memory listener keeping a bounded history        | history         |
// | TracingListener   | Listener that reports dispatched events to tracing  | on_event        |
//--------------------------------------------------------------------------------------------------

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tracing::debug;

use super::error::ListenerResult;

/// Callback invoked for every one-way event of type `E`.
///
/// Any `Fn(&E) -> ListenerResult` closure that is `Send + Sync` is a listener.
pub trait Listener<E>: Send + Sync + 'static {
    /// Processes an event
    fn on_event(&self, event: &E) -> ListenerResult;
}

impl<E, F> Listener<E> for F
where
    F: Fn(&E) -> ListenerResult + Send + Sync + 'static,
{
    fn on_event(&self, event: &E) -> ListenerResult {
        self(event)
    }
}

/// Callback invoked for every one-way event of type `E` that has to await before it is done.
///
/// Async listeners are ordered together with the synchronous listeners of the same event
/// type, but only `CommandBus::trigger_async` can drive them.
#[async_trait]
pub trait AsyncListener<E>: Send + Sync + 'static {
    /// Processes an event
    async fn on_event(&self, event: &E) -> ListenerResult;
}

/// Callback invoked for every two-way request of type `Req`, producing a `Resp`.
///
/// Any `Fn(&Req) -> ListenerResult<Resp>` closure that is `Send + Sync` is a responder.
pub trait Responder<Req, Resp>: Send + Sync + 'static {
    /// Produces this responder's answer to the request
    fn respond(&self, request: &Req) -> ListenerResult<Resp>;
}

impl<Req, Resp, F> Responder<Req, Resp> for F
where
    F: Fn(&Req) -> ListenerResult<Resp> + Send + Sync + 'static,
{
    fn respond(&self, request: &Req) -> ListenerResult<Resp> {
        self(request)
    }
}

/// Entry in an [`EventLogger`] history
#[derive(Debug, Clone, Serialize)]
pub struct LoggedEvent<E> {
    /// The event as delivered
    pub event: E,
    /// When the logger received it
    pub received_at: DateTime<Utc>,
}

/// A simple in-memory event logger for debugging.
///
/// Cloning the logger yields another handle onto the same history, so one clone can be
/// registered on the bus while the other is kept for inspection.
pub struct EventLogger<E> {
    /// Maximum number of events to keep in history
    max_history: usize,
    /// Event history, oldest first
    history: Arc<RwLock<VecDeque<LoggedEvent<E>>>>,
}

impl<E> Clone for EventLogger<E> {
    fn clone(&self) -> Self {
        Self {
            max_history: self.max_history,
            history: Arc::clone(&self.history),
        }
    }
}

impl<E: Clone> EventLogger<E> {
    /// Creates a new event logger. A `max_history` of zero is clamped to one.
    pub fn new(max_history: usize) -> Self {
        let max_history = max_history.max(1);
        Self {
            max_history,
            history: Arc::new(RwLock::new(VecDeque::with_capacity(max_history))),
        }
    }

    /// Returns the recorded events, oldest first
    pub fn history(&self) -> Vec<LoggedEvent<E>> {
        self.history.read().iter().cloned().collect()
    }

    /// Returns only the event payloads, oldest first
    pub fn events(&self) -> Vec<E> {
        self.history.read().iter().map(|logged| logged.event.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.history.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.read().is_empty()
    }

    pub fn clear(&self) {
        self.history.write().clear();
    }
}

impl<E> Listener<E> for EventLogger<E>
where
    E: Clone + Send + Sync + 'static,
{
    fn on_event(&self, event: &E) -> ListenerResult {
        let mut history = self.history.write();

        // Remove oldest event if at capacity
        if history.len() >= self.max_history {
            history.pop_front();
        }

        history.push_back(LoggedEvent {
            event: event.clone(),
            received_at: Utc::now(),
        });

        Ok(())
    }
}

/// Listener that reports each event it sees through `tracing` at debug level.
///
/// Register one per event type an application wants to observe.
#[derive(Debug, Clone)]
pub struct TracingListener {
    label: &'static str,
}

impl TracingListener {
    pub fn new(label: &'static str) -> Self {
        Self { label }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }
}

impl Default for TracingListener {
    fn default() -> Self {
        Self::new("command_system")
    }
}

impl<E> Listener<E> for TracingListener
where
    E: fmt::Debug + 'static,
{
    fn on_event(&self, event: &E) -> ListenerResult {
        debug!(listener = self.label, event = ?event, "event observed");
        Ok(())
    }
}

/// Wraps an infallible one-way closure into a listener.
pub(crate) fn infallible<E, F>(f: F) -> impl Listener<E>
where
    E: 'static,
    F: Fn(&E) + Send + Sync + 'static,
{
    move |event: &E| -> ListenerResult {
        f(event);
        Ok(())
    }
}

/// Wraps an infallible two-way closure into a responder.
pub(crate) fn infallible_responder<Req, Resp, F>(f: F) -> impl Responder<Req, Resp>
where
    Req: 'static,
    Resp: 'static,
    F: Fn(&Req) -> Resp + Send + Sync + 'static,
{
    move |request: &Req| -> ListenerResult<Resp> { Ok(f(request)) }
}

/// Async listener built from a closure that takes its own copy of the event
pub(crate) struct OwnedEventTask<F>(F);

#[async_trait]
impl<E, F, Fut> AsyncListener<E> for OwnedEventTask<F>
where
    E: Clone + Send + Sync + 'static,
    F: Fn(E) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ListenerResult> + Send + 'static,
{
    async fn on_event(&self, event: &E) -> ListenerResult {
        (self.0)(event.clone()).await
    }
}

/// Wraps a closure returning a future into an async listener.
pub(crate) fn owned_task<E, F, Fut>(f: F) -> impl AsyncListener<E>
where
    E: Clone + Send + Sync + 'static,
    F: Fn(E) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ListenerResult> + Send + 'static,
{
    OwnedEventTask(f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ListenerError;

    #[derive(Debug, Clone, PartialEq, Serialize)]
    struct Tick(u32);

    #[test]
    fn test_event_logger_evicts_oldest() {
        let logger: EventLogger<Tick> = EventLogger::new(2);
        for i in 0..3 {
            logger.on_event(&Tick(i)).unwrap();
        }

        assert_eq!(logger.len(), 2);
        assert_eq!(logger.events(), vec![Tick(1), Tick(2)]);
    }

    #[test]
    fn test_event_logger_clones_share_history() {
        let logger: EventLogger<Tick> = EventLogger::new(10);
        let registered = logger.clone();
        registered.on_event(&Tick(7)).unwrap();

        let history = logger.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].event, Tick(7));
        assert!(history[0].received_at <= Utc::now());

        logger.clear();
        assert!(registered.is_empty());
    }

    #[test]
    fn test_closures_are_listeners_and_responders() {
        let listener = |event: &Tick| -> ListenerResult {
            if event.0 == 0 { Err("zero".into()) } else { Ok(()) }
        };
        assert!(listener.on_event(&Tick(1)).is_ok());
        assert_eq!(listener.on_event(&Tick(0)), Err(ListenerError::failed("zero")));

        let doubler = infallible_responder(|req: &Tick| req.0 * 2);
        assert_eq!(doubler.respond(&Tick(21)), Ok(42));
    }

    #[test]
    fn test_logged_events_serialize_with_timestamp() {
        let logger: EventLogger<Tick> = EventLogger::new(4);
        logger.on_event(&Tick(9)).unwrap();

        let json = serde_json::to_value(logger.history()).unwrap();
        assert_eq!(json[0]["event"], 9);
        assert!(json[0]["received_at"].is_string());
    }

    #[test]
    fn test_owned_task_receives_a_copy() {
        let doubled = Arc::new(RwLock::new(Vec::new()));
        let sink = Arc::clone(&doubled);
        let task = owned_task(move |tick: Tick| {
            let sink = Arc::clone(&sink);
            async move {
                sink.write().push(tick.0 * 2);
                Ok::<(), ListenerError>(())
            }
        });

        futures::executor::block_on(AsyncListener::<Tick>::on_event(&task, &Tick(4))).unwrap();
        assert_eq!(*doubled.read(), vec![8]);
    }

    #[test]
    fn test_tracing_listener_never_fails() {
        let listener = TracingListener::new("test");
        assert_eq!(listener.label(), "test");
        assert!(Listener::<Tick>::on_event(&listener, &Tick(3)).is_ok());
    }
}
