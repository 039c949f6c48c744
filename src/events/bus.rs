//--------------------------------------------------------------------------------------------------
// MODULE OVERVIEW
//--------------------------------------------------------------------------------------------------
// This module implements the command bus: typed one-way (notify) and two-way (request/response)
// dispatch over two registries guarded by a parking_lot RwLock.
//
// | Component     | Description                                                 |
// |---------------|-------------------------------------------------------------|
// | CommandBus    | Registration, removal and dispatch of typed callbacks       |
//
//--------------------------------------------------------------------------------------------------
// STRUCTS
//--------------------------------------------------------------------------------------------------
// | Name          | Description                                   | Key Methods                   |
// |---------------|-----------------------------------------------|-------------------------------|
// | CommandBus    | Cloneable handle onto shared registries       | listen, unlisten, trigger     |
// | Registries    | One-way and two-way registries                |                               |
//
//--------------------------------------------------------------------------------------------------

use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::FutureExt;
use parking_lot::RwLock;
use tokio::runtime::Handle;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::config::{CommandBusConfig, FailurePolicy};

use super::error::{CommandError, CommandResult, ListenerError, ListenerFailure, ListenerResult};
use super::handlers::{self, AsyncListener, Listener, Responder};
use super::registry::{Entry, Registry};
use super::types::{Callback, EventKey, Subscription};

/// Inner state shared between all clones of the bus
#[derive(Default)]
struct Registries {
    one_way: Registry,
    two_way: Registry,
}

impl Registries {
    fn for_key(&self, key: &EventKey) -> &Registry {
        if key.is_two_way() { &self.two_way } else { &self.one_way }
    }

    fn for_key_mut(&mut self, key: &EventKey) -> &mut Registry {
        if key.is_two_way() { &mut self.two_way } else { &mut self.one_way }
    }
}

/// In-process typed event bus.
///
/// Listeners are registered against a payload type and invoked, in registration order, every
/// time an event of that type is triggered. Two-way listeners (responders) produce a value
/// for each request; `trigger_request` collects them in registration order.
///
/// The bus is a cheap-to-clone handle: every clone sees the same registries, so it can be
/// handed to producers, consumers and spawned tasks alike.
///
/// # Examples
///
/// ```
/// use command_system::CommandBus;
///
/// #[derive(Debug, Clone)]
/// struct Damage(u32);
///
/// let bus = CommandBus::default();
/// let sub = bus.listen_fn(|damage: &Damage| println!("took {} damage", damage.0));
/// bus.trigger(Damage(3)).unwrap();
///
/// let doubled = bus.listen_request_fn(|damage: &Damage| damage.0 * 2);
/// assert_eq!(bus.trigger_request::<Damage, u32>(Damage(4)).unwrap(), vec![8]);
///
/// bus.unlisten(sub).unwrap();
/// bus.unlisten(doubled).unwrap();
/// ```
#[derive(Clone)]
pub struct CommandBus {
    inner: Arc<RwLock<Registries>>,
    // Sequence counter for dispatch tracing
    sequence_counter: Arc<AtomicU64>,
    config: Arc<CommandBusConfig>,
}

impl Default for CommandBus {
    fn default() -> Self {
        Self::new(CommandBusConfig::default())
    }
}

impl std::fmt::Debug for CommandBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("CommandBus")
            .field("name", &self.config.name)
            .field("failure_policy", &self.config.failure_policy)
            .field("one_way_listeners", &inner.one_way.total())
            .field("two_way_listeners", &inner.two_way.total())
            .finish()
    }
}

impl CommandBus {
    /// Creates a new, empty bus
    pub fn new(config: CommandBusConfig) -> Self {
        info!(
            "Created new CommandBus '{}' with failure policy: {}",
            config.name, config.failure_policy
        );
        Self {
            inner: Arc::new(RwLock::new(Registries::default())),
            sequence_counter: Arc::new(AtomicU64::new(1)),
            config: Arc::new(config),
        }
    }

    /// Creates a new bus configured from the environment
    pub fn from_env() -> Self {
        Self::new(CommandBusConfig::from_env())
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &CommandBusConfig {
        &self.config
    }

    //----------------------------------------------------------------------------------------------
    // Listen
    //----------------------------------------------------------------------------------------------

    /// Registers a one-way listener for events of type `E`.
    ///
    /// No uniqueness check is made: registering the same behavior twice yields two
    /// subscriptions and two invocations per trigger.
    pub fn listen<E, L>(&self, listener: L) -> Subscription
    where
        E: 'static,
        L: Listener<E>,
    {
        self.register(EventKey::one_way::<E>(), Callback::notify::<E>(Box::new(listener)))
    }

    /// Registers an infallible closure as a one-way listener for `E`
    pub fn listen_fn<E, F>(&self, f: F) -> Subscription
    where
        E: 'static,
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.listen::<E, _>(handlers::infallible(f))
    }

    /// Registers a fallible closure as a one-way listener for `E`
    pub fn try_listen_fn<E, F>(&self, f: F) -> Subscription
    where
        E: 'static,
        F: Fn(&E) -> ListenerResult + Send + Sync + 'static,
    {
        self.listen::<E, _>(f)
    }

    /// Registers an async one-way listener for `E`.
    ///
    /// It takes its place in the same registration order as synchronous listeners for `E`.
    /// While it is registered, only [`trigger_async`](Self::trigger_async) can deliver `E`;
    /// [`trigger`](Self::trigger) reports `CommandError::RequiresAsync`.
    pub fn listen_task<E, L>(&self, listener: L) -> Subscription
    where
        E: 'static,
        L: AsyncListener<E>,
    {
        self.register(EventKey::one_way::<E>(), Callback::task::<E>(Box::new(listener)))
    }

    /// Registers a closure returning a future as an async listener for `E`. The closure
    /// receives its own clone of each event.
    pub fn listen_task_fn<E, F, Fut>(&self, f: F) -> Subscription
    where
        E: Clone + Send + Sync + 'static,
        F: Fn(E) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ListenerResult> + Send + 'static,
    {
        self.listen_task::<E, _>(handlers::owned_task(f))
    }

    /// Registers a two-way responder answering `Req` requests with `Resp`.
    ///
    /// Responders are keyed by the (request, response) pair: a `Req -> A` responder is never
    /// consulted by `trigger_request::<Req, B>`.
    pub fn listen_request<Req, Resp, R>(&self, responder: R) -> Subscription
    where
        Req: 'static,
        Resp: 'static,
        R: Responder<Req, Resp>,
    {
        self.register(
            EventKey::two_way::<Req, Resp>(),
            Callback::respond::<Req, Resp>(Box::new(responder)),
        )
    }

    /// Registers an infallible closure as a two-way responder
    pub fn listen_request_fn<Req, Resp, F>(&self, f: F) -> Subscription
    where
        Req: 'static,
        Resp: 'static,
        F: Fn(&Req) -> Resp + Send + Sync + 'static,
    {
        self.listen_request::<Req, Resp, _>(handlers::infallible_responder(f))
    }

    /// Registers a fallible closure as a two-way responder
    pub fn try_listen_request_fn<Req, Resp, F>(&self, f: F) -> Subscription
    where
        Req: 'static,
        Resp: 'static,
        F: Fn(&Req) -> ListenerResult<Resp> + Send + Sync + 'static,
    {
        self.listen_request::<Req, Resp, _>(f)
    }

    fn register(&self, key: EventKey, callback: Callback) -> Subscription {
        let subscription = Subscription::new(key);
        let kind = callback.kind();

        let count = {
            let mut inner = self.inner.write();
            let registry = inner.for_key_mut(&key);
            registry.insert(key, subscription.id(), callback);
            registry.len(&key)
        };

        debug!(
            bus = %self.config.name,
            subscription = %subscription.id(),
            "Registered {} callback for {} (total: {})",
            kind, key, count
        );

        subscription
    }

    //----------------------------------------------------------------------------------------------
    // Unlisten
    //----------------------------------------------------------------------------------------------

    /// Removes the callback registered under `subscription`.
    ///
    /// # Errors
    ///
    /// `CommandError::NotRegistered` if this bus has no sequence for the subscription's key or
    /// the subscription is not in it (already removed, or issued by another bus).
    pub fn unlisten(&self, subscription: Subscription) -> CommandResult<()> {
        let key = subscription.key();
        let result = self.inner.write().for_key_mut(&key).remove(key, subscription.id());

        match &result {
            Ok(()) => debug!(
                bus = %self.config.name,
                subscription = %subscription.id(),
                "Removed callback for {}", key
            ),
            Err(e) => warn!(bus = %self.config.name, "Failed to unlisten: {}", e),
        }

        result
    }

    /// Removes every one-way listener for `E`, returning how many were removed
    pub fn clear_listeners<E: 'static>(&self) -> usize {
        self.clear_key(EventKey::one_way::<E>())
    }

    /// Removes every responder for (`Req`, `Resp`), returning how many were removed
    pub fn clear_request_listeners<Req: 'static, Resp: 'static>(&self) -> usize {
        self.clear_key(EventKey::two_way::<Req, Resp>())
    }

    fn clear_key(&self, key: EventKey) -> usize {
        let removed = self.inner.write().for_key_mut(&key).clear_key(&key);
        debug!(bus = %self.config.name, "Cleared {} callbacks for {}", removed, key);
        removed
    }

    /// Removes every callback from both registries, returning how many were removed
    pub fn clear(&self) -> usize {
        let removed = {
            let mut inner = self.inner.write();
            inner.one_way.clear() + inner.two_way.clear()
        };
        debug!(bus = %self.config.name, "Cleared all {} callbacks", removed);
        removed
    }

    //----------------------------------------------------------------------------------------------
    // Trigger
    //----------------------------------------------------------------------------------------------

    /// Delivers `event` to every one-way listener for `E`, in registration order.
    ///
    /// With no listeners registered this is a no-op that returns `Ok(())`.
    ///
    /// # Errors
    ///
    /// Depends on the configured [`FailurePolicy`]:
    /// * `FailFast` - the first failing listener stops delivery and its error is returned as
    ///   `CommandError::ListenerFailed`.
    /// * `ContinueOnError` - every listener is invoked; failures are collected into
    ///   `CommandError::DispatchFailed`.
    ///
    /// `CommandError::RequiresAsync` if an async listener is registered for `E`; nothing is
    /// delivered in that case.
    pub fn trigger<E: 'static>(&self, event: E) -> CommandResult<()> {
        let key = EventKey::one_way::<E>();
        let Some((sequence, entries)) = self.begin_dispatch(&key) else {
            return Ok(());
        };

        self.notify_all(key, sequence, &entries, &event)
    }

    /// Delivers one event to a snapshot made of synchronous listeners only
    fn notify_all<E: 'static>(
        &self,
        key: EventKey,
        sequence: u64,
        entries: &[Entry],
        event: &E,
    ) -> CommandResult<()> {
        if let Some(entry) = entries.iter().find(|entry| entry.callback.is_task()) {
            warn!(
                bus = %self.config.name,
                subscription = %entry.id,
                "Synchronous trigger of {} reached an async listener", key
            );
            return Err(CommandError::RequiresAsync { key, subscription: entry.id });
        }

        let mut failures = Vec::new();
        for (position, entry) in entries.iter().enumerate() {
            let listener = entry.callback.as_notify::<E>(key)?;
            trace!(sequence, position, subscription = %entry.id, "Notifying listener for {}", key);

            if let Err(error) = guarded(|| listener.0.on_event(event)) {
                self.on_failure(key, entry.id, position, error, &mut failures)?;
            }
        }

        self.finish_dispatch(key, sequence, entries.len(), failures)
    }

    /// Delivers one event to a snapshot holding at least one async listener. Synchronous
    /// listeners run inline; async ones are awaited in turn.
    async fn notify_all_async<E>(
        &self,
        key: EventKey,
        sequence: u64,
        entries: &[Entry],
        event: &E,
    ) -> CommandResult<()>
    where
        E: Sync + 'static,
    {
        let mut failures = Vec::new();
        for (position, entry) in entries.iter().enumerate() {
            trace!(sequence, position, subscription = %entry.id, "Notifying listener for {}", key);

            let outcome = if entry.callback.is_task() {
                let listener = entry.callback.as_task::<E>(key)?;
                guarded_async(listener.0.on_event(event)).await
            } else {
                let listener = entry.callback.as_notify::<E>(key)?;
                guarded(|| listener.0.on_event(event))
            };

            if let Err(error) = outcome {
                self.on_failure(key, entry.id, position, error, &mut failures)?;
            }
        }

        self.finish_dispatch(key, sequence, entries.len(), failures)
    }

    /// Sends `request` to every responder for (`Req`, `Resp`) and collects their answers.
    ///
    /// The i-th element of the result is the answer of the i-th registered responder. With no
    /// responders registered the result is an empty vector.
    ///
    /// # Errors
    ///
    /// As for [`trigger`](Self::trigger). A failed request never returns partial results.
    pub fn trigger_request<Req: 'static, Resp: 'static>(
        &self,
        request: Req,
    ) -> CommandResult<Vec<Resp>> {
        let key = EventKey::two_way::<Req, Resp>();
        let Some((sequence, entries)) = self.begin_dispatch(&key) else {
            return Ok(Vec::new());
        };

        let mut responses = Vec::with_capacity(entries.len());
        let mut failures = Vec::new();
        for (position, entry) in entries.iter().enumerate() {
            let responder = entry.callback.as_respond::<Req, Resp>(key)?;
            trace!(sequence, position, subscription = %entry.id, "Requesting response for {}", key);

            match guarded(|| responder.0.respond(&request)) {
                Ok(response) => responses.push(response),
                Err(error) => self.on_failure(key, entry.id, position, error, &mut failures)?,
            }
        }

        self.finish_dispatch(key, sequence, entries.len(), failures)?;
        Ok(responses)
    }

    /// Takes a snapshot of the key's callbacks. `None` when there is nothing to dispatch to.
    ///
    /// The read lock is released before any callback runs, so callbacks may listen or
    /// unlisten (themselves included) without affecting the dispatch in progress.
    fn begin_dispatch(&self, key: &EventKey) -> Option<(u64, Vec<Entry>)> {
        let entries = self.inner.read().for_key(key).snapshot(key);
        if entries.is_empty() {
            debug!(bus = %self.config.name, "No listeners for event: {}", key);
            return None;
        }

        let sequence = self.sequence_counter.fetch_add(1, Ordering::SeqCst);
        debug!(
            bus = %self.config.name,
            sequence,
            "Dispatching {} to {} listeners", key, entries.len()
        );
        Some((sequence, entries))
    }

    /// Applies the failure policy to one failed invocation
    fn on_failure(
        &self,
        key: EventKey,
        subscription: Uuid,
        position: usize,
        error: ListenerError,
        failures: &mut Vec<ListenerFailure>,
    ) -> CommandResult<()> {
        warn!(
            bus = %self.config.name,
            %subscription,
            position,
            "Listener failed while handling {}: {}", key, error
        );

        match self.config.failure_policy {
            FailurePolicy::FailFast => Err(CommandError::ListenerFailed {
                key,
                subscription,
                source: error,
            }),
            FailurePolicy::ContinueOnError => {
                failures.push(ListenerFailure { subscription, position, error });
                Ok(())
            }
        }
    }

    fn finish_dispatch(
        &self,
        key: EventKey,
        sequence: u64,
        delivered: usize,
        failures: Vec<ListenerFailure>,
    ) -> CommandResult<()> {
        if failures.is_empty() {
            trace!(sequence, "Dispatch of {} complete", key);
            return Ok(());
        }

        Err(CommandError::DispatchFailed { key, delivered, failures })
    }

    //----------------------------------------------------------------------------------------------
    // Introspection
    //----------------------------------------------------------------------------------------------

    /// Returns the number of one-way listeners registered for `E`
    pub fn listener_count<E: 'static>(&self) -> usize {
        let key = EventKey::one_way::<E>();
        self.inner.read().one_way.len(&key)
    }

    /// Returns the number of responders registered for (`Req`, `Resp`)
    pub fn request_listener_count<Req: 'static, Resp: 'static>(&self) -> usize {
        let key = EventKey::two_way::<Req, Resp>();
        self.inner.read().two_way.len(&key)
    }

    /// True if no callback of either kind is registered
    pub fn is_empty(&self) -> bool {
        let inner = self.inner.read();
        inner.one_way.total() == 0 && inner.two_way.total() == 0
    }

    //----------------------------------------------------------------------------------------------
    // Async variants
    //----------------------------------------------------------------------------------------------

    // Every async variant needs a tokio runtime; awaited elsewhere it fails with
    // `CommandError::NoRuntime`.

    /// Async form of [`listen`](Self::listen); the registration runs on the blocking pool.
    ///
    /// # Errors
    ///
    /// `CommandError::NoRuntime` outside a tokio runtime.
    pub async fn listen_async<E, L>(&self, listener: L) -> CommandResult<Subscription>
    where
        E: 'static,
        L: Listener<E>,
    {
        let bus = self.clone();
        offload(move || Ok(bus.listen::<E, L>(listener))).await
    }

    /// Async form of [`listen_request`](Self::listen_request)
    ///
    /// # Errors
    ///
    /// `CommandError::NoRuntime` outside a tokio runtime.
    pub async fn listen_request_async<Req, Resp, R>(
        &self,
        responder: R,
    ) -> CommandResult<Subscription>
    where
        Req: 'static,
        Resp: 'static,
        R: Responder<Req, Resp>,
    {
        let bus = self.clone();
        offload(move || Ok(bus.listen_request::<Req, Resp, R>(responder))).await
    }

    /// Async form of [`unlisten`](Self::unlisten); fails exactly when the sync form would
    ///
    /// # Errors
    ///
    /// As for [`unlisten`](Self::unlisten), plus `CommandError::NoRuntime` outside a tokio
    /// runtime.
    pub async fn unlisten_async(&self, subscription: Subscription) -> CommandResult<()> {
        let bus = self.clone();
        offload(move || bus.unlisten(subscription)).await
    }

    /// Async form of [`trigger`](Self::trigger), in registration order and under the same
    /// failure policy.
    ///
    /// When only synchronous listeners are registered the dispatch runs on the blocking pool.
    /// Otherwise it runs on the awaiting task: synchronous listeners are called inline and
    /// each async listener is awaited before the next listener starts.
    ///
    /// # Errors
    ///
    /// As for [`trigger`](Self::trigger), except that async listeners are delivered to rather
    /// than reported. `CommandError::NoRuntime` outside a tokio runtime, before any listener
    /// runs.
    pub async fn trigger_async<E>(&self, event: E) -> CommandResult<()>
    where
        E: Send + Sync + 'static,
    {
        let handle = Handle::try_current()?;
        let key = EventKey::one_way::<E>();
        let Some((sequence, entries)) = self.begin_dispatch(&key) else {
            return Ok(());
        };

        if entries.iter().any(|entry| entry.callback.is_task()) {
            return self.notify_all_async(key, sequence, &entries, &event).await;
        }

        let bus = self.clone();
        handle
            .spawn_blocking(move || bus.notify_all(key, sequence, &entries, &event))
            .await?
    }

    /// Async form of [`trigger_request`](Self::trigger_request).
    ///
    /// A responder that needs to await can return a future as its `Resp`; the caller then
    /// awaits the collected futures, which stay in registration order.
    ///
    /// # Errors
    ///
    /// As for [`trigger_request`](Self::trigger_request), plus `CommandError::NoRuntime`
    /// outside a tokio runtime.
    pub async fn trigger_request_async<Req, Resp>(&self, request: Req) -> CommandResult<Vec<Resp>>
    where
        Req: Send + 'static,
        Resp: Send + 'static,
    {
        let bus = self.clone();
        offload(move || bus.trigger_request::<Req, Resp>(request)).await
    }
}

/// Runs `f` on the current tokio runtime's blocking pool
async fn offload<T, F>(f: F) -> CommandResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> CommandResult<T> + Send + 'static,
{
    let handle = Handle::try_current()?;
    handle.spawn_blocking(f).await?
}

/// Runs one listener invocation, turning a panic into `ListenerError::Panicked`.
fn guarded<T>(f: impl FnOnce() -> ListenerResult<T>) -> ListenerResult<T> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(ListenerError::from_panic(payload)),
    }
}

/// Awaits one async listener invocation, turning a panic into `ListenerError::Panicked`.
async fn guarded_async<T>(f: impl Future<Output = ListenerResult<T>>) -> ListenerResult<T> {
    match AssertUnwindSafe(f).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(ListenerError::from_panic(payload)),
    }
}
