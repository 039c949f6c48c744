//--------------------------------------------------------------------------------------------------
// STRUCTS & ENUMS
//--------------------------------------------------------------------------------------------------
// | Name              | Description                                       | Key Methods         |
// |-------------------|---------------------------------------------------|---------------------|
// | EventKey          | Registry key: payload type or (request, response) | one_way, two_way    |
// | Subscription      | Handle returned by listen, consumed by unlisten   | id, key             |
// | Callback          | Tagged registry entry (notify / task / respond)   | notify, respond     |
//--------------------------------------------------------------------------------------------------

use std::any::{Any, TypeId, type_name};
use std::fmt;
use std::sync::Arc;

use uuid::Uuid;

use super::error::{CommandError, CommandResult};
use super::handlers::{AsyncListener, Listener, Responder};

/// Identity used to look up a registry entry.
///
/// One-way events are keyed by the payload type alone. Two-way events are keyed by the
/// (request, response) pair so two responders returning different types for the same
/// request never share a sequence.
#[derive(Clone, Copy)]
pub enum EventKey {
    OneWay {
        event: TypeId,
        event_name: &'static str,
    },
    TwoWay {
        request: TypeId,
        response: TypeId,
        request_name: &'static str,
        response_name: &'static str,
    },
}

impl EventKey {
    /// Key for one-way events carrying `E`
    pub fn one_way<E: 'static>() -> Self {
        EventKey::OneWay {
            event: TypeId::of::<E>(),
            event_name: type_name::<E>(),
        }
    }

    /// Key for two-way events taking `Req` and producing `Resp`
    pub fn two_way<Req: 'static, Resp: 'static>() -> Self {
        EventKey::TwoWay {
            request: TypeId::of::<Req>(),
            response: TypeId::of::<Resp>(),
            request_name: type_name::<Req>(),
            response_name: type_name::<Resp>(),
        }
    }

    pub fn is_two_way(&self) -> bool {
        matches!(self, EventKey::TwoWay { .. })
    }
}

// Names are for display only; identity is the TypeIds.
impl PartialEq for EventKey {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (EventKey::OneWay { event: a, .. }, EventKey::OneWay { event: b, .. }) => a == b,
            (
                EventKey::TwoWay { request: ra, response: sa, .. },
                EventKey::TwoWay { request: rb, response: sb, .. },
            ) => ra == rb && sa == sb,
            _ => false,
        }
    }
}

impl Eq for EventKey {}

impl std::hash::Hash for EventKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        match self {
            EventKey::OneWay { event, .. } => {
                0u8.hash(state);
                event.hash(state);
            }
            EventKey::TwoWay { request, response, .. } => {
                1u8.hash(state);
                request.hash(state);
                response.hash(state);
            }
        }
    }
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKey::OneWay { event_name, .. } => write!(f, "{}", event_name),
            EventKey::TwoWay { request_name, response_name, .. } => {
                write!(f, "{} -> {}", request_name, response_name)
            }
        }
    }
}

impl fmt::Debug for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventKey({})", self)
    }
}

/// Registered association between a key and one callback.
///
/// Returned by every `listen` call and handed back to `unlisten` to remove the callback.
/// Cloning a subscription does not register anything twice; the clone names the same entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Subscription {
    id: Uuid,
    key: EventKey,
}

impl Subscription {
    pub(crate) fn new(key: EventKey) -> Self {
        Self { id: Uuid::new_v4(), key }
    }

    /// Returns the subscription ID
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns the key the callback was registered under
    pub fn key(&self) -> EventKey {
        self.key
    }
}

/// Boxed one-way listener stored behind `Callback::Notify`
pub(crate) struct NotifyFn<E: 'static>(pub(crate) Box<dyn Listener<E>>);

/// Boxed one-way async listener stored behind `Callback::Task`
pub(crate) struct TaskFn<E: 'static>(pub(crate) Box<dyn AsyncListener<E>>);

/// Boxed two-way responder stored behind `Callback::Respond`
pub(crate) struct RespondFn<Req: 'static, Resp: 'static>(pub(crate) Box<dyn Responder<Req, Resp>>);

/// Registry entry payload.
///
/// The concrete callback is type-erased so a single map can hold every payload type; the
/// variant tag and a checked downcast recover it at dispatch time.
#[derive(Clone)]
pub(crate) enum Callback {
    Notify(Arc<dyn Any + Send + Sync>),
    Task(Arc<dyn Any + Send + Sync>),
    Respond(Arc<dyn Any + Send + Sync>),
}

impl Callback {
    pub(crate) fn notify<E: 'static>(listener: Box<dyn Listener<E>>) -> Self {
        Callback::Notify(Arc::new(NotifyFn(listener)))
    }

    pub(crate) fn task<E: 'static>(listener: Box<dyn AsyncListener<E>>) -> Self {
        Callback::Task(Arc::new(TaskFn(listener)))
    }

    pub(crate) fn respond<Req: 'static, Resp: 'static>(
        responder: Box<dyn Responder<Req, Resp>>,
    ) -> Self {
        Callback::Respond(Arc::new(RespondFn(responder)))
    }

    /// Recovers the one-way listener for `E`, or reports a mismatch against `key`.
    pub(crate) fn as_notify<E: 'static>(&self, key: EventKey) -> CommandResult<Arc<NotifyFn<E>>> {
        match self {
            Callback::Notify(inner) => Arc::clone(inner)
                .downcast::<NotifyFn<E>>()
                .map_err(|_| CommandError::TypeMismatch { key, expected: "notify" }),
            _ => Err(CommandError::TypeMismatch { key, expected: "notify" }),
        }
    }

    /// Recovers the one-way async listener for `E`, or reports a mismatch against `key`.
    pub(crate) fn as_task<E: 'static>(&self, key: EventKey) -> CommandResult<Arc<TaskFn<E>>> {
        match self {
            Callback::Task(inner) => Arc::clone(inner)
                .downcast::<TaskFn<E>>()
                .map_err(|_| CommandError::TypeMismatch { key, expected: "task" }),
            _ => Err(CommandError::TypeMismatch { key, expected: "task" }),
        }
    }

    /// Recovers the two-way responder for (`Req`, `Resp`), or reports a mismatch against `key`.
    pub(crate) fn as_respond<Req: 'static, Resp: 'static>(
        &self,
        key: EventKey,
    ) -> CommandResult<Arc<RespondFn<Req, Resp>>> {
        match self {
            Callback::Respond(inner) => Arc::clone(inner)
                .downcast::<RespondFn<Req, Resp>>()
                .map_err(|_| CommandError::TypeMismatch { key, expected: "respond" }),
            _ => Err(CommandError::TypeMismatch { key, expected: "respond" }),
        }
    }

    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Callback::Notify(_) => "notify",
            Callback::Task(_) => "task",
            Callback::Respond(_) => "respond",
        }
    }

    pub(crate) fn is_task(&self) -> bool {
        matches!(self, Callback::Task(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ListenerResult;
    use std::collections::HashSet;

    struct Ping;
    struct Pong;
    struct Other;

    #[test]
    fn test_two_way_keys_distinguish_response_types() {
        let a = EventKey::two_way::<Ping, Pong>();
        let b = EventKey::two_way::<Ping, Other>();
        assert_ne!(a, b);
        assert_eq!(a, EventKey::two_way::<Ping, Pong>());

        let keys: HashSet<EventKey> =
            [a, b, EventKey::two_way::<Ping, Pong>()].into_iter().collect();
        assert_eq!(keys.len(), 2);
    }

    #[test]
    fn test_one_way_and_two_way_keys_never_collide() {
        assert_ne!(EventKey::one_way::<Ping>(), EventKey::two_way::<Ping, Ping>());
        assert!(!EventKey::one_way::<Ping>().is_two_way());
        assert!(EventKey::two_way::<Ping, Pong>().is_two_way());
    }

    #[test]
    fn test_key_display_uses_type_names() {
        let key = EventKey::two_way::<u8, String>();
        assert_eq!(key.to_string(), "u8 -> alloc::string::String");
    }

    #[test]
    fn test_wrong_variant_is_type_mismatch() {
        let key = EventKey::one_way::<Ping>();
        let callback = Callback::notify::<Ping>(Box::new(|_: &Ping| -> ListenerResult { Ok(()) }));

        assert!(callback.as_notify::<Ping>(key).is_ok());
        assert!(matches!(
            callback.as_respond::<Ping, Pong>(key),
            Err(CommandError::TypeMismatch { expected: "respond", .. })
        ));
        assert!(matches!(
            callback.as_notify::<Other>(key),
            Err(CommandError::TypeMismatch { expected: "notify", .. })
        ));
        assert!(matches!(
            callback.as_task::<Ping>(key),
            Err(CommandError::TypeMismatch { expected: "task", .. })
        ));
        assert!(!callback.is_task());
    }

    struct Quiet;

    #[async_trait::async_trait]
    impl AsyncListener<Ping> for Quiet {
        async fn on_event(&self, _: &Ping) -> ListenerResult {
            Ok(())
        }
    }

    #[test]
    fn test_task_callbacks_are_not_notify_callbacks() {
        let key = EventKey::one_way::<Ping>();
        let callback = Callback::task::<Ping>(Box::new(Quiet));

        assert!(callback.is_task());
        assert_eq!(callback.kind(), "task");
        assert!(callback.as_task::<Ping>(key).is_ok());
        assert!(matches!(
            callback.as_notify::<Ping>(key),
            Err(CommandError::TypeMismatch { expected: "notify", .. })
        ));
    }

    #[test]
    fn test_subscriptions_are_unique() {
        let key = EventKey::one_way::<Ping>();
        let a = Subscription::new(key);
        let b = Subscription::new(key);
        assert_ne!(a.id(), b.id());
        assert_eq!(a.key(), b.key());
        assert_eq!(a.clone(), a);
    }
}
