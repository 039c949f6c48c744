//! Sample component that wires itself into a command bus on start and
//! removes its listeners again on destroy.

use anyhow::Result;
use tracing::info;

use command_system::{CommandBus, CommandBusConfig, Subscription};

#[derive(Debug, Clone, Copy)]
struct EventOne;

#[derive(Debug, Clone, Copy)]
struct EventTwo;

#[derive(Debug, Clone, Copy)]
struct ReturningEvent {
    count: i32,
}

/// A host-side component owning the subscriptions it creates
struct ListenerComponent {
    bus: CommandBus,
    subscriptions: Vec<Subscription>,
}

impl ListenerComponent {
    fn new(bus: CommandBus) -> Self {
        Self {
            bus,
            subscriptions: Vec::new(),
        }
    }

    fn start(&mut self) -> Result<()> {
        self.subscriptions
            .push(self.bus.listen_fn(|_: &EventOne| info!("Event One")));
        self.subscriptions
            .push(self.bus.listen_fn(|_: &EventTwo| info!("Event Two")));

        self.bus.trigger(EventOne)?;
        self.bus.trigger(EventTwo)?;

        self.subscriptions
            .push(self.bus.listen_request_fn(|_: &EventOne| ReturningEvent { count: 10 }));

        let returning_events = self.bus.trigger_request::<EventOne, ReturningEvent>(EventOne)?;
        for returning in returning_events {
            info!("{}", returning.count);
        }

        Ok(())
    }

    fn destroy(&mut self) -> Result<()> {
        for subscription in self.subscriptions.drain(..) {
            self.bus.unlisten(subscription)?;
        }
        Ok(())
    }
}

fn main() -> Result<()> {
    // Initialize tracing (for logging)
    tracing_subscriber::fmt::init();

    let bus = CommandBus::new(CommandBusConfig::try_from_env().map_err(anyhow::Error::msg)?);
    let mut component = ListenerComponent::new(bus.clone());

    component.start()?;
    component.destroy()?;

    // Nothing is listening any more, so this is a silent no-op
    bus.trigger(EventOne)?;
    info!("Listeners remaining after destroy: {}", bus.listener_count::<EventOne>());

    Ok(())
}
