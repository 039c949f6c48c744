//! Async flavour of the `listener` sample: registration and dispatch go through
//! the non-blocking variants on a tokio runtime.

use anyhow::Result;
use tracing::info;

use command_system::{CommandBus, CommandBusConfig, ListenerResult};

#[derive(Debug, Clone, Copy)]
struct EventOne;

#[derive(Debug, Clone, Copy)]
struct ReturningEvent {
    count: i32,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing (for logging)
    tracing_subscriber::fmt::init();

    let bus = CommandBus::new(CommandBusConfig::try_from_env().map_err(anyhow::Error::msg)?);

    // A listener that awaits before it is done; only trigger_async can deliver to it
    let loaded = bus.listen_task_fn(|_: EventOne| async {
        tokio::task::yield_now().await;
        info!("Event One (async)");
        ListenerResult::Ok(())
    });
    bus.trigger_async(EventOne).await?;
    bus.unlisten_async(loaded).await?;

    let subscription = bus
        .listen_request_async(|_: &EventOne| -> ListenerResult<ReturningEvent> {
            Ok(ReturningEvent { count: 10 })
        })
        .await?;

    let returning_events = bus
        .trigger_request_async::<EventOne, ReturningEvent>(EventOne)
        .await?;
    for returning in returning_events {
        info!("{}", returning.count);
    }

    bus.unlisten_async(subscription).await?;

    Ok(())
}
