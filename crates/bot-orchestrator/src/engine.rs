use crate::brokers::BrokerSet;
use crate::commands::{EngineSettings, EngineState};
use crate::cycle::CycleContext;
use crate::events::EngineEvent;
use crate::handle::SchedulerHandle;
use crate::scheduler::{Scheduler, Slot};
use anyhow::{bail, Context, Result};
use optrade_core::clock::Clock;
use optrade_core::subscription::Subscription;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A started scheduler.
pub struct Engine {
    pub handle: SchedulerHandle,
    /// Receiver subscribed before the task started, so no event is missed.
    pub events: broadcast::Receiver<EngineEvent>,
    pub task: JoinHandle<()>,
}

/// Validates the subscriptions and spawns the scheduler task on the
/// current Tokio runtime.
///
/// Instrument keys are resolved by the task itself; a subscription whose
/// symbol cannot be resolved is deactivated rather than failing the start.
///
/// # Errors
/// Returns an error if a subscription is invalid, duplicated, or trades
/// through a broker that is not connected.
pub fn start(
    settings: EngineSettings,
    subscriptions: Vec<Subscription>,
    brokers: BrokerSet,
    clock: Arc<dyn Clock>,
) -> Result<Engine> {
    let now = clock.now();
    let mut seen = HashSet::new();
    let mut slots = Vec::with_capacity(subscriptions.len());

    for subscription in subscriptions {
        subscription
            .validate()
            .with_context(|| format!("Invalid subscription {}", subscription.symbol))?;
        if !seen.insert(subscription.symbol.clone()) {
            bail!("{} is subscribed more than once", subscription.symbol);
        }
        if !brokers.contains(subscription.broker) {
            bail!(
                "{}: broker {} is not connected",
                subscription.symbol,
                subscription.broker
            );
        }
        slots.push(Slot::new(subscription, settings.session_anchor, now)?);
    }

    let (tx, rx) = mpsc::channel(32);
    let (event_tx, events) = broadcast::channel(1000);
    let (state_tx, state_rx) = watch::channel(EngineState::Starting);
    let cancel = CancellationToken::new();

    let handle = SchedulerHandle::new(tx, event_tx.clone(), state_rx, cancel.clone());
    let ctx = CycleContext::new(brokers, settings, cancel);
    let scheduler = Scheduler::new(ctx, clock, slots, rx, event_tx, state_tx);

    tracing::info!(subscriptions = seen.len(), "Spawning scheduler");
    let task = tokio::spawn(scheduler.run());

    Ok(Engine {
        handle,
        events,
        task,
    })
}
