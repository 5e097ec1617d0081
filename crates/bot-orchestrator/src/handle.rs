use crate::commands::{CloseReport, EngineState, SchedulerCommand};
use crate::events::{EngineEvent, EngineSnapshot};
use anyhow::{anyhow, Result};
use optrade_core::subscription::Subscription;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;

/// Control surface of a running scheduler. Cheap to clone.
#[derive(Clone)]
pub struct SchedulerHandle {
    tx: mpsc::Sender<SchedulerCommand>,
    event_tx: broadcast::Sender<EngineEvent>,
    state_rx: watch::Receiver<EngineState>,
    cancel: CancellationToken,
}

impl SchedulerHandle {
    #[must_use]
    pub const fn new(
        tx: mpsc::Sender<SchedulerCommand>,
        event_tx: broadcast::Sender<EngineEvent>,
        state_rx: watch::Receiver<EngineState>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            tx,
            event_tx,
            state_rx,
            cancel,
        }
    }

    /// Adds a subscription, resolving its instrument first. Replaces an
    /// existing subscription with the same symbol.
    ///
    /// # Errors
    /// Returns an error if the subscription is invalid, its broker is not
    /// connected, the instrument cannot be resolved, or the scheduler has
    /// stopped.
    pub async fn activate(&self, subscription: Subscription) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send(SchedulerCommand::Activate(Box::new(subscription), tx))
            .await?;
        rx.await?
    }

    /// Stops scheduling a symbol from its next cycle on.
    ///
    /// # Errors
    /// Returns an error if the symbol is not active or the scheduler has
    /// stopped.
    pub async fn deactivate(&self, symbol: &str) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send(SchedulerCommand::Deactivate(symbol.to_string(), tx))
            .await?;
        rx.await?
    }

    /// Active set, last decision per symbol and recent events.
    ///
    /// # Errors
    /// Returns an error if the scheduler has stopped.
    pub async fn snapshot(&self) -> Result<EngineSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.send(SchedulerCommand::Snapshot(tx)).await?;
        Ok(rx.await?)
    }

    /// Exits open option legs at market without consulting the decision
    /// engine. `None` covers every active subscription. Partial success
    /// comes back as a report listing both closed legs and failures.
    ///
    /// # Errors
    /// Returns an error if nothing was open, no open leg could be closed, or
    /// the scheduler has stopped.
    pub async fn close_positions(&self, symbol: Option<&str>) -> Result<CloseReport> {
        let (tx, rx) = oneshot::channel();
        self.send(SchedulerCommand::ClosePositions(symbol.map(str::to_string), tx))
            .await?;
        rx.await?
    }

    /// Cancels in-flight broker calls and stops the scheduler.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let _ = self.tx.send(SchedulerCommand::Shutdown).await;
    }

    #[must_use]
    pub fn subscribe_events(&self) -> broadcast::Receiver<EngineEvent> {
        self.event_tx.subscribe()
    }

    #[must_use]
    pub fn state(&self) -> EngineState {
        *self.state_rx.borrow()
    }

    /// Waits until nothing is scheduled any more, either because every
    /// subscription was deactivated or because the scheduler stopped.
    ///
    /// # Errors
    /// Returns an error if the scheduler task went away without reporting
    /// a final state.
    pub async fn wait_until_done(&self) -> Result<EngineState> {
        let mut state_rx = self.state_rx.clone();
        let state = state_rx
            .wait_for(|state| matches!(state, EngineState::Idle | EngineState::Stopped))
            .await
            .map_err(|_| anyhow!("Scheduler task ended unexpectedly"))?;
        Ok(*state)
    }

    async fn send(&self, command: SchedulerCommand) -> Result<()> {
        self.tx
            .send(command)
            .await
            .map_err(|_| anyhow!("Scheduler is not running"))
    }
}
