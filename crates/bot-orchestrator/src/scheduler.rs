use crate::commands::{CloseReport, EngineState, SchedulerCommand};
use crate::cycle::{resolve, run_cycle, CycleContext, CycleOutcome};
use crate::dispatch::close_positions;
use crate::events::{EngineEvent, EngineSnapshot, SubscriptionStatus};
use anyhow::{anyhow, bail, Result};
use chrono::{NaiveDateTime, NaiveTime};
use optrade_core::clock::{until, Clock, IntervalClock};
use optrade_core::error::EngineError;
use optrade_core::events::TradeIntent;
use optrade_core::subscription::Subscription;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};

const RECENT_EVENTS: usize = 10;
const RECENT_DEACTIVATIONS: usize = 10;

/// One row of the subscription table.
pub(crate) struct Slot {
    subscription: Subscription,
    clock: IntervalClock,
    last_bucket: Option<NaiveDateTime>,
    last_decision: Option<TradeIntent>,
    consecutive_failures: u32,
    deactivation_reason: Option<String>,
}

impl Slot {
    /// The bucket containing `now` counts as already run, so the first
    /// cycle waits for the next boundary.
    pub(crate) fn new(subscription: Subscription, anchor: NaiveTime, now: NaiveDateTime) -> Result<Self> {
        let clock = IntervalClock::new(subscription.interval_minutes, anchor)?;
        Ok(Self {
            last_bucket: clock.current_bucket(now),
            subscription,
            clock,
            last_decision: None,
            consecutive_failures: 0,
            deactivation_reason: None,
        })
    }

    fn due_bucket(&self, now: NaiveDateTime) -> Option<NaiveDateTime> {
        if !self.subscription.active {
            return None;
        }
        self.clock
            .current_bucket(now)
            .filter(|bucket| Some(*bucket) != self.last_bucket)
    }

    fn status(&self) -> SubscriptionStatus {
        SubscriptionStatus {
            symbol: self.subscription.symbol.clone(),
            company: self.subscription.company().to_string(),
            broker: self.subscription.broker,
            strategy: self.subscription.strategy,
            interval_minutes: self.subscription.interval_minutes,
            active: self.subscription.active,
            instrument_key: self
                .subscription
                .instrument_key
                .as_ref()
                .map(ToString::to_string),
            last_bucket: self.last_bucket,
            last_decision: self.last_decision.clone(),
            consecutive_failures: self.consecutive_failures,
            deactivation_reason: self.deactivation_reason.clone(),
        }
    }
}

/// Single owner of the subscription table.
///
/// Wakes at the earliest upcoming bucket boundary of any active
/// subscription, runs a cycle for every subscription whose bucket changed,
/// and serves control commands in between. Once nothing is active it stops
/// scheduling and only answers commands until shut down.
pub struct Scheduler {
    ctx: CycleContext,
    clock: Arc<dyn Clock>,
    rx: mpsc::Receiver<SchedulerCommand>,
    event_tx: broadcast::Sender<EngineEvent>,
    state_tx: watch::Sender<EngineState>,
    slots: Vec<Slot>,
    deactivated: VecDeque<SubscriptionStatus>,
    recent_events: VecDeque<EngineEvent>,
    state: EngineState,
}

impl Scheduler {
    pub(crate) fn new(
        ctx: CycleContext,
        clock: Arc<dyn Clock>,
        slots: Vec<Slot>,
        rx: mpsc::Receiver<SchedulerCommand>,
        event_tx: broadcast::Sender<EngineEvent>,
        state_tx: watch::Sender<EngineState>,
    ) -> Self {
        Self {
            ctx,
            clock,
            rx,
            event_tx,
            state_tx,
            slots,
            deactivated: VecDeque::with_capacity(RECENT_DEACTIVATIONS),
            recent_events: VecDeque::with_capacity(RECENT_EVENTS),
            state: EngineState::Starting,
        }
    }

    /// Runs until shutdown, cancellation, or every handle is dropped.
    pub async fn run(mut self) {
        tracing::info!(subscriptions = self.slots.len(), "Scheduler starting");
        self.resolve_instruments().await;

        loop {
            if self.ctx.cancel.is_cancelled() {
                break;
            }
            self.remove_inactive();

            let now = self.clock.now();
            let due = self.take_due(now);
            if !due.is_empty() {
                self.run_due(due, now).await;
                continue;
            }

            let wait = self.next_wakeup(now);
            if wait.is_some() {
                self.set_state(EngineState::Running);
            } else {
                self.set_state(EngineState::Idle);
            }

            tokio::select! {
                command = self.rx.recv() => match command {
                    Some(SchedulerCommand::Shutdown) | None => break,
                    Some(command) => self.handle_command(command).await,
                },
                () = sleep_for(wait) => {}
                () = self.ctx.cancel.cancelled() => break,
            }
        }

        self.ctx.cancel.cancel();
        self.set_state(EngineState::Stopped);
        tracing::info!("Scheduler stopped");
    }

    async fn resolve_instruments(&mut self) {
        for index in 0..self.slots.len() {
            let slot = &self.slots[index];
            if !slot.subscription.active || slot.subscription.instrument_key.is_some() {
                continue;
            }

            match resolve(&self.ctx, &slot.subscription).await {
                Ok(key) => {
                    let symbol = slot.subscription.symbol.clone();
                    tracing::info!(symbol = %symbol, instrument_key = %key, "Instrument resolved");
                    self.add_event(EngineEvent::InstrumentResolved {
                        symbol,
                        instrument_key: key.to_string(),
                    });
                    self.slots[index].subscription.instrument_key = Some(key);
                }
                Err(EngineError::Cancelled) => return,
                Err(e) => self.deactivate_slot(index, e.to_string()),
            }
        }
    }

    /// Marks every due subscription's bucket as taken and returns them.
    fn take_due(&mut self, now: NaiveDateTime) -> Vec<(usize, Subscription)> {
        let mut due = Vec::new();
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if let Some(bucket) = slot.due_bucket(now) {
                slot.last_bucket = Some(bucket);
                due.push((index, slot.subscription.clone()));
            }
        }
        due
    }

    fn next_wakeup(&self, now: NaiveDateTime) -> Option<Duration> {
        self.slots
            .iter()
            .filter(|slot| slot.subscription.active)
            .map(|slot| slot.clock.next_bucket(now))
            .min()
            .map(|next| until(next, now))
    }

    async fn run_due(&mut self, due: Vec<(usize, Subscription)>, now: NaiveDateTime) {
        self.set_state(EngineState::Running);
        let (indices, subscriptions): (Vec<usize>, Vec<Subscription>) = due.into_iter().unzip();
        let symbols: Vec<String> = subscriptions.iter().map(|s| s.symbol.clone()).collect();

        tracing::info!(at = %now, symbols = ?symbols, "Cycle started");
        self.add_event(EngineEvent::CycleStarted { at: now, symbols });

        let outcomes = run_cycle(&self.ctx, &subscriptions, now).await;
        for (index, outcome) in indices.into_iter().zip(outcomes) {
            self.apply_outcome(index, outcome);
        }
    }

    fn apply_outcome(&mut self, index: usize, outcome: CycleOutcome) {
        for event in outcome.events {
            self.add_event(event);
        }

        let max_failures = self.ctx.settings.max_consecutive_failures;
        let Some(slot) = self.slots.get_mut(index) else {
            return;
        };
        if let Some(decision) = outcome.decision {
            slot.last_decision = Some(decision);
        }

        let error = match outcome.result {
            Ok(()) => {
                slot.consecutive_failures = 0;
                return;
            }
            Err(EngineError::Cancelled) => return,
            Err(error) => error,
        };

        if error.counts_as_failure() {
            slot.consecutive_failures += 1;
        }
        let failures = slot.consecutive_failures;
        let symbol = outcome.symbol;

        let event = if let EngineError::DataUnavailable { reason, .. } = &error {
            tracing::info!(symbol = %symbol, %reason, "Cycle skipped");
            EngineEvent::CycleSkipped {
                symbol: symbol.clone(),
                reason: reason.clone(),
            }
        } else {
            tracing::warn!(symbol = %symbol, error = %error, consecutive_failures = failures, "Cycle failed");
            EngineEvent::Error {
                symbol: symbol.clone(),
                message: error.to_string(),
            }
        };
        self.add_event(event);

        if error.deactivates() {
            self.deactivate_slot(index, error.to_string());
        } else if failures >= max_failures {
            self.deactivate_slot(
                index,
                format!("{failures} consecutive failed cycles, last: {error}"),
            );
        }
    }

    fn deactivate_slot(&mut self, index: usize, reason: String) {
        let Some(slot) = self.slots.get_mut(index) else {
            return;
        };
        slot.subscription.active = false;
        slot.deactivation_reason = Some(reason.clone());
        let symbol = slot.subscription.symbol.clone();

        tracing::warn!(symbol = %symbol, %reason, "Subscription deactivated");
        self.add_event(EngineEvent::Deactivated { symbol, reason });
    }

    /// Moves deactivated subscriptions out of the table. Only called between
    /// cycles, so slot indices stay valid while outcomes are applied.
    fn remove_inactive(&mut self) {
        let (active, inactive): (Vec<Slot>, Vec<Slot>) = std::mem::take(&mut self.slots)
            .into_iter()
            .partition(|slot| slot.subscription.active);
        self.slots = active;

        for slot in inactive {
            if self.deactivated.len() >= RECENT_DEACTIVATIONS {
                self.deactivated.pop_front();
            }
            self.deactivated.push_back(slot.status());
        }
    }

    async fn handle_command(&mut self, command: SchedulerCommand) {
        match command {
            SchedulerCommand::Activate(subscription, reply) => {
                let result = self.activate(*subscription).await;
                if let Err(e) = &result {
                    tracing::warn!(error = %e, "Activation rejected");
                }
                let _ = reply.send(result);
            }
            SchedulerCommand::Deactivate(symbol, reply) => {
                let result = self.deactivate(&symbol);
                let _ = reply.send(result);
            }
            SchedulerCommand::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
            SchedulerCommand::ClosePositions(symbol, reply) => {
                let result = self.close(symbol).await;
                let _ = reply.send(result);
            }
            SchedulerCommand::Shutdown => {}
        }
    }

    async fn activate(&mut self, mut subscription: Subscription) -> Result<()> {
        subscription.validate()?;
        if !self.ctx.brokers.contains(subscription.broker) {
            bail!(
                "{}: broker {} is not connected",
                subscription.symbol,
                subscription.broker
            );
        }

        let key = resolve(&self.ctx, &subscription).await?;
        subscription.instrument_key = Some(key.clone());
        subscription.active = true;
        let symbol = subscription.symbol.clone();

        let slot = Slot::new(subscription, self.ctx.settings.session_anchor, self.clock.now())?;
        self.deactivated.retain(|status| status.symbol != symbol);
        match self
            .slots
            .iter()
            .position(|s| s.subscription.symbol == symbol)
        {
            Some(index) => self.slots[index] = slot,
            None => self.slots.push(slot),
        }

        tracing::info!(symbol = %symbol, instrument_key = %key, "Subscription activated");
        self.add_event(EngineEvent::InstrumentResolved {
            symbol,
            instrument_key: key.to_string(),
        });
        Ok(())
    }

    fn deactivate(&mut self, symbol: &str) -> Result<()> {
        let index = self
            .slots
            .iter()
            .position(|s| s.subscription.symbol == symbol && s.subscription.active)
            .ok_or_else(|| anyhow!("{symbol} is not an active subscription"))?;
        self.deactivate_slot(index, "deactivated on request".to_string());
        Ok(())
    }

    async fn close(&mut self, symbol: Option<String>) -> Result<CloseReport> {
        let (targets, scope): (Vec<Subscription>, String) = match symbol {
            Some(symbol) => {
                let targets: Vec<Subscription> = self
                    .slots
                    .iter()
                    .filter(|s| s.subscription.symbol == symbol)
                    .map(|s| s.subscription.clone())
                    .collect();
                if targets.is_empty() {
                    bail!("{symbol} is not subscribed");
                }
                (targets, symbol)
            }
            None => (
                self.slots
                    .iter()
                    .filter(|s| s.subscription.active)
                    .map(|s| s.subscription.clone())
                    .collect(),
                "any subscribed symbol".to_string(),
            ),
        };

        let report = close_positions(&self.ctx, &targets, &scope).await?;
        for position in &report.closed {
            self.add_event(EngineEvent::from(position));
        }
        for failure in &report.failures {
            tracing::warn!(symbol = %failure.symbol, error = %failure.message, "Close positions incomplete");
            self.add_event(EngineEvent::Error {
                symbol: failure.symbol.clone(),
                message: failure.message.clone(),
            });
        }
        Ok(report)
    }

    fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            state: self.state,
            subscriptions: self.slots.iter().map(Slot::status).collect(),
            recently_deactivated: self.deactivated.iter().cloned().collect(),
            recent_events: self.recent_events.iter().cloned().collect(),
        }
    }

    fn set_state(&mut self, state: EngineState) {
        if self.state == state {
            return;
        }
        if state == EngineState::Idle {
            tracing::info!("No active subscriptions, scheduling stopped");
        }
        self.state = state;
        self.state_tx.send_replace(state);
    }

    fn add_event(&mut self, event: EngineEvent) {
        if self.recent_events.len() >= RECENT_EVENTS {
            self.recent_events.pop_front();
        }
        self.recent_events.push_back(event.clone());

        // Send to subscribers (ignore if no receivers)
        let _ = self.event_tx.send(event);
    }
}

async fn sleep_for(wait: Option<Duration>) {
    match wait {
        Some(duration) => tokio::time::sleep(duration).await,
        None => std::future::pending().await,
    }
}
