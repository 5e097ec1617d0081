//! One scheduling cycle: fetch, merge, indicators, reconcile, decide, dispatch.
//!
//! Candle fetches for every due subscription run concurrently, bounded by the
//! worker count, and are joined before any decision is taken. Decisions and
//! order dispatch then run in subscription order so the per-cycle entry cap
//! is applied deterministically.

use crate::brokers::BrokerSet;
use crate::commands::EngineSettings;
use crate::dispatch::{place_entry, place_exits, ExitPricing};
use crate::events::EngineEvent;
use crate::retry::RetryPolicy;
use chrono::NaiveDateTime;
use futures_util::future::join_all;
use optrade_core::candle::{CandleSeries, CandleWindow};
use optrade_core::contract::InstrumentKey;
use optrade_core::error::{BrokerError, EngineError};
use optrade_core::events::{TradeAction, TradeIntent};
use optrade_core::position::reconcile;
use optrade_core::subscription::Subscription;
use optrade_core::traits::BrokerAdapter;
use optrade_strategy::{decide, latest, table};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

/// Everything a cycle needs, shared read-only for its duration.
#[derive(Debug, Clone)]
pub struct CycleContext {
    pub brokers: BrokerSet,
    pub settings: EngineSettings,
    pub retry: RetryPolicy,
    pub cancel: CancellationToken,
}

impl CycleContext {
    #[must_use]
    pub fn new(brokers: BrokerSet, settings: EngineSettings, cancel: CancellationToken) -> Self {
        let retry = RetryPolicy::new(settings.retry.clone(), settings.adapter_timeout);
        Self {
            brokers,
            settings,
            retry,
            cancel,
        }
    }

    /// Broker session a subscription trades through.
    ///
    /// # Errors
    /// Returns [`EngineError::Configuration`] if the broker is not connected.
    pub fn adapter(&self, subscription: &Subscription) -> Result<&Arc<dyn BrokerAdapter>, EngineError> {
        self.brokers.get(subscription.broker).ok_or_else(|| {
            EngineError::Configuration(format!(
                "{}: broker {} is not connected",
                subscription.symbol, subscription.broker
            ))
        })
    }
}

/// Result of one subscription's cycle.
#[derive(Debug)]
pub struct CycleOutcome {
    pub symbol: String,
    /// Decision taken, present even if dispatching it failed.
    pub decision: Option<TradeIntent>,
    pub result: Result<(), EngineError>,
    pub events: Vec<EngineEvent>,
}

/// Resolves a subscription's instrument key.
///
/// # Errors
/// Returns [`EngineError::InstrumentResolutionFailed`] on any adapter
/// failure other than cancellation.
pub async fn resolve(ctx: &CycleContext, subscription: &Subscription) -> Result<InstrumentKey, EngineError> {
    let symbol = subscription.symbol.as_str();
    let adapter = ctx.adapter(subscription)?;

    ctx.retry
        .run("resolve_instrument", &ctx.cancel, || adapter.resolve_instrument(symbol))
        .await
        .map_err(|source| match source {
            BrokerError::Cancelled => EngineError::Cancelled,
            source => EngineError::InstrumentResolutionFailed {
                symbol: symbol.to_string(),
                source,
            },
        })
}

/// Runs one cycle for every due subscription.
///
/// Outcomes come back in the order of `due`. A failure in one subscription
/// never affects another.
pub async fn run_cycle(ctx: &CycleContext, due: &[Subscription], now: NaiveDateTime) -> Vec<CycleOutcome> {
    let semaphore = Semaphore::new(ctx.settings.worker_count.max(1));
    let semaphore = &semaphore;

    let fetches = due.iter().map(|subscription| async move {
        let _permit = semaphore.acquire().await.map_err(|_| EngineError::Cancelled)?;
        fetch_series(ctx, subscription).await
    });
    let fetched = join_all(fetches).await;

    let mut entries_left = ctx.settings.max_entries_per_cycle;
    let mut outcomes = Vec::with_capacity(due.len());

    for (subscription, series) in due.iter().zip(fetched) {
        let mut outcome = CycleOutcome {
            symbol: subscription.symbol.clone(),
            decision: None,
            result: Ok(()),
            events: Vec::new(),
        };

        let result = match series {
            Ok(series) => evaluate(ctx, subscription, &series, now, &mut entries_left, &mut outcome).await,
            Err(e) => Err(e),
        };
        outcome.result = result;
        outcomes.push(outcome);
    }

    outcomes
}

/// Historical and intraday candles merged into one series.
async fn fetch_series(ctx: &CycleContext, subscription: &Subscription) -> Result<CandleSeries, EngineError> {
    let symbol = subscription.symbol.as_str();
    let adapter = ctx.adapter(subscription)?;
    let key = subscription
        .instrument_key
        .as_ref()
        .ok_or_else(|| EngineError::data_unavailable(symbol, "instrument key not resolved"))?;
    let interval = subscription.interval_minutes;

    let historical = ctx
        .retry
        .run("fetch_candles", &ctx.cancel, || {
            adapter.fetch_candles(
                key,
                interval,
                CandleWindow::Historical {
                    lookback_days: ctx.settings.history_lookback_days,
                },
            )
        })
        .await
        .map_err(|e| EngineError::adapter(symbol, "fetch_candles", e))?;

    let intraday = ctx
        .retry
        .run("fetch_candles", &ctx.cancel, || {
            adapter.fetch_candles(key, interval, CandleWindow::Intraday)
        })
        .await
        .map_err(|e| EngineError::adapter(symbol, "fetch_candles", e))?;

    tracing::debug!(
        symbol,
        historical = historical.len(),
        intraday = intraday.len(),
        "Fetched candles"
    );

    Ok(CandleSeries::merge(historical, intraday))
}

async fn evaluate(
    ctx: &CycleContext,
    subscription: &Subscription,
    series: &CandleSeries,
    now: NaiveDateTime,
    entries_left: &mut usize,
    outcome: &mut CycleOutcome,
) -> Result<(), EngineError> {
    let symbol = subscription.symbol.as_str();

    if series.is_empty() {
        return Err(EngineError::data_unavailable(symbol, "no candles returned"));
    }
    let Some(row) = latest(series) else {
        return Err(EngineError::data_unavailable(
            symbol,
            format!("not enough data: no complete indicator row from {} candles", series.len()),
        ));
    };

    for line in table::render_row(&row) {
        tracing::info!(symbol, "{line}");
    }

    let adapter = ctx.adapter(subscription)?;
    let positions = ctx
        .retry
        .run("fetch_positions", &ctx.cancel, || adapter.fetch_positions())
        .await
        .map_err(|e| EngineError::adapter(symbol, "fetch_positions", e))?;

    let book = reconcile(symbol, &positions);
    if book.is_mixed() {
        let defect = EngineError::DecisionAmbiguous {
            symbol: symbol.to_string(),
            reason: format!(
                "{} call and {} put legs open, using the first leg",
                book.calls.len(),
                book.puts.len()
            ),
        };
        tracing::warn!(symbol, error = %defect, "Mixed position book");
    }

    let intent = decide(
        symbol,
        subscription.strategy,
        &row,
        book.state(),
        subscription.target_pct,
        ctx.settings.tick_size,
    );

    tracing::info!(
        symbol,
        strategy = %subscription.strategy,
        state = ?book.state(),
        action = %intent.action,
        close = %row.close,
        supertrend = %row.supertrend,
        macd = %row.macd,
        macd_signal = %row.macd_signal,
        adx = %row.adx,
        adx_ema21 = %row.adx_ema21,
        willr = %row.willr14,
        ema10 = %row.ema_fast,
        ema20 = %row.ema_slow,
        target = ?intent.target_price,
        "Decision"
    );

    outcome.decision = Some(intent.clone());
    outcome.events.push(EngineEvent::Decision {
        symbol: symbol.to_string(),
        row,
        intent: intent.clone(),
    });

    match intent.action {
        TradeAction::Hold => Ok(()),
        TradeAction::EnterCall | TradeAction::EnterPut => {
            if *entries_left == 0 {
                let reason = format!(
                    "entry cap of {} per cycle reached",
                    ctx.settings.max_entries_per_cycle
                );
                tracing::info!(symbol, action = %intent.action, %reason, "Entry skipped");
                outcome.events.push(EngineEvent::EntrySkipped {
                    symbol: symbol.to_string(),
                    reason,
                });
                return Ok(());
            }
            let placed = place_entry(ctx, adapter, subscription, &intent, now).await?;
            *entries_left -= 1;
            outcome.events.push(placed);
            Ok(())
        }
        TradeAction::ExitCall | TradeAction::ExitPut => {
            let Some(option_type) = intent.action.option_type() else {
                return Ok(());
            };
            let exits = place_exits(
                ctx,
                adapter,
                symbol,
                book.legs(option_type),
                ExitPricing::LastTraded,
            )
            .await;
            outcome.events.extend(exits.closed.iter().map(EngineEvent::from));
            exits.error.map_or(Ok(()), Err)
        }
    }
}
