//! Turns trade intents into broker orders.
//!
//! Entries are re-priced on the option contract they buy: the contract's
//! last traded price becomes the entry reference and the target percentage
//! is re-applied at the contract's tick size.

use crate::commands::{CloseFailure, CloseReport, ClosedPosition};
use crate::cycle::CycleContext;
use crate::events::EngineEvent;
use chrono::NaiveDateTime;
use optrade_core::contract::{target_price, OptionContract};
use optrade_core::error::{BrokerError, EngineError};
use optrade_core::events::{EntryOrder, ExitOrder, OrderSide, TradeIntent};
use optrade_core::position::{reconcile, Position};
use optrade_core::subscription::Subscription;
use optrade_core::traits::BrokerAdapter;
use rust_decimal::Decimal;
use std::sync::Arc;

/// How an exit order is priced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitPricing {
    /// Limit at the instrument's last traded price.
    LastTraded,
    /// Market order.
    Market,
}

/// Buys the option contract an entry intent calls for.
///
/// # Errors
/// Returns [`EngineError::Adapter`] if contract selection, pricing or order
/// placement fails.
pub async fn place_entry(
    ctx: &CycleContext,
    adapter: &Arc<dyn BrokerAdapter>,
    subscription: &Subscription,
    intent: &TradeIntent,
    now: NaiveDateTime,
) -> Result<EngineEvent, EngineError> {
    let symbol = subscription.symbol.as_str();
    let Some(option_type) = intent.action.option_type() else {
        return Err(EngineError::DecisionAmbiguous {
            symbol: symbol.to_string(),
            reason: format!("{} is not an entry", intent.action),
        });
    };

    let contract: OptionContract = ctx
        .retry
        .run("select_option_contract", &ctx.cancel, || {
            adapter.select_option_contract(symbol, intent.reference_price, option_type, now)
        })
        .await
        .map_err(|e| EngineError::adapter(symbol, "select_option_contract", e))?;

    let entry_price = ctx
        .retry
        .run("last_price", &ctx.cancel, || {
            adapter.last_price(&contract.instrument_key)
        })
        .await
        .map_err(|e| EngineError::adapter(symbol, "last_price", e))?;

    let tick = if contract.tick_size > Decimal::ZERO {
        contract.tick_size
    } else {
        ctx.settings.tick_size
    };
    let target = target_price(entry_price, subscription.target_pct, tick);
    let quantity = contract.quantity_for_lots(subscription.lots);

    tracing::info!(
        symbol,
        trading_symbol = %contract.trading_symbol,
        strike = %contract.strike,
        expiry = %contract.expiry,
        option_type = %option_type,
        quantity,
        entry = %entry_price,
        target = %target,
        "Placing entry order"
    );

    let order = EntryOrder {
        instrument_key: contract.instrument_key.clone(),
        trading_symbol: contract.trading_symbol.clone(),
        quantity,
        side: OrderSide::Buy,
        reference_price: entry_price,
        target_price: target,
    };

    let order_id = ctx
        .retry
        .run_once("place_entry_order", &ctx.cancel, || adapter.place_entry_order(&order))
        .await
        .map_err(|e| EngineError::adapter(symbol, "place_entry_order", e))?;

    tracing::info!(symbol, order_id = %order_id, "Entry order placed");

    Ok(EngineEvent::EntryPlaced {
        symbol: symbol.to_string(),
        trading_symbol: contract.trading_symbol,
        quantity,
        entry_price,
        target_price: target,
        order_id,
    })
}

/// Exit orders sent for a batch of legs.
#[derive(Debug, Default)]
pub struct ExitReport {
    /// Legs the broker accepted an exit order for.
    pub closed: Vec<ClosedPosition>,
    /// First failure. Later legs are still attempted unless it was a
    /// cancellation.
    pub error: Option<EngineError>,
}

/// Sells every given leg.
///
/// A leg whose last price cannot be fetched falls back to the price in the
/// position snapshot. A rejected exit does not stop the remaining legs.
pub async fn place_exits(
    ctx: &CycleContext,
    adapter: &Arc<dyn BrokerAdapter>,
    symbol: &str,
    legs: &[Position],
    pricing: ExitPricing,
) -> ExitReport {
    let mut report = ExitReport {
        closed: Vec::with_capacity(legs.len()),
        error: None,
    };

    for leg in legs {
        let Ok(quantity) = u32::try_from(leg.quantity) else {
            tracing::warn!(symbol, trading_symbol = %leg.trading_symbol, quantity = leg.quantity, "Skipping leg with unsupported quantity");
            continue;
        };

        let price = match pricing {
            ExitPricing::Market => Decimal::ZERO,
            ExitPricing::LastTraded => {
                match ctx
                    .retry
                    .run("last_price", &ctx.cancel, || adapter.last_price(&leg.instrument_key))
                    .await
                {
                    Ok(price) => price,
                    Err(BrokerError::Cancelled) => {
                        report.error = Some(EngineError::Cancelled);
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(
                            symbol,
                            trading_symbol = %leg.trading_symbol,
                            error = %e,
                            fallback = %leg.last_price,
                            "Last price unavailable, using position snapshot"
                        );
                        leg.last_price
                    }
                }
            }
        };

        let order = ExitOrder {
            instrument_key: leg.instrument_key.clone(),
            trading_symbol: leg.trading_symbol.clone(),
            quantity,
            side: OrderSide::Sell,
            price,
        };

        let placed = ctx
            .retry
            .run_once("place_exit_order", &ctx.cancel, || adapter.place_exit_order(&order))
            .await
            .map_err(|e| EngineError::adapter(symbol, "place_exit_order", e));

        let order_id = match placed {
            Ok(order_id) => order_id,
            Err(EngineError::Cancelled) => {
                report.error = Some(EngineError::Cancelled);
                break;
            }
            Err(e) => {
                tracing::warn!(symbol, trading_symbol = %leg.trading_symbol, error = %e, "Exit order failed");
                report.error.get_or_insert(e);
                continue;
            }
        };

        tracing::info!(
            symbol,
            trading_symbol = %leg.trading_symbol,
            quantity,
            price = %price,
            order_id = %order_id,
            "Exit order placed"
        );

        report.closed.push(ClosedPosition {
            symbol: symbol.to_string(),
            trading_symbol: leg.trading_symbol.clone(),
            quantity,
            price,
            order_id,
        });
    }

    report
}

impl From<&ClosedPosition> for EngineEvent {
    fn from(closed: &ClosedPosition) -> Self {
        Self::ExitPlaced {
            symbol: closed.symbol.clone(),
            trading_symbol: closed.trading_symbol.clone(),
            quantity: closed.quantity,
            price: closed.price,
            order_id: closed.order_id.clone(),
        }
    }
}

/// Exits every open long option leg of the given subscriptions at market,
/// bypassing the decision engine.
///
/// Every symbol and leg is attempted. Failures are listed in the report
/// next to the legs that were closed.
///
/// # Errors
/// Returns [`EngineError::NoOpenPositions`] if nothing was open, and the
/// first failure if legs were open but none could be closed.
pub async fn close_positions(
    ctx: &CycleContext,
    subscriptions: &[Subscription],
    scope: &str,
) -> Result<CloseReport, EngineError> {
    let mut report = CloseReport::default();
    let mut first_error = None;

    for subscription in subscriptions {
        if ctx.cancel.is_cancelled() {
            first_error.get_or_insert(EngineError::Cancelled);
            break;
        }
        let symbol = subscription.symbol.as_str();
        let (adapter, legs) = match open_legs(ctx, subscription).await {
            Ok((_, legs)) if legs.is_empty() => continue,
            Ok(found) => found,
            Err(e) => {
                report.failures.push(CloseFailure::new(symbol, &e));
                first_error.get_or_insert(e);
                continue;
            }
        };

        tracing::info!(symbol, legs = legs.len(), "Closing positions at market");
        let exits = place_exits(ctx, adapter, symbol, &legs, ExitPricing::Market).await;
        report.closed.extend(exits.closed);
        if let Some(e) = exits.error {
            report.failures.push(CloseFailure::new(symbol, &e));
            first_error.get_or_insert(e);
        }
    }

    if report.closed.is_empty() {
        return Err(first_error.unwrap_or_else(|| EngineError::NoOpenPositions(scope.to_string())));
    }
    Ok(report)
}

/// Broker session and open legs of one subscription.
async fn open_legs<'a>(
    ctx: &'a CycleContext,
    subscription: &Subscription,
) -> Result<(&'a Arc<dyn BrokerAdapter>, Vec<Position>), EngineError> {
    let symbol = subscription.symbol.as_str();
    let adapter = ctx.adapter(subscription)?;
    let positions = ctx
        .retry
        .run("fetch_positions", &ctx.cancel, || adapter.fetch_positions())
        .await
        .map_err(|e| EngineError::adapter(symbol, "fetch_positions", e))?;
    let legs = reconcile(symbol, &positions).all_legs().cloned().collect();
    Ok((adapter, legs))
}
