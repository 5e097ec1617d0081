//! Paper trading broker for the intraday options engine.
//!
//! Serves candles seeded from CSV files, lists a synthetic weekly option
//! chain around spot and simulates fills in memory. Used for dry runs and
//! as the broker behind the engine's own tests.

pub mod broker;
pub mod loader;

pub use broker::{paper_key, weekly_expiry, Fill, PaperBroker};
pub use loader::{load_candles, parse_timestamp, read_candles};
