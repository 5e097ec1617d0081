pub mod decision;
pub mod indicators;
pub mod table;

pub use decision::{decide, decide_action, signals, Signals};
pub use indicators::{compute, latest, IndicatorRow, MIN_ROWS};
