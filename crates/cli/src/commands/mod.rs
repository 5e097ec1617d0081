//! CLI commands for the intraday options engine.

pub mod clock;
pub mod run;
pub mod signal;

pub use clock::{run_clock, ClockArgs};
pub use run::{run_engine, RunArgs};
pub use signal::{run_signal, SignalArgs};
