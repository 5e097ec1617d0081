pub mod brokers;
pub mod commands;
pub mod cycle;
pub mod dispatch;
pub mod engine;
pub mod events;
pub mod handle;
pub mod retry;
pub mod scheduler;

pub use brokers::BrokerSet;
pub use commands::{
    CloseFailure, CloseReport, ClosedPosition, EngineSettings, EngineState, SchedulerCommand,
};
pub use engine::{start, Engine};
pub use events::{EngineEvent, EngineSnapshot, SubscriptionStatus};
pub use handle::SchedulerHandle;
pub use retry::RetryPolicy;
pub use scheduler::Scheduler;
