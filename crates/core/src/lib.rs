pub mod candle;
pub mod clock;
pub mod config;
pub mod config_loader;
pub mod contract;
pub mod error;
pub mod events;
pub mod position;
pub mod subscription;
pub mod traits;

pub use candle::{Candle, CandleSeries, CandleWindow};
pub use clock::{Buckets, Clock, IntervalClock, SystemClock};
pub use config::{AppConfig, BrokersConfig, EngineConfig, PaperConfig, RetryConfig, UpstoxConfig};
pub use config_loader::ConfigLoader;
pub use contract::{InstrumentKey, OptionContract};
pub use error::{BrokerError, BrokerResult, EngineError};
pub use events::{EntryOrder, ExitOrder, OptionType, OrderId, OrderSide, TradeAction, TradeIntent};
pub use position::{reconcile, Position, PositionBook, PositionState};
pub use subscription::{BrokerId, StrategyKind, Subscription};
pub use traits::BrokerAdapter;
