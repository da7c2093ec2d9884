//! Trading coordinator and external-interface adapters for the
//! prediction-market trading core. Wires the decimal, ledger, matching
//! engine, and settlement crates into one single-writer-per-market service.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod serialize;
pub mod storage;
pub mod types;

pub use config::TradingConfig;
pub use coordinator::{BestPrices, MarketSnapshotResult, PlaceOrderResult, Portfolio, TradingCoordinator};
pub use error::CoordinatorError;
pub use storage::{InMemoryStorage, Storage, StorageError, StorageTransaction};
pub use types::{MarketRecord, MarketResolution, MarketStatus, OrderRecord, TradeRecord};

pub use ledger::Outcome;
pub use matching_engine::Side;
