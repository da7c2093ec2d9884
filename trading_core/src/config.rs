//! Coordinator-wide configuration, loaded from the environment — defaults
//! baked in, overridable by env var, no config file format of its own.

use ledger::UserId;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::env;
use uuid::Uuid;

#[derive(Debug, Clone, Copy)]
pub struct TradingConfig {
    pub taker_fee_rate: Decimal,
    pub max_quantity: Decimal,
    pub min_price: Decimal,
    pub max_price: Decimal,
    pub system_account_id: UserId,
    pub max_storage_retries: u32,
    pub retry_base_delay_ms: u64,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            taker_fee_rate: dec!(0.01),
            max_quantity: dec!(1000000),
            min_price: dec!(0.01),
            max_price: dec!(0.99),
            system_account_id: Uuid::nil(),
            max_storage_retries: 3,
            retry_base_delay_ms: 50,
        }
    }
}

impl TradingConfig {
    /// Read overrides from the environment, falling back to `Default` for
    /// anything unset or unparseable. `SYSTEM_ACCOUNT_ID` defaults to the
    /// nil UUID, which is fine for a standalone deployment but should be set
    /// explicitly once a real account namespace exists.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let parse_decimal = |key: &str, default: Decimal| {
            env::var(key)
                .ok()
                .and_then(|v| v.parse::<Decimal>().ok())
                .unwrap_or(default)
        };

        Self {
            taker_fee_rate: parse_decimal("TAKER_FEE_RATE", defaults.taker_fee_rate),
            max_quantity: parse_decimal("MAX_QUANTITY", defaults.max_quantity),
            min_price: parse_decimal("MIN_PRICE", defaults.min_price),
            max_price: parse_decimal("MAX_PRICE", defaults.max_price),
            system_account_id: env::var("SYSTEM_ACCOUNT_ID")
                .ok()
                .and_then(|v| v.parse::<Uuid>().ok())
                .unwrap_or(defaults.system_account_id),
            max_storage_retries: env::var("MAX_STORAGE_RETRIES")
                .ok()
                .and_then(|v| v.parse::<u32>().ok())
                .unwrap_or(defaults.max_storage_retries),
            retry_base_delay_ms: env::var("RETRY_BASE_DELAY_MS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(defaults.retry_base_delay_ms),
        }
    }
}
