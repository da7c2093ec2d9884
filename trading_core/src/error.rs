use decimal::DecimalError;
use ledger::{LedgerError, MarketId, PositionError, UserId};
use matching_engine::OrderId;
use settlement::SettlementError;

/// The taxonomy from the error-handling design: input errors, business
/// errors, invariant violations, and storage errors, each handled
/// differently by the caller.
#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    // --- input errors: reject early, no side effects ---
    #[error("market {0} not found")]
    MarketNotFound(MarketId),
    #[error("order {0} not found")]
    OrderNotFound(OrderId),
    #[error("user {0} is not the owner of this order")]
    NotOwner(UserId),
    #[error("price {0} is outside the configured [{1}, {2}] range")]
    InvalidPrice(rust_decimal::Decimal, rust_decimal::Decimal, rust_decimal::Decimal),
    #[error("quantity {0} is zero or exceeds the configured maximum {1}")]
    InvalidQuantity(rust_decimal::Decimal, rust_decimal::Decimal),

    // --- business errors: reject, no state change ---
    #[error("market {0} is not open")]
    MarketNotOpen(MarketId),
    #[error("user {user_id} has insufficient available funds: needs {needed}, has {available}")]
    InsufficientFunds {
        user_id: UserId,
        needed: rust_decimal::Decimal,
        available: rust_decimal::Decimal,
    },
    #[error("user {user_id} has insufficient unreserved shares: needs {needed}, has {available}")]
    InsufficientShares {
        user_id: UserId,
        needed: rust_decimal::Decimal,
        available: rust_decimal::Decimal,
    },
    #[error("order {0} is not in a cancellable state")]
    NotCancellable(OrderId),

    // --- invariant violations: fatal, a bug or a concurrent writer ---
    #[error("reservation mismatch for user {user_id} during recovery: ledger reserved {ledger_reserved}, recomputed {recomputed}")]
    ReservationMismatch {
        user_id: UserId,
        ledger_reserved: rust_decimal::Decimal,
        recomputed: rust_decimal::Decimal,
    },
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Position(#[from] PositionError),
    #[error(transparent)]
    Settlement(#[from] SettlementError),
    #[error(transparent)]
    Decimal(#[from] DecimalError),

    // --- storage errors ---
    #[error("transient storage error: {0}")]
    StorageTransient(String),
    #[error("permanent storage error: {0}")]
    StoragePermanent(String),
}

impl CoordinatorError {
    /// Whether this is a bug/concurrent-writer class error that should never
    /// be retried blindly by the caller.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            CoordinatorError::ReservationMismatch { .. } | CoordinatorError::Ledger(LedgerError::InvariantViolation { .. })
        )
    }
}
