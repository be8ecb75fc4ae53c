//! Error types for engine operations.

use thiserror::Error;

use crate::dispensary::{DispensaryError, DispensaryStatus};
use crate::inventory::StockError;
use crate::ledger::LedgerError;
use crate::model::{DispensaryId, OrderId, OrderStatus, PaymentMethod, UserId};

/// Top-level error returned by [`Engine`](super::Engine) operations when a
/// caller wants one unified type.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("order operation failed: {0}")]
    Order(#[from] OrderError),

    #[error("dispense failed: {0}")]
    Dispense(#[from] DispenseError),

    #[error("admin operation failed: {0}")]
    Admin(#[from] AdminError),
}

/// Error during order lifecycle processing.
#[derive(Debug, Error)]
pub enum OrderError {
    #[error("order {0} not found")]
    OrderNotFound(OrderId),

    #[error("access denied for user {0}")]
    AccessDenied(UserId),

    #[error("illegal order transition {from} -> {to} for order {order}")]
    InvalidTransition {
        order: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    },

    #[error("payment method {0:?} is not valid for orders")]
    UnsupportedPaymentMethod(PaymentMethod),

    #[error(transparent)]
    Stock(#[from] StockError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// The order was cancelled and its stock restored, but the refund did
    /// not go through; an operator must reconcile the wallet manually.
    #[error("order {order} cancelled and stock restored, but refund failed: {source}")]
    RefundFailed {
        order: OrderId,
        source: LedgerError,
    },
}

/// Error during a physical hand-off.
#[derive(Debug, Error)]
pub enum DispenseError {
    #[error("access denied for user {0}")]
    AccessDenied(UserId),

    #[error("order {0} not found")]
    OrderNotFound(OrderId),

    /// The order is not ready for dispensing.
    #[error("order {order} is in status {status}, expected processing")]
    InvalidState {
        order: OrderId,
        status: OrderStatus,
    },

    #[error("dispensary {dispensary} is {status:?}, not active")]
    DispensaryUnavailable {
        dispensary: DispensaryId,
        status: DispensaryStatus,
    },

    #[error(transparent)]
    Dispensary(#[from] DispensaryError),
}

/// Error during an operator-facing admin operation.
#[derive(Debug, Error)]
pub enum AdminError {
    #[error("access denied for user {0}")]
    AccessDenied(UserId),

    #[error(transparent)]
    Dispensary(#[from] DispensaryError),

    #[error(transparent)]
    Stock(#[from] StockError),
}
