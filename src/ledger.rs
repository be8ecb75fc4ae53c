//! Wallet ledger.
//!
//! Owns per-user balances and the append-only transaction history. Entries
//! are never mutated or deleted once written; `balance_after` snapshots let
//! the ordered history reconstruct the balance exactly. Entries tied to an
//! order are deduplicated by `(order, kind)` so a retried debit or refund
//! returns the original entry instead of moving money twice.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::Amount;
use crate::model::{OrderId, PaymentMethod, TxnId, UserId};

/// Direction and purpose of a ledger entry.
///
/// `Credit` is a wallet recharge; `Refund` is the credit written when an
/// order is cancelled. Keeping them distinct means the audit trail tells a
/// recharge from a refund without parsing descriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TxnKind {
    Debit,
    Credit,
    Refund,
}

impl TxnKind {
    fn credits_balance(self) -> bool {
        matches!(self, TxnKind::Credit | TxnKind::Refund)
    }
}

/// Settlement state of a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TxnStatus {
    Pending,
    Completed,
    Failed,
}

/// An immutable ledger entry. `amount` is a positive magnitude; `kind`
/// carries the direction.
#[derive(Debug, Clone, Serialize)]
pub struct WalletTransaction {
    pub id: TxnId,
    pub user: UserId,
    pub order: Option<OrderId>,
    pub kind: TxnKind,
    pub amount: Amount,
    pub description: String,
    pub method: PaymentMethod,
    pub status: TxnStatus,
    /// Balance snapshot immediately after this entry applied.
    pub balance_after: Amount,
    pub created_at: DateTime<Utc>,
}

/// Per-user balance plus references into the transaction log.
///
/// The balance is the source of truth; the id list exists for display and
/// auditing and is never summed to re-derive the balance.
#[derive(Debug, Default)]
pub struct Wallet {
    pub balance: Amount,
    pub transactions: Vec<TxnId>,
}

/// Error during a ledger operation.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("no wallet for user {0}")]
    WalletNotFound(UserId),

    #[error("insufficient wallet balance for user {user}: available {available}, required {required}")]
    InsufficientFunds {
        user: UserId,
        available: Amount,
        required: Amount,
    },

    #[error("{kind:?} for order {order} already recorded with a different amount")]
    DuplicateTransaction { order: OrderId, kind: TxnKind },
}

/// The wallet ledger. Check-then-mutate runs inside a single per-key map
/// guard, which is the per-user critical section concurrent requests must
/// serialize on.
#[derive(Debug, Default)]
pub struct Ledger {
    wallets: DashMap<UserId, Wallet>,
    log: DashMap<TxnId, WalletTransaction>,
    /// Idempotency index for order-bound entries.
    by_order: DashMap<(OrderId, TxnKind), TxnId>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty wallet for `user` if none exists.
    pub fn open_wallet(&self, user: UserId) {
        self.wallets.entry(user).or_default();
    }

    /// Current balance, or `None` if the user has no wallet.
    pub fn balance(&self, user: UserId) -> Option<Amount> {
        self.wallets.get(&user).map(|w| w.balance)
    }

    /// A user's ledger entries in append order.
    pub fn transactions(&self, user: UserId) -> Vec<WalletTransaction> {
        let Some(wallet) = self.wallets.get(&user) else {
            return Vec::new();
        };
        wallet
            .transactions
            .iter()
            .filter_map(|id| self.log.get(id).map(|t| t.clone()))
            .collect()
    }

    /// Look up a single entry by its transaction identifier.
    pub fn transaction(&self, id: &TxnId) -> Option<WalletTransaction> {
        self.log.get(id).map(|t| t.clone())
    }

    /// Fund a wallet (recharge). Creates the wallet on first credit.
    pub fn credit(
        &self,
        user: UserId,
        amount: Amount,
        method: PaymentMethod,
        description: &str,
    ) -> WalletTransaction {
        let entry = {
            let mut wallet = self.wallets.entry(user).or_default();
            wallet.balance += amount;
            let entry = self.build_entry(user, None, TxnKind::Credit, amount, method, description, wallet.balance);
            wallet.transactions.push(entry.id.clone());
            entry
        };
        info!(user = %user, txn = %entry.id, amount = %amount, "wallet credited");
        self.log.insert(entry.id.clone(), entry.clone());
        entry
    }

    /// Debit an order payment from a wallet.
    ///
    /// The balance check runs inside the per-wallet guard, so two concurrent
    /// debits against the same user cannot both pass it. A retry for the
    /// same `(order, Debit)` key returns the existing entry.
    pub fn debit(
        &self,
        user: UserId,
        order: OrderId,
        amount: Amount,
    ) -> Result<WalletTransaction, LedgerError> {
        self.apply_order_entry(user, order, TxnKind::Debit, amount, "Order payment")
    }

    /// Credit a cancelled order's total back to its owner's wallet.
    ///
    /// Same idempotency contract as [`debit`](Self::debit), keyed by
    /// `(order, Refund)`.
    pub fn refund(
        &self,
        user: UserId,
        order: OrderId,
        amount: Amount,
    ) -> Result<WalletTransaction, LedgerError> {
        self.apply_order_entry(user, order, TxnKind::Refund, amount, "Order refund")
    }

    fn apply_order_entry(
        &self,
        user: UserId,
        order: OrderId,
        kind: TxnKind,
        amount: Amount,
        description: &str,
    ) -> Result<WalletTransaction, LedgerError> {
        // The index entry guard makes the dedup check and the wallet
        // mutation one atomic step for this (order, kind) key.
        match self.by_order.entry((order, kind)) {
            Entry::Occupied(indexed) => {
                let existing = self
                    .log
                    .get(indexed.get())
                    .map(|t| t.clone())
                    .ok_or(LedgerError::DuplicateTransaction { order, kind })?;
                if existing.amount != amount {
                    return Err(LedgerError::DuplicateTransaction { order, kind });
                }
                info!(user = %user, order = %order, txn = %existing.id, "{kind:?} retry returned existing entry");
                Ok(existing)
            }
            Entry::Vacant(indexed) => {
                let entry = {
                    let mut wallet = self
                        .wallets
                        .get_mut(&user)
                        .ok_or(LedgerError::WalletNotFound(user))?;
                    if kind.credits_balance() {
                        wallet.balance += amount;
                    } else {
                        if wallet.balance < amount {
                            return Err(LedgerError::InsufficientFunds {
                                user,
                                available: wallet.balance,
                                required: amount,
                            });
                        }
                        wallet.balance -= amount;
                    }
                    let entry = self.build_entry(
                        user,
                        Some(order),
                        kind,
                        amount,
                        PaymentMethod::Wallet,
                        description,
                        wallet.balance,
                    );
                    wallet.transactions.push(entry.id.clone());
                    entry
                };
                info!(
                    user = %user,
                    order = %order,
                    txn = %entry.id,
                    amount = %amount,
                    balance_after = %entry.balance_after,
                    "{kind:?} applied"
                );
                self.log.insert(entry.id.clone(), entry.clone());
                indexed.insert(entry.id.clone());
                Ok(entry)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn build_entry(
        &self,
        user: UserId,
        order: Option<OrderId>,
        kind: TxnKind,
        amount: Amount,
        method: PaymentMethod,
        description: &str,
        balance_after: Amount,
    ) -> WalletTransaction {
        WalletTransaction {
            id: TxnId::generate(),
            user,
            order,
            kind,
            amount,
            description: description.to_string(),
            method,
            status: TxnStatus::Completed,
            balance_after,
            created_at: Utc::now(),
        }
    }
}
