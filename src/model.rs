//! Shared identifiers and request-level types.

use std::fmt;

use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// User identifier.
pub type UserId = Uuid;

/// Product identifier.
pub type ProductId = Uuid;

/// Dispensary identifier.
pub type DispensaryId = Uuid;

/// Order identifier.
pub type OrderId = Uuid;

/// Physical slot label inside a dispensary, e.g. `"A1"`.
pub type SlotId = String;

/// Human-readable transaction identifier: `TXN<epoch-millis><random suffix>`.
///
/// Generated once when the owning record is created and never recomputed;
/// the millisecond prefix keeps identifiers roughly sortable, the random
/// suffix disambiguates identifiers minted within the same millisecond.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxnId(String);

impl TxnId {
    const SUFFIX_LEN: usize = 9;

    pub fn generate() -> Self {
        let millis = chrono::Utc::now().timestamp_millis();
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(Self::SUFFIX_LEN)
            .map(|b| (b as char).to_ascii_lowercase())
            .collect();
        TxnId(format!("TXN{millis}{suffix}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Role attached to an authenticated identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Staff,
    Admin,
}

/// An authenticated identity, supplied by the external auth service and
/// trusted as-is for ownership and authorization checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Principal {
    pub user: UserId,
    pub role: Role,
}

impl Principal {
    pub fn new(user: UserId, role: Role) -> Self {
        Self { user, role }
    }

    /// Staff and admins operate machines; students only own orders.
    pub fn is_operator(&self) -> bool {
        matches!(self.role, Role::Staff | Role::Admin)
    }
}

/// How an order is paid. Only `Wallet` settles inside this engine; the
/// others are stubbed external gateways. `Admin` is reserved for ledger
/// adjustments (wallet recharges) and is not a valid order method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Wallet,
    Card,
    Upi,
    Cash,
    Admin,
}

/// Payment settlement state of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Completed,
    Failed,
    Refunded,
}

/// Order lifecycle state.
///
/// Forward path: `Placed → Processing → Dispensed → Completed`.
/// Cancellation diverts from `Placed` or `Processing` only; once goods left
/// the machine there is nothing to divert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[default]
    Placed,
    Processing,
    Dispensed,
    Completed,
    Cancelled,
}

impl OrderStatus {
    /// Whether `self → next` is a legal transition. No skips, no backward
    /// moves; this doubles as the compare-and-set guard that keeps a
    /// concurrent cancel and dispense mutually exclusive.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Placed, Processing)
                | (Processing, Dispensed)
                | (Dispensed, Completed)
                | (Placed, Cancelled)
                | (Processing, Cancelled)
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OrderStatus::Placed => "placed",
            OrderStatus::Processing => "processing",
            OrderStatus::Dispensed => "dispensed",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn txn_id_has_prefix_and_suffix() {
        let id = TxnId::generate();
        assert!(id.as_str().starts_with("TXN"));
        // "TXN" + at least 13 digits of epoch millis + 9 suffix chars
        assert!(id.as_str().len() >= 3 + 13 + TxnId::SUFFIX_LEN);
    }

    #[test]
    fn txn_ids_are_unique() {
        let a = TxnId::generate();
        let b = TxnId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn txn_id_suffix_is_lowercase_alphanumeric() {
        let id = TxnId::generate();
        let suffix = &id.as_str()[id.as_str().len() - TxnId::SUFFIX_LEN..];
        assert!(
            suffix
                .chars()
                .all(|c| c.is_ascii_digit() || c.is_ascii_lowercase())
        );
    }

    #[test]
    fn operator_roles() {
        let user = Uuid::new_v4();
        assert!(!Principal::new(user, Role::Student).is_operator());
        assert!(Principal::new(user, Role::Staff).is_operator());
        assert!(Principal::new(user, Role::Admin).is_operator());
    }

    #[test]
    fn forward_transitions_are_legal() {
        use OrderStatus::*;
        assert!(Placed.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Dispensed));
        assert!(Dispensed.can_transition_to(Completed));
        assert!(Placed.can_transition_to(Cancelled));
        assert!(Processing.can_transition_to(Cancelled));
    }

    #[test]
    fn skips_and_backward_moves_are_illegal() {
        use OrderStatus::*;
        assert!(!Placed.can_transition_to(Dispensed));
        assert!(!Placed.can_transition_to(Completed));
        assert!(!Processing.can_transition_to(Completed));
        assert!(!Dispensed.can_transition_to(Cancelled));
        assert!(!Dispensed.can_transition_to(Processing));
        assert!(!Completed.can_transition_to(Cancelled));
        assert!(!Completed.can_transition_to(Placed));
        assert!(!Cancelled.can_transition_to(Placed));
        assert!(!Placed.can_transition_to(Placed));
    }

    #[test]
    fn payment_method_wire_names() {
        assert_eq!(
            serde_json::to_string(&PaymentMethod::Wallet).unwrap(),
            "\"wallet\""
        );
        assert_eq!(
            serde_json::to_string(&PaymentMethod::Upi).unwrap(),
            "\"upi\""
        );
    }
}
