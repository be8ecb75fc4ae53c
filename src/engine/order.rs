//! The order aggregate: one reservation of goods by one user from one
//! dispensary, with prices and slot labels frozen at creation time.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::Amount;
use crate::model::{
    DispensaryId, OrderId, OrderStatus, PaymentMethod, PaymentStatus, ProductId, SlotId, TxnId,
    UserId,
};

/// Minutes a paid order waits in the machine before the collect-by
/// deadline lapses.
const COLLECT_WINDOW_MINUTES: i64 = 30;

/// A requested (product, quantity) pair, before stock validation.
#[derive(Debug, Clone, Copy)]
pub struct LineRequest {
    pub product: ProductId,
    pub quantity: u32,
}

impl LineRequest {
    pub fn new(product: ProductId, quantity: u32) -> Self {
        Self { product, quantity }
    }
}

/// A validated order line. `price` and `slot` are snapshots taken from the
/// inventory record at creation and never re-derived.
#[derive(Debug, Clone, Serialize)]
pub struct OrderLine {
    pub product: ProductId,
    pub quantity: u32,
    pub price: Amount,
    pub slot: SlotId,
}

/// The QR payload handed to the physical scanner. External wire contract;
/// field names and shape must not change.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QrPayload {
    pub order_id: OrderId,
    pub transaction_id: TxnId,
    pub amount: Amount,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Order {
    pub id: OrderId,
    pub user: UserId,
    pub dispensary: DispensaryId,
    pub lines: Vec<OrderLine>,
    /// Sum of line totals, computed once at creation.
    pub total_amount: Amount,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub status: OrderStatus,
    /// Human-readable payment trail identifier, assigned once.
    pub txn_id: TxnId,
    /// Serialized [`QrPayload`] for pickup verification.
    pub qr_code: Option<String>,
    pub collect_by: DateTime<Utc>,
    pub collected_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Build a new order in `placed`/`pending` from validated lines. The
    /// total and the QR payload are fixed here and never recomputed.
    pub fn new(
        user: UserId,
        dispensary: DispensaryId,
        lines: Vec<OrderLine>,
        payment_method: PaymentMethod,
        notes: Option<String>,
    ) -> Self {
        let total_amount = lines
            .iter()
            .fold(Amount::default(), |sum, line| sum + line.price * line.quantity);
        let created_at = Utc::now();
        let mut order = Self {
            id: uuid::Uuid::new_v4(),
            user,
            dispensary,
            lines,
            total_amount,
            payment_method,
            payment_status: PaymentStatus::default(),
            status: OrderStatus::default(),
            txn_id: TxnId::generate(),
            qr_code: None,
            collect_by: created_at + Duration::minutes(COLLECT_WINDOW_MINUTES),
            collected_at: None,
            notes,
            created_at,
        };
        order.qr_code = serde_json::to_string(&order.qr_payload()).ok();
        order
    }

    /// The scanner payload built from this order's final identifiers.
    pub fn qr_payload(&self) -> QrPayload {
        QrPayload {
            order_id: self.id,
            transaction_id: self.txn_id.clone(),
            amount: self.total_amount,
            timestamp: self.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn line(price: f64, quantity: u32, slot: &str) -> OrderLine {
        OrderLine {
            product: Uuid::new_v4(),
            quantity,
            price: Amount::from_float(price),
            slot: slot.to_string(),
        }
    }

    fn order(lines: Vec<OrderLine>) -> Order {
        Order::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            lines,
            PaymentMethod::Wallet,
            None,
        )
    }

    #[test]
    fn total_is_sum_of_line_totals() {
        let order = order(vec![line(30.0, 2, "A1"), line(12.5, 4, "B3")]);
        assert_eq!(order.total_amount, Amount::from_float(110.0));
    }

    #[test]
    fn new_order_starts_placed_and_pending() {
        let order = order(vec![line(30.0, 1, "A1")]);
        assert_eq!(order.status, OrderStatus::Placed);
        assert_eq!(order.payment_status, PaymentStatus::Pending);
        assert!(order.collected_at.is_none());
    }

    #[test]
    fn collect_by_is_thirty_minutes_out() {
        let order = order(vec![line(30.0, 1, "A1")]);
        assert_eq!(
            order.collect_by - order.created_at,
            Duration::minutes(COLLECT_WINDOW_MINUTES)
        );
    }

    #[test]
    fn qr_code_carries_final_identifiers() {
        let order = order(vec![line(30.0, 2, "A1")]);
        let json: serde_json::Value =
            serde_json::from_str(order.qr_code.as_deref().unwrap()).unwrap();

        assert_eq!(json["orderId"], order.id.to_string());
        assert_eq!(json["transactionId"], order.txn_id.as_str());
        assert_eq!(json["amount"], 60.0);
        assert!(json["timestamp"].is_string());
    }

    #[test]
    fn empty_order_totals_zero() {
        let order = order(Vec::new());
        assert_eq!(order.total_amount, Amount::default());
    }
}
