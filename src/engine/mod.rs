//! The order/payment/inventory consistency engine.
//!
//! The engine orchestrates the ledger, the inventory store and the
//! dispensary registry to keep order state consistent with payment and
//! stock state. There is no cross-resource transaction primitive: every
//! operation applies its mutations in a fixed order (inventory check →
//! wallet debit → inventory decrement), each step runs inside a per-key
//! critical section, and a step that loses a race is compensated rather
//! than retried.
//!
//! # Create-order flow
//!
//! ```text
//! create_order(user, dispensary, lines, method)
//!     ├─ 1. Validate stock, freeze line prices and slot labels
//!     ├─ 2. Build the order (placed/pending) with txn id + QR payload
//!     ├─ 3. Wallet pre-check, then debit (idempotent by (order, kind))
//!     ├─ 4. Decrement each line's stock; on failure re-increment what
//!     │     was taken, refund the debit, and fail
//!     ├─ 5. Publish the order
//!     └─ 6. Emit order-placed (fire-and-forget)
//! ```

mod error;
pub use error::{AdminError, DispenseError, EngineError, OrderError};

pub mod order;
pub use order::{LineRequest, Order, OrderLine, QrPayload};

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{error, info, warn};

use crate::Amount;
use crate::dispensary::{
    Dispensary, DispensaryError, DispensaryStatus, DispensaryStore, Location, Slot, StatusPatch,
};
use crate::events::{Event, EventSink, NullSink};
use crate::inventory::{InventoryRecord, InventoryStore};
use crate::ledger::{Ledger, LedgerError, WalletTransaction};
use crate::model::{
    DispensaryId, OrderId, OrderStatus, PaymentMethod, PaymentStatus, Principal, ProductId, UserId,
};

/// The consistency engine. All operations take `&self` and may be invoked
/// concurrently; per-key serialization lives in the component stores.
pub struct Engine {
    ledger: Ledger,
    inventory: InventoryStore,
    dispensaries: DispensaryStore,
    orders: DashMap<OrderId, Order>,
    sink: Arc<dyn EventSink>,
}

/// Public API
impl Engine {
    /// Engine with no notification transport wired up.
    pub fn new() -> Self {
        Self::with_sink(Arc::new(NullSink))
    }

    /// Engine publishing lifecycle events through `sink`.
    pub fn with_sink(sink: Arc<dyn EventSink>) -> Self {
        Self {
            ledger: Ledger::new(),
            inventory: InventoryStore::new(),
            dispensaries: DispensaryStore::new(),
            orders: DashMap::new(),
            sink,
        }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn inventory(&self) -> &InventoryStore {
        &self.inventory
    }

    pub fn dispensaries(&self) -> &DispensaryStore {
        &self.dispensaries
    }

    /// Create an order for the requesting user. Line quantities must be
    /// at least 1 (enforced by the request validation layer upstream).
    ///
    /// Prices and slot labels are frozen from the matching inventory
    /// records. Wallet orders settle immediately: payment flips to
    /// `completed` and the order to `processing` before stock commits.
    /// The order-placed event fires only after every mutation succeeded.
    pub fn create_order(
        &self,
        principal: Principal,
        dispensary: DispensaryId,
        requests: &[LineRequest],
        payment_method: PaymentMethod,
        notes: Option<String>,
    ) -> Result<Order, OrderError> {
        if payment_method == PaymentMethod::Admin {
            return Err(OrderError::UnsupportedPaymentMethod(payment_method));
        }

        // 1. Validate stock and freeze prices/slots.
        let mut lines = Vec::with_capacity(requests.len());
        for request in requests {
            let record = self
                .inventory
                .check(request.product, dispensary, request.quantity)?;
            lines.push(OrderLine {
                product: request.product,
                quantity: request.quantity,
                price: record.selling_price,
                slot: record.slot,
            });
        }

        // 2. Build the order; identifiers and QR payload are final from here.
        let mut order = Order::new(principal.user, dispensary, lines, payment_method, notes);

        // 3. Settle wallet payments. The pre-check fails fast before any
        // mutation; the debit re-checks inside the per-wallet guard.
        if payment_method == PaymentMethod::Wallet {
            let available = self
                .ledger
                .balance(principal.user)
                .ok_or(LedgerError::WalletNotFound(principal.user))?;
            if available < order.total_amount {
                return Err(LedgerError::InsufficientFunds {
                    user: principal.user,
                    available,
                    required: order.total_amount,
                }
                .into());
            }
            self.ledger
                .debit(principal.user, order.id, order.total_amount)?;
            order.payment_status = PaymentStatus::Completed;
            order.status = OrderStatus::Processing;
        }

        // 4. Commit stock. A line that lost the race since the check is
        // compensated: re-increment what was taken and refund the debit.
        let mut taken: Vec<&OrderLine> = Vec::new();
        for line in &order.lines {
            match self.inventory.decrement(line.product, dispensary, line.quantity) {
                Ok(_) => taken.push(line),
                Err(stock_err) => {
                    for done in &taken {
                        if let Err(undo_err) =
                            self.inventory.increment(done.product, dispensary, done.quantity)
                        {
                            error!(
                                order = %order.id,
                                product = %done.product,
                                "failed to restore stock while compensating: {undo_err}"
                            );
                        }
                    }
                    if order.payment_status == PaymentStatus::Completed {
                        if let Err(refund_err) =
                            self.ledger.refund(principal.user, order.id, order.total_amount)
                        {
                            error!(
                                order = %order.id,
                                user = %principal.user,
                                "failed to refund while compensating: {refund_err}"
                            );
                        }
                    }
                    warn!(
                        order = %order.id,
                        user = %principal.user,
                        reason = %stock_err,
                        "order creation compensated"
                    );
                    return Err(stock_err.into());
                }
            }
        }

        // 5/6. Publish, then notify.
        info!(
            order = %order.id,
            user = %principal.user,
            dispensary = %dispensary,
            total = %order.total_amount,
            status = %order.status,
            "order created"
        );
        self.orders.insert(order.id, order.clone());
        self.sink.publish(Event::OrderPlaced {
            order_id: order.id,
            user_id: order.user,
            dispensary_id: dispensary,
            status: order.status,
        });
        Ok(order)
    }

    /// Fetch one order; restricted to its owner or an operator.
    pub fn order(&self, id: OrderId, principal: Principal) -> Result<Order, OrderError> {
        let order = self
            .orders
            .get(&id)
            .ok_or(OrderError::OrderNotFound(id))?;
        if order.user != principal.user && !principal.is_operator() {
            return Err(OrderError::AccessDenied(principal.user));
        }
        Ok(order.clone())
    }

    /// A user's orders, newest first, optionally filtered by status. Only
    /// the user themselves or an operator may list them.
    pub fn orders_for_user(
        &self,
        user: UserId,
        principal: Principal,
        status: Option<OrderStatus>,
    ) -> Result<Vec<Order>, OrderError> {
        if user != principal.user && !principal.is_operator() {
            return Err(OrderError::AccessDenied(principal.user));
        }
        Ok(self.filtered_orders(|order| order.user == user, status))
    }

    /// A dispensary's orders, newest first; operator only.
    pub fn orders_for_dispensary(
        &self,
        dispensary: DispensaryId,
        principal: Principal,
        status: Option<OrderStatus>,
    ) -> Result<Vec<Order>, OrderError> {
        if !principal.is_operator() {
            return Err(OrderError::AccessDenied(principal.user));
        }
        Ok(self.filtered_orders(|order| order.dispensary == dispensary, status))
    }

    /// Transition an order's status; operator only. Only the forward
    /// transitions of the state machine are legal. Transitioning to
    /// `completed` stamps the collection timestamp.
    ///
    /// Cancellation through this path performs no refund or stock
    /// restoration; owners cancel through [`cancel_order`](Self::cancel_order).
    pub fn update_status(
        &self,
        id: OrderId,
        new_status: OrderStatus,
        principal: Principal,
    ) -> Result<Order, OrderError> {
        if !principal.is_operator() {
            return Err(OrderError::AccessDenied(principal.user));
        }
        let snapshot = {
            let mut order = self
                .orders
                .get_mut(&id)
                .ok_or(OrderError::OrderNotFound(id))?;
            if !order.status.can_transition_to(new_status) {
                return Err(OrderError::InvalidTransition {
                    order: id,
                    from: order.status,
                    to: new_status,
                });
            }
            order.status = new_status;
            if new_status == OrderStatus::Completed {
                order.collected_at = Some(chrono::Utc::now());
            }
            order.clone()
        };
        info!(order = %id, status = %new_status, "order status updated");
        self.sink.publish(Event::OrderStatusChanged {
            order_id: id,
            user_id: snapshot.user,
            status: new_status,
        });
        Ok(snapshot)
    }

    /// Cancel an order; owner only, and only while it is strictly before
    /// `dispensed`. The status flip inside the order guard is the
    /// compare-and-set that excludes a concurrent dispense.
    ///
    /// A completed payment is refunded in full. Stock restoration runs
    /// even when the refund fails; the refund failure is then surfaced as
    /// [`OrderError::RefundFailed`] for manual reconciliation.
    pub fn cancel_order(&self, id: OrderId, principal: Principal) -> Result<Order, OrderError> {
        let mut snapshot = {
            let mut order = self
                .orders
                .get_mut(&id)
                .ok_or(OrderError::OrderNotFound(id))?;
            if order.user != principal.user {
                return Err(OrderError::AccessDenied(principal.user));
            }
            if !order.status.can_transition_to(OrderStatus::Cancelled) {
                return Err(OrderError::InvalidTransition {
                    order: id,
                    from: order.status,
                    to: OrderStatus::Cancelled,
                });
            }
            order.status = OrderStatus::Cancelled;
            order.clone()
        };

        // Refund first (idempotent); restoration below runs regardless.
        let mut refund_failure = None;
        if snapshot.payment_status == PaymentStatus::Completed {
            match self
                .ledger
                .refund(snapshot.user, id, snapshot.total_amount)
            {
                Ok(_) => {
                    if let Some(mut order) = self.orders.get_mut(&id) {
                        order.payment_status = PaymentStatus::Refunded;
                    }
                    snapshot.payment_status = PaymentStatus::Refunded;
                }
                Err(err) => {
                    warn!(order = %id, user = %snapshot.user, "refund failed on cancellation: {err}");
                    refund_failure = Some(err);
                }
            }
        }

        let mut restore_failure = None;
        for line in &snapshot.lines {
            if let Err(err) =
                self.inventory
                    .increment(line.product, snapshot.dispensary, line.quantity)
            {
                error!(
                    order = %id,
                    product = %line.product,
                    "failed to restore stock on cancellation: {err}"
                );
                restore_failure.get_or_insert(err);
            }
        }

        if let Some(source) = refund_failure {
            return Err(OrderError::RefundFailed { order: id, source });
        }
        if let Some(err) = restore_failure {
            return Err(err.into());
        }
        info!(order = %id, user = %snapshot.user, "order cancelled");
        Ok(snapshot)
    }

    /// Hand goods over from a dispensary slot; operator only.
    ///
    /// The order must be in `processing` and the dispensary `active`, and
    /// the slot label must exist (an unknown slot is an explicit failure,
    /// not a no-op). On success the order transitions to `dispensed` and
    /// one unit leaves the slot.
    pub fn dispense(
        &self,
        dispensary: DispensaryId,
        order_id: OrderId,
        slot_id: &str,
        principal: Principal,
    ) -> Result<Order, DispenseError> {
        if !principal.is_operator() {
            return Err(DispenseError::AccessDenied(principal.user));
        }

        let unit = self
            .dispensaries
            .get(dispensary)
            .ok_or(DispensaryError::DispensaryNotFound(dispensary))?;

        let snapshot = {
            let mut order = self
                .orders
                .get_mut(&order_id)
                .ok_or(DispenseError::OrderNotFound(order_id))?;
            if order.status != OrderStatus::Processing {
                return Err(DispenseError::InvalidState {
                    order: order_id,
                    status: order.status,
                });
            }
            if unit.status != DispensaryStatus::Active {
                return Err(DispenseError::DispensaryUnavailable {
                    dispensary,
                    status: unit.status,
                });
            }
            // Validate the slot before flipping the order, so a bad label
            // leaves the order collectible.
            if unit.slot(slot_id).is_none() {
                return Err(DispensaryError::SlotNotFound {
                    dispensary,
                    slot: slot_id.to_string(),
                }
                .into());
            }
            order.status = OrderStatus::Dispensed;
            order.clone()
        };

        self.dispensaries.release_slot(dispensary, slot_id)?;

        info!(order = %order_id, dispensary = %dispensary, slot = %slot_id, "product dispensed");
        self.sink.publish(Event::ProductDispensed {
            order_id,
            dispensary_id: dispensary,
            slot_id: slot_id.to_string(),
            user_id: snapshot.user,
        });
        Ok(snapshot)
    }
}

/// Operator-facing administration
impl Engine {
    /// Fund a wallet. A user may recharge their own; operators may
    /// recharge anyone's.
    pub fn recharge_wallet(
        &self,
        principal: Principal,
        user: UserId,
        amount: Amount,
        method: PaymentMethod,
    ) -> Result<WalletTransaction, AdminError> {
        if user != principal.user && !principal.is_operator() {
            return Err(AdminError::AccessDenied(principal.user));
        }
        Ok(self.ledger.credit(user, amount, method, "Wallet recharge"))
    }

    /// Register a dispensary with `capacity` enumerated slots.
    pub fn register_dispensary(
        &self,
        principal: Principal,
        name: impl Into<String>,
        location: Location,
        capacity: u32,
    ) -> Result<Dispensary, AdminError> {
        self.require_operator(principal)?;
        Ok(self.dispensaries.register(name, location, capacity))
    }

    /// Patch a dispensary's operational status and telemetry; emits a
    /// status-changed event.
    pub fn update_dispensary_status(
        &self,
        principal: Principal,
        id: DispensaryId,
        patch: StatusPatch,
    ) -> Result<Dispensary, AdminError> {
        self.require_operator(principal)?;
        let unit = self.dispensaries.update_status(id, patch)?;
        self.sink.publish(Event::DispensaryStatusChanged {
            dispensary_id: unit.id,
            status: unit.status,
            telemetry: unit.telemetry,
        });
        Ok(unit)
    }

    /// Create or replace the inventory record for its (product,
    /// dispensary) pair.
    pub fn put_inventory(
        &self,
        principal: Principal,
        record: InventoryRecord,
    ) -> Result<(), AdminError> {
        self.require_operator(principal)?;
        self.inventory.put(record);
        Ok(())
    }

    /// Refill an inventory record.
    pub fn restock_inventory(
        &self,
        principal: Principal,
        product: ProductId,
        dispensary: DispensaryId,
        quantity: u32,
    ) -> Result<u32, AdminError> {
        self.require_operator(principal)?;
        Ok(self.inventory.restock(product, dispensary, quantity)?)
    }

    /// Load a physical slot with a product.
    pub fn fill_slot(
        &self,
        principal: Principal,
        dispensary: DispensaryId,
        slot_id: &str,
        product: ProductId,
        quantity: u32,
    ) -> Result<Slot, AdminError> {
        self.require_operator(principal)?;
        Ok(self
            .dispensaries
            .fill_slot(dispensary, slot_id, product, quantity)?)
    }
}

/// Private API
impl Engine {
    fn require_operator(&self, principal: Principal) -> Result<(), AdminError> {
        if principal.is_operator() {
            Ok(())
        } else {
            Err(AdminError::AccessDenied(principal.user))
        }
    }

    fn filtered_orders(
        &self,
        matches: impl Fn(&Order) -> bool,
        status: Option<OrderStatus>,
    ) -> Vec<Order> {
        let mut orders: Vec<_> = self
            .orders
            .iter()
            .filter(|entry| {
                matches(entry.value()) && status.is_none_or(|s| entry.value().status == s)
            })
            .map(|entry| entry.value().clone())
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        orders
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}
