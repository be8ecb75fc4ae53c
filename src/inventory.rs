//! Inventory store.
//!
//! One record per (product, dispensary) pair. Check-then-decrement runs
//! inside a single per-key guard so two concurrent orders cannot both pass
//! the stock check and drive the quantity below zero.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::Amount;
use crate::model::{DispensaryId, ProductId, SlotId};

/// Derived stock state of an inventory record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StockStatus {
    Active,
    LowStock,
    OutOfStock,
    Expired,
}

/// Stock of one product at one dispensary.
#[derive(Debug, Clone, Serialize)]
pub struct InventoryRecord {
    pub product: ProductId,
    pub dispensary: DispensaryId,
    pub quantity: u32,
    /// Slot label this product occupies, e.g. `"A1"`.
    pub slot: SlotId,
    pub batch_number: Option<String>,
    pub expiry_date: Option<DateTime<Utc>>,
    pub cost_price: Amount,
    pub selling_price: Amount,
    /// Quantity at or below which the record reads `low_stock`.
    pub restock_level: u32,
    pub last_restocked: DateTime<Utc>,
    pub status: StockStatus,
}

impl InventoryRecord {
    pub const DEFAULT_RESTOCK_LEVEL: u32 = 5;

    pub fn new(
        product: ProductId,
        dispensary: DispensaryId,
        slot: impl Into<SlotId>,
        quantity: u32,
        cost_price: Amount,
        selling_price: Amount,
    ) -> Self {
        let mut record = Self {
            product,
            dispensary,
            quantity,
            slot: slot.into(),
            batch_number: None,
            expiry_date: None,
            cost_price,
            selling_price,
            restock_level: Self::DEFAULT_RESTOCK_LEVEL,
            last_restocked: Utc::now(),
            status: StockStatus::Active,
        };
        record.recompute_status();
        record
    }

    fn recompute_status(&mut self) {
        self.status = if self
            .expiry_date
            .is_some_and(|expiry| expiry < Utc::now())
        {
            StockStatus::Expired
        } else if self.quantity == 0 {
            StockStatus::OutOfStock
        } else if self.quantity <= self.restock_level {
            StockStatus::LowStock
        } else {
            StockStatus::Active
        };
    }
}

/// Error during an inventory operation.
#[derive(Debug, Error)]
pub enum StockError {
    #[error("insufficient stock for product {product} at dispensary {dispensary}: available {available}, requested {requested}")]
    InsufficientStock {
        product: ProductId,
        dispensary: DispensaryId,
        available: u32,
        requested: u32,
    },

    #[error("no inventory record for product {product} at dispensary {dispensary}")]
    RecordNotFound {
        product: ProductId,
        dispensary: DispensaryId,
    },
}

type StockKey = (ProductId, DispensaryId);

/// The inventory store.
#[derive(Debug, Default)]
pub struct InventoryStore {
    records: DashMap<StockKey, InventoryRecord>,
}

impl InventoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the record for its (product, dispensary) pair.
    pub fn put(&self, mut record: InventoryRecord) {
        record.recompute_status();
        self.records
            .insert((record.product, record.dispensary), record);
    }

    /// Snapshot of one record.
    pub fn get(&self, product: ProductId, dispensary: DispensaryId) -> Option<InventoryRecord> {
        self.records.get(&(product, dispensary)).map(|r| r.clone())
    }

    /// All records at one dispensary, ordered by slot label.
    pub fn for_dispensary(&self, dispensary: DispensaryId) -> Vec<InventoryRecord> {
        let mut records: Vec<_> = self
            .records
            .iter()
            .filter(|entry| entry.value().dispensary == dispensary)
            .map(|entry| entry.value().clone())
            .collect();
        records.sort_by(|a, b| a.slot.cmp(&b.slot));
        records
    }

    /// Validate that `requested` units are available, returning a snapshot
    /// of the matching record (frozen price and slot for the order line).
    pub fn check(
        &self,
        product: ProductId,
        dispensary: DispensaryId,
        requested: u32,
    ) -> Result<InventoryRecord, StockError> {
        let record =
            self.records
                .get(&(product, dispensary))
                .ok_or(StockError::InsufficientStock {
                    product,
                    dispensary,
                    available: 0,
                    requested,
                })?;
        if record.quantity < requested {
            return Err(StockError::InsufficientStock {
                product,
                dispensary,
                available: record.quantity,
                requested,
            });
        }
        Ok(record.clone())
    }

    /// Remove `quantity` units; fails without mutating if that would go
    /// negative. Returns the new quantity.
    pub fn decrement(
        &self,
        product: ProductId,
        dispensary: DispensaryId,
        quantity: u32,
    ) -> Result<u32, StockError> {
        let mut record =
            self.records
                .get_mut(&(product, dispensary))
                .ok_or(StockError::InsufficientStock {
                    product,
                    dispensary,
                    available: 0,
                    requested: quantity,
                })?;
        if record.quantity < quantity {
            return Err(StockError::InsufficientStock {
                product,
                dispensary,
                available: record.quantity,
                requested: quantity,
            });
        }
        record.quantity -= quantity;
        record.recompute_status();
        info!(
            product = %product,
            dispensary = %dispensary,
            taken = quantity,
            remaining = record.quantity,
            "stock decremented"
        );
        Ok(record.quantity)
    }

    /// Return `quantity` units (cancellation path). No upper bound is
    /// enforced. Returns the new quantity.
    pub fn increment(
        &self,
        product: ProductId,
        dispensary: DispensaryId,
        quantity: u32,
    ) -> Result<u32, StockError> {
        let mut record = self
            .records
            .get_mut(&(product, dispensary))
            .ok_or(StockError::RecordNotFound {
                product,
                dispensary,
            })?;
        record.quantity += quantity;
        record.recompute_status();
        info!(
            product = %product,
            dispensary = %dispensary,
            restored = quantity,
            remaining = record.quantity,
            "stock incremented"
        );
        Ok(record.quantity)
    }

    /// Refill a record, stamping `last_restocked`.
    pub fn restock(
        &self,
        product: ProductId,
        dispensary: DispensaryId,
        quantity: u32,
    ) -> Result<u32, StockError> {
        let mut record = self
            .records
            .get_mut(&(product, dispensary))
            .ok_or(StockError::RecordNotFound {
                product,
                dispensary,
            })?;
        record.quantity += quantity;
        record.last_restocked = Utc::now();
        record.recompute_status();
        Ok(record.quantity)
    }
}
