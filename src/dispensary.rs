//! Dispensary registry: physical units, their labeled slot arrays, and
//! environmental telemetry.
//!
//! Slot labels are assigned once at registration by enumerating lettered
//! rows of ten columns (`A1..A10, B1..`) up to the declared capacity and
//! are never reassigned.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::model::{DispensaryId, ProductId, SlotId};

/// Columns per lettered slot row.
const SLOTS_PER_ROW: u32 = 10;

/// Operational state of a dispensary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DispensaryStatus {
    #[default]
    Active,
    Maintenance,
    Offline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerStatus {
    #[default]
    On,
    Off,
    Battery,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkStatus {
    #[default]
    Connected,
    Disconnected,
    Poor,
}

/// Environmental readings reported by the cabinet.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Telemetry {
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub power: PowerStatus,
    pub network: NetworkStatus,
}

/// One physical compartment. Occupied iff it still holds units.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Slot {
    pub id: SlotId,
    pub is_occupied: bool,
    pub product: Option<ProductId>,
    pub quantity: u32,
}

/// Where a unit is installed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Location {
    pub building: String,
    pub floor: i32,
    pub room: Option<String>,
}

/// A physical vending unit with a fixed-size slot array.
#[derive(Debug, Clone, Serialize)]
pub struct Dispensary {
    pub id: DispensaryId,
    pub name: String,
    pub location: Location,
    pub capacity: u32,
    pub slots: Vec<Slot>,
    pub status: DispensaryStatus,
    pub telemetry: Telemetry,
    pub last_maintenance: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Dispensary {
    pub fn slot(&self, slot_id: &str) -> Option<&Slot> {
        self.slots.iter().find(|s| s.id == slot_id)
    }
}

/// Label for the `index`-th slot (0-based): `A1..A10`, then `B1..`.
fn slot_label(index: u32) -> SlotId {
    let row = char::from(b'A' + (index / SLOTS_PER_ROW) as u8);
    let column = index % SLOTS_PER_ROW + 1;
    format!("{row}{column}")
}

/// Fields an operator may patch on a dispensary; `None` leaves the current
/// value in place.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusPatch {
    pub status: Option<DispensaryStatus>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub power: Option<PowerStatus>,
    pub network: Option<NetworkStatus>,
}

/// Error during a dispensary operation.
#[derive(Debug, Error)]
pub enum DispensaryError {
    #[error("dispensary {0} not found")]
    DispensaryNotFound(DispensaryId),

    #[error("slot {slot} not found in dispensary {dispensary}")]
    SlotNotFound {
        dispensary: DispensaryId,
        slot: SlotId,
    },
}

/// The dispensary registry.
#[derive(Debug, Default)]
pub struct DispensaryStore {
    units: DashMap<DispensaryId, Dispensary>,
}

impl DispensaryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a unit, enumerating `capacity` empty slots.
    pub fn register(&self, name: impl Into<String>, location: Location, capacity: u32) -> Dispensary {
        let slots = (0..capacity)
            .map(|index| Slot {
                id: slot_label(index),
                is_occupied: false,
                product: None,
                quantity: 0,
            })
            .collect();
        let dispensary = Dispensary {
            id: Uuid::new_v4(),
            name: name.into(),
            location,
            capacity,
            slots,
            status: DispensaryStatus::default(),
            telemetry: Telemetry::default(),
            last_maintenance: None,
            created_at: Utc::now(),
        };
        info!(dispensary = %dispensary.id, name = %dispensary.name, capacity, "dispensary registered");
        self.units.insert(dispensary.id, dispensary.clone());
        dispensary
    }

    /// Snapshot of one unit.
    pub fn get(&self, id: DispensaryId) -> Option<Dispensary> {
        self.units.get(&id).map(|d| d.clone())
    }

    /// All units, ordered by name.
    pub fn list(&self) -> Vec<Dispensary> {
        let mut units: Vec<_> = self.units.iter().map(|d| d.value().clone()).collect();
        units.sort_by(|a, b| a.name.cmp(&b.name));
        units
    }

    /// Apply an operator patch to status and telemetry, returning the
    /// updated snapshot.
    pub fn update_status(
        &self,
        id: DispensaryId,
        patch: StatusPatch,
    ) -> Result<Dispensary, DispensaryError> {
        let mut unit = self
            .units
            .get_mut(&id)
            .ok_or(DispensaryError::DispensaryNotFound(id))?;
        if let Some(status) = patch.status {
            unit.status = status;
            if status == DispensaryStatus::Maintenance {
                unit.last_maintenance = Some(Utc::now());
            }
        }
        if let Some(temperature) = patch.temperature {
            unit.telemetry.temperature = Some(temperature);
        }
        if let Some(humidity) = patch.humidity {
            unit.telemetry.humidity = Some(humidity);
        }
        if let Some(power) = patch.power {
            unit.telemetry.power = power;
        }
        if let Some(network) = patch.network {
            unit.telemetry.network = network;
        }
        info!(dispensary = %id, status = ?unit.status, "dispensary status updated");
        Ok(unit.clone())
    }

    /// Load a slot with a product, setting its physical quantity.
    pub fn fill_slot(
        &self,
        id: DispensaryId,
        slot_id: &str,
        product: ProductId,
        quantity: u32,
    ) -> Result<Slot, DispensaryError> {
        let mut unit = self
            .units
            .get_mut(&id)
            .ok_or(DispensaryError::DispensaryNotFound(id))?;
        let slot = unit
            .slots
            .iter_mut()
            .find(|s| s.id == slot_id)
            .ok_or_else(|| DispensaryError::SlotNotFound {
                dispensary: id,
                slot: slot_id.to_string(),
            })?;
        slot.product = Some(product);
        slot.quantity = quantity;
        slot.is_occupied = quantity > 0;
        Ok(slot.clone())
    }

    /// Take one unit out of a slot. When the slot empties, the occupied
    /// flag clears and the product assignment is released.
    pub fn release_slot(&self, id: DispensaryId, slot_id: &str) -> Result<Slot, DispensaryError> {
        let mut unit = self
            .units
            .get_mut(&id)
            .ok_or(DispensaryError::DispensaryNotFound(id))?;
        let slot = unit
            .slots
            .iter_mut()
            .find(|s| s.id == slot_id)
            .ok_or_else(|| DispensaryError::SlotNotFound {
                dispensary: id,
                slot: slot_id.to_string(),
            })?;
        slot.quantity = slot.quantity.saturating_sub(1);
        if slot.quantity == 0 {
            slot.is_occupied = false;
            slot.product = None;
        }
        info!(dispensary = %id, slot = %slot.id, remaining = slot.quantity, "slot released");
        Ok(slot.clone())
    }
}
