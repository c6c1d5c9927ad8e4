//! Persistence contracts the settlement core depends on, plus in-memory
//! implementations used by tests and local runs.
//!
//! The payment store's `insert_if_absent` is the single atomicity primitive
//! behind settlement idempotency; no in-process locking is layered on top.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::models::{Booking, BookingPaymentUpdate, PaymentRecord, Vehicle};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Conflicting record: {0}")]
    Conflict(String),
}

impl From<mongodb::error::Error> for StoreError {
    fn from(err: mongodb::error::Error) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

impl From<mongodb::bson::ser::Error> for StoreError {
    fn from(err: mongodb::bson::ser::Error) -> Self {
        StoreError::Unavailable(format!("serialization failed: {}", err))
    }
}

impl From<mongodb::bson::de::Error> for StoreError {
    fn from(err: mongodb::bson::de::Error) -> Self {
        StoreError::Unavailable(format!("deserialization failed: {}", err))
    }
}

/// Result of [`PaymentStore::insert_if_absent`].
#[derive(Debug, Clone)]
pub struct InsertOutcome {
    /// `false` when a record with the same key already existed.
    pub created: bool,
    /// The stored record: the new one, or the one that was already there.
    pub record: PaymentRecord,
}

#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn insert(&self, booking: &Booking) -> Result<(), StoreError>;

    async fn get(&self, id: &str) -> Result<Option<Booking>, StoreError>;

    /// Write only the payment fields of a booking.
    ///
    /// The write is conditional: it only lands while the booking has no
    /// `settlement_ref` or already carries `update.settlement_ref`. Returns
    /// `None` for an unknown id or a booking settled by another transaction.
    async fn apply_payment_update(
        &self,
        id: &str,
        update: &BookingPaymentUpdate,
    ) -> Result<Option<Booking>, StoreError>;
}

/// Vehicle pricing lookup. Registration happens elsewhere; `upsert` exists
/// for seeding.
#[async_trait]
pub trait VehicleStore: Send + Sync {
    async fn get(&self, car_name: &str) -> Result<Option<Vehicle>, StoreError>;

    async fn upsert(&self, vehicle: &Vehicle) -> Result<(), StoreError>;
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Insert unless a record for `(order_id, transaction_id)` exists.
    ///
    /// A transaction id already stored under a different order is a
    /// [`StoreError::Conflict`].
    async fn insert_if_absent(&self, record: PaymentRecord) -> Result<InsertOutcome, StoreError>;

    async fn find_by_key(
        &self,
        order_id: &str,
        transaction_id: &str,
    ) -> Result<Option<PaymentRecord>, StoreError>;

    async fn count(&self) -> Result<u64, StoreError>;
}

#[derive(Clone, Default)]
pub struct InMemoryBookingStore {
    bookings: Arc<DashMap<String, Booking>>,
}

impl InMemoryBookingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BookingStore for InMemoryBookingStore {
    async fn insert(&self, booking: &Booking) -> Result<(), StoreError> {
        match self.bookings.entry(booking.id.clone()) {
            Entry::Occupied(_) => Err(StoreError::Conflict(format!(
                "booking {} already exists",
                booking.id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(booking.clone());
                Ok(())
            }
        }
    }

    async fn get(&self, id: &str) -> Result<Option<Booking>, StoreError> {
        Ok(self.bookings.get(id).map(|b| b.clone()))
    }

    async fn apply_payment_update(
        &self,
        id: &str,
        update: &BookingPaymentUpdate,
    ) -> Result<Option<Booking>, StoreError> {
        let Some(mut booking) = self.bookings.get_mut(id) else {
            return Ok(None);
        };
        let settled_elsewhere = booking
            .settlement_ref
            .as_deref()
            .is_some_and(|existing| existing != update.settlement_ref);
        if settled_elsewhere {
            return Ok(None);
        }

        booking.apply_payment_update(update);
        Ok(Some(booking.clone()))
    }
}

#[derive(Clone, Default)]
pub struct InMemoryVehicleStore {
    vehicles: Arc<DashMap<String, Vehicle>>,
}

impl InMemoryVehicleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_vehicles(vehicles: impl IntoIterator<Item = Vehicle>) -> Self {
        let store = Self::new();
        for vehicle in vehicles {
            store.vehicles.insert(vehicle.car_name.clone(), vehicle);
        }
        store
    }
}

#[async_trait]
impl VehicleStore for InMemoryVehicleStore {
    async fn get(&self, car_name: &str) -> Result<Option<Vehicle>, StoreError> {
        Ok(self.vehicles.get(car_name).map(|v| v.clone()))
    }

    async fn upsert(&self, vehicle: &Vehicle) -> Result<(), StoreError> {
        self.vehicles.insert(vehicle.car_name.clone(), vehicle.clone());
        Ok(())
    }
}

/// Payment records keyed by transaction id, which is globally unique.
#[derive(Clone, Default)]
pub struct InMemoryPaymentStore {
    records: Arc<DashMap<String, PaymentRecord>>,
}

impl InMemoryPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn insert_if_absent(&self, record: PaymentRecord) -> Result<InsertOutcome, StoreError> {
        match self.records.entry(record.transaction_id.clone()) {
            Entry::Occupied(existing) => {
                let existing = existing.get();
                if existing.order_id != record.order_id {
                    return Err(StoreError::Conflict(format!(
                        "transaction {} is recorded under order {}",
                        record.transaction_id, existing.order_id
                    )));
                }
                Ok(InsertOutcome {
                    created: false,
                    record: existing.clone(),
                })
            }
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
                Ok(InsertOutcome {
                    created: true,
                    record,
                })
            }
        }
    }

    async fn find_by_key(
        &self,
        order_id: &str,
        transaction_id: &str,
    ) -> Result<Option<PaymentRecord>, StoreError> {
        Ok(self
            .records
            .get(transaction_id)
            .filter(|r| r.order_id == order_id)
            .map(|r| r.clone()))
    }

    async fn count(&self) -> Result<u64, StoreError> {
        Ok(self.records.len() as u64)
    }
}
