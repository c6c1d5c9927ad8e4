use crate::models::{Booking, BookingPaymentUpdate, PaymentRecord, Vehicle};
use crate::services::store::{
    BookingStore, InsertOutcome, PaymentStore, StoreError, VehicleStore,
};
use async_trait::async_trait;
use chrono::Utc;
use mongodb::error::{ErrorKind, WriteError, WriteFailure};
use mongodb::options::{FindOneAndUpdateOptions, IndexOptions, ReplaceOptions, ReturnDocument};
use mongodb::{
    bson::{doc, from_document, to_bson, to_document, Bson, Document},
    Collection, Database, IndexModel,
};

const DUPLICATE_KEY: i32 = 11000;

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(WriteError {
            code: DUPLICATE_KEY,
            ..
        }))
    )
}

/// Bookings are stored with their id as `_id`; the API shape keeps `id`.
fn booking_to_document(booking: &Booking) -> Result<Document, StoreError> {
    let mut document = to_document(booking)?;
    if let Some(id) = document.remove("id") {
        document.insert("_id", id);
    }
    Ok(document)
}

fn booking_from_document(mut document: Document) -> Result<Booking, StoreError> {
    if let Some(id) = document.remove("_id") {
        document.insert("id", id);
    }
    Ok(from_document(document)?)
}

#[derive(Clone)]
pub struct MongoBookingStore {
    collection: Collection<Document>,
}

impl MongoBookingStore {
    pub fn new(db: &Database) -> Self {
        Self {
            collection: db.collection("bookings"),
        }
    }

    pub async fn init_indexes(&self) -> Result<(), StoreError> {
        let status_index = IndexModel::builder()
            .keys(doc! { "payment_status": 1, "trip_status": 1 })
            .options(
                IndexOptions::builder()
                    .name("booking_status_idx".to_string())
                    .build(),
            )
            .build();

        self.collection.create_indexes([status_index], None).await?;
        Ok(())
    }
}

#[async_trait]
impl BookingStore for MongoBookingStore {
    async fn insert(&self, booking: &Booking) -> Result<(), StoreError> {
        self.collection
            .insert_one(booking_to_document(booking)?, None)
            .await
            .map_err(|e| {
                if is_duplicate_key(&e) {
                    StoreError::Conflict(format!("booking {} already exists", booking.id))
                } else {
                    StoreError::from(e)
                }
            })?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Booking>, StoreError> {
        self.collection
            .find_one(doc! { "_id": id }, None)
            .await?
            .map(booking_from_document)
            .transpose()
    }

    async fn apply_payment_update(
        &self,
        id: &str,
        update: &BookingPaymentUpdate,
    ) -> Result<Option<Booking>, StoreError> {
        // Field-level $set: concurrent trip-status writes are not clobbered.
        let set = doc! {
            "$set": {
                "advance_payment": to_bson(&update.advance_payment)?,
                "balance_payment": to_bson(&update.balance_payment)?,
                "payment_status": to_bson(&update.payment_status)?,
                "settlement_ref": update.settlement_ref.as_str(),
                "updated_at": to_bson(&Utc::now())?,
            }
        };
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();

        // Only an unsettled booking, or one carrying this same settlement, matches.
        let filter = doc! {
            "_id": id,
            "settlement_ref": { "$in": [Bson::Null, update.settlement_ref.as_str()] },
        };

        self.collection
            .find_one_and_update(filter, set, options)
            .await?
            .map(booking_from_document)
            .transpose()
    }
}

#[derive(Clone)]
pub struct MongoVehicleStore {
    collection: Collection<Vehicle>,
}

impl MongoVehicleStore {
    pub fn new(db: &Database) -> Self {
        Self {
            collection: db.collection("vehicles"),
        }
    }

    pub async fn init_indexes(&self) -> Result<(), StoreError> {
        let car_name = IndexModel::builder()
            .keys(doc! { "car_name": 1 })
            .options(
                IndexOptions::builder()
                    .name("vehicle_car_name_idx".to_string())
                    .unique(true)
                    .build(),
            )
            .build();

        self.collection.create_indexes([car_name], None).await?;
        Ok(())
    }
}

#[async_trait]
impl VehicleStore for MongoVehicleStore {
    async fn get(&self, car_name: &str) -> Result<Option<Vehicle>, StoreError> {
        Ok(self
            .collection
            .find_one(doc! { "car_name": car_name }, None)
            .await?)
    }

    async fn upsert(&self, vehicle: &Vehicle) -> Result<(), StoreError> {
        let options = ReplaceOptions::builder().upsert(true).build();
        self.collection
            .replace_one(doc! { "car_name": vehicle.car_name.as_str() }, vehicle, options)
            .await?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct MongoPaymentStore {
    collection: Collection<PaymentRecord>,
}

impl MongoPaymentStore {
    pub fn new(db: &Database) -> Self {
        Self {
            collection: db.collection("payments"),
        }
    }

    /// Unique indexes backing `insert_if_absent`.
    pub async fn init_indexes(&self) -> Result<(), StoreError> {
        let settlement_key = IndexModel::builder()
            .keys(doc! { "order_id": 1, "transaction_id": 1 })
            .options(
                IndexOptions::builder()
                    .name("payment_settlement_key_idx".to_string())
                    .unique(true)
                    .build(),
            )
            .build();

        let transaction_id = IndexModel::builder()
            .keys(doc! { "transaction_id": 1 })
            .options(
                IndexOptions::builder()
                    .name("payment_transaction_id_idx".to_string())
                    .unique(true)
                    .build(),
            )
            .build();

        let ride_index = IndexModel::builder()
            .keys(doc! { "ride_id": 1 })
            .options(
                IndexOptions::builder()
                    .name("payment_ride_idx".to_string())
                    .build(),
            )
            .build();

        self.collection
            .create_indexes([settlement_key, transaction_id, ride_index], None)
            .await?;

        tracing::info!("Payment store indexes initialized");
        Ok(())
    }
}

#[async_trait]
impl PaymentStore for MongoPaymentStore {
    async fn insert_if_absent(&self, record: PaymentRecord) -> Result<InsertOutcome, StoreError> {
        match self.collection.insert_one(&record, None).await {
            Ok(_) => Ok(InsertOutcome {
                created: true,
                record,
            }),
            Err(e) if is_duplicate_key(&e) => {
                let existing = self
                    .find_by_key(&record.order_id, &record.transaction_id)
                    .await?
                    .ok_or_else(|| {
                        StoreError::Conflict(format!(
                            "transaction {} is recorded under a different order",
                            record.transaction_id
                        ))
                    })?;
                Ok(InsertOutcome {
                    created: false,
                    record: existing,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn find_by_key(
        &self,
        order_id: &str,
        transaction_id: &str,
    ) -> Result<Option<PaymentRecord>, StoreError> {
        let filter = doc! {
            "order_id": order_id,
            "transaction_id": transaction_id,
        };
        Ok(self.collection.find_one(filter, None).await?)
    }

    async fn count(&self) -> Result<u64, StoreError> {
        Ok(self.collection.count_documents(doc! {}, None).await?)
    }
}
