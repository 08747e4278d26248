use aerobook_shared::{BookingStatus, Masked, NewBooking, NewCancellation, NewPassenger};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

use crate::inventory::FlightInventory;
use crate::payment::PaymentLedger;
use crate::policy::BookingPolicy;
use crate::repository::{LedgerStore, UnitOfWork};
use crate::seat::{self, SeatError};
use crate::{CoreError, CoreResult};

#[derive(Debug, Clone)]
pub struct BookRequest {
    pub flight_id: i64,
    pub passenger: NewPassenger,
    pub seat_preference: Option<i32>,
    pub payment_method: Option<String>,
}

impl BookRequest {
    pub fn new(flight_id: i64, passenger: NewPassenger) -> Self {
        Self {
            flight_id,
            passenger,
            seat_preference: None,
            payment_method: None,
        }
    }

    pub fn with_seat(mut self, seat: i32) -> Self {
        self.seat_preference = Some(seat);
        self
    }

    fn validate(&self) -> CoreResult<()> {
        let passenger = &self.passenger;
        if passenger.name.trim().is_empty() {
            return Err(CoreError::ValidationError("passenger name is required".to_string()));
        }

        // Column widths of the passengers table.
        let limits = [
            ("name", Some(&passenger.name), 120),
            ("email", passenger.email.as_ref().map(Masked::expose), 120),
            ("phone", passenger.phone.as_ref().map(Masked::expose), 50),
            ("passport", passenger.passport.as_ref().map(Masked::expose), 50),
            ("payment_method", self.payment_method.as_ref(), 50),
        ];
        for (field, value, max) in limits {
            if value.is_some_and(|v| v.chars().count() > max) {
                return Err(CoreError::ValidationError(format!(
                    "{} is longer than {} characters",
                    field, max
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BookingReceipt {
    pub booking_id: i64,
    pub seat_no: i32,
    pub passenger_id: i64,
    pub payment_id: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CancelReceipt {
    pub booking_id: i64,
    pub cancellation_id: i64,
    pub refund_amount: f64,
}

/// The transactional booking core.
///
/// `book` holds the flight row lock from the capacity check through commit,
/// so bookers on one flight serialize while other flights proceed. `cancel`
/// locks only the booking row.
#[derive(Clone)]
pub struct BookingLedger {
    store: Arc<dyn LedgerStore>,
    inventory: FlightInventory,
    payments: PaymentLedger,
    policy: BookingPolicy,
}

impl BookingLedger {
    pub fn new(store: Arc<dyn LedgerStore>, policy: BookingPolicy) -> Self {
        Self {
            inventory: FlightInventory::new(store.clone()),
            payments: PaymentLedger::new(),
            store,
            policy,
        }
    }

    pub async fn book(&self, request: BookRequest) -> CoreResult<BookingReceipt> {
        request.validate()?;

        let mut tx = self.store.begin().await?;
        match self.book_within(tx.as_mut(), &request).await {
            Ok(receipt) => {
                tx.commit().await?;
                info!(
                    "Booking {} confirmed on flight {} seat {}",
                    receipt.booking_id, request.flight_id, receipt.seat_no
                );
                Ok(receipt)
            }
            Err(e) => {
                discard(tx, &e).await;
                Err(e)
            }
        }
    }

    async fn book_within(
        &self,
        tx: &mut dyn UnitOfWork,
        request: &BookRequest,
    ) -> CoreResult<BookingReceipt> {
        let flight = self.inventory.get_flight_for_update(tx, request.flight_id).await?;

        let confirmed = tx.count_confirmed(flight.id).await?;
        if confirmed >= i64::from(flight.capacity) {
            return Err(CoreError::CapacityExceeded {
                flight_id: flight.id,
                capacity: flight.capacity,
            });
        }

        let passenger = tx.insert_passenger(&request.passenger).await?;

        let occupied: HashSet<i32> = tx.confirmed_seats(flight.id).await?.into_iter().collect();
        let seat_no = seat::allocate_seat(&flight, &occupied, request.seat_preference).map_err(
            |SeatError::Full { flight_id, capacity }| CoreError::CapacityExceeded { flight_id, capacity },
        )?;

        let booking = tx
            .insert_booking(&NewBooking {
                flight_id: flight.id,
                passenger_id: passenger.id,
                seat_no: Some(seat_no),
            })
            .await?;

        let method = self.policy.payment_method(request.payment_method.as_deref());
        let payment = self
            .payments
            .record_payment(tx, booking.id, self.policy.fare_amount, &method)
            .await?;

        Ok(BookingReceipt {
            booking_id: booking.id,
            seat_no,
            passenger_id: passenger.id,
            payment_id: payment.id,
        })
    }

    pub async fn cancel(&self, booking_id: i64, reason: Option<&str>) -> CoreResult<CancelReceipt> {
        let booking = self.store.find_booking(booking_id).await?.ok_or(CoreError::NotFound {
            entity: "booking",
            id: booking_id,
        })?;
        if !booking.is_confirmed() {
            return Err(CoreError::AlreadyCancelled(booking_id));
        }

        let reason = self.policy.cancel_reason(reason);
        let mut tx = self.store.begin().await?;
        match self.cancel_within(tx.as_mut(), booking_id, reason).await {
            Ok(receipt) => {
                tx.commit().await?;
                info!(
                    "Booking {} cancelled, refund {:.2}",
                    booking_id, receipt.refund_amount
                );
                Ok(receipt)
            }
            Err(e) => {
                discard(tx, &e).await;
                Err(e)
            }
        }
    }

    async fn cancel_within(
        &self,
        tx: &mut dyn UnitOfWork,
        booking_id: i64,
        reason: String,
    ) -> CoreResult<CancelReceipt> {
        // Re-read under the row lock; a concurrent cancel may have won.
        let booking = tx.booking_for_update(booking_id).await?.ok_or(CoreError::NotFound {
            entity: "booking",
            id: booking_id,
        })?;
        if !booking.is_confirmed() {
            return Err(CoreError::AlreadyCancelled(booking_id));
        }

        tx.update_booking_status(booking_id, BookingStatus::Cancelled).await?;

        let refund_amount = self.policy.refund_amount;
        let cancellation = tx
            .insert_cancellation(&NewCancellation {
                booking_id,
                reason,
                refund_amount,
            })
            .await?;

        match self.payments.mark_refunded(tx, booking_id).await {
            Ok(()) => {}
            Err(CoreError::NotFound { .. }) => {
                warn!("Booking {} has no payment to refund", booking_id);
            }
            Err(e) => return Err(e),
        }

        Ok(CancelReceipt {
            booking_id,
            cancellation_id: cancellation.id,
            refund_amount,
        })
    }
}

async fn discard(tx: Box<dyn UnitOfWork>, cause: &CoreError) {
    if let Err(rb) = tx.rollback().await {
        warn!("Rollback after \"{}\" failed: {}", cause, rb);
    }
}
