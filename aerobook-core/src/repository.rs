use aerobook_shared::{
    Booking, BookingStatus, Cancellation, Flight, NewBooking, NewCancellation, NewFlight,
    NewPassenger, NewPayment, Passenger, Payment, PaymentStatus, UnknownStatus,
};
use async_trait::async_trait;

use crate::reporting::{BookingDetails, FlightReportRow, LedgerTotals};

#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("timed out after {waited_ms}ms waiting for lock on {resource}")]
    LockTimeout { resource: String, waited_ms: u64 },
    #[error("serialization failure: {0}")]
    Serialization(String),
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),
    #[error("corrupt row: {0}")]
    Corrupt(String),
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Whether retrying the whole transaction may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::LockTimeout { .. } | StoreError::Serialization(_))
    }
}

impl From<UnknownStatus> for StoreError {
    fn from(err: UnknownStatus) -> Self {
        StoreError::Corrupt(err.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Durable ledger storage. Mutations go through a [`UnitOfWork`]; the
/// remaining methods read committed state only.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Start a new atomic unit of work.
    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>>;

    /// All flights ordered by departure, then id.
    async fn list_flights(&self) -> StoreResult<Vec<Flight>>;

    async fn find_booking(&self, booking_id: i64) -> StoreResult<Option<Booking>>;

    async fn booking_details(&self, booking_id: i64) -> StoreResult<Option<BookingDetails>>;

    async fn flight_report(&self) -> StoreResult<Vec<FlightReportRow>>;

    async fn ledger_totals(&self) -> StoreResult<LedgerTotals>;
}

/// One atomic transaction against the ledger.
///
/// Row locks taken through the `*_for_update` methods are held until the
/// unit of work is committed or rolled back. Dropping it without calling
/// [`UnitOfWork::commit`] discards every buffered write.
#[async_trait]
pub trait UnitOfWork: Send {
    /// Lock the flight row. `None` if no such flight exists.
    async fn flight_for_update(&mut self, flight_id: i64) -> StoreResult<Option<Flight>>;

    async fn count_confirmed(&mut self, flight_id: i64) -> StoreResult<i64>;

    /// Seat numbers held by CONFIRMED bookings on the flight.
    async fn confirmed_seats(&mut self, flight_id: i64) -> StoreResult<Vec<i32>>;

    /// Lock the booking row. `None` if no such booking exists.
    async fn booking_for_update(&mut self, booking_id: i64) -> StoreResult<Option<Booking>>;

    async fn payment_for_booking(&mut self, booking_id: i64) -> StoreResult<Option<Payment>>;

    async fn insert_flight(&mut self, flight: &NewFlight) -> StoreResult<Flight>;

    async fn insert_passenger(&mut self, passenger: &NewPassenger) -> StoreResult<Passenger>;

    async fn insert_booking(&mut self, booking: &NewBooking) -> StoreResult<Booking>;

    async fn insert_payment(&mut self, payment: &NewPayment) -> StoreResult<Payment>;

    async fn insert_cancellation(
        &mut self,
        cancellation: &NewCancellation,
    ) -> StoreResult<Cancellation>;

    async fn update_booking_status(
        &mut self,
        booking_id: i64,
        status: BookingStatus,
    ) -> StoreResult<()>;

    async fn update_payment_status(
        &mut self,
        payment_id: i64,
        status: PaymentStatus,
    ) -> StoreResult<()>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;

    async fn rollback(self: Box<Self>) -> StoreResult<()>;
}
