pub mod booking;
pub mod flight;
pub mod payment;

pub use booking::{
    Booking, BookingStatus, Cancellation, NewBooking, NewCancellation, NewPassenger, Passenger,
};
pub use flight::{Flight, NewFlight};
pub use payment::{NewPayment, Payment, PaymentStatus};

/// A status string read back from storage that matches no known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} status: {value}")]
pub struct UnknownStatus {
    pub kind: &'static str,
    pub value: String,
}
