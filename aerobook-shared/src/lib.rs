pub mod models;
pub mod pii;

pub use models::{
    Booking, BookingStatus, Cancellation, Flight, NewBooking, NewCancellation, NewFlight,
    NewPassenger, NewPayment, Passenger, Payment, PaymentStatus, UnknownStatus,
};
pub use pii::Masked;
