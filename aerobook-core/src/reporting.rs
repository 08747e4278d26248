use aerobook_shared::{Booking, Cancellation, Flight, Passenger, Payment};
use serde::Serialize;
use std::sync::Arc;

use crate::repository::LedgerStore;
use crate::{CoreError, CoreResult};

/// A booking with everything that references it.
#[derive(Debug, Clone, Serialize)]
pub struct BookingDetails {
    pub booking: Booking,
    pub passenger: Passenger,
    pub payment: Option<Payment>,
    pub cancellation: Option<Cancellation>,
}

/// Per-flight line of the admin report. Revenue sums every payment on the
/// flight's bookings, refunded ones included.
#[derive(Debug, Clone, Serialize)]
pub struct FlightReportRow {
    pub flight: Flight,
    pub confirmed_bookings: i64,
    pub revenue: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LedgerTotals {
    pub total_bookings: i64,
    pub total_revenue: f64,
}

/// Read-only views over committed ledger state.
#[derive(Clone)]
pub struct ReportService {
    store: Arc<dyn LedgerStore>,
}

impl ReportService {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    pub async fn dashboard(&self) -> CoreResult<LedgerTotals> {
        Ok(self.store.ledger_totals().await?)
    }

    pub async fn flight_report(&self) -> CoreResult<Vec<FlightReportRow>> {
        Ok(self.store.flight_report().await?)
    }

    pub async fn booking(&self, booking_id: i64) -> CoreResult<BookingDetails> {
        self.store
            .booking_details(booking_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "booking",
                id: booking_id,
            })
    }
}
