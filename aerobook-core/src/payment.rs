use aerobook_shared::{NewPayment, Payment, PaymentStatus};
use tracing::debug;

use crate::repository::UnitOfWork;
use crate::{CoreError, CoreResult};

/// Payment and refund bookkeeping. Every call runs inside the caller's unit
/// of work; nothing here commits.
#[derive(Debug, Clone, Default)]
pub struct PaymentLedger;

impl PaymentLedger {
    pub fn new() -> Self {
        Self
    }

    /// Record a simulated, already settled charge for a booking.
    pub async fn record_payment(
        &self,
        tx: &mut dyn UnitOfWork,
        booking_id: i64,
        amount: f64,
        method: &str,
    ) -> CoreResult<Payment> {
        if tx.payment_for_booking(booking_id).await?.is_some() {
            return Err(CoreError::Conflict(format!(
                "booking {} already has a payment",
                booking_id
            )));
        }

        let payment = tx
            .insert_payment(&NewPayment {
                booking_id,
                amount,
                method: method.to_string(),
                status: PaymentStatus::Paid,
                tx_ref: None,
            })
            .await?;
        debug!("Payment {} recorded for booking {}", payment.id, booking_id);
        Ok(payment)
    }

    pub async fn mark_refunded(&self, tx: &mut dyn UnitOfWork, booking_id: i64) -> CoreResult<()> {
        let payment = tx
            .payment_for_booking(booking_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "payment for booking",
                id: booking_id,
            })?;

        tx.update_payment_status(payment.id, PaymentStatus::Refunded).await?;
        debug!("Payment {} marked refunded", payment.id);
        Ok(())
    }
}
