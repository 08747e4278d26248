pub mod inventory;
pub mod ledger;
pub mod payment;
pub mod policy;
pub mod reporting;
pub mod repository;
pub mod seat;

pub use inventory::FlightInventory;
pub use ledger::{BookRequest, BookingLedger, BookingReceipt, CancelReceipt};
pub use payment::PaymentLedger;
pub use policy::BookingPolicy;
pub use reporting::{BookingDetails, FlightReportRow, LedgerTotals, ReportService};
pub use repository::{LedgerStore, StoreError, StoreResult, UnitOfWork};

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    ValidationError(String),
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },
    #[error("Flight {flight_id} has no seats available (capacity {capacity})")]
    CapacityExceeded { flight_id: i64, capacity: i32 },
    #[error("Booking {0} is already cancelled")]
    AlreadyCancelled(i64),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Transaction failed: {0}")]
    TransactionFailure(#[from] StoreError),
}

impl CoreError {
    /// Machine-readable error kind reported to callers.
    pub fn kind(&self) -> &'static str {
        match self {
            CoreError::ValidationError(_) => "VALIDATION_ERROR",
            CoreError::NotFound { .. } => "NOT_FOUND",
            CoreError::CapacityExceeded { .. } => "CAPACITY_EXCEEDED",
            CoreError::AlreadyCancelled(_) => "ALREADY_CANCELLED",
            CoreError::Conflict(_) => "CONFLICT",
            CoreError::TransactionFailure(_) => "TRANSACTION_FAILURE",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::TransactionFailure(e) if e.is_retryable())
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(CoreError::ValidationError("x".into()).kind(), "VALIDATION_ERROR");
        assert_eq!(CoreError::AlreadyCancelled(3).kind(), "ALREADY_CANCELLED");
        assert_eq!(
            CoreError::NotFound { entity: "flight", id: 9 }.to_string(),
            "flight 9 not found"
        );
    }

    #[test]
    fn test_only_lock_failures_are_retryable() {
        let timeout = CoreError::from(StoreError::LockTimeout {
            resource: "flight:1".into(),
            waited_ms: 3000,
        });
        assert_eq!(timeout.kind(), "TRANSACTION_FAILURE");
        assert!(timeout.is_retryable());

        let backend = CoreError::from(StoreError::Backend("connection reset".into()));
        assert!(!backend.is_retryable());
        assert!(!CoreError::CapacityExceeded { flight_id: 1, capacity: 1 }.is_retryable());
    }
}
