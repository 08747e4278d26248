use aerobook_core::{BookingLedger, BookingPolicy, FlightInventory, LedgerStore, ReportService};
use std::sync::Arc;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
}

#[derive(Clone)]
pub struct AppState {
    pub ledger: BookingLedger,
    pub inventory: FlightInventory,
    pub reports: ReportService,
    pub auth: AuthConfig,
}

impl AppState {
    /// Wire every service to the one store handle owned by the process.
    pub fn new(store: Arc<dyn LedgerStore>, policy: BookingPolicy, auth: AuthConfig) -> Self {
        Self {
            ledger: BookingLedger::new(store.clone(), policy),
            inventory: FlightInventory::new(store.clone()),
            reports: ReportService::new(store),
            auth,
        }
    }
}
