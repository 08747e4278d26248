use aerobook_core::{
    BookingDetails, FlightReportRow, LedgerStore, LedgerTotals, StoreError, StoreResult,
    UnitOfWork,
};
use aerobook_shared::{
    Booking, BookingStatus, Cancellation, Flight, NewBooking, NewCancellation, NewFlight,
    NewPassenger, NewPayment, Passenger, Payment, PaymentStatus,
};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OwnedMutexGuard;
use tracing::debug;

/// Process-local ledger store.
///
/// Each flight and booking row has its own async mutex, held by a unit of
/// work from the `*_for_update` call until commit or rollback. Writes are
/// buffered per unit of work and applied in one step under the table lock,
/// after the same constraint checks the PostgreSQL schema enforces.
#[derive(Clone)]
pub struct MemoryLedgerStore {
    shared: Arc<Shared>,
}

struct Shared {
    tables: Mutex<Tables>,
    flight_locks: RowLocks,
    booking_locks: RowLocks,
    lock_timeout: Duration,
    sequences: Sequences,
}

#[derive(Default)]
struct Tables {
    flights: BTreeMap<i64, Flight>,
    passengers: BTreeMap<i64, Passenger>,
    bookings: BTreeMap<i64, Booking>,
    payments: BTreeMap<i64, Payment>,
    cancellations: BTreeMap<i64, Cancellation>,
}

#[derive(Default)]
struct Sequences {
    flights: AtomicI64,
    passengers: AtomicI64,
    bookings: AtomicI64,
    payments: AtomicI64,
    cancellations: AtomicI64,
}

fn next_id(seq: &AtomicI64) -> i64 {
    seq.fetch_add(1, Ordering::Relaxed) + 1
}

struct RowLocks {
    table: &'static str,
    rows: Mutex<HashMap<i64, Arc<tokio::sync::Mutex<()>>>>,
}

impl RowLocks {
    fn new(table: &'static str) -> Self {
        Self {
            table,
            rows: Mutex::new(HashMap::new()),
        }
    }

    async fn acquire(&self, id: i64, timeout: Duration) -> StoreResult<OwnedMutexGuard<()>> {
        let row = self.rows.lock().entry(id).or_default().clone();
        tokio::time::timeout(timeout, row.lock_owned())
            .await
            .map_err(|_| StoreError::LockTimeout {
                resource: format!("{}:{}", self.table, id),
                waited_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            })
    }
}

impl MemoryLedgerStore {
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                tables: Mutex::new(Tables::default()),
                flight_locks: RowLocks::new("flight"),
                booking_locks: RowLocks::new("booking"),
                lock_timeout,
                sequences: Sequences::default(),
            }),
        }
    }

    /// Committed CONFIRMED bookings on a flight.
    pub fn confirmed_bookings(&self, flight_id: i64) -> Vec<Booking> {
        self.shared
            .tables
            .lock()
            .bookings
            .values()
            .filter(|b| b.flight_id == flight_id && b.is_confirmed())
            .cloned()
            .collect()
    }

    pub fn passenger_count(&self) -> usize {
        self.shared.tables.lock().passengers.len()
    }

    pub fn payments_for(&self, booking_id: i64) -> Vec<Payment> {
        self.shared
            .tables
            .lock()
            .payments
            .values()
            .filter(|p| p.booking_id == booking_id)
            .cloned()
            .collect()
    }

    pub fn cancellations_for(&self, booking_id: i64) -> Vec<Cancellation> {
        self.shared
            .tables
            .lock()
            .cancellations
            .values()
            .filter(|c| c.booking_id == booking_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>> {
        Ok(Box::new(MemoryUnitOfWork {
            shared: self.shared.clone(),
            flight_guards: HashMap::new(),
            booking_guards: HashMap::new(),
            pending: Pending::default(),
        }))
    }

    async fn list_flights(&self) -> StoreResult<Vec<Flight>> {
        let mut flights: Vec<Flight> = self.shared.tables.lock().flights.values().cloned().collect();
        flights.sort_by(|a, b| a.depart.cmp(&b.depart).then(a.id.cmp(&b.id)));
        Ok(flights)
    }

    async fn find_booking(&self, booking_id: i64) -> StoreResult<Option<Booking>> {
        Ok(self.shared.tables.lock().bookings.get(&booking_id).cloned())
    }

    async fn booking_details(&self, booking_id: i64) -> StoreResult<Option<BookingDetails>> {
        let tables = self.shared.tables.lock();
        let Some(booking) = tables.bookings.get(&booking_id).cloned() else {
            return Ok(None);
        };
        let passenger = tables
            .passengers
            .get(&booking.passenger_id)
            .cloned()
            .ok_or_else(|| {
                StoreError::Corrupt(format!("booking {} has no passenger", booking_id))
            })?;
        let payment = tables.payments.values().find(|p| p.booking_id == booking_id).cloned();
        let cancellation = tables
            .cancellations
            .values()
            .find(|c| c.booking_id == booking_id)
            .cloned();

        Ok(Some(BookingDetails {
            booking,
            passenger,
            payment,
            cancellation,
        }))
    }

    async fn flight_report(&self) -> StoreResult<Vec<FlightReportRow>> {
        let flights = self.list_flights().await?;
        let tables = self.shared.tables.lock();

        let rows = flights
            .into_iter()
            .map(|flight| {
                let bookings: HashSet<i64> = tables
                    .bookings
                    .values()
                    .filter(|b| b.flight_id == flight.id)
                    .map(|b| b.id)
                    .collect();
                let confirmed_bookings = tables
                    .bookings
                    .values()
                    .filter(|b| b.flight_id == flight.id && b.is_confirmed())
                    .count() as i64;
                let revenue = tables
                    .payments
                    .values()
                    .filter(|p| bookings.contains(&p.booking_id))
                    .map(|p| p.amount)
                    .sum();
                FlightReportRow {
                    flight,
                    confirmed_bookings,
                    revenue,
                }
            })
            .collect();
        Ok(rows)
    }

    async fn ledger_totals(&self) -> StoreResult<LedgerTotals> {
        let tables = self.shared.tables.lock();
        Ok(LedgerTotals {
            total_bookings: tables.bookings.len() as i64,
            total_revenue: tables.payments.values().map(|p| p.amount).sum(),
        })
    }
}

#[derive(Default)]
struct Pending {
    flights: Vec<Flight>,
    passengers: Vec<Passenger>,
    bookings: Vec<Booking>,
    payments: Vec<Payment>,
    cancellations: Vec<Cancellation>,
    booking_status: HashMap<i64, BookingStatus>,
    payment_status: HashMap<i64, PaymentStatus>,
}

struct MemoryUnitOfWork {
    shared: Arc<Shared>,
    flight_guards: HashMap<i64, OwnedMutexGuard<()>>,
    booking_guards: HashMap<i64, OwnedMutexGuard<()>>,
    pending: Pending,
}

impl MemoryUnitOfWork {
    fn flight(&self, flight_id: i64) -> Option<Flight> {
        self.shared
            .tables
            .lock()
            .flights
            .get(&flight_id)
            .cloned()
            .or_else(|| self.pending.flights.iter().find(|f| f.id == flight_id).cloned())
    }

    fn booking(&self, booking_id: i64) -> Option<Booking> {
        let mut booking = self
            .shared
            .tables
            .lock()
            .bookings
            .get(&booking_id)
            .cloned()
            .or_else(|| self.pending.bookings.iter().find(|b| b.id == booking_id).cloned())?;
        if let Some(status) = self.pending.booking_status.get(&booking_id) {
            booking.status = *status;
        }
        Some(booking)
    }

    /// Bookings on a flight as this unit of work sees them.
    fn bookings_on(&self, flight_id: i64) -> Vec<Booking> {
        let mut rows: Vec<Booking> = self
            .shared
            .tables
            .lock()
            .bookings
            .values()
            .filter(|b| b.flight_id == flight_id)
            .cloned()
            .collect();
        rows.extend(self.pending.bookings.iter().filter(|b| b.flight_id == flight_id).cloned());
        for booking in &mut rows {
            if let Some(status) = self.pending.booking_status.get(&booking.id) {
                booking.status = *status;
            }
        }
        rows
    }

    fn payment_for(&self, booking_id: i64) -> Option<Payment> {
        let mut payment = self
            .shared
            .tables
            .lock()
            .payments
            .values()
            .find(|p| p.booking_id == booking_id)
            .cloned()
            .or_else(|| self.pending.payments.iter().find(|p| p.booking_id == booking_id).cloned())?;
        if let Some(status) = self.pending.payment_status.get(&payment.id) {
            payment.status = *status;
        }
        Some(payment)
    }

    fn payment_exists(&self, payment_id: i64) -> bool {
        self.shared.tables.lock().payments.contains_key(&payment_id)
            || self.pending.payments.iter().any(|p| p.id == payment_id)
    }

    fn passenger_exists(&self, passenger_id: i64) -> bool {
        self.shared.tables.lock().passengers.contains_key(&passenger_id)
            || self.pending.passengers.iter().any(|p| p.id == passenger_id)
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn flight_for_update(&mut self, flight_id: i64) -> StoreResult<Option<Flight>> {
        let Some(flight) = self.flight(flight_id) else {
            return Ok(None);
        };
        if !self.flight_guards.contains_key(&flight_id) {
            let guard = self
                .shared
                .flight_locks
                .acquire(flight_id, self.shared.lock_timeout)
                .await?;
            self.flight_guards.insert(flight_id, guard);
        }
        Ok(Some(flight))
    }

    async fn count_confirmed(&mut self, flight_id: i64) -> StoreResult<i64> {
        Ok(self.bookings_on(flight_id).iter().filter(|b| b.is_confirmed()).count() as i64)
    }

    async fn confirmed_seats(&mut self, flight_id: i64) -> StoreResult<Vec<i32>> {
        Ok(self
            .bookings_on(flight_id)
            .iter()
            .filter(|b| b.is_confirmed())
            .filter_map(|b| b.seat_no)
            .collect())
    }

    async fn booking_for_update(&mut self, booking_id: i64) -> StoreResult<Option<Booking>> {
        if self.booking(booking_id).is_none() {
            return Ok(None);
        }
        if !self.booking_guards.contains_key(&booking_id) {
            let guard = self
                .shared
                .booking_locks
                .acquire(booking_id, self.shared.lock_timeout)
                .await?;
            self.booking_guards.insert(booking_id, guard);
        }
        // Re-read: the previous holder may have committed a status change.
        Ok(self.booking(booking_id))
    }

    async fn payment_for_booking(&mut self, booking_id: i64) -> StoreResult<Option<Payment>> {
        Ok(self.payment_for(booking_id))
    }

    async fn insert_flight(&mut self, flight: &NewFlight) -> StoreResult<Flight> {
        let duplicate = self.shared.tables.lock().flights.values().any(|f| f.code == flight.code)
            || self.pending.flights.iter().any(|f| f.code == flight.code);
        if duplicate {
            return Err(StoreError::UniqueViolation(format!("flights.code = {}", flight.code)));
        }

        let row = flight.clone().into_flight(next_id(&self.shared.sequences.flights));
        self.pending.flights.push(row.clone());
        Ok(row)
    }

    async fn insert_passenger(&mut self, passenger: &NewPassenger) -> StoreResult<Passenger> {
        let row = passenger.clone().into_passenger(next_id(&self.shared.sequences.passengers));
        self.pending.passengers.push(row.clone());
        Ok(row)
    }

    async fn insert_booking(&mut self, booking: &NewBooking) -> StoreResult<Booking> {
        if self.flight(booking.flight_id).is_none() {
            return Err(StoreError::Backend(format!(
                "foreign key violation: flight {} does not exist",
                booking.flight_id
            )));
        }
        if !self.passenger_exists(booking.passenger_id) {
            return Err(StoreError::Backend(format!(
                "foreign key violation: passenger {} does not exist",
                booking.passenger_id
            )));
        }

        let row = booking
            .clone()
            .into_booking(next_id(&self.shared.sequences.bookings), Utc::now());
        self.pending.bookings.push(row.clone());
        Ok(row)
    }

    async fn insert_payment(&mut self, payment: &NewPayment) -> StoreResult<Payment> {
        if self.booking(payment.booking_id).is_none() {
            return Err(StoreError::Backend(format!(
                "foreign key violation: booking {} does not exist",
                payment.booking_id
            )));
        }
        if self.payment_for(payment.booking_id).is_some() {
            return Err(StoreError::UniqueViolation(format!(
                "payments.booking_id = {}",
                payment.booking_id
            )));
        }

        let row = payment
            .clone()
            .into_payment(next_id(&self.shared.sequences.payments), Utc::now());
        self.pending.payments.push(row.clone());
        Ok(row)
    }

    async fn insert_cancellation(
        &mut self,
        cancellation: &NewCancellation,
    ) -> StoreResult<Cancellation> {
        if self.booking(cancellation.booking_id).is_none() {
            return Err(StoreError::Backend(format!(
                "foreign key violation: booking {} does not exist",
                cancellation.booking_id
            )));
        }
        let exists = self
            .shared
            .tables
            .lock()
            .cancellations
            .values()
            .any(|c| c.booking_id == cancellation.booking_id)
            || self.pending.cancellations.iter().any(|c| c.booking_id == cancellation.booking_id);
        if exists {
            return Err(StoreError::UniqueViolation(format!(
                "cancellations.booking_id = {}",
                cancellation.booking_id
            )));
        }

        let row = cancellation
            .clone()
            .into_cancellation(next_id(&self.shared.sequences.cancellations), Utc::now());
        self.pending.cancellations.push(row.clone());
        Ok(row)
    }

    async fn update_booking_status(
        &mut self,
        booking_id: i64,
        status: BookingStatus,
    ) -> StoreResult<()> {
        if self.booking(booking_id).is_none() {
            return Err(StoreError::Backend(format!("booking {} does not exist", booking_id)));
        }
        self.pending.booking_status.insert(booking_id, status);
        Ok(())
    }

    async fn update_payment_status(
        &mut self,
        payment_id: i64,
        status: PaymentStatus,
    ) -> StoreResult<()> {
        if !self.payment_exists(payment_id) {
            return Err(StoreError::Backend(format!("payment {} does not exist", payment_id)));
        }
        self.pending.payment_status.insert(payment_id, status);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let MemoryUnitOfWork {
            shared,
            flight_guards,
            booking_guards,
            pending,
        } = *self;

        {
            let mut tables = shared.tables.lock();
            check_constraints(&tables, &pending)?;

            for flight in pending.flights {
                tables.flights.insert(flight.id, flight);
            }
            for passenger in pending.passengers {
                tables.passengers.insert(passenger.id, passenger);
            }
            for booking in pending.bookings {
                tables.bookings.insert(booking.id, booking);
            }
            for payment in pending.payments {
                tables.payments.insert(payment.id, payment);
            }
            for cancellation in pending.cancellations {
                tables.cancellations.insert(cancellation.id, cancellation);
            }
            for (id, status) in pending.booking_status {
                if let Some(booking) = tables.bookings.get_mut(&id) {
                    booking.status = status;
                }
            }
            for (id, status) in pending.payment_status {
                if let Some(payment) = tables.payments.get_mut(&id) {
                    payment.status = status;
                }
            }
        }

        // Row locks are released only once the writes are visible.
        drop(flight_guards);
        drop(booking_guards);
        debug!("Memory unit of work committed");
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        debug!(
            "Memory unit of work rolled back ({} bookings discarded)",
            self.pending.bookings.len()
        );
        Ok(())
    }
}

/// Commit-time checks mirroring the schema's unique constraints.
fn check_constraints(tables: &Tables, pending: &Pending) -> StoreResult<()> {
    let mut codes: HashSet<&str> = tables.flights.values().map(|f| f.code.as_str()).collect();
    for flight in &pending.flights {
        if !codes.insert(flight.code.as_str()) {
            return Err(StoreError::UniqueViolation(format!("flights.code = {}", flight.code)));
        }
    }

    let touched: HashSet<i64> = pending
        .bookings
        .iter()
        .map(|b| b.flight_id)
        .chain(
            pending
                .booking_status
                .keys()
                .filter_map(|id| tables.bookings.get(id).map(|b| b.flight_id)),
        )
        .collect();

    for flight_id in touched {
        let mut seats = HashSet::new();
        let committed = tables.bookings.values().filter(|b| b.flight_id == flight_id);
        let added = pending.bookings.iter().filter(|b| b.flight_id == flight_id);
        for booking in committed.chain(added) {
            let status = pending
                .booking_status
                .get(&booking.id)
                .copied()
                .unwrap_or(booking.status);
            if status != BookingStatus::Confirmed {
                continue;
            }
            if let Some(seat) = booking.seat_no {
                if !seats.insert(seat) {
                    return Err(StoreError::UniqueViolation(format!(
                        "bookings (flight_id, seat_no) = ({}, {})",
                        flight_id, seat
                    )));
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn new_flight(code: &str, capacity: i32) -> NewFlight {
        let depart = Utc::now() + ChronoDuration::days(1);
        NewFlight {
            code: code.into(),
            origin: "Dhaka".into(),
            destination: "Sylhet".into(),
            depart,
            arrive: depart + ChronoDuration::hours(1),
            capacity,
        }
    }

    async fn committed_flight(store: &MemoryLedgerStore, code: &str, capacity: i32) -> Flight {
        let mut tx = store.begin().await.unwrap();
        let flight = tx.insert_flight(&new_flight(code, capacity)).await.unwrap();
        tx.commit().await.unwrap();
        flight
    }

    #[tokio::test]
    async fn test_uncommitted_writes_are_invisible() {
        let store = MemoryLedgerStore::new(Duration::from_millis(200));
        let flight = committed_flight(&store, "AA101", 3).await;

        let mut tx = store.begin().await.unwrap();
        tx.flight_for_update(flight.id).await.unwrap().unwrap();
        let passenger = tx.insert_passenger(&NewPassenger::named("Karim")).await.unwrap();
        tx.insert_booking(&NewBooking {
            flight_id: flight.id,
            passenger_id: passenger.id,
            seat_no: Some(1),
        })
        .await
        .unwrap();
        assert_eq!(tx.count_confirmed(flight.id).await.unwrap(), 1);
        assert!(store.confirmed_bookings(flight.id).is_empty());

        tx.rollback().await.unwrap();
        assert!(store.confirmed_bookings(flight.id).is_empty());
        assert_eq!(store.passenger_count(), 0);
    }

    #[tokio::test]
    async fn test_dropped_unit_of_work_rolls_back_and_unlocks() {
        let store = MemoryLedgerStore::new(Duration::from_millis(200));
        let flight = committed_flight(&store, "AA101", 3).await;

        {
            let mut tx = store.begin().await.unwrap();
            tx.flight_for_update(flight.id).await.unwrap();
            tx.insert_passenger(&NewPassenger::named("Karim")).await.unwrap();
        }

        let mut tx = store.begin().await.unwrap();
        assert!(tx.flight_for_update(flight.id).await.unwrap().is_some());
        assert_eq!(store.passenger_count(), 0);
    }

    #[tokio::test]
    async fn test_flight_lock_times_out() {
        let store = MemoryLedgerStore::new(Duration::from_millis(50));
        let flight = committed_flight(&store, "AA101", 3).await;

        let mut holder = store.begin().await.unwrap();
        holder.flight_for_update(flight.id).await.unwrap();

        let mut waiter = store.begin().await.unwrap();
        let err = waiter.flight_for_update(flight.id).await.unwrap_err();
        assert!(matches!(err, StoreError::LockTimeout { .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_different_flights_do_not_block() {
        let store = MemoryLedgerStore::new(Duration::from_millis(50));
        let first = committed_flight(&store, "AA101", 3).await;
        let second = committed_flight(&store, "BB202", 3).await;

        let mut a = store.begin().await.unwrap();
        a.flight_for_update(first.id).await.unwrap();
        let mut b = store.begin().await.unwrap();
        assert!(b.flight_for_update(second.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_missing_rows_are_not_locked() {
        let store = MemoryLedgerStore::new(Duration::from_millis(50));
        let mut tx = store.begin().await.unwrap();
        assert!(tx.flight_for_update(404).await.unwrap().is_none());
        assert!(tx.booking_for_update(404).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_flight_code_rejected() {
        let store = MemoryLedgerStore::new(Duration::from_millis(50));
        committed_flight(&store, "AA101", 3).await;

        let mut tx = store.begin().await.unwrap();
        let err = tx.insert_flight(&new_flight("AA101", 5)).await.unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation(_)));
    }

    #[tokio::test]
    async fn test_concurrent_duplicate_codes_conflict_at_commit() {
        let store = MemoryLedgerStore::new(Duration::from_millis(50));
        let mut a = store.begin().await.unwrap();
        let mut b = store.begin().await.unwrap();
        a.insert_flight(&new_flight("CC303", 2)).await.unwrap();
        b.insert_flight(&new_flight("CC303", 2)).await.unwrap();

        a.commit().await.unwrap();
        let err = b.commit().await.unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation(_)));
        assert_eq!(store.list_flights().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_seat_uniqueness_checked_at_commit() {
        let store = MemoryLedgerStore::new(Duration::from_millis(50));
        let flight = committed_flight(&store, "AA101", 3).await;

        // Neither unit of work locks the flight, so only the constraint catches this.
        let mut a = store.begin().await.unwrap();
        let mut b = store.begin().await.unwrap();
        for tx in [&mut a, &mut b] {
            let passenger = tx.insert_passenger(&NewPassenger::named("Nadia")).await.unwrap();
            tx.insert_booking(&NewBooking {
                flight_id: flight.id,
                passenger_id: passenger.id,
                seat_no: Some(2),
            })
            .await
            .unwrap();
        }

        a.commit().await.unwrap();
        assert!(matches!(b.commit().await, Err(StoreError::UniqueViolation(_))));
        assert_eq!(store.confirmed_bookings(flight.id).len(), 1);
        assert_eq!(store.passenger_count(), 1);
    }

    #[tokio::test]
    async fn test_booking_requires_existing_rows() {
        let store = MemoryLedgerStore::new(Duration::from_millis(50));
        let mut tx = store.begin().await.unwrap();
        let err = tx
            .insert_booking(&NewBooking {
                flight_id: 1,
                passenger_id: 1,
                seat_no: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Backend(_)));
    }
}
