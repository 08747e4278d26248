use aerobook_core::{
    BookingDetails, FlightReportRow, LedgerStore, LedgerTotals, StoreError, StoreResult,
    UnitOfWork,
};
use aerobook_shared::{
    Booking, BookingStatus, Cancellation, Flight, Masked, NewBooking, NewCancellation, NewFlight,
    NewPassenger, NewPayment, Passenger, Payment, PaymentStatus,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use std::time::Duration;
use tracing::{debug, info};

/// Ledger store backed by PostgreSQL row locks (`SELECT ... FOR UPDATE`).
#[derive(Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool, lock_timeout: Duration) -> Self {
        Self { pool, lock_timeout }
    }

    pub async fn connect(
        url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
        lock_timeout: Duration,
    ) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(url)
            .await?;

        Ok(Self::new(pool, lock_timeout))
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Running ledger migrations...");
        sqlx::migrate!("../migrations").run(&self.pool).await?;
        info!("Ledger migrations applied");
        Ok(())
    }

    fn lock_timeout_ms(&self) -> u64 {
        u64::try_from(self.lock_timeout.as_millis()).unwrap_or(u64::MAX)
    }
}

// Internal structs for type-safe querying
#[derive(sqlx::FromRow)]
struct FlightRow {
    id: i64,
    code: String,
    origin: String,
    destination: String,
    depart: DateTime<Utc>,
    arrive: DateTime<Utc>,
    capacity: i32,
}

impl From<FlightRow> for Flight {
    fn from(row: FlightRow) -> Self {
        Flight {
            id: row.id,
            code: row.code,
            origin: row.origin,
            destination: row.destination,
            depart: row.depart,
            arrive: row.arrive,
            capacity: row.capacity,
        }
    }
}

#[derive(sqlx::FromRow)]
struct PassengerRow {
    id: i64,
    name: String,
    email: Option<String>,
    phone: Option<String>,
    passport: Option<String>,
}

impl From<PassengerRow> for Passenger {
    fn from(row: PassengerRow) -> Self {
        Passenger {
            id: row.id,
            name: row.name,
            email: row.email.map(Masked),
            phone: row.phone.map(Masked),
            passport: row.passport.map(Masked),
        }
    }
}

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: i64,
    flight_id: i64,
    passenger_id: i64,
    seat_no: Option<i32>,
    status: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = StoreError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        Ok(Booking {
            id: row.id,
            flight_id: row.flight_id,
            passenger_id: row.passenger_id,
            seat_no: row.seat_no,
            status: row.status.parse()?,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PaymentRow {
    id: i64,
    booking_id: i64,
    amount: f64,
    method: Option<String>,
    status: String,
    tx_ref: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = StoreError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        Ok(Payment {
            id: row.id,
            booking_id: row.booking_id,
            amount: row.amount,
            method: row.method.unwrap_or_default(),
            status: row.status.parse()?,
            tx_ref: row.tx_ref,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct CancellationRow {
    id: i64,
    booking_id: i64,
    reason: Option<String>,
    refund_amount: Option<f64>,
    processed_at: DateTime<Utc>,
}

impl From<CancellationRow> for Cancellation {
    fn from(row: CancellationRow) -> Self {
        Cancellation {
            id: row.id,
            booking_id: row.booking_id,
            reason: row.reason.unwrap_or_default(),
            refund_amount: row.refund_amount.unwrap_or_default(),
            processed_at: row.processed_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct FlightReportDbRow {
    id: i64,
    code: String,
    origin: String,
    destination: String,
    depart: DateTime<Utc>,
    arrive: DateTime<Utc>,
    capacity: i32,
    confirmed_bookings: i64,
    revenue: f64,
}

const FLIGHT_COLUMNS: &str = "id, code, origin, destination, depart, arrive, capacity";
const BOOKING_COLUMNS: &str = "id, flight_id, passenger_id, seat_no, status, created_at";
const PAYMENT_COLUMNS: &str = "id, booking_id, amount, method, status, tx_ref, created_at";

fn map_sqlx(err: sqlx::Error) -> StoreError {
    if let Some(db_err) = err.as_database_error() {
        match db_err.code().as_deref() {
            Some("23505") => return StoreError::UniqueViolation(db_err.message().to_string()),
            Some("40001") | Some("40P01") => {
                return StoreError::Serialization(db_err.message().to_string())
            }
            _ => {}
        }
    }
    StoreError::Backend(err.to_string())
}

fn map_lock(err: sqlx::Error, resource: String, waited_ms: u64) -> StoreError {
    let timed_out = err
        .as_database_error()
        .and_then(|e| e.code())
        .is_some_and(|code| code == "55P03");
    if timed_out {
        StoreError::LockTimeout { resource, waited_ms }
    } else {
        map_sqlx(err)
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;

        // lock_timeout does not accept bind parameters; the value is an integer.
        let waited_ms = self.lock_timeout_ms();
        let stmt = format!("SET LOCAL lock_timeout = '{}ms'", waited_ms);
        sqlx::query(&stmt).execute(&mut *tx).await.map_err(map_sqlx)?;

        Ok(Box::new(PgUnitOfWork { tx, waited_ms }))
    }

    async fn list_flights(&self) -> StoreResult<Vec<Flight>> {
        let rows = sqlx::query_as::<_, FlightRow>(&format!(
            "SELECT {} FROM flights ORDER BY depart, id",
            FLIGHT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok(rows.into_iter().map(Flight::from).collect())
    }

    async fn find_booking(&self, booking_id: i64) -> StoreResult<Option<Booking>> {
        sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {} FROM bookings WHERE id = $1",
            BOOKING_COLUMNS
        ))
        .bind(booking_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?
        .map(Booking::try_from)
        .transpose()
    }

    async fn booking_details(&self, booking_id: i64) -> StoreResult<Option<BookingDetails>> {
        let Some(booking) = self.find_booking(booking_id).await? else {
            return Ok(None);
        };

        let passenger = sqlx::query_as::<_, PassengerRow>(
            "SELECT id, name, email, phone, passport FROM passengers WHERE id = $1",
        )
        .bind(booking.passenger_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?
        .map(Passenger::from)
        .ok_or_else(|| StoreError::Corrupt(format!("booking {} has no passenger", booking_id)))?;

        let payment = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {} FROM payments WHERE booking_id = $1 ORDER BY id LIMIT 1",
            PAYMENT_COLUMNS
        ))
        .bind(booking_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?
        .map(Payment::try_from)
        .transpose()?;

        let cancellation = sqlx::query_as::<_, CancellationRow>(
            "SELECT id, booking_id, reason, refund_amount, processed_at \
             FROM cancellations WHERE booking_id = $1",
        )
        .bind(booking_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?
        .map(Cancellation::from);

        Ok(Some(BookingDetails {
            booking,
            passenger,
            payment,
            cancellation,
        }))
    }

    async fn flight_report(&self) -> StoreResult<Vec<FlightReportRow>> {
        let rows = sqlx::query_as::<_, FlightReportDbRow>(
            r#"
            SELECT
                f.id, f.code, f.origin, f.destination, f.depart, f.arrive, f.capacity,
                (SELECT COUNT(*) FROM bookings b
                  WHERE b.flight_id = f.id AND b.status = 'CONFIRMED') AS confirmed_bookings,
                COALESCE((SELECT SUM(p.amount) FROM payments p
                  JOIN bookings b ON b.id = p.booking_id
                  WHERE b.flight_id = f.id), 0::float8) AS revenue
            FROM flights f
            ORDER BY f.depart, f.id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok(rows
            .into_iter()
            .map(|row| FlightReportRow {
                flight: Flight {
                    id: row.id,
                    code: row.code,
                    origin: row.origin,
                    destination: row.destination,
                    depart: row.depart,
                    arrive: row.arrive,
                    capacity: row.capacity,
                },
                confirmed_bookings: row.confirmed_bookings,
                revenue: row.revenue,
            })
            .collect())
    }

    async fn ledger_totals(&self) -> StoreResult<LedgerTotals> {
        let (total_bookings, total_revenue): (i64, f64) = sqlx::query_as(
            "SELECT (SELECT COUNT(*) FROM bookings), \
                    COALESCE((SELECT SUM(amount) FROM payments), 0::float8)",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok(LedgerTotals {
            total_bookings,
            total_revenue,
        })
    }
}

struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
    waited_ms: u64,
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn flight_for_update(&mut self, flight_id: i64) -> StoreResult<Option<Flight>> {
        let row = sqlx::query_as::<_, FlightRow>(&format!(
            "SELECT {} FROM flights WHERE id = $1 FOR UPDATE",
            FLIGHT_COLUMNS
        ))
        .bind(flight_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_lock(e, format!("flight:{}", flight_id), self.waited_ms))?;

        Ok(row.map(Flight::from))
    }

    async fn count_confirmed(&mut self, flight_id: i64) -> StoreResult<i64> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM bookings WHERE flight_id = $1 AND status = 'CONFIRMED'",
        )
        .bind(flight_id)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_sqlx)
    }

    async fn confirmed_seats(&mut self, flight_id: i64) -> StoreResult<Vec<i32>> {
        sqlx::query_scalar::<_, i32>(
            "SELECT seat_no FROM bookings \
             WHERE flight_id = $1 AND status = 'CONFIRMED' AND seat_no IS NOT NULL",
        )
        .bind(flight_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(map_sqlx)
    }

    async fn booking_for_update(&mut self, booking_id: i64) -> StoreResult<Option<Booking>> {
        sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {} FROM bookings WHERE id = $1 FOR UPDATE",
            BOOKING_COLUMNS
        ))
        .bind(booking_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_lock(e, format!("booking:{}", booking_id), self.waited_ms))?
        .map(Booking::try_from)
        .transpose()
    }

    async fn payment_for_booking(&mut self, booking_id: i64) -> StoreResult<Option<Payment>> {
        sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {} FROM payments WHERE booking_id = $1 ORDER BY id LIMIT 1",
            PAYMENT_COLUMNS
        ))
        .bind(booking_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_sqlx)?
        .map(Payment::try_from)
        .transpose()
    }

    async fn insert_flight(&mut self, flight: &NewFlight) -> StoreResult<Flight> {
        let row = sqlx::query_as::<_, FlightRow>(&format!(
            "INSERT INTO flights (code, origin, destination, depart, arrive, capacity) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {}",
            FLIGHT_COLUMNS
        ))
        .bind(&flight.code)
        .bind(&flight.origin)
        .bind(&flight.destination)
        .bind(flight.depart)
        .bind(flight.arrive)
        .bind(flight.capacity)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;

        Ok(row.into())
    }

    async fn insert_passenger(&mut self, passenger: &NewPassenger) -> StoreResult<Passenger> {
        let row = sqlx::query_as::<_, PassengerRow>(
            "INSERT INTO passengers (name, email, phone, passport) \
             VALUES ($1, $2, $3, $4) RETURNING id, name, email, phone, passport",
        )
        .bind(&passenger.name)
        .bind(passenger.email.as_ref().map(Masked::expose))
        .bind(passenger.phone.as_ref().map(Masked::expose))
        .bind(passenger.passport.as_ref().map(Masked::expose))
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;

        Ok(row.into())
    }

    async fn insert_booking(&mut self, booking: &NewBooking) -> StoreResult<Booking> {
        sqlx::query_as::<_, BookingRow>(&format!(
            "INSERT INTO bookings (flight_id, passenger_id, seat_no, status, created_at) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {}",
            BOOKING_COLUMNS
        ))
        .bind(booking.flight_id)
        .bind(booking.passenger_id)
        .bind(booking.seat_no)
        .bind(BookingStatus::Confirmed.as_str())
        .bind(Utc::now())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_sqlx)?
        .try_into()
    }

    async fn insert_payment(&mut self, payment: &NewPayment) -> StoreResult<Payment> {
        sqlx::query_as::<_, PaymentRow>(&format!(
            "INSERT INTO payments (booking_id, amount, method, status, tx_ref, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {}",
            PAYMENT_COLUMNS
        ))
        .bind(payment.booking_id)
        .bind(payment.amount)
        .bind(&payment.method)
        .bind(payment.status.as_str())
        .bind(payment.tx_ref.as_deref())
        .bind(Utc::now())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_sqlx)?
        .try_into()
    }

    async fn insert_cancellation(
        &mut self,
        cancellation: &NewCancellation,
    ) -> StoreResult<Cancellation> {
        let row = sqlx::query_as::<_, CancellationRow>(
            "INSERT INTO cancellations (booking_id, reason, refund_amount, processed_at) \
             VALUES ($1, $2, $3, $4) \
             RETURNING id, booking_id, reason, refund_amount, processed_at",
        )
        .bind(cancellation.booking_id)
        .bind(&cancellation.reason)
        .bind(cancellation.refund_amount)
        .bind(Utc::now())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;

        Ok(row.into())
    }

    async fn update_booking_status(
        &mut self,
        booking_id: i64,
        status: BookingStatus,
    ) -> StoreResult<()> {
        let result = sqlx::query("UPDATE bookings SET status = $1 WHERE id = $2")
            .bind(status.as_str())
            .bind(booking_id)
            .execute(&mut *self.tx)
            .await
            .map_err(map_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Backend(format!("booking {} does not exist", booking_id)));
        }
        Ok(())
    }

    async fn update_payment_status(
        &mut self,
        payment_id: i64,
        status: PaymentStatus,
    ) -> StoreResult<()> {
        let result = sqlx::query("UPDATE payments SET status = $1 WHERE id = $2")
            .bind(status.as_str())
            .bind(payment_id)
            .execute(&mut *self.tx)
            .await
            .map_err(map_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Backend(format!("payment {} does not exist", payment_id)));
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await.map_err(map_sqlx)?;
        debug!("Postgres transaction committed");
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        self.tx.rollback().await.map_err(map_sqlx)?;
        debug!("Postgres transaction rolled back");
        Ok(())
    }
}
