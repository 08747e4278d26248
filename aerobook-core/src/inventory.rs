use aerobook_shared::{Flight, NewFlight};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{info, warn};

use crate::repository::{LedgerStore, StoreError, UnitOfWork};
use crate::{CoreError, CoreResult};

/// Flight identity and capacity.
#[derive(Clone)]
pub struct FlightInventory {
    store: Arc<dyn LedgerStore>,
}

impl FlightInventory {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Lock the flight inside `tx` so capacity checks on it serialize.
    pub async fn get_flight_for_update(
        &self,
        tx: &mut dyn UnitOfWork,
        flight_id: i64,
    ) -> CoreResult<Flight> {
        tx.flight_for_update(flight_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "flight",
                id: flight_id,
            })
    }

    pub async fn list_flights(&self) -> CoreResult<Vec<Flight>> {
        Ok(self.store.list_flights().await?)
    }

    pub async fn create_flight(&self, new: NewFlight) -> CoreResult<Flight> {
        validate_new_flight(&new)?;

        let mut tx = self.store.begin().await?;
        let flight = match tx.insert_flight(&new).await {
            Ok(flight) => flight,
            Err(e) => {
                if let Err(rb) = tx.rollback().await {
                    warn!("Rollback after failed flight insert also failed: {}", rb);
                }
                return Err(map_unique(e, &new.code));
            }
        };
        tx.commit().await.map_err(|e| map_unique(e, &new.code))?;

        info!("Flight {} created (id {}, {} seats)", flight.code, flight.id, flight.capacity);
        Ok(flight)
    }

    /// Insert the two demo flights when the inventory is empty. Returns the
    /// number of flights created.
    pub async fn seed_sample_flights(&self, now: DateTime<Utc>) -> CoreResult<usize> {
        if !self.store.list_flights().await?.is_empty() {
            info!("Flights already present, skipping seed");
            return Ok(0);
        }

        let samples = [
            NewFlight {
                code: "AA101".into(),
                origin: "Dhaka".into(),
                destination: "Chittagong".into(),
                depart: now + Duration::days(1) + Duration::hours(3),
                arrive: now + Duration::days(1) + Duration::hours(4),
                capacity: 10,
            },
            NewFlight {
                code: "BB202".into(),
                origin: "Dhaka".into(),
                destination: "Sylhet".into(),
                depart: now + Duration::days(2) + Duration::hours(5),
                arrive: now + Duration::days(2) + Duration::hours(6),
                capacity: 8,
            },
        ];

        let mut tx = self.store.begin().await?;
        for sample in &samples {
            if let Err(e) = tx.insert_flight(sample).await {
                if let Err(rb) = tx.rollback().await {
                    warn!("Rollback after failed seed also failed: {}", rb);
                }
                return Err(map_unique(e, &sample.code));
            }
        }
        tx.commit().await?;

        info!("Sample flights added");
        Ok(samples.len())
    }
}

fn map_unique(err: StoreError, code: &str) -> CoreError {
    match err {
        StoreError::UniqueViolation(_) => {
            CoreError::Conflict(format!("flight code {} already exists", code))
        }
        other => CoreError::TransactionFailure(other),
    }
}

pub fn validate_new_flight(new: &NewFlight) -> CoreResult<()> {
    // Column widths of the flights table.
    for (field, value, max) in [
        ("code", &new.code, 20),
        ("origin", &new.origin, 80),
        ("destination", &new.destination, 80),
    ] {
        if value.trim().is_empty() {
            return Err(CoreError::ValidationError(format!("{} is required", field)));
        }
        if value.chars().count() > max {
            return Err(CoreError::ValidationError(format!(
                "{} is longer than {} characters",
                field, max
            )));
        }
    }
    if new.capacity < 1 {
        return Err(CoreError::ValidationError(format!(
            "capacity must be positive, got {}",
            new.capacity
        )));
    }
    if new.arrive <= new.depart {
        return Err(CoreError::ValidationError(
            "arrival must be after departure".to_string(),
        ));
    }
    Ok(())
}
