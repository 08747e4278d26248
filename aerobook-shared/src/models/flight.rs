use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A scheduled flight. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flight {
    pub id: i64,
    pub code: String,
    pub origin: String,
    pub destination: String,
    pub depart: DateTime<Utc>,
    pub arrive: DateTime<Utc>,
    pub capacity: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewFlight {
    pub code: String,
    pub origin: String,
    pub destination: String,
    pub depart: DateTime<Utc>,
    pub arrive: DateTime<Utc>,
    pub capacity: i32,
}

impl NewFlight {
    pub fn into_flight(self, id: i64) -> Flight {
        Flight {
            id,
            code: self.code,
            origin: self.origin,
            destination: self.destination,
            depart: self.depart,
            arrive: self.arrive,
            capacity: self.capacity,
        }
    }
}
