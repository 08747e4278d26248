use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::UnknownStatus;
use crate::pii::Masked;

/// Booking lifecycle. `Confirmed -> Cancelled` is the only transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Confirmed,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Confirmed => "CONFIRMED",
            BookingStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CONFIRMED" => Ok(BookingStatus::Confirmed),
            "CANCELLED" => Ok(BookingStatus::Cancelled),
            other => Err(UnknownStatus {
                kind: "booking",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passenger {
    pub id: i64,
    pub name: String,
    pub email: Option<Masked<String>>,
    pub phone: Option<Masked<String>>,
    pub passport: Option<Masked<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewPassenger {
    pub name: String,
    pub email: Option<Masked<String>>,
    pub phone: Option<Masked<String>>,
    pub passport: Option<Masked<String>>,
}

impl NewPassenger {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn into_passenger(self, id: i64) -> Passenger {
        Passenger {
            id,
            name: self.name,
            email: self.email,
            phone: self.phone,
            passport: self.passport,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub id: i64,
    pub flight_id: i64,
    pub passenger_id: i64,
    pub seat_no: Option<i32>,
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
}

impl Booking {
    pub fn is_confirmed(&self) -> bool {
        self.status == BookingStatus::Confirmed
    }
}

#[derive(Debug, Clone)]
pub struct NewBooking {
    pub flight_id: i64,
    pub passenger_id: i64,
    pub seat_no: Option<i32>,
}

impl NewBooking {
    pub fn into_booking(self, id: i64, created_at: DateTime<Utc>) -> Booking {
        Booking {
            id,
            flight_id: self.flight_id,
            passenger_id: self.passenger_id,
            seat_no: self.seat_no,
            status: BookingStatus::Confirmed,
            created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cancellation {
    pub id: i64,
    pub booking_id: i64,
    pub reason: String,
    pub refund_amount: f64,
    pub processed_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewCancellation {
    pub booking_id: i64,
    pub reason: String,
    pub refund_amount: f64,
}

impl NewCancellation {
    pub fn into_cancellation(self, id: i64, processed_at: DateTime<Utc>) -> Cancellation {
        Cancellation {
            id,
            booking_id: self.booking_id,
            reason: self.reason,
            refund_amount: self.refund_amount,
            processed_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_booking_status_parse() {
        assert_eq!("CONFIRMED".parse::<BookingStatus>().unwrap(), BookingStatus::Confirmed);
        assert_eq!("CANCELLED".parse::<BookingStatus>().unwrap(), BookingStatus::Cancelled);

        let err = "PENDING".parse::<BookingStatus>().unwrap_err();
        assert_eq!(err.kind, "booking");
        assert_eq!(err.value, "PENDING");
    }

    #[test]
    fn test_passenger_contact_masked_in_debug() {
        let mut new = NewPassenger::named("Rahim Uddin");
        new.email = Some(Masked("rahim@example.com".to_string()));
        let passenger = new.into_passenger(7);

        let debug = format!("{:?}", passenger);
        assert!(debug.contains("Rahim Uddin"));
        assert!(!debug.contains("rahim@example.com"));

        let json = serde_json::to_value(&passenger).unwrap();
        assert_eq!(json["email"], "rahim@example.com");
        assert!(json["phone"].is_null());
    }
}
