use aerobook_shared::Flight;
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SeatError {
    #[error("no free seat on flight {flight_id} ({capacity} seats)")]
    Full { flight_id: i64, capacity: i32 },
}

/// Pick a seat on `flight` that is not in `occupied`.
///
/// A preferred seat wins when it lies in `1..=capacity` and is free. Otherwise
/// the lowest free seat number is returned, so the result depends only on the
/// inputs.
pub fn allocate_seat(
    flight: &Flight,
    occupied: &HashSet<i32>,
    preferred: Option<i32>,
) -> Result<i32, SeatError> {
    if let Some(seat) = preferred {
        if (1..=flight.capacity).contains(&seat) && !occupied.contains(&seat) {
            return Ok(seat);
        }
    }

    (1..=flight.capacity)
        .find(|seat| !occupied.contains(seat))
        .ok_or(SeatError::Full {
            flight_id: flight.id,
            capacity: flight.capacity,
        })
}
