//! Seat inventory - the per-trip seat map.
//!
//! Seats are reserved all-or-nothing: if any requested seat is taken, nothing
//! changes and the caller gets `SeatConflict`. Mutations only happen on a trip
//! row the caller has locked with [`lock_trip`] inside its own transaction.

use std::collections::HashSet;

use sqlx::PgConnection;
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    models::trip::{SeatMap, SeatState, Trip, TripStatus},
};

/// Reject empty seat lists, blank ids and duplicates before any lock is taken.
pub fn validate_seat_request(seat_ids: &[String]) -> Result<(), AppError> {
    if seat_ids.is_empty() {
        return Err(AppError::InvalidRequest(
            "At least one seat must be selected".to_string(),
        ));
    }

    let mut seen = HashSet::with_capacity(seat_ids.len());
    for seat in seat_ids {
        if seat.trim().is_empty() {
            return Err(AppError::InvalidRequest("Seat id cannot be empty".to_string()));
        }
        if !seen.insert(seat.as_str()) {
            return Err(AppError::InvalidRequest(format!(
                "Seat {seat} was selected more than once"
            )));
        }
    }

    Ok(())
}

pub fn ensure_bookable(trip: &Trip) -> Result<(), AppError> {
    if trip.status != TripStatus::Scheduled {
        return Err(AppError::TripNotBookable);
    }
    Ok(())
}

/// Check that every requested seat exists and is available, and that taking
/// them keeps the trip within capacity.
pub fn check_seats(trip: &Trip, seat_ids: &[String]) -> Result<(), AppError> {
    for seat in seat_ids {
        match trip.seat_map.get(seat) {
            None => {
                return Err(AppError::InvalidRequest(format!(
                    "Seat {seat} does not exist on this trip"
                )));
            }
            Some(SeatState::Occupied) => return Err(AppError::SeatConflict),
            Some(SeatState::Available) => {}
        }
    }

    let capacity = usize::try_from(trip.capacity).unwrap_or(0);
    if trip.occupied_count() + seat_ids.len() > capacity {
        return Err(AppError::SeatConflict);
    }

    Ok(())
}

fn set_seats(seat_map: &mut SeatMap, seat_ids: &[String], state: SeatState) {
    for seat in seat_ids {
        if let Some(current) = seat_map.get_mut(seat) {
            *current = state;
        }
    }
}

/// Load a trip with its route price, locking the trip row.
pub async fn lock_trip(conn: &mut PgConnection, trip_id: Uuid) -> Result<Trip, AppError> {
    let trip = sqlx::query_as::<_, Trip>(
        r#"
        SELECT t.id, t.route_id, t.status, t.capacity, t.seat_map, r.base_price_cents
        FROM trips t
        JOIN routes r ON r.id = t.route_id
        WHERE t.id = $1
        FOR UPDATE OF t
        "#,
    )
    .bind(trip_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(AppError::TripNotFound)?;

    Ok(trip)
}

/// Read a trip without locking it.
pub async fn find_trip(pool: &DbPool, trip_id: Uuid) -> Result<Trip, AppError> {
    let trip = sqlx::query_as::<_, Trip>(
        r#"
        SELECT t.id, t.route_id, t.status, t.capacity, t.seat_map, r.base_price_cents
        FROM trips t
        JOIN routes r ON r.id = t.route_id
        WHERE t.id = $1
        "#,
    )
    .bind(trip_id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::TripNotFound)?;

    Ok(trip)
}

/// Flip the requested seats to occupied on a locked trip.
///
/// # Errors
///
/// - `TripNotBookable`: trip is not scheduled
/// - `SeatConflict`: any seat is already occupied, or capacity would be exceeded
/// - `InvalidRequest`: a seat id is not on the seat map
pub async fn reserve_seats(
    conn: &mut PgConnection,
    trip: &mut Trip,
    seat_ids: &[String],
) -> Result<(), AppError> {
    ensure_bookable(trip)?;
    check_seats(trip, seat_ids)?;

    set_seats(&mut trip.seat_map, seat_ids, SeatState::Occupied);
    write_seat_map(conn, trip).await
}

/// Return seats of a cancelled booking to the pool.
pub async fn release_seats(
    conn: &mut PgConnection,
    trip: &mut Trip,
    seat_ids: &[String],
) -> Result<(), AppError> {
    set_seats(&mut trip.seat_map, seat_ids, SeatState::Available);
    write_seat_map(conn, trip).await
}

async fn write_seat_map(conn: &mut PgConnection, trip: &Trip) -> Result<(), AppError> {
    sqlx::query("UPDATE trips SET seat_map = $1, updated_at = NOW() WHERE id = $2")
        .bind(&trip.seat_map)
        .bind(trip.id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::types::Json;

    fn trip(capacity: i32, seats: &[(&str, SeatState)]) -> Trip {
        Trip {
            id: Uuid::new_v4(),
            route_id: Uuid::new_v4(),
            status: TripStatus::Scheduled,
            capacity,
            seat_map: Json(
                seats
                    .iter()
                    .map(|(id, state)| (id.to_string(), *state))
                    .collect(),
            ),
            base_price_cents: 5_000,
        }
    }

    fn seats(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_request_validation() {
        assert!(validate_seat_request(&seats(&["1A", "1B"])).is_ok());
        assert!(matches!(
            validate_seat_request(&[]),
            Err(AppError::InvalidRequest(_))
        ));
        assert!(matches!(
            validate_seat_request(&seats(&["1A", "1A"])),
            Err(AppError::InvalidRequest(_))
        ));
        assert!(matches!(
            validate_seat_request(&seats(&["  "])),
            Err(AppError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_any_occupied_seat_is_a_conflict() {
        let t = trip(
            4,
            &[
                ("12A", SeatState::Available),
                ("12B", SeatState::Occupied),
            ],
        );

        assert!(check_seats(&t, &seats(&["12A"])).is_ok());
        assert!(matches!(
            check_seats(&t, &seats(&["12A", "12B"])),
            Err(AppError::SeatConflict)
        ));
    }

    #[test]
    fn test_unknown_seat_is_invalid_not_conflict() {
        let t = trip(2, &[("1A", SeatState::Available)]);
        assert!(matches!(
            check_seats(&t, &seats(&["9Z"])),
            Err(AppError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_capacity_is_never_exceeded() {
        // Seat map lists more seats than the bus can carry
        let t = trip(
            2,
            &[
                ("1A", SeatState::Occupied),
                ("1B", SeatState::Available),
                ("1C", SeatState::Available),
            ],
        );

        assert!(check_seats(&t, &seats(&["1B"])).is_ok());
        assert!(matches!(
            check_seats(&t, &seats(&["1B", "1C"])),
            Err(AppError::SeatConflict)
        ));
    }

    #[test]
    fn test_only_scheduled_trips_are_bookable() {
        let mut t = trip(1, &[("1A", SeatState::Available)]);
        assert!(ensure_bookable(&t).is_ok());

        t.status = TripStatus::Departed;
        assert!(matches!(ensure_bookable(&t), Err(AppError::TripNotBookable)));
    }

    #[test]
    fn test_set_seats_ignores_unknown_ids() {
        let mut map = SeatMap::new();
        map.insert("1A".into(), SeatState::Available);

        set_seats(&mut map, &seats(&["1A", "ZZ"]), SeatState::Occupied);

        assert_eq!(map.get("1A"), Some(&SeatState::Occupied));
        assert!(!map.contains_key("ZZ"));
    }
}
