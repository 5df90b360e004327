//! Trip and seat map models.
//!
//! Trips are created and scheduled by company tooling. The core reads
//! status, capacity and route price, and owns the `seat_map` column.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use uuid::Uuid;

use super::UnknownVariant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TripStatus {
    Scheduled,
    Departed,
    Completed,
    Cancelled,
}

impl TryFrom<String> for TripStatus {
    type Error = UnknownVariant;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "scheduled" => Ok(TripStatus::Scheduled),
            "departed" => Ok(TripStatus::Departed),
            "completed" => Ok(TripStatus::Completed),
            "cancelled" => Ok(TripStatus::Cancelled),
            _ => Err(UnknownVariant {
                kind: "trip status",
                value,
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeatState {
    Available,
    Occupied,
}

/// Seat identifier (e.g. `"12A"`) to availability, stored as JSONB.
pub type SeatMap = BTreeMap<String, SeatState>;

/// A trip joined with the base price of its route.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Trip {
    pub id: Uuid,
    pub route_id: Uuid,
    #[sqlx(try_from = "String")]
    pub status: TripStatus,
    pub capacity: i32,
    pub seat_map: Json<SeatMap>,
    pub base_price_cents: i64,
}

impl Trip {
    pub fn occupied_count(&self) -> usize {
        self.seat_map
            .values()
            .filter(|s| **s == SeatState::Occupied)
            .count()
    }
}
