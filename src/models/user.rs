//! User model as seen by the wallet core.
//!
//! Users are registered and authenticated by the wider platform. The core
//! reads role, serial code, PIN hash and agent commission rate, and writes
//! nothing but `pin_hash`.

use serde::Serialize;
use uuid::Uuid;

use super::UnknownVariant;

/// Role supplied by the auth layer with every request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Passenger,
    Agent,
    Company,
    Admin,
}

impl TryFrom<String> for Role {
    type Error = UnknownVariant;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "passenger" => Ok(Role::Passenger),
            "agent" => Ok(Role::Agent),
            "company" => Ok(Role::Company),
            "admin" => Ok(Role::Admin),
            _ => Err(UnknownVariant { kind: "role", value }),
        }
    }
}

/// Represents a row of the `users` table, restricted to the columns the core reads.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,

    pub full_name: String,

    #[sqlx(try_from = "String")]
    pub role: Role,

    /// Short public code other users type in to send money, e.g. `PS-4821`
    pub serial_code: String,

    /// Argon2 PHC string of the wallet PIN, absent until the user sets one
    pub pin_hash: Option<String>,

    /// Agent commission in basis points (250 = 2.5%)
    pub commission_rate_bps: i32,
}
