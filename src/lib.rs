//! Wallet ledger and booking core of a bus-ticketing marketplace.
//!
//! Passengers reserve seats and pay from a stored-value wallet or by mobile
//! money; agents deposit cash into passenger wallets for a commission. This
//! crate owns the parts of the platform that mutate shared money and seat
//! state: the wallet ledger, seat inventory, the booking coordinator and
//! mobile-money callback reconciliation.
//!
//! # Architecture
//!
//! - **Web Framework**: Axum (async HTTP server)
//! - **Database**: PostgreSQL with sqlx; every mutation runs in a transaction
//!   with `SELECT ... FOR UPDATE` row locks
//! - **Authentication**: bearer tokens resolved to a user and role
//! - **Side channels**: provider calls and notifications run in spawned tasks,
//!   after commit

pub mod app;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod state;
