//! Favorr - favor ledger, public request board and leaderboard
//!
//! Users record favors they owe each other, settle them (with photo proof
//! for the kinds that need it), post public requests with pledged rewards,
//! and climb a leaderboard of completed favors.
//!
//! ## Components
//!
//! - **Identity**: registration, login and JWT session tokens
//! - **Ledger**: favor creation and the settlement state machine
//! - **Board**: public requests, reward pledges, claiming and completion
//! - **Leaderboard**: completed-favor counters and reconciliation
//! - **Listing**: limit/skip pagination shared by every listing

pub mod auth;
pub mod board;
pub mod config;
pub mod db;
pub mod files;
pub mod leaderboard;
pub mod ledger;
pub mod listing;
pub mod logging;
pub mod routes;
pub mod server;
pub mod types;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{FavorrError, Result};
