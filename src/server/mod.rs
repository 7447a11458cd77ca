//! HTTP server for Favorr

pub mod http;

pub use http::{reconcile_leaderboard, run, AppState};
