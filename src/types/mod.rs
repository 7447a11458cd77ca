//! Shared types for Favorr

mod error;

pub use error::{FavorrError, Result};
