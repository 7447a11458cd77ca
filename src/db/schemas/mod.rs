//! Database schemas for Favorr
//!
//! Defines MongoDB document structures for users, favors and public requests.

mod favor;
mod metadata;
mod public_request;
mod user;

pub use favor::{FavorDoc, FavorStatus, FAVOR_COLLECTION};
pub use metadata::Metadata;
pub use public_request::{PublicRequestDoc, RequestStatus, Reward, PUBLIC_REQUEST_COLLECTION};
pub use user::{UserDoc, USER_COLLECTION};
