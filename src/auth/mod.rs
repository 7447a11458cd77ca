//! Authentication and authorization for Favorr
//!
//! Provides:
//! - JWT token generation and validation
//! - Password hashing with Argon2
//! - Participant roles for ledger and board operations
//! - The identity authority tying them to the user store

pub mod identity;
pub mod jwt;
pub mod password;
pub mod permissions;

pub use identity::{
    IdentityAuthority, PublicUser, RegisterInput, SanitizedUser, Session, UserIdentity, UserRef,
};
pub use jwt::{
    extract_token_from_cookie, extract_token_from_header, Claims, JwtValidator, TokenInput,
    TokenValidationResult, SESSION_COOKIE,
};
pub use password::{hash_password, verify_password};
pub use permissions::{is_action_allowed, require, Action, Role};
