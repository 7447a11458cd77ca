//! Identity authority
//!
//! Issues and validates the bearer credential that binds a request to a user.
//! Tokens are stateless HS256 JWTs; revocation is the client discarding the
//! token (and the HTTP layer clearing the cookie).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::auth::jwt::{extract_token_from_cookie, extract_token_from_header, JwtValidator, TokenInput};
use crate::auth::password::{hash_password, verify_password};
use crate::db::schemas::UserDoc;
use crate::db::UserStore;
use crate::types::{FavorrError, Result};

const MAX_USERNAME_LEN: usize = 32;
const MIN_PASSWORD_LEN: usize = 8;

/// The caller of an operation, resolved once per request from its token
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserIdentity {
    pub user_id: String,
    pub username: String,
}

/// Registration form
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterInput {
    pub username: String,
    pub email: String,
    pub password: String,
    pub password_confirmation: String,
}

/// A user as shown to themselves; never carries the credential hash
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SanitizedUser {
    pub id: String,
    pub username: String,
    pub email: String,
    pub completed_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl From<&UserDoc> for SanitizedUser {
    fn from(user: &UserDoc) -> Self {
        Self {
            id: user.id.clone(),
            username: user.username.clone(),
            email: user.email.clone(),
            completed_count: user.completed_count,
            created_at: user.metadata.created_at.map(|t| t.to_chrono()),
        }
    }
}

/// A user as shown to everyone else
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: String,
    pub username: String,
    pub completed_count: i64,
}

impl From<&UserDoc> for PublicUser {
    fn from(user: &UserDoc) -> Self {
        Self {
            id: user.id.clone(),
            username: user.username.clone(),
            completed_count: user.completed_count,
        }
    }
}

/// Minimal reference to a user inside favor and request views
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserRef {
    pub id: String,
    pub username: String,
}

impl UserRef {
    /// Resolve a set of user ids to references, one store read per distinct id
    pub async fn resolve_all(
        users: &dyn UserStore,
        ids: &[&str],
    ) -> Result<HashMap<String, UserRef>> {
        let mut refs = HashMap::new();
        for &id in ids {
            if refs.contains_key(id) {
                continue;
            }
            let username = match users.find_user_by_id(id).await? {
                Some(user) => user.username,
                None => id.to_string(),
            };
            refs.insert(
                id.to_string(),
                UserRef {
                    id: id.to_string(),
                    username,
                },
            );
        }
        Ok(refs)
    }

    /// Entry from a resolved map, falling back to the bare id
    pub fn pick(refs: &HashMap<String, UserRef>, id: &str) -> UserRef {
        refs.get(id).cloned().unwrap_or_else(|| UserRef {
            id: id.to_string(),
            username: id.to_string(),
        })
    }
}

/// Issued token plus the user it identifies
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: SanitizedUser,
}

/// Registration, login and token validation
#[derive(Clone)]
pub struct IdentityAuthority {
    users: Arc<dyn UserStore>,
    jwt: JwtValidator,
}

impl IdentityAuthority {
    pub fn new(users: Arc<dyn UserStore>, jwt: JwtValidator) -> Self {
        Self { users, jwt }
    }

    /// Token lifetime in seconds
    pub fn token_window(&self) -> u64 {
        self.jwt.expiry_seconds()
    }

    /// Create an account and sign the new user in
    pub async fn register(&self, input: RegisterInput) -> Result<Session> {
        let username = input.username.trim().to_string();
        let email = input.email.trim().to_string();

        validate_username(&username)?;
        validate_email(&email)?;
        if input.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(FavorrError::Validation(format!(
                "Password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }

        if input.password != input.password_confirmation {
            return Err(FavorrError::PasswordMismatch);
        }

        if self.users.find_user_by_username(&username).await?.is_some() {
            return Err(FavorrError::DuplicateIdentity);
        }

        let password_hash = hash_password(&input.password)?;
        // The unique index settles a race between two registrations
        let user = self
            .users
            .insert_user(UserDoc::new(username, email, password_hash))
            .await?;

        info!("Registered user {} ({})", user.username, user.id);
        self.issue(&user)
    }

    /// Exchange credentials for a session
    ///
    /// Unknown usernames and wrong passwords fail identically.
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<Session> {
        let user = match self.users.find_user_by_username(username.trim()).await? {
            Some(user) => user,
            None => {
                debug!("Login for unknown username");
                return Err(invalid_credentials());
            }
        };

        if !verify_password(password, &user.password_hash)? {
            warn!("Failed login for {}", user.username);
            return Err(invalid_credentials());
        }

        info!("User logged in: {}", user.username);
        self.issue(&user)
    }

    /// Resolve a token to the identity it was issued for
    pub fn validate(&self, token: &str) -> Result<UserIdentity> {
        let result = self.jwt.verify_token(token);
        match result.claims {
            Some(claims) if result.valid => Ok(UserIdentity {
                user_id: claims.sub,
                username: claims.username,
            }),
            _ => Err(FavorrError::Unauthenticated(
                result.error.unwrap_or_else(|| "Invalid token".to_string()),
            )),
        }
    }

    /// Resolve the identity carried by a request's Authorization or Cookie header
    pub fn identify(
        &self,
        authorization: Option<&str>,
        cookie: Option<&str>,
    ) -> Result<UserIdentity> {
        let token = extract_token_from_header(authorization)
            .or_else(|| extract_token_from_cookie(cookie))
            .ok_or_else(|| FavorrError::Unauthenticated("Missing token".into()))?;
        self.validate(token)
    }

    /// Logical no-op: the token stays valid until it expires
    pub fn revoke(&self, token: Option<&str>) {
        if let Some(identity) = token.and_then(|t| self.validate(t).ok()) {
            debug!("Session closed for {}", identity.username);
        }
    }

    /// Find another user by username
    pub async fn lookup(&self, username: &str) -> Result<PublicUser> {
        self.users
            .find_user_by_username(username.trim())
            .await?
            .map(|u| PublicUser::from(&u))
            .ok_or_else(|| FavorrError::UnknownEntity(format!("user '{}'", username.trim())))
    }

    /// The caller's own profile
    pub async fn current(&self, identity: &UserIdentity) -> Result<SanitizedUser> {
        self.users
            .find_user_by_id(&identity.user_id)
            .await?
            .map(|u| SanitizedUser::from(&u))
            .ok_or_else(|| FavorrError::Unauthenticated("User no longer exists".into()))
    }

    fn issue(&self, user: &UserDoc) -> Result<Session> {
        let token = self.jwt.generate_token(TokenInput {
            user_id: user.id.clone(),
            username: user.username.clone(),
        })?;
        let expires_at = Utc::now() + chrono::Duration::seconds(self.jwt.expiry_seconds() as i64);

        Ok(Session {
            token,
            expires_at,
            user: SanitizedUser::from(user),
        })
    }
}

fn invalid_credentials() -> FavorrError {
    FavorrError::Unauthenticated("Invalid username or password".into())
}

fn validate_username(username: &str) -> Result<()> {
    if username.is_empty() {
        return Err(FavorrError::Validation("Username is required".into()));
    }
    if username.chars().count() > MAX_USERNAME_LEN {
        return Err(FavorrError::Validation(format!(
            "Username must be at most {} characters",
            MAX_USERNAME_LEN
        )));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
    {
        return Err(FavorrError::Validation(
            "Username may contain only letters, digits, '_', '-' and '.'".into(),
        ));
    }
    Ok(())
}

fn validate_email(email: &str) -> Result<()> {
    let malformed = || FavorrError::Validation(format!("Invalid email address '{}'", email));

    if email.chars().any(char::is_whitespace) {
        return Err(malformed());
    }
    let (local, domain) = email.split_once('@').ok_or_else(malformed)?;
    if local.is_empty() || domain.contains('@') {
        return Err(malformed());
    }
    let (host, tld) = domain.rsplit_once('.').ok_or_else(malformed)?;
    if host.is_empty() || tld.is_empty() || host.split('.').any(str::is_empty) {
        return Err(malformed());
    }
    Ok(())
}
