use std::sync::Arc;

use anyhow::Context;
use axum::extract::FromRef;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, warn};

use super::{
    dto::{LoginRequest, RegisterRequest},
    jwt::{JwtKeys, TokenError},
    password::{hash_password, verify_password},
    repo::UserRepo,
    repo_types::{NewUser, User},
};
use crate::{
    db::StoreError,
    error::{AppError, FieldErrors},
    state::AppState,
};

pub const NAME_MAX_CHARS: usize = 100;
pub const PASSWORD_MIN_CHARS: usize = 8;

/// Authentication failures. Messages are what the client sees, so every
/// token problem reads the same.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("Authorization header required")]
    MissingCredentials,
    #[error("Invalid authorization header format")]
    MalformedHeader,
    #[error("Invalid or expired token")]
    Token(#[from] TokenError),
    #[error("Invalid or expired token")]
    UnknownSubject,
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("User with this email already exists")]
    DuplicateEmail,
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Registration, login and token-to-user resolution.
#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserRepo>,
    keys: JwtKeys,
}

impl FromRef<AppState> for AuthService {
    fn from_ref(state: &AppState) -> Self {
        Self::new(state.users.clone(), state.keys.clone())
    }
}

impl AuthService {
    pub fn new(users: Arc<dyn UserRepo>, keys: JwtKeys) -> Self {
        Self { users, keys }
    }

    pub async fn register(&self, req: RegisterRequest) -> Result<User, AppError> {
        let name = req.name.trim().to_string();
        let email = req.email.trim().to_string();

        let mut fields = FieldErrors::new();
        let name_len = name.chars().count();
        if name_len == 0 {
            fields.insert("name".into(), "name is required".into());
        } else if name_len > NAME_MAX_CHARS {
            fields.insert(
                "name".into(),
                format!("name must be at most {NAME_MAX_CHARS} characters"),
            );
        }
        check_email(&email, &mut fields);
        if req.password.chars().count() < PASSWORD_MIN_CHARS {
            fields.insert(
                "password".into(),
                format!("password must be at least {PASSWORD_MIN_CHARS} characters"),
            );
        }
        if !fields.is_empty() {
            return Err(AppError::validation("Validation failed", fields));
        }

        if self.users.find_by_email(&email).await.map_err(internal)?.is_some() {
            warn!(email = %email, "email already registered");
            return Err(AuthError::DuplicateEmail.into());
        }

        let password_hash = hash_blocking(req.password).await?;

        let user = match self
            .users
            .create(NewUser {
                name,
                email,
                password_hash,
            })
            .await
        {
            Ok(user) => user,
            // Lost a race with a concurrent registration.
            Err(StoreError::Conflict) => return Err(AuthError::DuplicateEmail.into()),
            Err(e) => return Err(internal(e)),
        };

        info!(user_id = %user.id, email = %user.email, "user registered");
        Ok(user)
    }

    pub async fn login(&self, req: LoginRequest) -> Result<(User, String), AppError> {
        let email = req.email.trim().to_string();

        let mut fields = FieldErrors::new();
        check_email(&email, &mut fields);
        if req.password.is_empty() {
            fields.insert("password".into(), "password is required".into());
        }
        if !fields.is_empty() {
            return Err(AppError::validation("Validation failed", fields));
        }

        let Some(user) = self.users.find_by_email(&email).await.map_err(internal)? else {
            warn!(email = %email, "login unknown email");
            return Err(AuthError::InvalidCredentials.into());
        };

        if !verify_blocking(req.password, user.password_hash.clone()).await? {
            warn!(user_id = %user.id, "login invalid password");
            return Err(AuthError::InvalidCredentials.into());
        }

        let token = self.keys.issue(user.id)?;
        info!(user_id = %user.id, "user logged in");
        Ok((user, token))
    }

    /// Resolves a raw bearer token to the live user it names.
    pub async fn authenticate(&self, token: &str) -> Result<User, AppError> {
        let claims = self.keys.validate(token).map_err(|e| {
            warn!(reason = ?e, "token rejected");
            AuthError::Token(e)
        })?;

        match self.users.find_by_id(claims.sub).await.map_err(internal)? {
            Some(user) => Ok(user),
            None => {
                warn!(user_id = %claims.sub, "token subject no longer exists");
                Err(AuthError::UnknownSubject.into())
            }
        }
    }
}

fn check_email(email: &str, fields: &mut FieldErrors) {
    if email.is_empty() {
        fields.insert("email".into(), "email is required".into());
    } else if !is_valid_email(email) {
        fields.insert("email".into(), "email is not a valid address".into());
    }
}

fn internal(e: StoreError) -> AppError {
    AppError::Internal(anyhow::Error::new(e).context("user store"))
}

// Argon2 is deliberately slow; keep it off the async workers.
async fn hash_blocking(password: String) -> Result<String, AppError> {
    let hash = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .context("hash task panicked")?
        .context("hash password")?;
    Ok(hash)
}

async fn verify_blocking(password: String, hash: String) -> Result<bool, AppError> {
    let ok = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .context("verify task panicked")?
        .context("verify password")?;
    Ok(ok)
}
