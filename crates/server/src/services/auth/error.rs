//! Authentication error types.

use thiserror::Error;

use crate::db::RepositoryError;
use crate::services::token::TokenError;

/// Errors that can occur during authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Invalid credentials (wrong password or user not found).
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Session token or CSRF token did not verify.
    ///
    /// The underlying reason is logged, never returned.
    #[error("not validated")]
    NotValidated,

    /// Session or CSRF token could not be generated.
    #[error("token generation failed: {0}")]
    TokenGeneration(#[source] TokenError),

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),

    /// Password hashing error.
    #[error("password hashing error")]
    PasswordHash,
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        if err.is_not_valid() {
            Self::NotValidated
        } else {
            Self::TokenGeneration(err)
        }
    }
}
