//! Authentication service.
//!
//! Login checks a password against the credential store, then issues a CSRF
//! token and a session token that embeds it. Unknown users and wrong
//! passwords cost one Argon2 verification each and fail the same way.

mod error;

pub use error::AuthError;

use std::future::Future;
use std::sync::LazyLock;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, instrument};

use dreampos_core::{display_currency, redirect_path_for};

use crate::db::RepositoryError;
use crate::models::{BusinessInfo, CurrentUser, UserDetails};
use crate::services::token::{CSRF_TOKEN_BYTES, SessionClaims, TokenService};

/// Read access to employee credentials.
pub trait CredentialStore: Send + Sync {
    /// Credential record and roles, or `None` for an unknown username.
    fn user_details(
        &self,
        username: &str,
    ) -> impl Future<Output = Result<Option<UserDetails>, RepositoryError>> + Send;

    /// Currency code of the user's business, if one is configured.
    fn user_currency(
        &self,
        username: &str,
    ) -> impl Future<Output = Result<Option<String>, RepositoryError>> + Send;

    /// Business and locations the user belongs to.
    fn business_info(
        &self,
        username: &str,
    ) -> impl Future<Output = Result<BusinessInfo, RepositoryError>> + Send;
}

/// Hash verified when the username does not exist, so both failure paths
/// do the same work.
static DUMMY_HASH: LazyLock<Option<String>> =
    LazyLock::new(|| hash_password("dreampos-timing-equalizer").ok());

/// Everything a successful login hands back to the HTTP layer.
#[derive(Debug, Clone)]
pub struct LoginSession {
    pub session_token: String,
    pub csrf_token: String,
    pub expires_at: DateTime<Utc>,
    pub redirect_path: &'static str,
    /// Uppercase ISO code.
    pub currency: String,
    pub business_info: BusinessInfo,
}

/// Authentication service over a credential store.
pub struct AuthService<'a, S> {
    store: S,
    tokens: &'a TokenService,
}

impl<'a, S: CredentialStore> AuthService<'a, S> {
    /// Create a new authentication service.
    #[must_use]
    pub const fn new(store: S, tokens: &'a TokenService) -> Self {
        Self { store, tokens }
    }

    /// Login with username and password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` if the username or password is wrong.
    /// Returns `AuthError::TokenGeneration` if a token cannot be issued.
    /// Returns `AuthError::Repository` if the credential store fails.
    #[instrument(skip(self, password))]
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        session_ttl: Duration,
    ) -> Result<LoginSession, AuthError> {
        let details = self.store.user_details(username).await?;

        let hash = details
            .as_ref()
            .map_or_else(|| DUMMY_HASH.as_deref().unwrap_or_default(), |d| d.password_hash.as_str());
        let verified = verify_password(password, hash).is_ok();

        let user = match details {
            Some(user) if verified => user,
            _ => {
                debug!("Login rejected");
                return Err(AuthError::InvalidCredentials);
            }
        };

        let csrf_token = self.tokens.issue_csrf_token(CSRF_TOKEN_BYTES)?;
        let expires_at = Utc::now() + session_ttl;
        let claims = SessionClaims::new(username, csrf_token.clone(), expires_at);
        let session_token = self.tokens.issue_session_token(&claims)?;

        let redirect_path = redirect_path_for(&user.roles);
        let currency = display_currency(self.store.user_currency(username).await?.as_deref());
        let business_info = self.store.business_info(username).await?;

        debug!(redirect_path, "Login succeeded");

        Ok(LoginSession {
            session_token,
            csrf_token,
            expires_at,
            redirect_path,
            currency,
            business_info,
        })
    }

    /// Verify a session cookie against the presented CSRF header.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::NotValidated` for any verification failure.
    pub fn validate(&self, session_token: &str, presented_csrf: &str) -> Result<SessionClaims, AuthError> {
        self.tokens
            .verify_session_token(session_token, presented_csrf)
            .map_err(|e| {
                debug!(reason = %e, "Session validation failed");
                AuthError::NotValidated
            })
    }

    /// Validate a session and load the employee it belongs to.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::NotValidated` if the session does not verify or the
    /// employee no longer exists.
    /// Returns `AuthError::Repository` if the credential store fails.
    pub async fn current_user(
        &self,
        session_token: &str,
        presented_csrf: &str,
    ) -> Result<CurrentUser, AuthError> {
        let claims = self.validate(session_token, presented_csrf)?;
        let details = self
            .store
            .user_details(&claims.username)
            .await?
            .ok_or(AuthError::NotValidated)?;

        Ok(CurrentUser {
            id: details.id,
            username: claims.username,
            roles: details.roles,
        })
    }
}

/// Hash a password with Argon2id and a random salt.
///
/// # Errors
///
/// Returns `AuthError::PasswordHash` if hashing fails.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AuthError::PasswordHash)
}

/// Verify a password against a hash.
fn verify_password(password: &str, hash: &str) -> Result<(), AuthError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| AuthError::InvalidCredentials)?;
    let argon2 = Argon2::default();

    argon2
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| AuthError::InvalidCredentials)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use secrecy::SecretString;

    use dreampos_core::{BusinessId, EmployeeId, LocationId};

    use super::*;
    use crate::models::LocationInfo;

    static PASSWORD_HASH: LazyLock<String> =
        LazyLock::new(|| hash_password("correct horse").unwrap());

    #[derive(Default)]
    struct FakeStore {
        users: HashMap<String, UserDetails>,
        currency: Option<String>,
    }

    impl FakeStore {
        fn with_user(username: &str, roles: &[&str]) -> Self {
            let mut users = HashMap::new();
            users.insert(
                username.to_owned(),
                UserDetails {
                    id: EmployeeId::new(1),
                    password_hash: PASSWORD_HASH.clone(),
                    roles: roles.iter().map(|r| (*r).to_owned()).collect(),
                },
            );
            Self {
                users,
                currency: Some("eur".to_owned()),
            }
        }
    }

    impl CredentialStore for FakeStore {
        async fn user_details(&self, username: &str) -> Result<Option<UserDetails>, RepositoryError> {
            Ok(self.users.get(username).cloned())
        }

        async fn user_currency(&self, _username: &str) -> Result<Option<String>, RepositoryError> {
            Ok(self.currency.clone())
        }

        async fn business_info(&self, _username: &str) -> Result<BusinessInfo, RepositoryError> {
            Ok(BusinessInfo {
                id: BusinessId::new(3),
                locations: vec![LocationInfo {
                    id: LocationId::new(7),
                    name: "Downtown".to_owned(),
                }],
            })
        }
    }

    fn tokens() -> TokenService {
        TokenService::new(&SecretString::from("p4Lm8Qx2Wv6Rt1Zn9Kb3Yc7Hd5Jf0Gs"))
    }

    #[tokio::test]
    async fn test_login_success() {
        let tokens = tokens();
        let auth = AuthService::new(FakeStore::with_user("ana", &["MANAGER"]), &tokens);

        let session = auth.login("ana", "correct horse", Duration::hours(1)).await.unwrap();
        assert_eq!(session.redirect_path, "/dashboard");
        assert_eq!(session.currency, "EUR");
        assert_eq!(session.business_info.locations.len(), 1);

        let claims = auth.validate(&session.session_token, &session.csrf_token).unwrap();
        assert_eq!(claims.username, "ana");
        assert_eq!(claims.csrf_token, session.csrf_token);
    }

    #[tokio::test]
    async fn test_login_cashier_takes_priority() {
        let tokens = tokens();
        let auth = AuthService::new(
            FakeStore::with_user("cam", &["RECEPTIONIST", "CASHIER"]),
            &tokens,
        );
        let session = auth.login("cam", "correct horse", Duration::hours(1)).await.unwrap();
        assert_eq!(session.redirect_path, "/newOrder");
    }

    #[tokio::test]
    async fn test_login_failures_are_indistinguishable() {
        let tokens = tokens();
        let auth = AuthService::new(FakeStore::with_user("ana", &["MANAGER"]), &tokens);

        let wrong_password = auth.login("ana", "wrong", Duration::hours(1)).await.unwrap_err();
        let unknown_user = auth.login("zed", "correct horse", Duration::hours(1)).await.unwrap_err();

        assert!(matches!(wrong_password, AuthError::InvalidCredentials));
        assert!(matches!(unknown_user, AuthError::InvalidCredentials));
        assert_eq!(wrong_password.to_string(), unknown_user.to_string());
    }

    #[tokio::test]
    async fn test_login_currency_falls_back_to_usd() {
        let tokens = tokens();
        let mut store = FakeStore::with_user("ana", &[]);
        store.currency = None;
        let auth = AuthService::new(store, &tokens);

        let session = auth.login("ana", "correct horse", Duration::hours(1)).await.unwrap();
        assert_eq!(session.currency, "USD");
        assert_eq!(session.redirect_path, "/login");
    }

    #[tokio::test]
    async fn test_validate_collapses_failures() {
        let tokens = tokens();
        let auth = AuthService::new(FakeStore::with_user("ana", &["CLERK"]), &tokens);
        let session = auth.login("ana", "correct horse", Duration::hours(1)).await.unwrap();

        let mismatch = auth.validate(&session.session_token, "other").unwrap_err();
        let garbage = auth.validate("garbage", &session.csrf_token).unwrap_err();
        assert!(matches!(mismatch, AuthError::NotValidated));
        assert!(matches!(garbage, AuthError::NotValidated));
    }

    #[tokio::test]
    async fn test_current_user_requires_existing_employee() {
        let tokens = tokens();
        let auth = AuthService::new(FakeStore::with_user("ana", &["CLERK"]), &tokens);
        let session = auth.login("ana", "correct horse", Duration::hours(1)).await.unwrap();

        let user = auth
            .current_user(&session.session_token, &session.csrf_token)
            .await
            .unwrap();
        assert_eq!(user.username, "ana");
        assert_eq!(user.roles, vec!["CLERK".to_owned()]);

        let csrf = tokens.issue_csrf_token(CSRF_TOKEN_BYTES).unwrap();
        let ghost = SessionClaims::new("ghost", csrf.clone(), Utc::now() + Duration::hours(1));
        let token = tokens.issue_session_token(&ghost).unwrap();
        let err = auth.current_user(&token, &csrf).await.unwrap_err();
        assert!(matches!(err, AuthError::NotValidated));
    }

    #[test]
    fn test_hash_and_verify() {
        assert!(verify_password("correct horse", &PASSWORD_HASH).is_ok());
        assert!(verify_password("incorrect horse", &PASSWORD_HASH).is_err());
        assert!(verify_password("anything", "not-a-phc-string").is_err());
    }
}
