//! Server configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `DREAMPOS_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//! - `DREAMPOS_JWT_SECRET` - Session token signing secret (min 32 chars, high entropy)
//! - `DREAMPOS_FRONTEND_URL` - Origin of the terminal frontend, used for CORS and checkout redirects
//! - `STRIPE_SECRET_KEY` - Stripe API secret key
//! - `STRIPE_WEBHOOK_SECRET` - Stripe webhook signing secret (`whsec_...`)
//!
//! ## Optional
//! - `DREAMPOS_HOST` - Bind address (default: 127.0.0.1)
//! - `DREAMPOS_PORT` - Listen port (default: 8080)
//! - `DREAMPOS_SESSION_TTL_SECS` - Session and CSRF cookie lifetime (default: 86400)
//! - `DREAMPOS_COOKIE_SECURE` - Mark auth cookies `Secure` (default: true)
//! - `DREAMPOS_PROCESSOR_TIMEOUT_SECS` - Upper bound for Stripe calls (default: 15)
//! - `STRIPE_API_BASE` - Stripe API origin (default: <https://api.stripe.com>)
//! - `TWILIO_ACCOUNT_SID`, `TWILIO_AUTH_TOKEN`, `TWILIO_FROM_NUMBER` - Reservation SMS;
//!   SMS is disabled unless all three are set
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment tag

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use url::Url;

const MIN_JWT_SECRET_LENGTH: usize = 32;
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Substrings that mark a value as a copy-pasted placeholder (case-insensitive).
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Frontend origin, e.g. `https://pos.example.org`
    pub frontend_url: Url,
    /// Session token settings
    pub auth: AuthConfig,
    /// Stripe settings
    pub stripe: StripeConfig,
    /// Twilio settings, `None` when SMS is disabled
    pub sms: Option<TwilioConfig>,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
}

/// Session token and cookie settings.
#[derive(Clone)]
pub struct AuthConfig {
    /// HS256 signing secret
    pub jwt_secret: SecretString,
    /// Lifetime of both auth cookies and of the embedded token expiry
    pub session_ttl: Duration,
    /// Whether to set the `Secure` cookie attribute
    pub cookie_secure: bool,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"[REDACTED]")
            .field("session_ttl", &self.session_ttl)
            .field("cookie_secure", &self.cookie_secure)
            .finish()
    }
}

/// Stripe API configuration.
///
/// Implements `Debug` manually to redact secret fields.
#[derive(Clone)]
pub struct StripeConfig {
    /// API origin; overridable for tests against a stub server
    pub api_base: String,
    /// Secret API key (`sk_...`)
    pub secret_key: SecretString,
    /// Webhook endpoint signing secret (`whsec_...`)
    pub webhook_secret: SecretString,
    /// Upper bound for any single Stripe call
    pub timeout: Duration,
}

impl std::fmt::Debug for StripeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeConfig")
            .field("api_base", &self.api_base)
            .field("secret_key", &"[REDACTED]")
            .field("webhook_secret", &"[REDACTED]")
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Twilio SMS configuration.
#[derive(Clone)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: SecretString,
    pub from_number: String,
}

impl std::fmt::Debug for TwilioConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwilioConfig")
            .field("account_sid", &self.account_sid)
            .field("auth_token", &"[REDACTED]")
            .field("from_number", &self.from_number)
            .finish()
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let database_url = get_database_url("DREAMPOS_DATABASE_URL")?;
        let host = parse_env("DREAMPOS_HOST", "127.0.0.1")?;
        let port = parse_env("DREAMPOS_PORT", "8080")?;
        let frontend_url = get_required_env("DREAMPOS_FRONTEND_URL")?;
        let frontend_url = Url::parse(&frontend_url).map_err(|e| {
            ConfigError::InvalidEnvVar("DREAMPOS_FRONTEND_URL".to_owned(), e.to_string())
        })?;

        let jwt_secret = get_validated_secret("DREAMPOS_JWT_SECRET")?;
        validate_jwt_secret(&jwt_secret, "DREAMPOS_JWT_SECRET")?;
        let auth = AuthConfig {
            jwt_secret,
            session_ttl: Duration::from_secs(parse_env("DREAMPOS_SESSION_TTL_SECS", "86400")?),
            cookie_secure: parse_env("DREAMPOS_COOKIE_SECURE", "true")?,
        };

        let stripe = StripeConfig {
            api_base: get_env_or_default("STRIPE_API_BASE", "https://api.stripe.com"),
            secret_key: get_validated_secret("STRIPE_SECRET_KEY")?,
            webhook_secret: get_validated_secret("STRIPE_WEBHOOK_SECRET")?,
            timeout: Duration::from_secs(parse_env("DREAMPOS_PROCESSOR_TIMEOUT_SECS", "15")?),
        };

        Ok(Self {
            database_url,
            host,
            port,
            frontend_url,
            auth,
            stripe,
            sms: TwilioConfig::from_env(),
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Frontend URL with `path` appended, e.g. `/payment/success`.
    #[must_use]
    pub fn frontend_path(&self, path: &str) -> String {
        format!(
            "{}{}",
            self.frontend_url.as_str().trim_end_matches('/'),
            path
        )
    }
}

impl TwilioConfig {
    fn from_env() -> Option<Self> {
        let account_sid = get_optional_env("TWILIO_ACCOUNT_SID")?;
        let auth_token = get_optional_env("TWILIO_AUTH_TOKEN")?;
        let from_number = get_optional_env("TWILIO_FROM_NUMBER")?;
        Some(Self {
            account_sid,
            auth_token: SecretString::from(auth_token),
            from_number,
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_owned()))
}

/// Get database URL with fallback to generic `DATABASE_URL`.
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    std::env::var(primary_key)
        .or_else(|_| std::env::var("DATABASE_URL"))
        .map(SecretString::from)
        .map_err(|_| ConfigError::MissingEnvVar(primary_key.to_owned()))
}

/// Empty values count as unset.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_owned())
}

/// Parse an environment variable (or its default) with `FromStr`.
fn parse_env<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_env_or_default(key, default)
        .trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_owned(), e.to_string()))
}

fn validate_jwt_secret(secret: &SecretString, var_name: &str) -> Result<(), ConfigError> {
    let len = secret.expose_secret().len();
    if len < MIN_JWT_SECRET_LENGTH {
        return Err(ConfigError::InsecureSecret(
            var_name.to_owned(),
            format!("must be at least {MIN_JWT_SECRET_LENGTH} characters (got {len})"),
        ));
    }
    Ok(())
}

/// Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    let mut freq: HashMap<char, u32> = HashMap::new();
    let mut total = 0_u32;
    for c in s.chars() {
        *freq.entry(c).or_default() += 1;
        total += 1;
    }
    if total == 0 {
        return 0.0;
    }

    let total = f64::from(total);
    freq.into_values()
        .map(|count| {
            let p = f64::from(count) / total;
            -p * p.log2()
        })
        .sum()
}

/// Reject placeholders and low-entropy values.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    if let Some(pattern) = PLACEHOLDER_PATTERNS.iter().find(|p| lower.contains(*p)) {
        return Err(ConfigError::InsecureSecret(
            var_name.to_owned(),
            format!("appears to be a placeholder (contains '{pattern}')"),
        ));
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_owned(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a randomly generated secret."
            ),
        ));
    }

    Ok(())
}

fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn sample_config() -> ServerConfig {
        ServerConfig {
            database_url: SecretString::from("postgres://localhost/dreampos"),
            host: "127.0.0.1".parse().unwrap(),
            port: 8080,
            frontend_url: Url::parse("http://localhost:5173/").unwrap(),
            auth: AuthConfig {
                jwt_secret: SecretString::from("jwt_secret_value_that_must_not_leak"),
                session_ttl: Duration::from_secs(86_400),
                cookie_secure: false,
            },
            stripe: StripeConfig {
                api_base: "https://api.stripe.com".to_owned(),
                secret_key: SecretString::from("sk_test_must_not_leak"),
                webhook_secret: SecretString::from("whsec_must_not_leak"),
                timeout: Duration::from_secs(15),
            },
            sms: Some(TwilioConfig {
                account_sid: "AC123".to_owned(),
                auth_token: SecretString::from("twilio_token_must_not_leak"),
                from_number: "+15550001111".to_owned(),
            }),
            sentry_dsn: None,
            sentry_environment: None,
        }
    }

    #[test]
    fn test_shannon_entropy_bounds() {
        assert!(shannon_entropy("").abs() < f64::EPSILON);
        assert!(shannon_entropy("zzzzzz").abs() < f64::EPSILON);
        assert!((shannon_entropy("01") - 1.0).abs() < 0.01);
        assert!(shannon_entropy("Qw7!rT2#pL9$vB4%") > MIN_ENTROPY_BITS_PER_CHAR);
    }

    #[test]
    fn test_placeholder_secret_rejected() {
        let err = validate_secret_strength("your-jwt-secret-goes-here", "K").unwrap_err();
        assert!(matches!(err, ConfigError::InsecureSecret(_, _)));
        assert!(validate_secret_strength("CHANGEME-9f8e7d6c5b4a", "K").is_err());
    }

    #[test]
    fn test_low_entropy_secret_rejected() {
        let err = validate_secret_strength(&"ab".repeat(20), "K").unwrap_err();
        assert!(matches!(err, ConfigError::InsecureSecret(_, _)));
    }

    #[test]
    fn test_random_secret_accepted() {
        assert!(validate_secret_strength("Qw7!rT2#pL9$vB4%zX1^mN6&kJ3*hG8(", "K").is_ok());
    }

    #[test]
    fn test_jwt_secret_length() {
        assert!(validate_jwt_secret(&SecretString::from("short"), "K").is_err());
        assert!(validate_jwt_secret(&SecretString::from("k".repeat(32)), "K").is_ok());
    }

    #[test]
    fn test_socket_addr() {
        let addr = sample_config().socket_addr();
        assert_eq!(addr.to_string(), "127.0.0.1:8080");
    }

    #[test]
    fn test_frontend_path_joins_without_double_slash() {
        let config = sample_config();
        assert_eq!(
            config.frontend_path("/payment/success"),
            "http://localhost:5173/payment/success"
        );
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let debug_output = format!("{:?}", sample_config());
        assert!(debug_output.contains("[REDACTED]"));
        assert!(debug_output.contains("AC123"));
        assert!(!debug_output.contains("jwt_secret_value_that_must_not_leak"));
        assert!(!debug_output.contains("sk_test_must_not_leak"));
        assert!(!debug_output.contains("whsec_must_not_leak"));
        assert!(!debug_output.contains("twilio_token_must_not_leak"));
    }
}
