//! Employee provisioning.
//!
//! # Environment Variables
//!
//! - `DREAMPOS_DATABASE_URL` - `PostgreSQL` connection string
//! - `DREAMPOS_NEW_PASSWORD` - Password for the new employee; kept out of
//!   argv so it does not land in shell history

use dreampos_core::{BusinessId, EmployeeId, Role};
use dreampos_server::db::{RepositoryError, UserRepository};
use dreampos_server::models::NewEmployee;
use dreampos_server::services::auth::hash_password;
use thiserror::Error;

use super::{CommandError, connect};

const PASSWORD_VAR: &str = "DREAMPOS_NEW_PASSWORD";
const MIN_PASSWORD_LENGTH: usize = 8;

/// Errors that can occur while creating an employee.
#[derive(Debug, Error)]
pub enum EmployeeError {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("Invalid role: {0}. Valid roles: cashier, receptionist, manager, clerk, supplier")]
    InvalidRole(String),

    #[error("Invalid username: {0}")]
    InvalidUsername(String),

    #[error("Password in DREAMPOS_NEW_PASSWORD must be at least 8 characters")]
    WeakPassword,

    #[error("Password hashing failed")]
    PasswordHash,

    #[error("Employee already exists with username: {0}")]
    UserExists(String),

    /// Unknown business or a role missing from the `role` table.
    #[error("{0}")]
    Rejected(String),

    #[error("Database error: {0}")]
    Repository(RepositoryError),
}

/// Arguments for [`create`].
#[derive(Debug)]
pub struct CreateArgs {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub business_id: i64,
    pub roles: Vec<String>,
}

/// Parse role names, rejecting unknown ones.
fn parse_roles(raw: &[String]) -> Result<Vec<Role>, EmployeeError> {
    raw.iter()
        .map(|r| {
            r.parse::<Role>()
                .map_err(|_| EmployeeError::InvalidRole(r.clone()))
        })
        .collect()
}

/// Create an employee login and return its id.
pub async fn create(args: &CreateArgs) -> Result<EmployeeId, EmployeeError> {
    let username = args.username.trim();
    if username.is_empty() || username.chars().any(char::is_whitespace) {
        return Err(EmployeeError::InvalidUsername(args.username.clone()));
    }
    let roles = parse_roles(&args.roles)?;

    let password = std::env::var(PASSWORD_VAR).unwrap_or_default();
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(EmployeeError::WeakPassword);
    }
    let password_hash = hash_password(&password).map_err(|_| EmployeeError::PasswordHash)?;

    let pool = connect().await?;

    tracing::info!("Creating employee: {}", username);

    let id = UserRepository::new(&pool)
        .create_employee(&NewEmployee {
            username: username.to_owned(),
            password_hash,
            first_name: args.first_name.trim().to_owned(),
            last_name: args.last_name.trim().to_owned(),
            business_id: BusinessId::new(args.business_id),
            roles: roles.iter().map(|r| r.as_str().to_owned()).collect(),
        })
        .await
        .map_err(|e| match e {
            RepositoryError::Conflict(_) => EmployeeError::UserExists(username.to_owned()),
            RepositoryError::Invalid(msg) => EmployeeError::Rejected(msg),
            other => EmployeeError::Repository(other),
        })?;

    tracing::info!(
        "Employee created successfully! ID: {}, Username: {}, Roles: {:?}",
        id,
        username,
        roles
    );

    Ok(id)
}
