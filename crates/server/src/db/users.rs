//! Employee credential repository.
//!
//! Employees are provisioned out of band (see `dreampos-cli employee create`);
//! the server only reads them.

use sqlx::PgPool;
use tracing::instrument;

use dreampos_core::{BusinessId, EmployeeId, LocationId};

use super::RepositoryError;
use crate::models::{BusinessInfo, LocationInfo, NewEmployee, UserDetails};
use crate::services::auth::CredentialStore;

/// Repository for employee database operations.
#[derive(Clone, Copy)]
pub struct UserRepository<'a> {
    pool: &'a PgPool,
}

#[derive(sqlx::FromRow)]
struct UserDetailsRow {
    id: EmployeeId,
    password_hash: String,
    roles: Vec<String>,
}

#[derive(sqlx::FromRow)]
struct BusinessLocationRow {
    business_id: BusinessId,
    location_id: Option<LocationId>,
    location_name: Option<String>,
}

impl<'a> UserRepository<'a> {
    /// Create a new user repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get the credential record and role labels for a username.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self))]
    pub async fn get_user_details(
        &self,
        username: &str,
    ) -> Result<Option<UserDetails>, RepositoryError> {
        // Using runtime query to avoid SQLx offline mode cache requirements
        let row = sqlx::query_as::<_, UserDetailsRow>(
            r"
            SELECT
                e.id,
                e.password_hash,
                COALESCE(
                    array_agg(r.name ORDER BY r.name) FILTER (WHERE r.name IS NOT NULL),
                    '{}'
                ) AS roles
            FROM employee e
            LEFT JOIN employee_role er ON er.employee_id = e.id
            LEFT JOIN role r ON r.id = er.role_id
            WHERE e.username = $1
            GROUP BY e.id
            ",
        )
        .bind(username)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(|r| UserDetails {
            id: r.id,
            password_hash: r.password_hash,
            roles: r.roles,
        }))
    }

    /// Currency of the employee's business, taken from its first location's country.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self))]
    pub async fn get_user_currency(&self, username: &str) -> Result<Option<String>, RepositoryError> {
        let currency: Option<String> = sqlx::query_scalar(
            r"
            SELECT c.currency
            FROM employee e
            JOIN location l ON l.business_id = e.business_id
            JOIN country c ON c.code = l.country_code
            WHERE e.username = $1
            ORDER BY l.id
            LIMIT 1
            ",
        )
        .bind(username)
        .fetch_optional(self.pool)
        .await?;

        Ok(currency.map(|c| c.trim().to_owned()))
    }

    /// Business id and its locations, ordered by name.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the username does not exist.
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self))]
    pub async fn get_business_info(&self, username: &str) -> Result<BusinessInfo, RepositoryError> {
        let rows = sqlx::query_as::<_, BusinessLocationRow>(
            r"
            SELECT e.business_id, l.id AS location_id, l.name AS location_name
            FROM employee e
            LEFT JOIN location l ON l.business_id = e.business_id
            WHERE e.username = $1
            ORDER BY l.name, l.id
            ",
        )
        .bind(username)
        .fetch_all(self.pool)
        .await?;

        let business_id = rows
            .first()
            .map(|r| r.business_id)
            .ok_or(RepositoryError::NotFound)?;

        let locations = rows
            .into_iter()
            .filter_map(|r| match (r.location_id, r.location_name) {
                (Some(id), Some(name)) => Some(LocationInfo { id, name }),
                _ => None,
            })
            .collect();

        Ok(BusinessInfo {
            id: business_id,
            locations,
        })
    }

    /// Look up an employee id by username.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self))]
    pub async fn get_employee_id(&self, username: &str) -> Result<Option<EmployeeId>, RepositoryError> {
        let id = sqlx::query_scalar::<_, EmployeeId>("SELECT id FROM employee WHERE username = $1")
            .bind(username)
            .fetch_optional(self.pool)
            .await?;
        Ok(id)
    }

    /// Create an employee and attach the given roles.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the username is taken.
    /// Returns `RepositoryError::Invalid` if the business or a role is unknown.
    /// Returns `RepositoryError::Database` for other database errors.
    #[instrument(skip(self, employee), fields(username = %employee.username))]
    pub async fn create_employee(&self, employee: &NewEmployee) -> Result<EmployeeId, RepositoryError> {
        let mut roles: Vec<String> = employee
            .roles
            .iter()
            .map(|r| r.trim().to_ascii_uppercase())
            .collect();
        roles.sort();
        roles.dedup();

        let mut tx = self.pool.begin().await?;

        let id = sqlx::query_scalar::<_, EmployeeId>(
            r"
            INSERT INTO employee (business_id, username, password_hash, first_name, last_name)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            ",
        )
        .bind(employee.business_id)
        .bind(&employee.username)
        .bind(&employee.password_hash)
        .bind(&employee.first_name)
        .bind(&employee.last_name)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| RepositoryError::from_constraint(e, "create employee"))?;

        let attached = sqlx::query(
            r"
            INSERT INTO employee_role (employee_id, role_id)
            SELECT $1, id FROM role WHERE name = ANY($2)
            ",
        )
        .bind(id)
        .bind(&roles)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if usize::try_from(attached).ok() != Some(roles.len()) {
            return Err(RepositoryError::Invalid(format!(
                "unknown role in {roles:?}"
            )));
        }

        tx.commit().await?;
        Ok(id)
    }
}

impl CredentialStore for UserRepository<'_> {
    async fn user_details(&self, username: &str) -> Result<Option<UserDetails>, RepositoryError> {
        self.get_user_details(username).await
    }

    async fn user_currency(&self, username: &str) -> Result<Option<String>, RepositoryError> {
        self.get_user_currency(username).await
    }

    async fn business_info(&self, username: &str) -> Result<BusinessInfo, RepositoryError> {
        self.get_business_info(username).await
    }
}
