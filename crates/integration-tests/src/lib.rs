//! Integration tests for DreamPOS.
//!
//! # Running Tests
//!
//! The tests need a disposable `PostgreSQL` database. They are `#[ignore]`d
//! so `cargo test` stays green without one:
//!
//! ```bash
//! DATABASE_URL=postgres://localhost/dreampos_test cargo test -p dreampos-integration-tests -- --ignored
//! ```
//!
//! Each [`TestContext`] migrates the database, seeds a business with its own
//! unique names, and serves the full router on an ephemeral port.

use std::net::SocketAddr;
use std::time::Duration;

use dreampos_core::{BusinessId, EmployeeId};
use dreampos_server::config::{AuthConfig, ServerConfig, StripeConfig};
use dreampos_server::db::{self, UserRepository};
use dreampos_server::models::NewEmployee;
use dreampos_server::services::auth::hash_password;
use dreampos_server::state::AppState;
use reqwest::Client;
use secrecy::SecretString;
use sqlx::PgPool;
use url::Url;

/// Password every seeded employee gets.
pub const PASSWORD: &str = "correct horse battery staple";

/// A running server plus direct database access.
pub struct TestContext {
    pub client: Client,
    pub base_url: String,
    pub pool: PgPool,
    pub business_id: BusinessId,
    /// Unique suffix for names seeded by this context.
    pub tag: String,
}

impl TestContext {
    /// Connect, migrate, seed a business and start a server.
    ///
    /// # Panics
    ///
    /// Panics if `DATABASE_URL` is unset or any setup step fails.
    pub async fn new() -> Self {
        let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let database_url = SecretString::from(database_url);

        let pool = db::create_pool(&database_url).await.expect("connect");
        db::run_migrations(&pool).await.expect("migrate");

        let tag = uuid::Uuid::new_v4().simple().to_string();
        let business_id = seed_business(&pool, &tag).await;

        let config = test_config(database_url);
        let state = AppState::new(config, pool.clone()).expect("state");
        let app = dreampos_server::app(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .expect("serve");
        });

        let client = Client::builder()
            .cookie_store(true)
            .build()
            .expect("client");

        Self {
            client,
            base_url: format!("http://{addr}"),
            pool,
            business_id,
            tag,
        }
    }

    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Create an employee with [`PASSWORD`] and the given roles.
    ///
    /// # Panics
    ///
    /// Panics if the insert fails.
    pub async fn employee(&self, name: &str, roles: &[&str]) -> (String, EmployeeId) {
        let username = format!("{name}_{}", self.tag);
        let id = UserRepository::new(&self.pool)
            .create_employee(&NewEmployee {
                username: username.clone(),
                password_hash: hash_password(PASSWORD).expect("hash"),
                first_name: name.to_owned(),
                last_name: "Test".to_owned(),
                business_id: self.business_id,
                roles: roles.iter().map(|r| (*r).to_owned()).collect(),
            })
            .await
            .expect("create employee");
        (username, id)
    }

    /// Insert a catalog item and return its id.
    ///
    /// # Panics
    ///
    /// Panics if the insert fails.
    pub async fn item(&self, name: &str, price: &str) -> i64 {
        sqlx::query_scalar(
            "INSERT INTO item (name, price_per_unit) VALUES ($1, $2::NUMERIC) RETURNING id",
        )
        .bind(format!("{name} {}", self.tag))
        .bind(price)
        .fetch_one(&self.pool)
        .await
        .expect("seed item")
    }

    /// Insert a service offered at this business's location by `staff`.
    ///
    /// # Panics
    ///
    /// Panics if an insert fails.
    pub async fn service(&self, name: &str, staff: &[EmployeeId]) -> i64 {
        let service_id: i64 = sqlx::query_scalar(
            "INSERT INTO service (name, duration_mins) VALUES ($1, 30) RETURNING id",
        )
        .bind(format!("{name} {}", self.tag))
        .fetch_one(&self.pool)
        .await
        .expect("seed service");
        let location_id: i64 =
            sqlx::query_scalar("SELECT id FROM location WHERE business_id = $1")
                .bind(self.business_id)
                .fetch_one(&self.pool)
                .await
                .expect("location");
        let service_location_id: i64 = sqlx::query_scalar(
            "INSERT INTO service_location (service_id, location_id, price) VALUES ($1, $2, 25) RETURNING id",
        )
        .bind(service_id)
        .bind(location_id)
        .fetch_one(&self.pool)
        .await
        .expect("seed service location");
        for employee in staff {
            sqlx::query(
                "INSERT INTO service_employee (service_location_id, employee_id) VALUES ($1, $2)",
            )
            .bind(service_location_id)
            .bind(*employee)
            .execute(&self.pool)
            .await
            .expect("seed service employee");
        }
        service_id
    }

    /// Open an order through the API and return its id.
    ///
    /// # Panics
    ///
    /// Panics unless the server answers 201.
    pub async fn create_order(&self, csrf: &str, items: serde_json::Value) -> i64 {
        let response = self
            .client
            .post(self.url("/api/order"))
            .header("X-XSRF-TOKEN", csrf)
            .json(&serde_json::json!({ "items": items }))
            .send()
            .await
            .expect("create order request");
        assert_eq!(response.status(), 201);
        response.json::<serde_json::Value>().await.expect("order body")["id"]
            .as_i64()
            .expect("order id")
    }

    /// Book a reservation for `service_id` through the API and return its id.
    ///
    /// # Panics
    ///
    /// Panics unless the server answers 201.
    pub async fn create_reservation(&self, csrf: &str, service_id: i64) -> i64 {
        let response = self
            .client
            .post(self.url("/api/reservation"))
            .header("X-XSRF-TOKEN", csrf)
            .json(&serde_json::json!({
                "customerName": "Sam Guest",
                "customerPhone": "+15557654321",
                "serviceId": service_id.to_string(),
                "staffId": "anyone",
                "datetime": "2030-01-15T10:00:00Z"
            }))
            .send()
            .await
            .expect("create reservation request");
        assert_eq!(response.status(), 201);
        response.json::<serde_json::Value>().await.expect("reservation body")["id"]
            .as_i64()
            .expect("reservation id")
    }

    /// Current storage status of an order.
    ///
    /// # Panics
    ///
    /// Panics if the order does not exist.
    pub async fn order_status(&self, id: i64) -> String {
        sqlx::query_scalar("SELECT status::TEXT FROM order_data WHERE id = $1")
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .expect("order status")
    }

    /// Current storage status of an appointment.
    ///
    /// # Panics
    ///
    /// Panics if the appointment does not exist.
    pub async fn reservation_status(&self, id: i64) -> String {
        sqlx::query_scalar("SELECT status::TEXT FROM appointment WHERE id = $1")
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .expect("reservation status")
    }

    /// Log in and keep the cookies in the client's jar.
    ///
    /// Returns the CSRF value to echo in `X-XSRF-TOKEN`.
    ///
    /// # Panics
    ///
    /// Panics unless login succeeds and sets the CSRF cookie.
    pub async fn login(&self, username: &str) -> String {
        let response = self
            .client
            .post(self.url("/auth/login"))
            .json(&serde_json::json!({ "username": username, "password": PASSWORD }))
            .send()
            .await
            .expect("login request");
        assert_eq!(response.status(), 200);
        response
            .cookies()
            .find(|c| c.name() == "X-XSRF-TOKEN")
            .map(|c| c.value().to_owned())
            .expect("csrf cookie")
    }
}

fn test_config(database_url: SecretString) -> ServerConfig {
    ServerConfig {
        database_url,
        host: [127, 0, 0, 1].into(),
        port: 0,
        frontend_url: Url::parse("http://localhost:5173/").expect("url"),
        auth: AuthConfig {
            jwt_secret: SecretString::from("q8Zr2LmX4vN7pK1sT9wB3yH6jD0fG5cE"),
            session_ttl: Duration::from_secs(3600),
            cookie_secure: false,
        },
        stripe: StripeConfig {
            // Nothing listens here; scenarios never reach the processor.
            api_base: "http://127.0.0.1:9".to_owned(),
            secret_key: SecretString::from("sk_test_integration"),
            webhook_secret: SecretString::from("whsec_integration"),
            timeout: Duration::from_secs(2),
        },
        sms: None,
        sentry_dsn: None,
        sentry_environment: None,
    }
}

async fn seed_business(pool: &PgPool, tag: &str) -> BusinessId {
    sqlx::query(
        "INSERT INTO country (code, currency) VALUES ('US', 'USD') ON CONFLICT (code) DO NOTHING",
    )
    .execute(pool)
    .await
    .expect("seed country");

    let business_id: i64 =
        sqlx::query_scalar("INSERT INTO business (name) VALUES ($1) RETURNING id")
            .bind(format!("Business {tag}"))
            .fetch_one(pool)
            .await
            .expect("seed business");

    sqlx::query("INSERT INTO location (business_id, country_code, name) VALUES ($1, 'US', 'Main')")
        .bind(business_id)
        .execute(pool)
        .await
        .expect("seed location");

    BusinessId::new(business_id)
}
