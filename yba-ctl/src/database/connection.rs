// Direct database connection for the full-bundle restore
//
// The restore path drops and recreates the platform database before the restore script
// loads the dump. `DatabaseAdmin` is the seam: production uses `PostgresAdmin` (sqlx),
// tests use stubs that record calls without a real database.

use async_trait::async_trait;
use log::{debug, info};
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::{Connection, Executor};
use std::time::{Duration, Instant};
use tokio::time::timeout;

use crate::config::Secret;
use crate::database::provisioning::{
    postgres_create_db_stmt, postgres_drop_db_stmt, postgres_terminate_sessions_query,
    validate_db_name,
};

/// Maintenance database the admin connection lands in.
pub const MAINTENANCE_DB: &str = "postgres";

/// Error returned by database admin operations.
/// Keeps operator-facing messages separate from driver details.
#[derive(Debug, Clone)]
pub struct DbAdminError {
    /// Operator-facing message
    pub user_message: String,
    /// Driver details for logging (never contains the password)
    pub internal_details: String,
}

impl std::fmt::Display for DbAdminError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.user_message)
    }
}

impl std::error::Error for DbAdminError {}

/// Where and as whom to connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PgConnectionParams {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: Secret,
}

impl PgConnectionParams {
    pub fn connect_options(&self, database: &str) -> PgConnectOptions {
        let mut opts = PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.username)
            .database(database);
        if !self.password.is_empty() {
            opts = opts.password(self.password.expose());
        }
        opts
    }

    /// `user@host:port`, safe to log.
    pub fn describe(&self) -> String {
        format!("{}@{}:{}", self.username, self.host, self.port)
    }
}

/// Trait for destructive database administration.
#[async_trait]
pub trait DatabaseAdmin: Send + Sync {
    /// Drop `db_name` (terminating other sessions) and create it again, empty.
    async fn recreate_database(
        &self,
        params: &PgConnectionParams,
        db_name: &str,
    ) -> Result<(), DbAdminError>;
}

/// Production admin backed by a single sqlx connection.
pub struct PostgresAdmin {
    pub connect_timeout: Duration,
}

impl Default for PostgresAdmin {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(20),
        }
    }
}

impl PostgresAdmin {
    async fn connect(&self, params: &PgConnectionParams) -> Result<PgConnection, DbAdminError> {
        let opts = params.connect_options(MAINTENANCE_DB);
        match timeout(self.connect_timeout, PgConnection::connect_with(&opts)).await {
            Ok(Ok(conn)) => Ok(conn),
            Ok(Err(e)) => Err(DbAdminError {
                user_message: format!(
                    "Unable to connect to postgres at {}. Verify host, credentials, and that the database is running.",
                    params.describe()
                ),
                internal_details: format!("Connection error: {}", e),
            }),
            Err(_) => Err(DbAdminError {
                user_message: format!(
                    "Connection to postgres at {} timed out. Check network connectivity and firewall.",
                    params.describe()
                ),
                internal_details: format!(
                    "Connection attempt timed out after {}ms",
                    self.connect_timeout.as_millis()
                ),
            }),
        }
    }
}

fn statement_error(stmt: &str, e: sqlx::Error) -> DbAdminError {
    DbAdminError {
        user_message: format!("Statement failed: {}", stmt),
        internal_details: e.to_string(),
    }
}

#[async_trait]
impl DatabaseAdmin for PostgresAdmin {
    async fn recreate_database(
        &self,
        params: &PgConnectionParams,
        db_name: &str,
    ) -> Result<(), DbAdminError> {
        let started = Instant::now();
        validate_db_name(db_name).map_err(|msg| DbAdminError {
            user_message: msg,
            internal_details: format!("rejected database name {:?}", db_name),
        })?;

        let mut conn = self.connect(params).await?;
        debug!(
            "[PHASE: database] [STEP: connect] Connected to {} (db={})",
            params.describe(),
            MAINTENANCE_DB
        );

        let terminated = conn
            .execute(sqlx::query(postgres_terminate_sessions_query()).bind(db_name))
            .await
            .map_err(|e| statement_error("terminate sessions", e))?;
        debug!(
            "[PHASE: database] [STEP: drop] Terminated {} sessions on {}",
            terminated.rows_affected(),
            db_name
        );

        // DROP/CREATE DATABASE cannot run inside a transaction; use the simple protocol.
        let drop_stmt = postgres_drop_db_stmt(db_name);
        conn.execute(sqlx::raw_sql(&drop_stmt))
            .await
            .map_err(|e| statement_error(&drop_stmt, e))?;
        info!("[PHASE: database] [STEP: drop] Dropped database {}", db_name);

        let create_stmt = postgres_create_db_stmt(db_name, None);
        conn.execute(sqlx::raw_sql(&create_stmt))
            .await
            .map_err(|e| statement_error(&create_stmt, e))?;
        info!(
            "[PHASE: database] [STEP: create] Created database {} (duration_ms={})",
            db_name,
            started.elapsed().as_millis()
        );

        // Closing is best-effort; the work is already committed.
        let _ = conn.close().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(password: &str) -> PgConnectionParams {
        PgConnectionParams {
            host: "127.0.0.1".to_string(),
            port: 1,
            username: "postgres".to_string(),
            password: Secret::new(password),
        }
    }

    #[test]
    fn connect_options_carry_target() {
        let opts = params("hunter2").connect_options(MAINTENANCE_DB);
        assert_eq!(opts.get_host(), "127.0.0.1");
        assert_eq!(opts.get_port(), 1);
        assert_eq!(opts.get_username(), "postgres");
        assert_eq!(opts.get_database(), Some(MAINTENANCE_DB));
    }

    #[test]
    fn describe_never_includes_password() {
        let d = params("hunter2").describe();
        assert_eq!(d, "postgres@127.0.0.1:1");
        assert!(!format!("{:?}", params("hunter2")).contains("hunter2"));
    }

    #[tokio::test]
    async fn reserved_database_is_refused_before_connecting() {
        // Port 1 is unreachable; a refusal proves validation ran first.
        let admin = PostgresAdmin::default();
        let err = admin
            .recreate_database(&params(""), "postgres")
            .await
            .unwrap_err();
        assert!(err.user_message.contains("reserved"), "{}", err);
    }

    #[tokio::test]
    async fn unreachable_server_reports_friendly_error() {
        let admin = PostgresAdmin {
            connect_timeout: Duration::from_secs(5),
        };
        let err = admin
            .recreate_database(&params("hunter2"), "yugaware")
            .await
            .unwrap_err();
        assert!(err.user_message.contains("postgres@127.0.0.1:1"), "{}", err);
        assert!(!err.user_message.contains("hunter2"));
        assert!(!err.internal_details.contains("hunter2"));
    }

    #[test]
    fn admin_error_display_is_user_message() {
        let err = DbAdminError {
            user_message: "Connection refused by server.".to_string(),
            internal_details: "tcp connect failed: errno=111".to_string(),
        };
        assert_eq!(err.to_string(), "Connection refused by server.");
    }

    #[test]
    fn admin_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<DbAdminError>();
    }
}
