use std::str::FromStr;

use sqlx::PgPool;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};

use crate::config::AppConfig;

/// Map the transport-security toggles onto a Postgres SSL mode.
///
/// Certificate validation only applies when TLS is on.
pub fn ssl_mode(db_ssl: bool, reject_unauthorized: bool) -> PgSslMode {
    match (db_ssl, reject_unauthorized) {
        (false, _) => PgSslMode::Disable,
        (true, false) => PgSslMode::Require,
        (true, true) => PgSslMode::VerifyFull,
    }
}

/// Create a PostgreSQL connection pool.
///
/// `max_connections` and the SSL mode come from [`AppConfig`].
pub async fn create_pool(config: &AppConfig) -> anyhow::Result<PgPool> {
    let options = PgConnectOptions::from_str(&config.database_url)?
        .ssl_mode(ssl_mode(config.db_ssl, config.db_ssl_reject_unauthorized));

    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect_with(options)
        .await?;

    tracing::info!(
        max_connections = config.db_max_connections,
        ssl = config.db_ssl,
        "Connected to PostgreSQL"
    );
    Ok(pool)
}

/// Lightweight round-trip query used as a connectivity check.
pub async fn ping(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ssl_mode_mapping() {
        assert!(matches!(ssl_mode(false, false), PgSslMode::Disable));
        assert!(matches!(ssl_mode(false, true), PgSslMode::Disable));
        assert!(matches!(ssl_mode(true, false), PgSslMode::Require));
        assert!(matches!(ssl_mode(true, true), PgSslMode::VerifyFull));
    }
}
