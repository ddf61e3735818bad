use crate::config::DatabaseConfig;
use crate::db::records::{row_to_record, ResultSet};
use crate::db::{guard, QueryError, QueryExecutor};
use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlPool, MySqlPoolOptions};
use sqlx::{Connection, Executor};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

enum Connector {
    /// A fresh connection for every statement, closed afterwards.
    PerRequest(MySqlConnectOptions),
    Pooled(MySqlPool),
}

pub struct MySqlExecutor {
    connector: Connector,
    connect_timeout: Duration,
    query_timeout: Duration,
    read_only: bool,
}

impl MySqlExecutor {
    pub fn new(config: &DatabaseConfig) -> Self {
        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .password(&config.password)
            .database(&config.name);

        let connector = if config.pool_size == 0 {
            info!(
                "Using a dedicated MySQL connection per query ({}:{}/{})",
                config.host, config.port, config.name
            );
            Connector::PerRequest(options)
        } else {
            info!(
                "Using a MySQL connection pool of {} ({}:{}/{})",
                config.pool_size, config.host, config.port, config.name
            );
            // Lazy so startup does not depend on the database being up
            let pool = MySqlPoolOptions::new()
                .max_connections(config.pool_size)
                .acquire_timeout(config.connect_timeout())
                .connect_lazy_with(options);
            Connector::Pooled(pool)
        };

        Self {
            connector,
            connect_timeout: config.connect_timeout(),
            query_timeout: config.query_timeout(),
            read_only: config.read_only,
        }
    }

    async fn fetch(&self, conn: &mut MySqlConnection, sql: &str) -> Result<ResultSet, QueryError> {
        // raw_sql keeps the statement on the text protocol, untouched
        let rows = timeout(self.query_timeout, Executor::fetch_all(&mut *conn, sqlx::raw_sql(sql)))
            .await
            .map_err(|_| QueryError::Timeout(self.query_timeout))??;

        debug!("Fetched {} rows", rows.len());

        rows.iter()
            .map(|row| row_to_record(row).map_err(QueryError::from))
            .collect()
    }
}

#[async_trait]
impl QueryExecutor for MySqlExecutor {
    async fn execute(&self, sql: &str) -> Result<ResultSet, QueryError> {
        // The driver accepts batches, so stacked statements stop here
        guard::ensure_single_statement(sql)?;
        if self.read_only {
            guard::ensure_read_only(sql)?;
        }

        match &self.connector {
            Connector::PerRequest(options) => {
                let mut conn = timeout(self.connect_timeout, MySqlConnection::connect_with(options))
                    .await
                    .map_err(|_| QueryError::Timeout(self.connect_timeout))??;

                let result = self.fetch(&mut conn, sql).await;

                if let Err(e) = conn.close().await {
                    warn!("Failed to close MySQL connection cleanly: {}", e);
                }
                result
            }
            Connector::Pooled(pool) => {
                // Returned to the pool when `conn` drops, whatever the outcome
                let mut conn = pool.acquire().await?;
                self.fetch(&mut conn, sql).await
            }
        }
    }
}
