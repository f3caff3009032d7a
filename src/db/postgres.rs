//! PostgreSQL Driver Module
//!
//! Driver implementation over tokio-postgres. The definition's url is
//! parsed as a standard postgres connection string; username and password
//! from the definition override anything embedded in the url. Statements
//! run in autocommit mode; the loader never opens a transaction.

use std::time::Duration;

use async_trait::async_trait;
use tokio_postgres::NoTls;
use tracing::debug;

use crate::db::driver::{ConnectOptions, DbConnection, Driver, RowSet};
use crate::error::{CacheError, Result};

// == Postgres Driver ==
pub struct PostgresDriver;

#[async_trait]
impl Driver for PostgresDriver {
    async fn connect(&self, options: &ConnectOptions) -> Result<Box<dyn DbConnection>> {
        let mut config: tokio_postgres::Config = options
            .url
            .parse()
            .map_err(|e| CacheError::Connection(format!("invalid connection url: {}", e)))?;
        if !options.username.is_empty() {
            config.user(&options.username);
        }
        if !options.password.is_empty() {
            config.password(&options.password);
        }

        let (client, connection) = config
            .connect(NoTls)
            .await
            .map_err(|e| CacheError::Connection(e.to_string()))?;

        // The connection object drives the socket until the client is dropped
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                debug!("postgres connection terminated: {}", e);
            }
        });

        Ok(Box::new(PostgresConnection { client }))
    }
}

struct PostgresConnection {
    client: tokio_postgres::Client,
}

#[async_trait]
impl DbConnection for PostgresConnection {
    async fn query(&mut self, sql: &str, param: &str) -> Result<RowSet> {
        // Preparing first yields column labels even for empty result sets
        let statement = self
            .client
            .prepare(sql)
            .await
            .map_err(|e| CacheError::Query(e.to_string()))?;
        let columns: Vec<String> = statement
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();

        let rows = self
            .client
            .query(&statement, &[&param])
            .await
            .map_err(|e| CacheError::Query(e.to_string()))?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let mut cells = Vec::with_capacity(columns.len());
            for index in 0..columns.len() {
                // Result columns must be textual; SQL NULL maps to None
                let cell: Option<String> = row
                    .try_get(index)
                    .map_err(|e| CacheError::Query(e.to_string()))?;
                cells.push(cell);
            }
            out.push(cells);
        }

        Ok(RowSet { columns, rows: out })
    }

    async fn is_valid(&mut self, timeout: Duration) -> bool {
        if self.client.is_closed() {
            return false;
        }
        matches!(
            tokio::time::timeout(timeout, self.client.simple_query("SELECT 1")).await,
            Ok(Ok(_))
        )
    }
}
