//! PostgreSQL implementation of SessionProvider and Session.

const DEFAULT_MAX_CONNECTIONS: u32 = 16;

use async_trait::async_trait;
use modelkit::{
    ConnectionConfig, ModelError, Row, Session, SessionProvider, Statement, UpdateResult, Value,
};
use sqlx::pool::PoolConnection;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgConnection, Postgres, Transaction};
use std::ops::Deref;
use tracing::{debug, info};

use crate::bind::{bind_params, decode_row, first_column};

/// Wrapper around sqlx::PgPool that implements SessionProvider.
#[derive(Clone, Debug)]
pub struct PgPool(sqlx::PgPool);

impl PgPool {
    /// Create a new PgPool from an sqlx PgPool.
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self(pool)
    }

    /// Connect to a PostgreSQL database.
    pub async fn connect(config: impl Into<ConnectionConfig>) -> Result<Self, ModelError> {
        let ConnectionConfig::Url(url) = config.into();
        let pool = PgPoolOptions::new()
            .max_connections(DEFAULT_MAX_CONNECTIONS)
            .connect(&url)
            .await
            .map_err(|e| ModelError::session(e.to_string()))?;
        info!(max_connections = DEFAULT_MAX_CONNECTIONS, "connected to PostgreSQL");
        Ok(Self(pool))
    }

    /// Get the inner sqlx::PgPool.
    pub fn inner(&self) -> &sqlx::PgPool {
        &self.0
    }
}

impl Deref for PgPool {
    type Target = sqlx::PgPool;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[async_trait]
impl SessionProvider for PgPool {
    type Session = PgSession;

    async fn open(&self) -> Result<PgSession, ModelError> {
        let conn = self
            .0
            .acquire()
            .await
            .map_err(|e| ModelError::session(e.to_string()))?;
        Ok(PgSession {
            inner: Some(Inner::Connection(conn)),
        })
    }

    async fn begin_transaction(&self) -> Result<PgSession, ModelError> {
        let tx = self
            .0
            .begin()
            .await
            .map_err(|e| ModelError::session(e.to_string()))?;
        Ok(PgSession {
            inner: Some(Inner::Transaction(tx)),
        })
    }
}

enum Inner {
    Connection(PoolConnection<Postgres>),
    Transaction(Transaction<'static, Postgres>),
}

/// A pooled connection, optionally inside a transaction.
///
/// Closing returns the connection to the pool; an uncommitted transaction
/// is rolled back when it is dropped.
pub struct PgSession {
    inner: Option<Inner>,
}

impl PgSession {
    fn connection(&mut self) -> Result<&mut PgConnection, ModelError> {
        match self.inner.as_mut() {
            Some(Inner::Connection(conn)) => Ok(&mut **conn),
            Some(Inner::Transaction(tx)) => Ok(&mut **tx),
            None => Err(ModelError::session("session is closed")),
        }
    }
}

#[async_trait]
impl Session for PgSession {
    async fn execute_update(&mut self, statement: &Statement) -> Result<UpdateResult, ModelError> {
        let args = bind_params(statement.params())?;
        let conn = self.connection()?;

        // Inserts rendered with RETURNING report the generated key.
        if statement.sql().contains(" RETURNING ") {
            let row = sqlx::query_with(statement.sql(), args)
                .fetch_optional(conn)
                .await
                .map_err(|e| ModelError::session(e.to_string()))?;
            let generated_key = row.as_ref().map(first_column).transpose()?;
            return Ok(UpdateResult {
                affected_rows: u64::from(generated_key.is_some()),
                generated_key,
            });
        }

        let result = sqlx::query_with(statement.sql(), args)
            .execute(conn)
            .await
            .map_err(|e| ModelError::session(e.to_string()))?;
        Ok(UpdateResult {
            affected_rows: result.rows_affected(),
            generated_key: None,
        })
    }

    async fn execute_query(&mut self, statement: &Statement) -> Result<Vec<Row>, ModelError> {
        let args = bind_params(statement.params())?;
        let rows = sqlx::query_with(statement.sql(), args)
            .fetch_all(self.connection()?)
            .await
            .map_err(|e| ModelError::session(e.to_string()))?;

        rows.iter().map(decode_row).collect()
    }

    async fn execute_scalar(&mut self, statement: &Statement) -> Result<Value, ModelError> {
        let args = bind_params(statement.params())?;
        let row = sqlx::query_with(statement.sql(), args)
            .fetch_one(self.connection()?)
            .await
            .map_err(|e| ModelError::session(e.to_string()))?;

        first_column(&row)
    }

    async fn execute_batch(&mut self, statement: &Statement) -> Result<Vec<u64>, ModelError> {
        let conn = self.connection()?;
        let mut counts = Vec::with_capacity(statement.batch().len());
        for params in statement.batch() {
            let args = bind_params(params)?;
            let result = sqlx::query_with(statement.sql(), args)
                .execute(&mut *conn)
                .await
                .map_err(|e| ModelError::session(e.to_string()))?;
            counts.push(result.rows_affected());
        }
        debug!(rows = counts.len(), "batch executed");
        Ok(counts)
    }

    async fn commit(&mut self) -> Result<(), ModelError> {
        match self.inner.take() {
            Some(Inner::Transaction(tx)) => tx
                .commit()
                .await
                .map_err(|e| ModelError::session(e.to_string())),
            other => {
                self.inner = other;
                Ok(())
            }
        }
    }

    async fn rollback(&mut self) -> Result<(), ModelError> {
        match self.inner.take() {
            Some(Inner::Transaction(tx)) => tx
                .rollback()
                .await
                .map_err(|e| ModelError::session(e.to_string())),
            other => {
                self.inner = other;
                Ok(())
            }
        }
    }

    async fn close(&mut self) -> Result<(), ModelError> {
        self.inner = None;
        Ok(())
    }
}
