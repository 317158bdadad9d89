//! Database session contract.
//!
//! A [`SessionProvider`] hands out sessions (plain or transactional); a
//! [`Session`] executes [`Statement`]s. Backends implement both; the record
//! layer only ever talks to these traits.

use async_trait::async_trait;

use crate::{ModelError, Row, Value};

/// Statement text plus its bound parameters and any accumulated batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Statement {
    sql: String,
    params: Vec<Value>,
    batch: Vec<Vec<Value>>,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
            batch: Vec::new(),
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Replace the bound parameters, in positional order.
    pub fn bind(&mut self, params: Vec<Value>) -> &mut Self {
        self.params = params;
        self
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }

    /// Move the currently bound parameters into the batch.
    pub fn add_to_batch(&mut self) {
        let params = std::mem::take(&mut self.params);
        self.batch.push(params);
    }

    pub fn batch(&self) -> &[Vec<Value>] {
        &self.batch
    }
}

/// Outcome of an insert, update or delete.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateResult {
    pub affected_rows: u64,
    /// Key generated by an insert, when the backend reports one.
    pub generated_key: Option<Value>,
}

/// Source of database sessions.
///
/// Implemented by database-specific pool types.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    type Session: Session;

    /// Open a session in autocommit mode.
    async fn open(&self) -> Result<Self::Session, ModelError>;

    /// Open a session with a transaction already begun.
    async fn begin_transaction(&self) -> Result<Self::Session, ModelError>;
}

/// A single connection to the database.
#[async_trait]
pub trait Session: Send {
    /// Prepare a statement for execution on this session.
    async fn prepare(&mut self, sql: &str) -> Result<Statement, ModelError> {
        Ok(Statement::new(sql))
    }

    async fn execute_update(&mut self, statement: &Statement) -> Result<UpdateResult, ModelError>;

    async fn execute_query(&mut self, statement: &Statement) -> Result<Vec<Row>, ModelError>;

    /// Execute and return the first column of the first row.
    async fn execute_scalar(&mut self, statement: &Statement) -> Result<Value, ModelError>;

    /// Execute every batched parameter set; one affected-row count each.
    async fn execute_batch(&mut self, statement: &Statement) -> Result<Vec<u64>, ModelError>;

    /// Commit the transaction. A no-op for autocommit sessions.
    async fn commit(&mut self) -> Result<(), ModelError>;

    async fn rollback(&mut self) -> Result<(), ModelError>;

    /// Release the connection. Must tolerate being called more than once.
    async fn close(&mut self) -> Result<(), ModelError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_moves_bound_params() {
        let mut statement = Statement::new("INSERT INTO t (a) VALUES (?)");
        statement.bind(vec![Value::from(1i64)]).add_to_batch();
        statement.bind(vec![Value::from(2i64)]).add_to_batch();

        assert!(statement.params().is_empty());
        assert_eq!(
            statement.batch(),
            &[vec![Value::from(1i64)], vec![Value::from(2i64)]]
        );
    }
}
