#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use modelkit::{
    CacheStore, MemoryCache, ModelError, Record, Row, Session, SessionProvider, Statement, Table,
    UpdateResult, Value,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Table)]
#[table(name = "users", pk = "id")]
pub struct User {
    pub id: i64,
    pub name: String,
    pub age: i64,
}

pub fn user_row(id: i64, name: &str, age: i64) -> Row {
    [
        ("id", Value::from(id)),
        ("name", Value::from(name)),
        ("age", Value::from(age)),
    ]
    .into_iter()
    .collect()
}

pub fn users(db: &MockProvider) -> Record<User, MockProvider> {
    Record::new(Arc::new(db.clone()))
}

/// Everything a session was asked to do, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Open,
    Begin,
    Prepare(String),
    Update { sql: String, params: Vec<Value> },
    Query { sql: String, params: Vec<Value> },
    Scalar { sql: String, params: Vec<Value> },
    Batch { sql: String, rows: Vec<Vec<Value>> },
    Commit,
    Rollback,
    Close,
}

#[derive(Debug, Default)]
struct MockState {
    events: Vec<Event>,
    updates: VecDeque<UpdateResult>,
    rows: VecDeque<Vec<Row>>,
    scalars: VecDeque<Value>,
    fail_on: Option<String>,
    fail_next_prepare: bool,
}

impl MockState {
    fn check(&self, sql: &str) -> Result<(), ModelError> {
        match &self.fail_on {
            Some(fragment) if sql.contains(fragment.as_str()) => {
                Err(ModelError::session(format!("injected failure for '{}'", sql)))
            }
            _ => Ok(()),
        }
    }
}

/// Scripted in-memory session provider.
#[derive(Debug, Clone, Default)]
pub struct MockProvider {
    state: Arc<Mutex<MockState>>,
}

impl MockProvider {
    pub fn events(&self) -> Vec<Event> {
        self.state.lock().unwrap().events.clone()
    }

    pub fn push_update(&self, result: UpdateResult) {
        self.state.lock().unwrap().updates.push_back(result);
    }

    pub fn push_rows(&self, rows: Vec<Row>) {
        self.state.lock().unwrap().rows.push_back(rows);
    }

    pub fn push_scalar(&self, value: impl Into<Value>) {
        self.state.lock().unwrap().scalars.push_back(value.into());
    }

    /// Fail every statement whose SQL contains `fragment`.
    pub fn fail_when(&self, fragment: &str) {
        self.state.lock().unwrap().fail_on = Some(fragment.to_string());
    }

    /// Fail the next `prepare` call only.
    pub fn fail_next_prepare(&self) {
        self.state.lock().unwrap().fail_next_prepare = true;
    }

    fn record(&self, event: Event) {
        self.state.lock().unwrap().events.push(event);
    }
}

#[async_trait]
impl SessionProvider for MockProvider {
    type Session = MockSession;

    async fn open(&self) -> Result<MockSession, ModelError> {
        self.record(Event::Open);
        Ok(MockSession {
            state: self.state.clone(),
        })
    }

    async fn begin_transaction(&self) -> Result<MockSession, ModelError> {
        self.record(Event::Begin);
        Ok(MockSession {
            state: self.state.clone(),
        })
    }
}

pub struct MockSession {
    state: Arc<Mutex<MockState>>,
}

#[async_trait]
impl Session for MockSession {
    async fn prepare(&mut self, sql: &str) -> Result<Statement, ModelError> {
        let mut state = self.state.lock().unwrap();
        if std::mem::take(&mut state.fail_next_prepare) {
            return Err(ModelError::session(format!("cannot prepare '{}'", sql)));
        }
        state.events.push(Event::Prepare(sql.to_string()));
        Ok(Statement::new(sql))
    }

    async fn execute_update(&mut self, statement: &Statement) -> Result<UpdateResult, ModelError> {
        let mut state = self.state.lock().unwrap();
        state.check(statement.sql())?;
        state.events.push(Event::Update {
            sql: statement.sql().to_string(),
            params: statement.params().to_vec(),
        });
        Ok(state.updates.pop_front().unwrap_or(UpdateResult {
            affected_rows: 1,
            generated_key: None,
        }))
    }

    async fn execute_query(&mut self, statement: &Statement) -> Result<Vec<Row>, ModelError> {
        let mut state = self.state.lock().unwrap();
        state.check(statement.sql())?;
        state.events.push(Event::Query {
            sql: statement.sql().to_string(),
            params: statement.params().to_vec(),
        });
        Ok(state.rows.pop_front().unwrap_or_default())
    }

    async fn execute_scalar(&mut self, statement: &Statement) -> Result<Value, ModelError> {
        let mut state = self.state.lock().unwrap();
        state.check(statement.sql())?;
        state.events.push(Event::Scalar {
            sql: statement.sql().to_string(),
            params: statement.params().to_vec(),
        });
        Ok(state.scalars.pop_front().unwrap_or(Value::Int(0)))
    }

    async fn execute_batch(&mut self, statement: &Statement) -> Result<Vec<u64>, ModelError> {
        let mut state = self.state.lock().unwrap();
        state.check(statement.sql())?;
        state.events.push(Event::Batch {
            sql: statement.sql().to_string(),
            rows: statement.batch().to_vec(),
        });
        Ok(vec![1; statement.batch().len()])
    }

    async fn commit(&mut self) -> Result<(), ModelError> {
        self.state.lock().unwrap().events.push(Event::Commit);
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), ModelError> {
        self.state.lock().unwrap().events.push(Event::Rollback);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ModelError> {
        self.state.lock().unwrap().events.push(Event::Close);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CacheOp {
    Delete(String),
    HashDelete(String, String),
    HashGet(String, String),
    HashSet(String, String),
}

/// Memory cache that remembers which operations it served.
#[derive(Debug, Default)]
pub struct RecordingCache {
    pub inner: MemoryCache,
    ops: Mutex<Vec<CacheOp>>,
}

impl RecordingCache {
    pub fn ops(&self) -> Vec<CacheOp> {
        self.ops.lock().unwrap().clone()
    }

    /// Operations other than reads.
    pub fn writes(&self) -> Vec<CacheOp> {
        self.ops()
            .into_iter()
            .filter(|op| !matches!(op, CacheOp::HashGet(..)))
            .collect()
    }

    fn log(&self, op: CacheOp) {
        self.ops.lock().unwrap().push(op);
    }
}

#[async_trait]
impl CacheStore for RecordingCache {
    async fn delete(&self, key: &str) -> Result<(), ModelError> {
        self.log(CacheOp::Delete(key.to_string()));
        self.inner.delete(key).await
    }

    async fn hash_delete(&self, key: &str, field: &str) -> Result<(), ModelError> {
        self.log(CacheOp::HashDelete(key.to_string(), field.to_string()));
        self.inner.hash_delete(key, field).await
    }

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>, ModelError> {
        self.log(CacheOp::HashGet(key.to_string(), field.to_string()));
        self.inner.hash_get(key, field).await
    }

    async fn hash_set(
        &self,
        key: &str,
        field: &str,
        value: String,
        ttl: Duration,
    ) -> Result<(), ModelError> {
        self.log(CacheOp::HashSet(key.to_string(), field.to_string()));
        self.inner.hash_set(key, field, value, ttl).await
    }
}

/// Cache whose backend is always down.
#[derive(Debug, Default)]
pub struct BrokenCache;

#[async_trait]
impl CacheStore for BrokenCache {
    async fn delete(&self, _key: &str) -> Result<(), ModelError> {
        Err(ModelError::CacheUnavailable("connection refused".into()))
    }

    async fn hash_delete(&self, _key: &str, _field: &str) -> Result<(), ModelError> {
        Err(ModelError::CacheUnavailable("connection refused".into()))
    }

    async fn hash_get(&self, _key: &str, _field: &str) -> Result<Option<String>, ModelError> {
        Err(ModelError::CacheUnavailable("connection refused".into()))
    }

    async fn hash_set(
        &self,
        _key: &str,
        _field: &str,
        _value: String,
        _ttl: Duration,
    ) -> Result<(), ModelError> {
        Err(ModelError::CacheUnavailable("connection refused".into()))
    }
}
