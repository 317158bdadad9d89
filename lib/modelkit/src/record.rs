//! The record façade.
//!
//! A [`Record`] accumulates attribute values and filter conditions, renders
//! them through its [`Dialect`], executes the statement on a session from its
//! [`SessionProvider`] and then resets itself. Every terminal operation
//! (`save`, `update`, `delete`, `list`, `find_*`, `count`, `page`) ends with
//! [`Record::reset`], whether it succeeded or not, so a record never carries
//! stale parameters into its next call.
//!
//! Two protocols keep a session open across several calls:
//!
//! - `tx`: the unit of work runs against the same record and its
//!   transactional session; commit happens once at the end.
//! - `add_to_batch` / `save_batch`: one prepared insert collects parameter
//!   sets until `save_batch` executes and commits them.
//!
//! A record is not meant to be shared between tasks; each logical unit of
//! work owns its own.

use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, error, warn};

use crate::param::{normalize_operator, parse_inline_operator, parse_template};
use crate::{
    Attributes, CacheStore, Conditions, DefaultDialect, Dialect, ModelConfig, ModelError,
    ModelResult, PageRow, Paginator, QueryParts, Row, Session, SessionProvider, Statement, Table,
    TableDescriptor, UpdateResult, Value,
};

/// Future returned by a transaction's unit of work.
pub type UnitOfWork<'r> = Pin<Box<dyn Future<Output = ModelResult<()>> + Send + 'r>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionScope {
    /// Opened on demand, closed by the next reset.
    Transient,
    /// Owned by `tx`; survives resets until the transaction ends.
    Transaction,
    /// Owned by batch accumulation; survives until `save_batch`.
    Batch,
}

#[derive(Debug, Clone)]
struct RawSql {
    sql: String,
    params: Vec<Value>,
}

/// Prepared insert collecting rows, with the column order it was rendered for.
#[derive(Debug)]
struct PendingBatch {
    columns: Vec<String>,
    statement: Statement,
}

pub struct Record<T, P: SessionProvider> {
    table: TableDescriptor,
    provider: Arc<P>,
    dialect: Arc<dyn Dialect>,
    cache: Option<Arc<dyn CacheStore>>,
    cached: bool,
    config: ModelConfig,

    attributes: Attributes,
    conditions: Conditions,
    raw: Option<RawSql>,
    order: Option<String>,
    page: Option<PageRow>,
    unfiltered: bool,

    session: Option<P::Session>,
    statement: Option<Statement>,
    batch: Option<PendingBatch>,
    scope: SessionScope,
    _marker: PhantomData<fn() -> T>,
}

impl<T, P> Record<T, P>
where
    T: Table + Serialize + DeserializeOwned,
    P: SessionProvider,
{
    /// Create a record for `T` using the default dialect and no cache.
    pub fn new(provider: Arc<P>) -> Self {
        let config = ModelConfig::default();
        Self {
            table: T::descriptor(),
            provider,
            dialect: Arc::new(DefaultDialect),
            cache: None,
            cached: config.cache_enabled,
            config,
            attributes: Attributes::new(),
            conditions: Conditions::new(),
            raw: None,
            order: None,
            page: None,
            unfiltered: false,
            session: None,
            statement: None,
            batch: None,
            scope: SessionScope::Transient,
            _marker: PhantomData,
        }
    }

    pub fn with_dialect(mut self, dialect: impl Dialect + 'static) -> Self {
        self.dialect = Arc::new(dialect);
        self
    }

    /// Attach a detail cache. Caching is active while the `cached` flag is on.
    pub fn with_cache(mut self, cache: Arc<dyn CacheStore>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_config(mut self, config: ModelConfig) -> Self {
        self.cached = config.cache_enabled;
        self.config = config;
        self
    }

    /// Point the record at another database. Any idle session is closed;
    /// switching inside `tx` or while a batch is pending is refused.
    pub async fn use_provider(&mut self, provider: Arc<P>) -> ModelResult<&mut Self> {
        if self.scope != SessionScope::Transient {
            return Err(ModelError::session(
                "cannot switch databases during a transaction or batch",
            ));
        }
        self.statement = None;
        self.release_session().await;
        self.provider = provider;
        Ok(self)
    }

    pub fn cached(&mut self, cached: bool) -> &mut Self {
        self.cached = cached;
        self
    }

    pub fn table(&self) -> &TableDescriptor {
        &self.table
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn conditions(&self) -> &Conditions {
        &self.conditions
    }

    pub fn raw_sql(&self) -> Option<&str> {
        self.raw.as_ref().map(|raw| raw.sql.as_str())
    }

    pub fn order_clause(&self) -> Option<&str> {
        self.order.as_deref()
    }

    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    /// True when nothing is pending and no session or statement is held.
    pub fn is_idle(&self) -> bool {
        self.attributes.is_empty()
            && self.conditions.is_empty()
            && self.raw.is_none()
            && self.order.is_none()
            && self.page.is_none()
            && self.session.is_none()
            && self.statement.is_none()
            && self.batch.is_none()
    }

    // ---------------------------------------------------------------------
    // Accumulation
    // ---------------------------------------------------------------------

    /// Set an insert/update column value.
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.attributes.insert(column, value);
        self
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.attributes.get(column)
    }

    /// Add a condition. `name` may carry an inline operator (`"age > ?"`);
    /// otherwise it is an equality. A null value adds nothing.
    pub fn filter(&mut self, name: &str, value: impl Into<Value>) -> ModelResult<&mut Self> {
        let value = value.into();
        if name.trim().is_empty() || value.is_null() {
            return Ok(self);
        }
        let (column, operator) = parse_inline_operator(name)?;
        self.conditions.push(column, operator, value);
        Ok(self)
    }

    /// Add a condition with an explicit operator.
    pub fn filter_op(
        &mut self,
        column: &str,
        operator: &str,
        value: impl Into<Value>,
    ) -> ModelResult<&mut Self> {
        let value = value.into();
        if column.trim().is_empty() || value.is_null() {
            return Ok(self);
        }
        let operator = normalize_operator(operator)?;
        self.conditions.push(column.trim(), operator, value);
        Ok(self)
    }

    /// Add every predicate of `"age > ? AND age < ?"`, pairing placeholders
    /// with `values` in order. The counts must match.
    pub fn filter_sql<I, V>(&mut self, template: &str, values: I) -> ModelResult<&mut Self>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        let keys = parse_template(self.conditions.next_sequence(), template)?;
        if keys.len() != values.len() {
            return Err(ModelError::malformed(format!(
                "'{}' has {} placeholders but {} values were supplied",
                template,
                keys.len(),
                values.len()
            )));
        }
        for (key, value) in keys.into_iter().zip(values) {
            self.conditions.insert(key, value);
        }
        Ok(self)
    }

    /// Use `sql` instead of the generated select. Condition values are still
    /// bound, in order.
    pub fn sql(&mut self, sql: impl Into<String>) -> &mut Self {
        self.sql_with(sql, Vec::<Value>::new())
    }

    /// Raw select whose own values bind ahead of any condition values.
    pub fn sql_with<I, V>(&mut self, sql: impl Into<String>, values: I) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.raw = Some(RawSql {
            sql: sql.into(),
            params: values.into_iter().map(Into::into).collect(),
        });
        self
    }

    pub fn order(&mut self, order: impl Into<String>) -> &mut Self {
        self.order = Some(order.into());
        self
    }

    /// Allow the next update or delete to run without conditions.
    pub fn allow_unfiltered(&mut self) -> &mut Self {
        self.unfiltered = true;
        self
    }

    /// Clear everything accumulated and release the statement and session.
    ///
    /// Safe whether or not a session was ever opened. Inside `tx` the
    /// transactional session is kept; during batch accumulation the pending
    /// batch and its session are kept.
    pub async fn reset(&mut self) {
        self.attributes.clear();
        self.conditions.clear();
        self.raw = None;
        self.order = None;
        self.page = None;
        self.unfiltered = false;

        match self.scope {
            SessionScope::Transient => {
                self.statement = None;
                self.release_session().await;
            }
            SessionScope::Transaction | SessionScope::Batch => self.statement = None,
        }
    }

    // ---------------------------------------------------------------------
    // Writes
    // ---------------------------------------------------------------------

    /// Insert the attribute bag. Returns the generated key, if any.
    pub async fn save(&mut self) -> ModelResult<Option<Value>> {
        let result = self.execute_save().await;
        self.reset().await;
        result
    }

    /// Bind the attribute bag as one more row of a batched insert.
    ///
    /// The first call opens a transactional session (unless running inside
    /// `tx`) and prepares the insert from the current columns. Later rows
    /// must carry the same columns and are bound in the prepared order.
    /// Any failure discards the whole batch: it is rolled back and the
    /// record is reset.
    pub async fn add_to_batch(&mut self) -> ModelResult<()> {
        let result = self.execute_add_to_batch().await;
        if let Err(e) = &result {
            error!(error = %e, table = self.table.name(), "batch row rejected, discarding batch");
            self.abort_batch().await;
        }
        result
    }

    /// Execute the accumulated batch and commit it.
    ///
    /// Returns `None` when nothing was batched. On failure the batch is
    /// rolled back and the error returned.
    pub async fn save_batch(&mut self) -> ModelResult<Option<Vec<u64>>> {
        let owns_transaction = self.scope == SessionScope::Batch;
        let Some(batch) = self.batch.take() else {
            if owns_transaction {
                self.abort_batch().await;
            }
            return Ok(None);
        };
        debug!(
            table = self.table.name(),
            rows = batch.statement.batch().len(),
            "executing batch"
        );
        let outcome = self.run_batch(&batch.statement, owns_transaction).await;
        if let Err(e) = &outcome {
            error!(error = %e, table = self.table.name(), "batch insert failed, rolling back");
            if owns_transaction {
                self.rollback_active().await;
            }
        }

        if owns_transaction {
            self.scope = SessionScope::Transient;
        }
        self.reset().await;
        outcome.map(Some)
    }

    /// Update rows matching the conditions with the attribute bag.
    pub async fn update(&mut self) -> ModelResult<u64> {
        let result = self.execute_update().await;
        self.reset().await;
        result
    }

    pub async fn update_by_id(&mut self, pk: impl Into<Value>) -> ModelResult<u64> {
        let pk = pk.into();
        self.conditions
            .push(self.table.primary_key(), "=", pk.clone());
        self.invalidate_entry(&pk.to_string()).await;
        self.update().await
    }

    pub async fn delete(&mut self) -> ModelResult<u64> {
        let result = self.execute_delete().await;
        self.reset().await;
        result
    }

    pub async fn delete_by_id(&mut self, pk: impl Into<Value>) -> ModelResult<u64> {
        let pk = pk.into();
        self.conditions
            .push(self.table.primary_key(), "=", pk.clone());
        self.invalidate_entry(&pk.to_string()).await;
        self.delete().await
    }

    // ---------------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------------

    pub async fn list(&mut self) -> ModelResult<Vec<T>> {
        let result = self.execute_list().await;
        self.reset().await;
        result
    }

    /// Like `list`, ignoring any raw SQL override.
    pub async fn all(&mut self) -> ModelResult<Vec<T>> {
        self.raw = None;
        self.list().await
    }

    /// Fetch one page. Page numbers are 1-based.
    pub async fn page(&mut self, page_number: u64, page_size: u64) -> ModelResult<Paginator<T>> {
        let result = self.execute_page(page_number, page_size).await;
        self.reset().await;
        result
    }

    /// Look up a row by primary key, consulting the detail cache first.
    pub async fn find_by_id(&mut self, pk: impl Into<Value>) -> ModelResult<Option<T>> {
        let pk = pk.into();
        let field = pk.to_string();
        if let Some(model) = self.cached_lookup(&field).await {
            debug!(table = self.table.name(), id = %field, "detail cache hit");
            self.reset().await;
            return Ok(Some(model));
        }

        self.conditions.push(self.table.primary_key(), "=", pk);
        let found = self.find_one().await?;
        if let Some(model) = &found {
            self.cache_entry(&field, model).await;
        }
        Ok(found)
    }

    /// First matching row, or `None`.
    pub async fn find_one(&mut self) -> ModelResult<Option<T>> {
        let result = self.execute_find_one().await;
        self.reset().await;
        result
    }

    pub async fn count(&mut self) -> ModelResult<u64> {
        self.count_with_reset(true).await
    }

    /// Count matching rows; with `reset == false` the pending conditions
    /// and the session are kept for a follow-up query.
    pub async fn count_with_reset(&mut self, reset: bool) -> ModelResult<u64> {
        let result = self.execute_count().await;
        if reset {
            self.reset().await;
        }
        result
    }

    // ---------------------------------------------------------------------
    // Transactions
    // ---------------------------------------------------------------------

    /// Run `work` inside one transaction on this record.
    ///
    /// Commits and resets on success. On any error the transaction is
    /// rolled back and the error returned; pending state is left as the
    /// failing operation left it. The session is released either way.
    ///
    /// ```text
    /// users.tx(|r| Box::pin(async move {
    ///     r.set("name", "Tom").save().await?;
    ///     r.set("age", 21).update_by_id(7).await?;
    ///     Ok(())
    /// })).await?;
    /// ```
    pub async fn tx<F>(&mut self, work: F) -> ModelResult<()>
    where
        F: for<'r> FnOnce(&'r mut Self) -> UnitOfWork<'r> + Send,
    {
        if self.scope != SessionScope::Transient {
            return Err(ModelError::session(
                "a transaction or batch is already in progress on this record",
            ));
        }
        self.release_session().await;
        self.session = Some(self.provider.begin_transaction().await?);
        self.scope = SessionScope::Transaction;

        let outcome = match work(&mut *self).await {
            Ok(()) => self.commit_active().await,
            Err(e) => Err(e),
        };
        self.scope = SessionScope::Transient;
        if self.batch.take().is_some() {
            warn!(table = self.table.name(), "discarding batch never saved inside transaction");
        }

        match outcome {
            Ok(()) => {
                self.reset().await;
                Ok(())
            }
            Err(e) => {
                error!(error = %e, table = self.table.name(), "transaction failed, rolling back");
                self.rollback_active().await;
                self.statement = None;
                self.release_session().await;
                Err(e)
            }
        }
    }

    // ---------------------------------------------------------------------
    // Execution
    // ---------------------------------------------------------------------

    async fn execute_add_to_batch(&mut self) -> ModelResult<()> {
        if self.batch.is_none() {
            if self.attributes.is_empty() {
                return Err(ModelError::malformed("batch row has no columns"));
            }
            let columns: Vec<String> = self
                .attributes
                .columns()
                .into_iter()
                .map(str::to_string)
                .collect();
            let sql = self.dialect.save_sql(&self.table, &self.attributes.columns());
            if self.scope == SessionScope::Transient {
                // An idle transient session cannot carry the batch.
                self.statement = None;
                self.release_session().await;
                self.session = Some(self.provider.begin_transaction().await?);
                self.scope = SessionScope::Batch;
            }
            debug!(table = self.table.name(), sql = %sql, "preparing batch statement");
            let statement = self.active_session()?.prepare(&sql).await?;
            self.batch = Some(PendingBatch { columns, statement });
        }

        let params = self.batch_row()?;
        if let Some(batch) = self.batch.as_mut() {
            batch.statement.bind(params).add_to_batch();
        }
        self.attributes.clear();
        Ok(())
    }

    /// Attribute values in the column order of the prepared batch insert.
    fn batch_row(&self) -> ModelResult<Vec<Value>> {
        let batch = self
            .batch
            .as_ref()
            .ok_or_else(|| ModelError::session("no batch in progress"))?;
        if self.attributes.len() != batch.columns.len() {
            return Err(ModelError::malformed(format!(
                "batch row has {} columns but the insert expects ({})",
                self.attributes.len(),
                batch.columns.join(", ")
            )));
        }
        batch
            .columns
            .iter()
            .map(|column| {
                self.attributes.get(column).cloned().ok_or_else(|| {
                    ModelError::malformed(format!("batch row is missing column '{}'", column))
                })
            })
            .collect()
    }

    /// Drop a pending batch, rolling back the transaction it owns.
    async fn abort_batch(&mut self) {
        self.batch = None;
        if self.scope == SessionScope::Batch {
            self.rollback_active().await;
            self.scope = SessionScope::Transient;
        }
        self.reset().await;
    }

    async fn execute_save(&mut self) -> ModelResult<Option<Value>> {
        let sql = self.dialect.save_sql(&self.table, &self.attributes.columns());
        let params = self.attributes.values();
        Ok(self.run_update(&sql, params).await?.generated_key)
    }

    async fn execute_update(&mut self) -> ModelResult<u64> {
        self.check_filtered("update")?;
        let sql = self
            .dialect
            .update_sql(&self.table, &self.attributes.columns(), &self.conditions);
        let mut params = self.attributes.values();
        params.extend(self.conditions.values());
        let result = self.run_update(&sql, params).await?;
        self.invalidate_table().await;
        Ok(result.affected_rows)
    }

    async fn execute_delete(&mut self) -> ModelResult<u64> {
        self.check_filtered("delete")?;
        let sql = self.dialect.delete_sql(&self.table, &self.conditions);
        let params = self.conditions.values();
        let result = self.run_update(&sql, params).await?;
        self.invalidate_table().await;
        Ok(result.affected_rows)
    }

    async fn execute_list(&mut self) -> ModelResult<Vec<T>> {
        let sql = self.dialect.query_sql(&self.query_parts());
        let params = self.query_params();
        let rows = self.run_query(&sql, params).await?;
        rows.into_iter().map(Row::into_model).collect()
    }

    async fn execute_find_one(&mut self) -> ModelResult<Option<T>> {
        let sql = self.dialect.query_one_sql(&self.query_parts());
        let params = self.query_params();
        let rows = self.run_query(&sql, params).await?;
        rows.into_iter().next().map(Row::into_model).transpose()
    }

    async fn execute_count(&mut self) -> ModelResult<u64> {
        let sql = self.dialect.query_count_sql(&self.query_parts());
        let params = self.query_params();
        let value = self.run_scalar(&sql, params).await?;
        value
            .as_u64()
            .ok_or_else(|| ModelError::UnexpectedValue(format!("count returned '{}'", value)))
    }

    async fn execute_page(
        &mut self,
        page_number: u64,
        page_size: u64,
    ) -> ModelResult<Paginator<T>> {
        if page_number == 0 || page_size == 0 {
            return Err(ModelError::InvalidPageRequest {
                page: page_number,
                size: page_size,
            });
        }
        let total = self.count_with_reset(false).await?;
        let pager = Paginator::new(total, page_number, page_size);
        self.page = Some(pager.page_row());
        let list = self.execute_list().await?;
        Ok(pager.with_list(list))
    }

    fn check_filtered(&self, action: &'static str) -> ModelResult<()> {
        if self.conditions.is_empty() && !self.unfiltered && !self.config.allow_unfiltered_writes
        {
            return Err(ModelError::MissingConditions(action));
        }
        Ok(())
    }

    fn query_parts(&self) -> QueryParts<'_> {
        QueryParts {
            raw_sql: self.raw_sql(),
            table: &self.table,
            conditions: &self.conditions,
            order: self.order.as_deref(),
            page: self.page,
        }
    }

    /// Raw-SQL values first, then condition values.
    fn query_params(&self) -> Vec<Value> {
        let mut params = self
            .raw
            .as_ref()
            .map(|raw| raw.params.clone())
            .unwrap_or_default();
        params.extend(self.conditions.values());
        params
    }

    async fn ensure_session(&mut self) -> ModelResult<()> {
        if self.session.is_none() {
            self.session = Some(self.provider.open().await?);
        }
        Ok(())
    }

    fn active_session(&mut self) -> ModelResult<&mut P::Session> {
        self.session
            .as_mut()
            .ok_or_else(|| ModelError::session("no active session"))
    }

    async fn prepare(&mut self, sql: &str, params: Vec<Value>) -> ModelResult<Statement> {
        debug!(table = self.table.name(), sql = %sql, "preparing statement");
        if !params.is_empty() {
            debug!(params = ?params, "binding parameters");
        }
        self.ensure_session().await?;
        let mut statement = self.active_session()?.prepare(sql).await?;
        statement.bind(params);
        Ok(statement)
    }

    async fn run_update(&mut self, sql: &str, params: Vec<Value>) -> ModelResult<UpdateResult> {
        let statement = self.prepare(sql, params).await?;
        let result = self.active_session()?.execute_update(&statement).await;
        self.statement = Some(statement);
        result
    }

    async fn run_query(&mut self, sql: &str, params: Vec<Value>) -> ModelResult<Vec<Row>> {
        let statement = self.prepare(sql, params).await?;
        let result = self.active_session()?.execute_query(&statement).await;
        self.statement = Some(statement);
        result
    }

    async fn run_scalar(&mut self, sql: &str, params: Vec<Value>) -> ModelResult<Value> {
        let statement = self.prepare(sql, params).await?;
        let result = self.active_session()?.execute_scalar(&statement).await;
        self.statement = Some(statement);
        result
    }

    async fn run_batch(&mut self, statement: &Statement, commit: bool) -> ModelResult<Vec<u64>> {
        let session = self.active_session()?;
        let counts = session.execute_batch(statement).await?;
        if commit {
            session.commit().await?;
        }
        Ok(counts)
    }

    async fn commit_active(&mut self) -> ModelResult<()> {
        self.active_session()?.commit().await
    }

    async fn rollback_active(&mut self) {
        if let Some(session) = self.session.as_mut() {
            if let Err(e) = session.rollback().await {
                error!(error = %e, "rollback failed");
            }
        }
    }

    async fn release_session(&mut self) {
        if let Some(mut session) = self.session.take() {
            if let Err(e) = session.close().await {
                warn!(error = %e, table = self.table.name(), "failed to close session");
            }
        }
    }

    // ---------------------------------------------------------------------
    // Detail cache
    // ---------------------------------------------------------------------

    fn active_cache(&self) -> Option<&Arc<dyn CacheStore>> {
        if self.cached { self.cache.as_ref() } else { None }
    }

    async fn cached_lookup(&mut self, field: &str) -> Option<T> {
        let cache = self.active_cache()?;
        let key = self.table.detail_cache_key();
        match cache.hash_get(&key, field).await {
            Ok(Some(json)) => match serde_json::from_str(&json) {
                Ok(model) => Some(model),
                Err(e) => {
                    warn!(error = %e, key = %key, field, "discarding undecodable cache entry");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, key = %key, field, "detail cache read failed");
                None
            }
        }
    }

    async fn cache_entry(&mut self, field: &str, model: &T) {
        let Some(cache) = self.active_cache() else {
            return;
        };
        let key = self.table.detail_cache_key();
        let json = match serde_json::to_string(model) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, key = %key, field, "could not serialize record for cache");
                return;
            }
        };
        if let Err(e) = cache
            .hash_set(&key, field, json, self.config.detail_ttl())
            .await
        {
            warn!(error = %e, key = %key, field, "detail cache write failed");
        }
    }

    async fn invalidate_entry(&mut self, field: &str) {
        if let Some(cache) = self.active_cache() {
            let key = self.table.detail_cache_key();
            if let Err(e) = cache.hash_delete(&key, field).await {
                warn!(error = %e, key = %key, field, "detail cache invalidation failed");
            }
        }
    }

    async fn invalidate_table(&mut self) {
        if let Some(cache) = self.active_cache() {
            let key = self.table.detail_cache_key();
            if let Err(e) = cache.delete(&key).await {
                warn!(error = %e, key = %key, "detail cache invalidation failed");
            }
        }
    }
}
