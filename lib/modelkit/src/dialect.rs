//! SQL generation strategies.
//!
//! A [`Dialect`] turns a record's pending state into statement text. Every
//! method has a default rendering with `?` placeholders and
//! `LIMIT offset, count` pagination; a dialect for another database only
//! overrides the pieces whose syntax differs.

use crate::{Conditions, PageRow, TableDescriptor};

/// Everything a select-style statement is rendered from.
#[derive(Debug, Clone, Copy)]
pub struct QueryParts<'a> {
    /// Caller-supplied SQL used in place of the generated select.
    pub raw_sql: Option<&'a str>,
    pub table: &'a TableDescriptor,
    pub conditions: &'a Conditions,
    pub order: Option<&'a str>,
    pub page: Option<PageRow>,
}

impl<'a> QueryParts<'a> {
    pub fn new(table: &'a TableDescriptor, conditions: &'a Conditions) -> Self {
        Self {
            raw_sql: None,
            table,
            conditions,
            order: None,
            page: None,
        }
    }
}

/// Renders insert, update, delete, select, select-one and count statements.
///
/// Implementations must be pure: they never touch a session or cache.
pub trait Dialect: Send + Sync {
    /// Placeholder for the `index`-th bound value (1-based).
    fn placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    fn limit_clause(&self, page: PageRow) -> String {
        format!(" LIMIT {}, {}", page.offset, page.limit)
    }

    /// `" WHERE k1 op ? AND ..."`, or empty when there are no conditions.
    fn where_clause(&self, conditions: &Conditions, first_index: usize) -> String {
        if conditions.is_empty() {
            return String::new();
        }
        let clauses: Vec<String> = conditions
            .keys()
            .enumerate()
            .map(|(i, key)| {
                format!(
                    "{} {} {}",
                    key.column(),
                    key.operator(),
                    self.placeholder(first_index + i)
                )
            })
            .collect();
        format!(" WHERE {}", clauses.join(" AND "))
    }

    fn order_clause(&self, order: Option<&str>) -> String {
        match order {
            Some(order) if !order.trim().is_empty() => format!(" ORDER BY {}", order.trim()),
            _ => String::new(),
        }
    }

    fn save_sql(&self, table: &TableDescriptor, columns: &[&str]) -> String {
        let placeholders: Vec<String> = (1..=columns.len()).map(|i| self.placeholder(i)).collect();
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table.name(),
            columns.join(", "),
            placeholders.join(", ")
        )
    }

    fn update_sql(
        &self,
        table: &TableDescriptor,
        columns: &[&str],
        conditions: &Conditions,
    ) -> String {
        let assignments: Vec<String> = columns
            .iter()
            .enumerate()
            .map(|(i, column)| format!("{} = {}", column, self.placeholder(i + 1)))
            .collect();
        format!(
            "UPDATE {} SET {}{}",
            table.name(),
            assignments.join(", "),
            self.where_clause(conditions, columns.len() + 1)
        )
    }

    fn delete_sql(&self, table: &TableDescriptor, conditions: &Conditions) -> String {
        format!(
            "DELETE FROM {}{}",
            table.name(),
            self.where_clause(conditions, 1)
        )
    }

    fn query_sql(&self, parts: &QueryParts<'_>) -> String {
        let mut sql = match parts.raw_sql {
            Some(raw) => raw.trim().to_string(),
            None => format!(
                "SELECT * FROM {}{}",
                parts.table.name(),
                self.where_clause(parts.conditions, 1)
            ),
        };
        sql.push_str(&self.order_clause(parts.order));
        if let Some(page) = parts.page {
            sql.push_str(&self.limit_clause(page));
        }
        sql
    }

    /// Single-row select. Raw SQL is used as written; generated selects get
    /// a one-row limit and ignore any page window.
    fn query_one_sql(&self, parts: &QueryParts<'_>) -> String {
        match parts.raw_sql {
            Some(_) => self.query_sql(&QueryParts { page: None, ..*parts }),
            None => {
                let mut sql = self.query_sql(&QueryParts { page: None, ..*parts });
                sql.push_str(&self.limit_clause(PageRow::new(0, 1)));
                sql
            }
        }
    }

    /// Count over the same FROM/WHERE; order and page window are ignored.
    fn query_count_sql(&self, parts: &QueryParts<'_>) -> String {
        match parts.raw_sql {
            Some(raw) => format!("SELECT COUNT(*) FROM ({}) AS t", raw.trim()),
            None => format!(
                "SELECT COUNT(*) FROM {}{}",
                parts.table.name(),
                self.where_clause(parts.conditions, 1)
            ),
        }
    }
}

/// ANSI-style dialect with `?` placeholders.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultDialect;

impl Dialect for DefaultDialect {}
