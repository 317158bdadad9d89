//! Modelkit - a record-style ORM core.
//!
//! A [`Record`] collects column values and filter conditions, renders SQL
//! through a pluggable [`Dialect`], executes it on a session obtained from a
//! [`SessionProvider`], and optionally caches single-row lookups in a
//! [`CacheStore`].
//!
//! # Core Concepts
//!
//! - **Attribute bag**: ordered column values used as insert/update payload
//!   ([`Attributes`]).
//! - **Condition set**: ordered WHERE predicates keyed by [`ParamKey`]; the
//!   order they were added is the order their values are bound in.
//! - **Terminal operation**: any call that renders, executes and then resets
//!   the record (`save`, `update`, `delete`, `list`, `find_*`, `count`,
//!   `page`).
//! - **Detail cache**: per-table hash of records keyed by primary key,
//!   invalidated by writes.
//!
//! # Traits
//!
//! - [`Table`]: table name and primary key of a record type
//! - [`Dialect`]: SQL rendering for a target database
//! - [`SessionProvider`] / [`Session`]: database backend
//! - [`CacheStore`]: key/hash cache backend

#![cfg_attr(
    test,
    allow(clippy::unwrap_used, clippy::expect_used, clippy::unwrap_in_result)
)]

// Lets `#[derive(Table)]` refer to `::modelkit` from inside this crate.
extern crate self as modelkit;

mod attributes;
mod cache;
mod config;
mod dialect;
mod error;
mod paginator;
pub mod param;
mod record;
mod session;
mod table;
mod value;

pub use attributes::{Attributes, Row};
pub use cache::{CacheStore, MemoryCache};
pub use config::{ConnectionConfig, ModelConfig};
pub use dialect::{DefaultDialect, Dialect, QueryParts};
pub use error::{ModelError, ModelResult};
pub use paginator::{PageRow, Paginator};
pub use param::{Conditions, ParamKey, parse_inline_operator, parse_template};
pub use record::{Record, UnitOfWork};
pub use session::{Session, SessionProvider, Statement, UpdateResult};
pub use table::{Table, TableDescriptor};
pub use value::Value;

// Re-export derive macro
pub use modelkit_derive::Table;
