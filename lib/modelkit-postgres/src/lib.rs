//! PostgreSQL backend for modelkit.
//!
//! Provides a [`PgPool`] session provider and the [`PgDialect`] SQL
//! renderer. Records pick both up at construction:
//!
//! ```text
//! use modelkit_postgres::{PgDialect, PgPool, Record};
//!
//! let pool = Arc::new(PgPool::connect("postgres://localhost/app").await?);
//! let mut users = Record::<User, _>::new(pool).with_dialect(PgDialect);
//! let id = users.set("name", "Tom").save().await?;
//! ```

#![cfg_attr(
    test,
    allow(clippy::unwrap_used, clippy::expect_used, clippy::unwrap_in_result)
)]

mod bind;
mod dialect;
mod executor;

pub use bind::{bind_params, bind_value, decode_row};
pub use dialect::PgDialect;
pub use executor::{PgPool, PgSession};

// Re-export core types for convenience
pub use modelkit::{
    Attributes, CacheStore, ConnectionConfig, Dialect, MemoryCache, ModelConfig, ModelError,
    ModelResult, Paginator, Record, Row, Session, SessionProvider, Table, Value,
};
