//! Table metadata for record types.
//!
//! Types implementing `Table` name the database table they map to and its
//! primary-key column. Add `#[derive(Table)]` with
//! `#[table(name = "...", pk = "...")]` to generate the implementation.

/// Table name and primary-key column for a record type.
///
/// # Example
///
/// ```text
/// #[derive(Table, Serialize, Deserialize)]
/// #[table(name = "users", pk = "uid")]
/// pub struct User {
///     pub uid: i64,
///     pub name: String,
/// }
/// ```
pub trait Table {
    /// The database table name for this type.
    fn table_name() -> &'static str;

    /// The primary-key column.
    fn primary_key() -> &'static str {
        "id"
    }

    fn descriptor() -> TableDescriptor {
        TableDescriptor::new(Self::table_name(), Self::primary_key())
    }
}

/// Resolved table metadata, constant per record type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDescriptor {
    name: String,
    primary_key: String,
}

impl TableDescriptor {
    pub fn new(name: impl Into<String>, primary_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            primary_key: primary_key.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    /// Hash key holding this table's cached single-row lookups.
    pub fn detail_cache_key(&self) -> String {
        format!("{}_detail", self.name)
    }
}
