//! PostgreSQL SQL dialect.

use modelkit::{Dialect, PageRow, TableDescriptor};

/// Numbered `$n` placeholders, `LIMIT n OFFSET m` windows, and inserts that
/// return the primary key.
#[derive(Debug, Clone, Copy, Default)]
pub struct PgDialect;

impl Dialect for PgDialect {
    fn placeholder(&self, index: usize) -> String {
        format!("${}", index)
    }

    fn limit_clause(&self, page: PageRow) -> String {
        format!(" LIMIT {} OFFSET {}", page.limit, page.offset)
    }

    fn save_sql(&self, table: &TableDescriptor, columns: &[&str]) -> String {
        let placeholders: Vec<String> = (1..=columns.len()).map(|i| self.placeholder(i)).collect();
        format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
            table.name(),
            columns.join(", "),
            placeholders.join(", "),
            table.primary_key()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modelkit::{Conditions, QueryParts};

    fn users() -> TableDescriptor {
        TableDescriptor::new("users", "id")
    }

    #[test]
    fn insert_returns_primary_key() {
        assert_eq!(
            PgDialect.save_sql(&users(), &["name", "age"]),
            "INSERT INTO users (name, age) VALUES ($1, $2) RETURNING id"
        );
    }

    #[test]
    fn update_numbers_conditions_after_columns() {
        let mut conditions = Conditions::new();
        conditions.push("id", "=", 5i64);
        assert_eq!(
            PgDialect.update_sql(&users(), &["name", "age"], &conditions),
            "UPDATE users SET name = $1, age = $2 WHERE id = $3"
        );
    }

    #[test]
    fn page_window_uses_offset_keyword() {
        let table = users();
        let mut conditions = Conditions::new();
        conditions.push("age", ">", 18i64);
        let parts = QueryParts {
            page: Some(PageRow::new(10, 10)),
            ..QueryParts::new(&table, &conditions)
        };
        assert_eq!(
            PgDialect.query_sql(&parts),
            "SELECT * FROM users WHERE age > $1 LIMIT 10 OFFSET 10"
        );
        assert_eq!(
            PgDialect.query_one_sql(&parts),
            "SELECT * FROM users WHERE age > $1 LIMIT 1 OFFSET 0"
        );
    }
}
