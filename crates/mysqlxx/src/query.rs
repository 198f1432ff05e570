//! Queries bound to a connection.

use std::fmt;

use mysqlxx_core::error::Result;

use crate::connection::Connection;
use crate::driver::Driver;
use crate::wire::WireDriver;

/// Outcome of a text statement.
///
/// Values are in the text protocol's form; `None` is SQL `NULL`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
    pub affected_rows: u64,
    pub last_insert_id: u64,
    pub warnings: u16,
}

impl QueryResult {
    /// Number of rows returned.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether no rows were returned.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Value at `row`, `col`. `None` for out of range or `NULL`.
    pub fn get(&self, row: usize, col: usize) -> Option<&str> {
        self.rows.get(row)?.get(col)?.as_deref()
    }

    /// Index of the column named `name`.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
}

/// A statement being built against a live connection.
///
/// Holds the connection's mutable borrow, so the connection cannot be
/// disconnected, reconnected or dropped while the query exists.
pub struct Query<'conn, D: Driver = WireDriver> {
    conn: &'conn mut Connection<D>,
    text: String,
}

impl<D: Driver> fmt::Debug for Query<'_, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query").field("text", &self.text).finish_non_exhaustive()
    }
}

impl<'conn, D: Driver> Query<'conn, D> {
    pub(crate) fn new(conn: &'conn mut Connection<D>, text: String) -> Self {
        Self { conn, text }
    }

    /// Current statement text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Replace the statement text.
    pub fn set_text(&mut self, text: impl Into<String>) -> &mut Self {
        self.text = text.into();
        self
    }

    /// Append to the statement text.
    pub fn append(&mut self, fragment: &str) -> &mut Self {
        self.text.push_str(fragment);
        self
    }

    /// Run the statement on the bound connection.
    pub fn execute(&mut self) -> Result<QueryResult> {
        self.conn.execute_text(&self.text)
    }
}

impl<D: Driver> fmt::Write for Query<'_, D> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.text.push_str(s);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> QueryResult {
        QueryResult {
            columns: vec!["id".to_string(), "name".to_string()],
            rows: vec![
                vec![Some("1".to_string()), Some("alpha".to_string())],
                vec![Some("2".to_string()), None],
            ],
            ..QueryResult::default()
        }
    }

    #[test]
    fn test_result_accessors() {
        let result = sample();
        assert_eq!(result.len(), 2);
        assert!(!result.is_empty());
        assert_eq!(result.get(0, 1), Some("alpha"));
        assert_eq!(result.get(1, 1), None);
        assert_eq!(result.get(5, 0), None);
        assert_eq!(result.column_index("name"), Some(1));
        assert_eq!(result.column_index("missing"), None);
    }
}
