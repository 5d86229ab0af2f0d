// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! A minimal query description understood by every store.
//!
//! Query shaping is the caller's job; stores only evaluate conjunctions of column
//! predicates over one table, with optional ordering and a row limit.

use std::cmp::Ordering;

use crate::{Row, Value};

/// A single column predicate.
#[derive(Clone, Debug, PartialEq)]
pub enum Filter {
    /// The column equals the value.
    Eq(String, Value),
    /// The column equals one of the values.
    In(String, Vec<Value>),
    /// The column is `NULL` (or absent).
    IsNull(String),
}

impl Filter {
    /// Returns `true` if the row satisfies the predicate.
    #[must_use]
    pub fn matches(&self, row: &Row) -> bool {
        match self {
            Self::Eq(column, value) => row.get(column) == Some(value),
            Self::In(column, values) => row.get(column).is_some_and(|v| values.contains(v)),
            Self::IsNull(column) => row.get(column).is_none_or(Value::is_null),
        }
    }
}

/// A query against one table.
///
/// # Examples
///
/// ```
/// use standin_store::{Query, Row};
///
/// let query = Query::table("b").eq("a_id", 1).order_by("name");
///
/// assert!(query.matches(&Row::new().with("a_id", 1)));
/// assert!(!query.matches(&Row::new().with("a_id", 2)));
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct Query {
    table: String,
    filters: Vec<Filter>,
    order_by: Vec<String>,
    limit: Option<usize>,
}

impl Query {
    /// Starts a query selecting every row of `table`.
    #[must_use]
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            filters: Vec::new(),
            order_by: Vec::new(),
            limit: None,
        }
    }

    /// Adds a predicate.
    #[must_use]
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Adds an equality predicate.
    #[must_use]
    pub fn eq(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(Filter::Eq(column.into(), value.into()))
    }

    /// Adds a membership predicate.
    #[must_use]
    pub fn is_in<V: Into<Value>>(self, column: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        self.filter(Filter::In(column.into(), values.into_iter().map(Into::into).collect()))
    }

    /// Adds a sort column. Rows are returned in primary-key order unless sort columns are given.
    #[must_use]
    pub fn order_by(mut self, column: impl Into<String>) -> Self {
        self.order_by.push(column.into());
        self
    }

    /// Limits the number of returned rows.
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// The queried table.
    #[must_use]
    pub fn table_name(&self) -> &str {
        &self.table
    }

    /// The predicates, all of which must hold.
    #[must_use]
    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    /// Returns `true` if the row satisfies every predicate.
    #[must_use]
    pub fn matches(&self, row: &Row) -> bool {
        self.filters.iter().all(|filter| filter.matches(row))
    }

    /// Sorts and truncates rows that already passed [`Query::matches`].
    ///
    /// The sort is stable, so rows that tie on every sort column keep their input order.
    #[must_use]
    pub fn finish(&self, mut rows: Vec<Row>) -> Vec<Row> {
        if !self.order_by.is_empty() {
            rows.sort_by(|a, b| self.compare(a, b));
        }
        if let Some(limit) = self.limit {
            rows.truncate(limit);
        }
        rows
    }

    fn compare(&self, a: &Row, b: &Row) -> Ordering {
        self.order_by
            .iter()
            .map(|column| {
                let left = a.get(column).unwrap_or(&Value::Null);
                let right = b.get(column).unwrap_or(&Value::Null);
                left.total_cmp(right)
            })
            .find(|ordering| ordering.is_ne())
            .unwrap_or(Ordering::Equal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows() -> Vec<Row> {
        vec![
            Row::new().with("id", 1).with("name", "c").with("a_id", 1),
            Row::new().with("id", 2).with("name", "a").with("a_id", 2),
            Row::new().with("id", 3).with("name", "b").with("a_id", 1),
            Row::new().with("id", 4).with("name", "d").with("a_id", Value::Null),
        ]
    }

    fn run(query: &Query) -> Vec<i64> {
        let matching = rows().into_iter().filter(|row| query.matches(row)).collect();
        query
            .finish(matching)
            .iter()
            .map(|row| row.get("id").and_then(Value::as_integer).unwrap())
            .collect()
    }

    #[test]
    fn eq_filter() {
        assert_eq!(run(&Query::table("b").eq("a_id", 1)), vec![1, 3]);
    }

    #[test]
    fn in_filter() {
        assert_eq!(run(&Query::table("b").is_in("id", [2, 4])), vec![2, 4]);
    }

    #[test]
    fn null_filter() {
        assert_eq!(run(&Query::table("b").filter(Filter::IsNull("a_id".into()))), vec![4]);
    }

    #[test]
    fn order_and_limit() {
        assert_eq!(run(&Query::table("b").order_by("name").limit(3)), vec![2, 3, 1]);
    }
}
