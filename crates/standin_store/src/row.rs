// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::BTreeMap;

use crate::{KeyError, PrimaryKey, Value};

/// A row: column names mapped to values.
///
/// Rows carry every scalar and foreign-key column of an entity. Copying a row from one
/// store to another is how an entity is mirrored into the cache.
///
/// # Examples
///
/// ```
/// use standin_store::{PrimaryKey, Row, Value};
///
/// let row = Row::new().with("id", 1).with("name", "b1").with("a_id", 1);
///
/// assert_eq!(row.get("name"), Some(&Value::from("b1")));
/// assert_eq!(row.key(&["id"]).unwrap(), Some(PrimaryKey::from(1)));
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Row(BTreeMap<String, Value>);

impl Row {
    /// Creates an empty row.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`Row::insert`].
    #[must_use]
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(column, value);
        self
    }

    /// Sets a column, returning the previous value if any.
    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(column.into(), value.into())
    }

    /// Returns the value of a column.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.get(column)
    }

    /// Returns `true` if the row has the column (even if it is `NULL`).
    #[must_use]
    pub fn contains(&self, column: &str) -> bool {
        self.0.contains_key(column)
    }

    /// Iterates columns in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Returns the number of columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the row has no columns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Extracts the key formed by `columns`, in order.
    ///
    /// Returns `Ok(None)` when any of the columns is `NULL`, which is how an unset
    /// foreign key reads.
    ///
    /// # Errors
    ///
    /// Returns an error if a column is missing or holds a value that cannot be a key.
    pub fn key(&self, columns: &[&str]) -> Result<Option<PrimaryKey>, KeyError> {
        let mut parts = Vec::with_capacity(columns.len());
        for column in columns {
            let value = self.get(column).ok_or_else(|| KeyError::Missing((*column).to_owned()))?;
            match value.to_key(column)? {
                Some(part) => parts.push(part),
                None => return Ok(None),
            }
        }
        Ok(Some(PrimaryKey::new(parts)))
    }

    /// Returns `true` if both rows hold the same columns with identical values.
    ///
    /// Unlike `==`, reals are compared by [`f64::total_cmp`], so a row holding `NaN` is
    /// identical to itself.
    #[must_use]
    pub fn same_content(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .zip(other.iter())
                .all(|((name, value), (other_name, other_value))| name == other_name && value.total_cmp(other_value).is_eq())
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}
