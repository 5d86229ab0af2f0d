// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Column values and primary keys.

use std::{cmp::Ordering, fmt};

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// A single column value as returned by a store.
///
/// Values are opaque to the caching core except where a primary or foreign key has
/// to be extracted from them, see [`Value::to_key`].
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Value {
    /// SQL `NULL`.
    #[default]
    Null,
    /// A boolean.
    Bool(bool),
    /// A signed 64-bit integer.
    Integer(i64),
    /// A double precision float.
    Real(f64),
    /// UTF-8 text.
    Text(String),
    /// Raw bytes.
    Blob(Vec<u8>),
}

impl Value {
    /// Returns `true` if the value is `NULL`.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns the integer if this is an [`Value::Integer`].
    #[must_use]
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the text if this is a [`Value::Text`].
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }

    /// Converts the value into a key part.
    ///
    /// Only integers, text and blobs can take part in a key. `NULL` yields `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::NotKeyable`] for booleans and floats.
    pub fn to_key(&self, column: &str) -> Result<Option<KeyValue>, KeyError> {
        match self {
            Self::Null => Ok(None),
            Self::Integer(v) => Ok(Some(KeyValue::Integer(*v))),
            Self::Text(v) => Ok(Some(KeyValue::Text(v.clone()))),
            Self::Blob(v) => Ok(Some(KeyValue::Blob(v.clone()))),
            Self::Bool(_) | Self::Real(_) => Err(KeyError::NotKeyable(column.to_owned())),
        }
    }

    /// A total order over values, used for sorting query results.
    ///
    /// Values of different kinds order by kind first (`NULL` sorts first).
    #[must_use]
    pub fn total_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Null, Self::Null) => Ordering::Equal,
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::Integer(a), Self::Integer(b)) => a.cmp(b),
            (Self::Real(a), Self::Real(b)) => a.total_cmp(b),
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            (Self::Blob(a), Self::Blob(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Bool(_) => 1,
            Self::Integer(_) => 2,
            Self::Real(_) => 3,
            Self::Text(_) => 4,
            Self::Blob(_) => 5,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Integer(v) => write!(f, "{v}"),
            Self::Real(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "{v:?}"),
            Self::Blob(v) => write!(f, "<{} bytes>", v.len()),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Integer(value.into())
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Real(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Self::Blob(value)
    }
}

impl<T: Into<Self>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

impl From<KeyValue> for Value {
    fn from(value: KeyValue) -> Self {
        match value {
            KeyValue::Integer(v) => Self::Integer(v),
            KeyValue::Text(v) => Self::Text(v),
            KeyValue::Blob(v) => Self::Blob(v),
        }
    }
}

/// One component of a primary key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyValue {
    /// An integer key part.
    Integer(i64),
    /// A text key part.
    Text(String),
    /// A binary key part.
    Blob(Vec<u8>),
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "{v:?}"),
            Self::Blob(v) => write!(f, "<{} bytes>", v.len()),
        }
    }
}

impl From<i64> for KeyValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for KeyValue {
    fn from(value: i32) -> Self {
        Self::Integer(value.into())
    }
}

impl From<&str> for KeyValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for KeyValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// The primary key of a row: one [`KeyValue`] per primary-key column.
///
/// Keys are immutable, hashable and totally ordered, so they can index both the
/// identity map and the rows of an in-memory table.
///
/// # Examples
///
/// ```
/// use standin_store::PrimaryKey;
///
/// let simple = PrimaryKey::from(1);
/// let composite = PrimaryKey::from((7, "eu-west"));
///
/// assert_eq!(simple.len(), 1);
/// assert_eq!(composite.to_string(), "(7, \"eu-west\")");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PrimaryKey(SmallVec<[KeyValue; 2]>);

impl PrimaryKey {
    /// Creates a key from its parts, in primary-key column order.
    pub fn new(parts: impl IntoIterator<Item = KeyValue>) -> Self {
        Self(parts.into_iter().collect())
    }

    /// Returns the key parts in column order.
    #[must_use]
    pub fn parts(&self) -> &[KeyValue] {
        &self.0
    }

    /// Returns the number of key parts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` for the empty key.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// A stable, unambiguous text encoding of the key (a JSON array).
    ///
    /// Used wherever a key has to be stored as a column value, e.g. in coverage records.
    #[must_use]
    pub fn encode(&self) -> String {
        // A slice of plain enums cannot fail to serialize.
        serde_json::to_string(self.parts()).unwrap_or_default()
    }
}

impl fmt::Display for PrimaryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.parts() {
            [single] => write!(f, "{single}"),
            parts => {
                write!(f, "(")?;
                for (index, part) in parts.iter().enumerate() {
                    if index > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{part}")?;
                }
                write!(f, ")")
            }
        }
    }
}

macro_rules! single_part_key {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for PrimaryKey {
                fn from(value: $ty) -> Self {
                    Self(SmallVec::from_iter([KeyValue::from(value)]))
                }
            }
        )*
    };
}

single_part_key!(i64, i32, &str, String, KeyValue);

impl<A: Into<KeyValue>, B: Into<KeyValue>> From<(A, B)> for PrimaryKey {
    fn from((a, b): (A, B)) -> Self {
        Self::new([a.into(), b.into()])
    }
}

impl<A: Into<KeyValue>, B: Into<KeyValue>, C: Into<KeyValue>> From<(A, B, C)> for PrimaryKey {
    fn from((a, b, c): (A, B, C)) -> Self {
        Self::new([a.into(), b.into(), c.into()])
    }
}

impl FromIterator<KeyValue> for PrimaryKey {
    fn from_iter<I: IntoIterator<Item = KeyValue>>(iter: I) -> Self {
        Self::new(iter)
    }
}

/// Failure to extract a key from a row.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum KeyError {
    /// The row has no such column.
    #[error("row has no column {0:?}")]
    Missing(String),

    /// The column holds a value that cannot be part of a key.
    #[error("column {0:?} does not hold a keyable value")]
    NotKeyable(String),
}
