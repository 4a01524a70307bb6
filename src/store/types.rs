//! Document, filter and index types shared by every store backend

use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::pin::Pin;

use super::error::{StoreError, StoreResult};

/// A stored document: an ordered JSON object
pub type Document = Map<String, Value>;

/// Encode any serializable value as a document; it must serialize to an object
pub fn to_document<T: Serialize>(value: &T) -> StoreResult<Document> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::serialization(format!(
            "expected an object, got {}",
            other
        ))),
    }
}

/// Lazy cursor over documents returned by `find` and `aggregate`
pub type DocumentStream = Pin<Box<dyn Stream<Item = StoreResult<Document>> + Send>>;

/// Resolve a dotted field path (`assessment_info.assessment_type`) in a document
pub fn field<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = doc.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

/// Document selection predicate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Filter {
    /// Every document
    All,
    /// Field equals value
    Eq(String, Value),
    /// Field equals one of the values
    In(String, Vec<Value>),
    /// All sub-filters match
    And(Vec<Filter>),
}

impl Filter {
    pub fn eq(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq(path.into(), value.into())
    }

    pub fn is_in(path: impl Into<String>, values: Vec<Value>) -> Self {
        Self::In(path.into(), values)
    }

    /// Check whether a document satisfies the filter
    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Filter::All => true,
            Filter::Eq(path, expected) => {
                field(doc, path).is_some_and(|v| values_equal(v, expected))
            }
            Filter::In(path, candidates) => field(doc, path)
                .is_some_and(|v| candidates.iter().any(|c| values_equal(v, c))),
            Filter::And(filters) => filters.iter().all(|f| f.matches(doc)),
        }
    }
}

/// Equality that treats `3` and `3.0` as the same key, the way document stores do
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x == y,
            _ => x.as_f64() == y.as_f64(),
        },
        _ => a == b,
    }
}

/// Top-level fields to keep when reading documents; empty keeps everything
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Projection(Vec<String>);

impl Projection {
    pub fn all() -> Self {
        Self(Vec::new())
    }

    pub fn include<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(fields.into_iter().map(Into::into).collect())
    }

    pub fn apply(&self, doc: &Document) -> Document {
        if self.0.is_empty() {
            return doc.clone();
        }
        self.0
            .iter()
            .filter_map(|name| doc.get(name).map(|v| (name.clone(), v.clone())))
            .collect()
    }
}

/// Key direction for indexes and sorts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Named secondary index definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub name: String,
    pub keys: Vec<(String, SortOrder)>,
}

impl IndexSpec {
    /// Ascending index over the given fields
    pub fn ascending<I, S>(name: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            keys: fields
                .into_iter()
                .map(|f| (f.into(), SortOrder::Ascending))
                .collect(),
        }
    }
}
