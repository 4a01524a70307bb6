//! Aggregation pipeline model and its in-memory evaluator
//!
//! Backends that hold documents locally (memory, file) run pipelines through
//! [`evaluate`]. The evaluator is pure: it never touches a backend, foreign
//! collections referenced by `Lookup` stages are handed in by the caller.

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use super::error::{StoreError, StoreResult};
use super::types::{field, Document, Filter, SortOrder};

/// One step of an aggregation pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stage {
    /// Keep documents that satisfy the filter
    Match(Filter),
    /// Left outer join against another collection
    Lookup {
        from: String,
        local_field: String,
        foreign_field: String,
        as_field: String,
    },
    /// Emit one document per element of an array field
    Unwind(String),
    /// Group by a field path (`None` groups everything together) into `_id`
    Group {
        key: Option<String>,
        accumulators: Vec<(String, Accumulator)>,
    },
    Sort {
        field: String,
        order: SortOrder,
    },
    /// Reshape documents; only the listed output fields survive
    Project(Vec<(String, ProjectExpr)>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Accumulator {
    Avg(String),
    AddToSet(String),
    Sum(String),
    Count,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ProjectExpr {
    Field(String),
    /// Length of an array field
    Size(String),
}

pub type Pipeline = Vec<Stage>;

/// Collections a pipeline joins against
pub fn foreign_collections(pipeline: &[Stage]) -> Vec<&str> {
    pipeline
        .iter()
        .filter_map(|stage| match stage {
            Stage::Lookup { from, .. } => Some(from.as_str()),
            _ => None,
        })
        .collect()
}

/// Run a pipeline over `docs`; `foreign` holds every collection named by a lookup
pub fn evaluate(
    docs: Vec<Document>,
    pipeline: &[Stage],
    foreign: &HashMap<String, Vec<Document>>,
) -> StoreResult<Vec<Document>> {
    pipeline
        .iter()
        .try_fold(docs, |docs, stage| apply_stage(docs, stage, foreign))
}

fn apply_stage(
    docs: Vec<Document>,
    stage: &Stage,
    foreign: &HashMap<String, Vec<Document>>,
) -> StoreResult<Vec<Document>> {
    match stage {
        Stage::Match(filter) => Ok(docs.into_iter().filter(|d| filter.matches(d)).collect()),
        Stage::Lookup {
            from,
            local_field,
            foreign_field,
            as_field,
        } => {
            let others = foreign.get(from).map(Vec::as_slice).unwrap_or_default();
            Ok(lookup(docs, others, local_field, foreign_field, as_field))
        }
        Stage::Unwind(path) => Ok(unwind(docs, path)),
        Stage::Group { key, accumulators } => group(docs, key.as_deref(), accumulators),
        Stage::Sort { field: path, order } => {
            let mut docs = docs;
            docs.sort_by(|a, b| {
                let ord = compare_values(field(a, path), field(b, path));
                match order {
                    SortOrder::Ascending => ord,
                    SortOrder::Descending => ord.reverse(),
                }
            });
            Ok(docs)
        }
        Stage::Project(fields) => docs.iter().map(|d| project(d, fields)).collect(),
    }
}

fn lookup(
    docs: Vec<Document>,
    others: &[Document],
    local_field: &str,
    foreign_field: &str,
    as_field: &str,
) -> Vec<Document> {
    let mut by_key: HashMap<String, Vec<Value>> = HashMap::new();
    for other in others {
        if let Some(k) = field(other, foreign_field) {
            by_key
                .entry(canonical_key(k))
                .or_default()
                .push(Value::Object(other.clone()));
        }
    }

    docs.into_iter()
        .map(|mut doc| {
            let joined = field(&doc, local_field)
                .and_then(|k| by_key.get(&canonical_key(k)))
                .cloned()
                .unwrap_or_default();
            doc.insert(as_field.to_string(), Value::Array(joined));
            doc
        })
        .collect()
}

fn unwind(docs: Vec<Document>, path: &str) -> Vec<Document> {
    let mut out = Vec::with_capacity(docs.len());
    for doc in docs {
        match doc.get(path) {
            Some(Value::Array(items)) => {
                for item in items.clone() {
                    let mut copy = doc.clone();
                    copy.insert(path.to_string(), item);
                    out.push(copy);
                }
            }
            Some(Value::Null) | None => {}
            Some(_) => out.push(doc),
        }
    }
    out
}

enum AccState {
    Avg { sum: f64, n: u64 },
    /// Distinct values in first-seen order, keyed for O(1) membership
    Set { keys: HashSet<String>, values: Vec<Value> },
    Sum(f64),
    Count(u64),
}

impl AccState {
    fn new(acc: &Accumulator) -> Self {
        match acc {
            Accumulator::Avg(_) => AccState::Avg { sum: 0.0, n: 0 },
            Accumulator::AddToSet(_) => AccState::Set {
                keys: HashSet::new(),
                values: Vec::new(),
            },
            Accumulator::Sum(_) => AccState::Sum(0.0),
            Accumulator::Count => AccState::Count(0),
        }
    }

    fn feed(&mut self, acc: &Accumulator, doc: &Document) {
        match (self, acc) {
            (AccState::Avg { sum, n }, Accumulator::Avg(path)) => {
                if let Some(x) = field(doc, path).and_then(Value::as_f64) {
                    *sum += x;
                    *n += 1;
                }
            }
            (AccState::Set { keys, values }, Accumulator::AddToSet(path)) => {
                if let Some(v) = field(doc, path) {
                    if keys.insert(canonical_key(v)) {
                        values.push(v.clone());
                    }
                }
            }
            (AccState::Sum(total), Accumulator::Sum(path)) => {
                *total += field(doc, path).and_then(Value::as_f64).unwrap_or(0.0);
            }
            (AccState::Count(n), Accumulator::Count) => *n += 1,
            _ => {}
        }
    }

    fn finish(self) -> Value {
        match self {
            AccState::Avg { n: 0, .. } => Value::Null,
            AccState::Avg { sum, n } => float_value(sum / n as f64),
            AccState::Set { values, .. } => Value::Array(values),
            AccState::Sum(total) => float_value(total),
            AccState::Count(n) => Value::from(n),
        }
    }
}

fn group(
    docs: Vec<Document>,
    key: Option<&str>,
    accumulators: &[(String, Accumulator)],
) -> StoreResult<Vec<Document>> {
    let mut order: Vec<(Value, Vec<AccState>)> = Vec::new();
    let mut slots: HashMap<String, usize> = HashMap::new();

    for doc in &docs {
        let id = match key {
            Some(path) => field(doc, path).cloned().unwrap_or(Value::Null),
            None => Value::Null,
        };
        let slot = *slots.entry(canonical_key(&id)).or_insert_with(|| {
            order.push((
                id.clone(),
                accumulators.iter().map(|(_, a)| AccState::new(a)).collect(),
            ));
            order.len() - 1
        });
        for (state, (_, acc)) in order[slot].1.iter_mut().zip(accumulators) {
            state.feed(acc, doc);
        }
    }

    Ok(order
        .into_iter()
        .map(|(id, states)| {
            let mut out = Document::new();
            out.insert("_id".to_string(), id);
            for ((name, _), state) in accumulators.iter().zip(states) {
                out.insert(name.clone(), state.finish());
            }
            out
        })
        .collect())
}

fn project(doc: &Document, fields: &[(String, ProjectExpr)]) -> StoreResult<Document> {
    let mut out = Document::new();
    for (name, expr) in fields {
        match expr {
            ProjectExpr::Field(path) => {
                if let Some(v) = field(doc, path) {
                    out.insert(name.clone(), v.clone());
                }
            }
            ProjectExpr::Size(path) => match field(doc, path) {
                Some(Value::Array(items)) => {
                    out.insert(name.clone(), Value::from(items.len()));
                }
                other => {
                    return Err(StoreError::invalid_pipeline(format!(
                        "size of '{}' requires an array, found {:?}",
                        path, other
                    )))
                }
            },
        }
    }
    Ok(out)
}

/// Stable hash key: integral floats collapse onto their integer form
fn canonical_key(v: &Value) -> String {
    match v {
        Value::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => i.to_string(),
            (None, Some(f)) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
                (f as i64).to_string()
            }
            _ => n.to_string(),
        },
        other => other.to_string(),
    }
}

fn float_value(x: f64) -> Value {
    Number::from_f64(x).map(Value::Number).unwrap_or(Value::Null)
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Null), Some(Value::Null)) => Ordering::Equal,
        (Some(Value::Null), Some(_)) => Ordering::Less,
        (Some(_), Some(Value::Null)) => Ordering::Greater,
        (Some(x), Some(y)) => x.to_string().cmp(&y.to_string()),
    }
}
