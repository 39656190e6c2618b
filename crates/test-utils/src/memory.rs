//! In-memory repository that evaluates queryables over JSON rows.
//!
//! Mirrors the SQL rendering closely enough for pipeline tests: comparisons
//! against NULL are false, empty `IN` lists match nothing, a null list member
//! matches NULL cells, ascending sorts put NULLs last, and counts are distinct
//! over the primary key.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{Map, Value};
use sifter_core::{CompareOp, FilterValue, Predicate, Queryable, Repository, SortDirection};

type Row = Map<String, Value>;

/// Repository over a fixed set of rows.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    rows: Vec<Row>,
    failure: Option<String>,
    executed: Mutex<Vec<Queryable>>,
}

impl MemoryRepository {
    /// Load rows. Values that are not JSON objects are skipped.
    pub fn new(rows: impl IntoIterator<Item = Value>) -> Self {
        let rows = rows
            .into_iter()
            .filter_map(|row| match row {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .collect();
        Self {
            rows,
            ..Default::default()
        }
    }

    /// A repository whose every call fails with `message`.
    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Default::default()
        }
    }

    /// Queryables passed to `execute` and `count`, in call order.
    pub fn executed(&self) -> Vec<Queryable> {
        self.executed
            .lock()
            .map(|queries| queries.clone())
            .unwrap_or_default()
    }

    fn record(&self, query: &Queryable) -> anyhow::Result<()> {
        if let Ok(mut queries) = self.executed.lock() {
            queries.push(query.clone());
        }
        match &self.failure {
            Some(message) => Err(anyhow::anyhow!("{message}")),
            None => Ok(()),
        }
    }

    fn matching<'a>(&'a self, query: &'a Queryable) -> impl Iterator<Item = &'a Row> + 'a {
        self.rows
            .iter()
            .filter(move |row| query.predicates().iter().all(|p| eval(p, row)))
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    type Record = Value;

    async fn execute(&self, query: &Queryable) -> anyhow::Result<Vec<Value>> {
        self.record(query)?;

        let mut rows: Vec<&Row> = self.matching(query).collect();
        rows.sort_by(|a, b| {
            query
                .orderings()
                .iter()
                .map(|o| {
                    let field = o.field.as_str();
                    let ord = compare_nulls_last(a.get(field), b.get(field));
                    match o.direction {
                        SortDirection::Asc => ord,
                        SortDirection::Desc => ord.reverse(),
                    }
                })
                .find(|ord| *ord != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        });

        let offset = usize::try_from(query.offset().unwrap_or(0)).unwrap_or(usize::MAX);
        let limit = query
            .limit()
            .map_or(usize::MAX, |l| usize::try_from(l).unwrap_or(usize::MAX));

        Ok(rows
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|row| Value::Object(row.clone()))
            .collect())
    }

    async fn count(&self, query: &Queryable) -> anyhow::Result<u64> {
        self.record(query)?;

        let pk = query.schema().primary_key().as_str();
        let distinct: HashSet<String> = self
            .matching(query)
            .filter_map(|row| row.get(pk))
            .filter(|value| !value.is_null())
            .map(Value::to_string)
            .collect();
        Ok(distinct.len() as u64)
    }
}

fn eval(predicate: &Predicate, row: &Row) -> bool {
    match predicate {
        Predicate::Compare { field, op, value } => {
            let Some(ord) = row.get(field.as_str()).and_then(|v| compare(v, value)) else {
                return false;
            };
            match op {
                CompareOp::Eq => ord == Ordering::Equal,
                CompareOp::Ne => ord != Ordering::Equal,
                CompareOp::Gt => ord == Ordering::Greater,
                CompareOp::Gte => ord != Ordering::Less,
                CompareOp::Lt => ord == Ordering::Less,
                CompareOp::Lte => ord != Ordering::Greater,
            }
        }
        Predicate::In {
            field,
            values,
            negated,
        } => {
            if values
                .iter()
                .any(|v| !v.is_scalar() && *v != FilterValue::Null)
            {
                return false;
            }
            let with_null = values.contains(&FilterValue::Null);
            let scalars: Vec<&FilterValue> = values.iter().filter(|v| v.is_scalar()).collect();
            if scalars.is_empty() && !with_null {
                return *negated;
            }

            match row.get(field.as_str()).filter(|v| !v.is_null()) {
                // IS NULL / IS NOT NULL member.
                None => with_null && !*negated,
                Some(cell) => {
                    let found = scalars
                        .iter()
                        .any(|v| compare(cell, v) == Some(Ordering::Equal));
                    found != *negated
                }
            }
        }
        Predicate::Null { field, negated } => {
            let is_null = row.get(field.as_str()).is_none_or(Value::is_null);
            is_null != *negated
        }
        Predicate::Contains { field, needle } => row
            .get(field.as_str())
            .and_then(Value::as_str)
            .is_some_and(|s| s.contains(needle.as_str())),
        Predicate::Any(predicates) => predicates.iter().any(|p| eval(p, row)),
    }
}

/// Compare a row cell with a filter value. `None` when they are incomparable.
fn compare(cell: &Value, value: &FilterValue) -> Option<Ordering> {
    match (cell, value) {
        (Value::Number(n), FilterValue::Integer(i)) => n.as_f64()?.partial_cmp(&(*i as f64)),
        (Value::Number(n), FilterValue::Float(f)) => n.as_f64()?.partial_cmp(f),
        (Value::String(s), FilterValue::String(v)) => Some(s.as_str().cmp(v.as_str())),
        (Value::Bool(b), FilterValue::Boolean(v)) => Some(b.cmp(v)),
        _ => None,
    }
}

fn compare_nulls_last(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => compare_cells(a, b),
    }
}

fn compare_cells(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => a.to_string().cmp(&b.to_string()),
    }
}
