//! Backing-store boundary and an in-memory implementation.
//!
//! [`IssueStore`] is the single call the executor makes into storage.
//! [`MemoryStore`] evaluates compiled predicates over JSON issue records with
//! SQL-like semantics: comparisons against a missing or null column never
//! match, and array-valued columns (such as `labels`) match when any element
//! does.

use crate::ast::Direction;
use crate::predicate::{Comparison, CompiledQuery, Predicate, SortKey};
use crate::resolver::Value;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{Map, Value as Json};
use std::cmp::Ordering;
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Failures raised by a backing store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("query failed: {0}")]
    Query(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to decode issues: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Storage that can filter and sort issues by a compiled query
pub trait IssueStore {
    type Record;

    fn fetch(&self, query: &CompiledQuery) -> Result<Vec<Self::Record>, StoreError>;
}

/// An issue record keyed by storage column
pub type Issue = Map<String, Json>;

/// Issues held in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    issues: Vec<Issue>,
}

impl MemoryStore {
    pub fn new(issues: Vec<Issue>) -> Self {
        Self { issues }
    }

    /// Load a JSON array of issue objects
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let content = fs::read_to_string(path)?;
        let issues: Vec<Issue> = serde_json::from_str(&content)?;
        Ok(Self::new(issues))
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }
}

impl IssueStore for MemoryStore {
    type Record = Issue;

    fn fetch(&self, query: &CompiledQuery) -> Result<Vec<Issue>, StoreError> {
        let mut matched: Vec<Issue> = self
            .issues
            .iter()
            .filter(|issue| matches(&query.predicate, issue))
            .cloned()
            .collect();

        // stable sort keeps insertion order among ties
        matched.sort_by(|a, b| compare_records(a, b, &query.order));

        debug!(total = self.issues.len(), matched = matched.len(), "memory store fetch");
        Ok(matched)
    }
}

/// Evaluate a predicate against one issue
fn matches(predicate: &Predicate, issue: &Issue) -> bool {
    match predicate {
        Predicate::Always => true,
        Predicate::Compare { column, op, value } => {
            let Some(field) = present(issue, column) else {
                return false;
            };
            match field {
                // != on a list means no element equals the value
                Json::Array(items) if *op == Comparison::NotEq => {
                    !items.iter().any(|item| compare(item, Comparison::Eq, value))
                }
                Json::Array(items) => items.iter().any(|item| compare(item, *op, value)),
                field => compare(field, *op, value),
            }
        }
        Predicate::IsNull { column, negated } => present(issue, column).is_none() != *negated,
        Predicate::InList { column, values, negated } => {
            let Some(field) = present(issue, column) else {
                return false;
            };
            let hit = elements(field)
                .iter()
                .any(|item| values.iter().any(|value| compare(item, Comparison::Eq, value)));
            hit != *negated
        }
        Predicate::Contains { column, needle, negated } => {
            let Some(field) = present(issue, column) else {
                return false;
            };
            let needle = needle.to_lowercase();
            let hit = elements(field)
                .iter()
                .any(|item| json_text(item).to_lowercase().contains(&needle));
            hit != *negated
        }
        Predicate::And(left, right) => matches(left, issue) && matches(right, issue),
        Predicate::Or(left, right) => matches(left, issue) || matches(right, issue),
        Predicate::Not(inner) => !matches(inner, issue),
        Predicate::Group(inner) => matches(inner, issue),
        Predicate::Any(items) => items.iter().any(|item| matches(item, issue)),
        Predicate::All(items) => items.iter().all(|item| matches(item, issue)),
    }
}

/// A non-null column value
fn present<'a>(issue: &'a Issue, column: &str) -> Option<&'a Json> {
    issue.get(column).filter(|value| !value.is_null())
}

fn elements(field: &Json) -> Vec<&Json> {
    match field {
        Json::Array(items) => items.iter().collect(),
        field => vec![field],
    }
}

fn json_text(field: &Json) -> String {
    match field {
        Json::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn compare(field: &Json, op: Comparison, value: &Value) -> bool {
    let Some(ordering) = order_against(field, value) else {
        return false;
    };
    match op {
        Comparison::Eq => ordering == Ordering::Equal,
        Comparison::NotEq => ordering != Ordering::Equal,
        Comparison::Gt => ordering == Ordering::Greater,
        Comparison::Lt => ordering == Ordering::Less,
        Comparison::Gte => ordering != Ordering::Less,
        Comparison::Lte => ordering != Ordering::Greater,
    }
}

/// Order a stored value against a resolved one, `None` when incomparable
fn order_against(field: &Json, value: &Value) -> Option<Ordering> {
    match value {
        Value::Null => None,
        Value::Empty => Some(json_text(field).as_str().cmp("")),
        Value::Integer(n) => field.as_f64()?.partial_cmp(&(*n as f64)),
        Value::Float(n) => field.as_f64()?.partial_cmp(n),
        Value::Timestamp(t) => parse_timestamp(field.as_str()?).map(|stored| stored.cmp(t)),
        Value::Text(s) => match field {
            Json::String(stored) => Some(stored.as_str().cmp(s.as_str())),
            Json::Number(_) => {
                let wanted: f64 = s.parse().ok()?;
                field.as_f64()?.partial_cmp(&wanted)
            }
            Json::Bool(b) => Some(b.to_string().as_str().cmp(s.as_str())),
            _ => None,
        },
    }
}

/// RFC 3339 timestamps or plain `YYYY-MM-DD` dates at midnight UTC
fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Some(t.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn compare_records(a: &Issue, b: &Issue, order: &[SortKey]) -> Ordering {
    for key in order {
        let ordering = match (present(a, &key.column), present(b, &key.column)) {
            (None, None) => Ordering::Equal,
            // nulls sort last in either direction
            (None, Some(_)) => return Ordering::Greater,
            (Some(_), None) => return Ordering::Less,
            (Some(x), Some(y)) => {
                let ordering = compare_json(x, y);
                match key.direction {
                    Direction::Asc => ordering,
                    Direction::Desc => ordering.reverse(),
                }
            }
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

fn compare_json(a: &Json, b: &Json) -> Ordering {
    match (a, b) {
        (Json::Number(x), Json::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Json::String(x), Json::String(y)) => match (parse_timestamp(x), parse_timestamp(y)) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => x.cmp(y),
        },
        _ => json_text(a).cmp(&json_text(b)),
    }
}
