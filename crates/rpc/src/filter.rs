//! Structured search filters.
//!
//! Filters are trees of comparisons over top-level object fields. They render
//! as LDAP-style strings (`(&(field1>=6)(field1<=10))`) for logging.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::ObjectValue;

/// A predicate over an object's fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Filter {
    /// `field == value`
    Eq(String, Value),
    /// `field >= value`
    Ge(String, Value),
    /// `field <= value`
    Le(String, Value),
    /// `field` is set (any value other than null)
    Present(String),
    /// All children match
    And(Vec<Filter>),
    /// Any child matches
    Or(Vec<Filter>),
    /// Child does not match
    Not(Box<Filter>),
}

impl Filter {
    /// `field == value`
    pub fn equal(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Eq(field.into(), value.into())
    }

    /// `field >= value`
    pub fn ge(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Ge(field.into(), value.into())
    }

    /// `field <= value`
    pub fn le(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Le(field.into(), value.into())
    }

    /// `field` is present
    pub fn present(field: impl Into<String>) -> Self {
        Filter::Present(field.into())
    }

    /// Inclusive range `low <= field <= high`.
    pub fn range(field: impl Into<String>, low: impl Into<Value>, high: impl Into<Value>) -> Self {
        let field = field.into();
        Filter::And(vec![Filter::ge(field.clone(), low), Filter::le(field, high)])
    }

    /// Evaluate against an object value.
    pub fn matches(&self, value: &ObjectValue) -> bool {
        match self {
            Filter::Eq(field, expected) => value
                .get(field)
                .and_then(|actual| compare(actual, expected))
                .map_or(false, |ord| ord == Ordering::Equal),
            Filter::Ge(field, bound) => value
                .get(field)
                .and_then(|actual| compare(actual, bound))
                .map_or(false, |ord| ord != Ordering::Less),
            Filter::Le(field, bound) => value
                .get(field)
                .and_then(|actual| compare(actual, bound))
                .map_or(false, |ord| ord != Ordering::Greater),
            Filter::Present(field) => value.get(field).map_or(false, |v| !v.is_null()),
            Filter::And(children) => children.iter().all(|c| c.matches(value)),
            Filter::Or(children) => children.iter().any(|c| c.matches(value)),
            Filter::Not(child) => !child.matches(value),
        }
    }

    /// Every field the filter references.
    pub fn fields(&self) -> BTreeSet<&str> {
        let mut out = BTreeSet::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields<'a>(&'a self, out: &mut BTreeSet<&'a str>) {
        match self {
            Filter::Eq(field, _)
            | Filter::Ge(field, _)
            | Filter::Le(field, _)
            | Filter::Present(field) => {
                out.insert(field.as_str());
            }
            Filter::And(children) | Filter::Or(children) => {
                for child in children {
                    child.collect_fields(out);
                }
            }
            Filter::Not(child) => child.collect_fields(out),
        }
    }

    /// Structural check: boolean combinators must have children.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Filter::And(children) | Filter::Or(children) => {
                if children.is_empty() {
                    return Err(format!("empty combinator in {}", self));
                }
                children.iter().try_for_each(Filter::validate)
            }
            Filter::Not(child) => child.validate(),
            Filter::Eq(field, _)
            | Filter::Ge(field, _)
            | Filter::Le(field, _)
            | Filter::Present(field) => {
                if field.is_empty() {
                    Err("filter field name is empty".to_string())
                } else {
                    Ok(())
                }
            }
        }
    }
}

// Numbers compare numerically, strings and booleans by value; anything else
// is incomparable.
fn compare(actual: &Value, expected: &Value) -> Option<Ordering> {
    match (actual, expected) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::Eq(field, v) => write!(f, "({}={})", field, render(v)),
            Filter::Ge(field, v) => write!(f, "({}>={})", field, render(v)),
            Filter::Le(field, v) => write!(f, "({}<={})", field, render(v)),
            Filter::Present(field) => write!(f, "({}=*)", field),
            Filter::And(children) => {
                f.write_str("(&")?;
                for child in children {
                    write!(f, "{}", child)?;
                }
                f.write_str(")")
            }
            Filter::Or(children) => {
                f.write_str("(|")?;
                for child in children {
                    write!(f, "{}", child)?;
                }
                f.write_str(")")
            }
            Filter::Not(child) => write!(f, "(!{})", child),
        }
    }
}

fn render(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
