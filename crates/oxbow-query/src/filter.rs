use std::cmp::Ordering;

use oxbow_types::{Document, FieldValue};

use crate::error::{QueryError, QueryResult};

/// A comparison operator in a field condition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    In,
    Nin,
}

impl FilterOp {
    /// Parse the underscore-prefixed operator name used in query documents.
    pub fn parse(op: &str) -> QueryResult<Self> {
        match op {
            "_eq" => Ok(FilterOp::Eq),
            "_ne" => Ok(FilterOp::Ne),
            "_gt" => Ok(FilterOp::Gt),
            "_ge" => Ok(FilterOp::Ge),
            "_lt" => Ok(FilterOp::Lt),
            "_le" => Ok(FilterOp::Le),
            "_in" => Ok(FilterOp::In),
            "_nin" => Ok(FilterOp::Nin),
            other => Err(QueryError::UnknownOperator(other.to_string())),
        }
    }
}

/// A single condition on one field.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldCondition {
    pub field: String,
    pub op: FilterOp,
    /// One value for scalar operators; the candidate set for `_in`/`_nin`.
    pub values: Vec<FieldValue>,
}

impl FieldCondition {
    fn matches(&self, doc: &Document) -> bool {
        let actual = doc.get(&self.field).unwrap_or(&FieldValue::Null);
        match self.op {
            FilterOp::Eq => self.first_equals(actual),
            FilterOp::Ne => !self.first_equals(actual),
            FilterOp::Gt => self.first_orders(actual, &[Ordering::Greater]),
            FilterOp::Ge => self.first_orders(actual, &[Ordering::Greater, Ordering::Equal]),
            FilterOp::Lt => self.first_orders(actual, &[Ordering::Less]),
            FilterOp::Le => self.first_orders(actual, &[Ordering::Less, Ordering::Equal]),
            FilterOp::In => self
                .values
                .iter()
                .any(|v| actual.compare(v) == Some(Ordering::Equal)),
            FilterOp::Nin => !self
                .values
                .iter()
                .any(|v| actual.compare(v) == Some(Ordering::Equal)),
        }
    }

    fn first_equals(&self, actual: &FieldValue) -> bool {
        self.values
            .first()
            .map(|v| actual.compare(v) == Some(Ordering::Equal))
            .unwrap_or(false)
    }

    fn first_orders(&self, actual: &FieldValue, accepted: &[Ordering]) -> bool {
        self.values
            .first()
            .and_then(|v| actual.compare(v))
            .map(|ordering| accepted.contains(&ordering))
            .unwrap_or(false)
    }
}

/// A filter tree over document fields.
#[derive(Clone, Debug, PartialEq)]
pub enum Filter {
    Condition(FieldCondition),
    And(Vec<Filter>),
    Or(Vec<Filter>),
}

impl Filter {
    pub fn condition(field: impl Into<String>, op: FilterOp, value: FieldValue) -> Self {
        Filter::Condition(FieldCondition {
            field: field.into(),
            op,
            values: vec![value],
        })
    }

    pub fn eq(field: impl Into<String>, value: FieldValue) -> Self {
        Self::condition(field, FilterOp::Eq, value)
    }

    pub fn le(field: impl Into<String>, value: FieldValue) -> Self {
        Self::condition(field, FilterOp::Le, value)
    }

    pub fn is_in(field: impl Into<String>, values: Vec<FieldValue>) -> Self {
        Filter::Condition(FieldCondition {
            field: field.into(),
            op: FilterOp::In,
            values,
        })
    }

    /// Whether the document satisfies this filter. Values of unrelated types
    /// are unordered and fail ordered comparisons.
    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Filter::Condition(condition) => condition.matches(doc),
            Filter::And(filters) => filters.iter().all(|f| f.matches(doc)),
            Filter::Or(filters) => filters.iter().any(|f| f.matches(doc)),
        }
    }

    /// The first equality condition in this filter usable as an index probe:
    /// a top-level `_eq`, or an `_eq` conjunct of a top-level `_and`.
    pub fn leading_eq(&self) -> Option<(&str, &FieldValue)> {
        match self {
            Filter::Condition(c) if c.op == FilterOp::Eq => {
                c.values.first().map(|v| (c.field.as_str(), v))
            }
            Filter::And(filters) => filters.iter().find_map(|f| f.leading_eq()),
            _ => None,
        }
    }
}
