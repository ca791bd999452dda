//! Predicates, ordering and paging for repository reads

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A column value as seen by the query layer
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i32),
    Text(String),
    Uuid(Uuid),
    Timestamp(DateTime<Utc>),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }
}

/// Values of different kinds, and NULLs, are unordered
impl PartialOrd for FieldValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (FieldValue::Bool(a), FieldValue::Bool(b)) => a.partial_cmp(b),
            (FieldValue::Int(a), FieldValue::Int(b)) => a.partial_cmp(b),
            (FieldValue::Text(a), FieldValue::Text(b)) => a.partial_cmp(b),
            (FieldValue::Uuid(a), FieldValue::Uuid(b)) => a.partial_cmp(b),
            (FieldValue::Timestamp(a), FieldValue::Timestamp(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        FieldValue::Int(value)
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<Uuid> for FieldValue {
    fn from(value: Uuid) -> Self {
        FieldValue::Uuid(value)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(value: DateTime<Utc>) -> Self {
        FieldValue::Timestamp(value)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(FieldValue::Null)
    }
}

/// A single predicate on one column. Comparisons with NULL never match, as in SQL.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq(&'static str, FieldValue),
    Ne(&'static str, FieldValue),
    Lt(&'static str, FieldValue),
    Lte(&'static str, FieldValue),
    Gt(&'static str, FieldValue),
    Gte(&'static str, FieldValue),
    IsNull(&'static str),
    IsNotNull(&'static str),
    In(&'static str, Vec<FieldValue>),
    /// Case-insensitive substring match
    Contains(&'static str, String),
}

impl Condition {
    pub fn column(&self) -> &'static str {
        match self {
            Condition::Eq(c, _)
            | Condition::Ne(c, _)
            | Condition::Lt(c, _)
            | Condition::Lte(c, _)
            | Condition::Gt(c, _)
            | Condition::Gte(c, _)
            | Condition::IsNull(c)
            | Condition::IsNotNull(c)
            | Condition::In(c, _)
            | Condition::Contains(c, _) => c,
        }
    }

    /// Evaluate against an in-memory column value
    pub fn matches(&self, value: &FieldValue) -> bool {
        let compare = |expected: &FieldValue| -> Option<Ordering> {
            if value.is_null() || expected.is_null() {
                None
            } else {
                value.partial_cmp(expected)
            }
        };

        match self {
            Condition::Eq(_, expected) => compare(expected) == Some(Ordering::Equal),
            Condition::Ne(_, expected) => {
                matches!(compare(expected), Some(Ordering::Less | Ordering::Greater))
            }
            Condition::Lt(_, expected) => compare(expected) == Some(Ordering::Less),
            Condition::Lte(_, expected) => {
                matches!(compare(expected), Some(Ordering::Less | Ordering::Equal))
            }
            Condition::Gt(_, expected) => compare(expected) == Some(Ordering::Greater),
            Condition::Gte(_, expected) => {
                matches!(compare(expected), Some(Ordering::Greater | Ordering::Equal))
            }
            Condition::IsNull(_) => value.is_null(),
            Condition::IsNotNull(_) => !value.is_null(),
            Condition::In(_, candidates) => candidates
                .iter()
                .any(|candidate| compare(candidate) == Some(Ordering::Equal)),
            Condition::Contains(_, needle) => match value {
                FieldValue::Text(text) => text.to_lowercase().contains(&needle.to_lowercase()),
                _ => false,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

/// 1-based page request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: i64,
    pub per_page: i64,
}

impl PageRequest {
    pub const DEFAULT_PER_PAGE: i64 = 20;
    pub const MAX_PER_PAGE: i64 = 100;

    pub fn new(page: i64, per_page: i64) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.clamp(1, Self::MAX_PER_PAGE),
        }
    }

    pub fn from_params(page: Option<i64>, per_page: Option<i64>) -> Self {
        Self::new(page.unwrap_or(1), per_page.unwrap_or(Self::DEFAULT_PER_PAGE))
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.per_page
    }
}

/// One page of results together with the unpaged total
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: i64, request: Option<PageRequest>) -> Self {
        let (page, per_page) = match request {
            Some(request) => (request.page, request.per_page),
            None => (1, total.max(1)),
        };
        Self {
            items,
            total,
            page,
            per_page,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            per_page: self.per_page,
        }
    }
}

/// Repository read request. Soft-deleted rows are excluded unless `with_deleted` is set.
#[derive(Debug, Clone, Default)]
pub struct Query {
    pub(crate) conditions: Vec<Condition>,
    pub(crate) order_by: Vec<(&'static str, SortDirection)>,
    pub(crate) page: Option<PageRequest>,
    pub(crate) with_deleted: bool,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn by_id(id: Uuid) -> Self {
        Self::new().eq("id", id)
    }

    pub fn filter(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn eq(self, column: &'static str, value: impl Into<FieldValue>) -> Self {
        self.filter(Condition::Eq(column, value.into()))
    }

    /// Adds the condition only when a value is given
    pub fn eq_opt<V: Into<FieldValue>>(self, column: &'static str, value: Option<V>) -> Self {
        match value {
            Some(value) => self.eq(column, value),
            None => self,
        }
    }

    pub fn contains_opt(self, column: &'static str, needle: Option<&str>) -> Self {
        match needle.map(str::trim).filter(|needle| !needle.is_empty()) {
            Some(needle) => self.filter(Condition::Contains(column, needle.to_string())),
            None => self,
        }
    }

    pub fn order_by(mut self, column: &'static str, direction: SortDirection) -> Self {
        self.order_by.push((column, direction));
        self
    }

    pub fn paginate(mut self, page: PageRequest) -> Self {
        self.page = Some(page);
        self
    }

    pub fn with_deleted(mut self) -> Self {
        self.with_deleted = true;
        self
    }

    /// Every column referenced by conditions and ordering
    pub fn columns(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.conditions
            .iter()
            .map(Condition::column)
            .chain(self.order_by.iter().map(|(column, _)| *column))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_never_equals() {
        let condition = Condition::Eq("deleted_date", FieldValue::Null);
        assert!(!condition.matches(&FieldValue::Null));
        assert!(Condition::IsNull("deleted_date").matches(&FieldValue::Null));
    }

    #[test]
    fn test_comparisons() {
        let value = FieldValue::Int(5);
        assert!(Condition::Gt("page", 4.into()).matches(&value));
        assert!(Condition::Lte("page", 5.into()).matches(&value));
        assert!(!Condition::Lt("page", 5.into()).matches(&value));
        assert!(Condition::Ne("page", 6.into()).matches(&value));
        assert!(!Condition::Eq("page", "5".into()).matches(&value));
        assert!(Condition::In("page", vec![1.into(), 5.into()]).matches(&value));
    }

    #[test]
    fn test_contains_is_case_insensitive() {
        let value = FieldValue::from("The Name of the Rose");
        assert!(Condition::Contains("name", "ROSE".into()).matches(&value));
        assert!(!Condition::Contains("name", "tulip".into()).matches(&value));
    }

    #[test]
    fn test_page_request_is_clamped() {
        let page = PageRequest::new(0, 1000);
        assert_eq!(page.page, 1);
        assert_eq!(page.per_page, PageRequest::MAX_PER_PAGE);
        assert_eq!(PageRequest::new(3, 10).offset(), 20);
    }

    #[test]
    fn test_optional_filters_are_skipped() {
        let query = Query::new()
            .eq_opt::<Uuid>("book_id", None)
            .contains_opt("name", Some("  "));
        assert!(query.conditions.is_empty());
    }
}
