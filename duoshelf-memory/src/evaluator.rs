//! Query expression evaluation for in-memory document filtering.
//!
//! This module provides the evaluation engine for query expressions, following the
//! document-database rules for dot-paths: a path that reaches an array continues into
//! every element, and most operators match when any reached value (or any element of a
//! reached array) matches.

use std::{cmp::Ordering, collections::HashMap};

use bson::{Bson, Document, datetime::DateTime};
use regex::Regex;

use duoshelf_core::{
    error::{DocumentStoreError, DocumentStoreResult},
    query::{Expr, FieldOp, QueryVisitor},
};

/// Type-erased, comparable representation of BSON values.
///
/// Numeric types are normalized to f64 so that `1` and `1.0` compare equal.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    Null,
    Bool(bool),
    Number(f64),
    DateTime(DateTime),
    String(&'a str),
    Binary(u8, &'a [u8]),
    Array(Vec<Comparable<'a>>),
    Map(HashMap<&'a str, Comparable<'a>>),
    /// Anything else (timestamps, regexes, ...): never equal, never ordered.
    Other,
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Null => Comparable::Null,
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Number(*value as f64),
            Bson::Int64(value) => Comparable::Number(*value as f64),
            Bson::Double(value) => Comparable::Number(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::String(value) => Comparable::String(value),
            Bson::Binary(binary) => Comparable::Binary(u8::from(binary.subtype), &binary.bytes),
            Bson::Array(arr) => Comparable::Array(arr.iter().map(Comparable::from).collect()),
            Bson::Document(doc) => Comparable::Map(
                doc.iter()
                    .map(|(k, v)| (k.as_str(), Comparable::from(v)))
                    .collect(),
            ),
            _ => Comparable::Other,
        }
    }
}

impl<'a> PartialEq for Comparable<'a> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Number(a), Comparable::Number(b)) => a == b,
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::Binary(sa, a), Comparable::Binary(sb, b)) => sa == sb && a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl<'a> PartialOrd for Comparable<'a> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

impl<'a> Comparable<'a> {
    /// Total order used for sorting: values of different types are ordered by type
    /// (null, numbers, strings, objects, arrays, binary, booleans, dates).
    pub(crate) fn sort_cmp(&self, other: &Self) -> Ordering {
        self.rank()
            .cmp(&other.rank())
            .then_with(|| self.partial_cmp(other).unwrap_or(Ordering::Equal))
    }

    fn rank(&self) -> u8 {
        match self {
            Comparable::Null => 0,
            Comparable::Number(_) => 1,
            Comparable::String(_) => 2,
            Comparable::Map(_) => 3,
            Comparable::Array(_) => 4,
            Comparable::Binary(..) => 5,
            Comparable::Bool(_) => 6,
            Comparable::DateTime(_) => 7,
            Comparable::Other => 8,
        }
    }
}

/// Every value reached by `path`, descending into arrays of documents.
pub(crate) fn values_at<'a>(document: &'a Document, path: &str) -> Vec<&'a Bson> {
    let segments: Vec<&str> = path.split('.').collect();
    let mut out = Vec::new();

    if let Some((head, rest)) = segments.split_first() {
        if let Some(value) = document.get(*head) {
            descend(value, rest, &mut out);
        }
    }

    out
}

fn descend<'a>(value: &'a Bson, segments: &[&str], out: &mut Vec<&'a Bson>) {
    let Some((head, rest)) = segments.split_first() else {
        out.push(value);
        return;
    };

    match value {
        Bson::Document(document) => {
            if let Some(child) = document.get(*head) {
                descend(child, rest, out);
            }
        }
        Bson::Array(items) => {
            for item in items.iter().filter(|item| matches!(item, Bson::Document(_))) {
                descend(item, segments, out);
            }
        }
        _ => {}
    }
}

/// Reached values plus the elements of reached arrays.
pub(crate) fn unwind<'a>(values: Vec<&'a Bson>) -> Vec<&'a Bson> {
    let mut out = Vec::with_capacity(values.len());

    for value in values {
        out.push(value);
        if let Bson::Array(items) = value {
            out.extend(items.iter());
        }
    }

    out
}

pub(crate) struct DocumentEvaluator<'a> {
    document: &'a Document,
}

impl<'a> DocumentEvaluator<'a> {
    pub fn new(document: &'a Document) -> Self {
        Self { document }
    }

    pub fn evaluate(&mut self, expr: &Expr) -> DocumentStoreResult<bool> {
        self.visit_expr(expr)
    }

    /// Evaluates `filter` (or nothing) against `document`.
    pub fn matches(document: &Document, filter: Option<&Expr>) -> DocumentStoreResult<bool> {
        match filter {
            Some(expr) => DocumentEvaluator::new(document).evaluate(expr),
            None => Ok(true),
        }
    }

    fn candidates(&self, field: &str) -> Vec<&'a Bson> {
        unwind(values_at(self.document, field))
    }
}

fn equals_any(candidates: &[&Bson], value: &Bson) -> bool {
    let target = Comparable::from(value);
    candidates.iter().any(|candidate| Comparable::from(*candidate) == target)
}

fn in_list(candidates: &[&Bson], values: &Bson) -> bool {
    match values {
        Bson::Array(values) => values.iter().any(|value| equals_any(candidates, value)),
        single => equals_any(candidates, single),
    }
}

fn any_string(candidates: &[&Bson], predicate: impl Fn(&str) -> bool) -> bool {
    candidates.iter().any(|candidate| match candidate {
        Bson::String(s) => predicate(s.as_str()),
        _ => false,
    })
}

fn operand_str<'v>(op: &FieldOp, value: &'v Bson) -> DocumentStoreResult<&'v str> {
    match value {
        Bson::String(s) => Ok(s.as_str()),
        other => Err(DocumentStoreError::InvalidFilter(format!(
            "{op:?} needs a string operand, got {:?}",
            other.element_type()
        ))),
    }
}

impl<'a> QueryVisitor for DocumentEvaluator<'a> {
    type Output = bool;
    type Error = DocumentStoreError;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        for expr in exprs {
            if !self.visit_expr(expr)? {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        for expr in exprs {
            if self.visit_expr(expr)? {
                return Ok(true);
            }
        }

        Ok(false)
    }

    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        Ok(!self.visit_expr(expr)?)
    }

    fn visit_exists(&mut self, field: &str, should_exist: bool) -> Result<Self::Output, Self::Error> {
        let present = values_at(self.document, field)
            .iter()
            .any(|value| !matches!(value, Bson::Null));

        Ok(present == should_exist)
    }

    fn visit_elem_match(&mut self, field: &str, expr: &Expr) -> Result<Self::Output, Self::Error> {
        for value in values_at(self.document, field) {
            let Bson::Array(items) = value else { continue };

            for item in items {
                if let Bson::Document(element) = item {
                    if DocumentEvaluator::new(element).evaluate(expr)? {
                        return Ok(true);
                    }
                }
            }
        }

        Ok(false)
    }

    fn visit_field(&mut self, field: &str, op: &FieldOp, value: &Bson) -> Result<Self::Output, Self::Error> {
        let candidates = self.candidates(field);

        match op {
            FieldOp::Eq => Ok(equals_any(&candidates, value)),
            FieldOp::Ne => Ok(!equals_any(&candidates, value)),
            FieldOp::Gt | FieldOp::Gte | FieldOp::Lt | FieldOp::Lte => {
                let target = Comparable::from(value);

                Ok(candidates.iter().any(|candidate| {
                    match Comparable::from(*candidate).partial_cmp(&target) {
                        Some(ordering) => match op {
                            FieldOp::Gt => ordering == Ordering::Greater,
                            FieldOp::Gte => ordering != Ordering::Less,
                            FieldOp::Lt => ordering == Ordering::Less,
                            _ => ordering != Ordering::Greater,
                        },
                        None => false,
                    }
                }))
            }
            FieldOp::In | FieldOp::AnyOf => Ok(in_list(&candidates, value)),
            FieldOp::Nin | FieldOp::NoneOf => Ok(!in_list(&candidates, value)),
            FieldOp::Matches => {
                let pattern = operand_str(op, value)?;
                let regex = Regex::new(pattern)
                    .map_err(|e| DocumentStoreError::InvalidFilter(format!("invalid pattern {pattern:?}: {e}")))?;

                Ok(any_string(&candidates, |s| regex.is_match(s)))
            }
            FieldOp::StartsWith => {
                let prefix = operand_str(op, value)?;
                Ok(any_string(&candidates, |s| s.starts_with(prefix)))
            }
            FieldOp::EndsWith => {
                let suffix = operand_str(op, value)?;
                Ok(any_string(&candidates, |s| s.ends_with(suffix)))
            }
            FieldOp::Contains => match value {
                Bson::String(needle) => Ok(any_string(&candidates, |s| s.contains(needle.as_str()))),
                other => Ok(equals_any(&candidates, other)),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use bson::doc;
    use duoshelf_core::query::Filter;

    use super::*;

    fn hero() -> Document {
        doc! {
            "id": "b38c6fd7-3c0f-44a9-93d9-bcd2e08e18cd",
            "name": "Iron Man",
            "publisher": "Marvel",
            "rating": 8,
            "alter_egos": ["Tony Stark", "Iron Monger"],
            "sidekick": null,
            "biography": { "full_name": "Anthony Edward Stark", "first_appearance": 1963 },
            "powers": [
                { "name": "Intellect", "level": 100 },
                { "name": "Flight", "level": 75 },
            ],
        }
    }

    fn eval(expr: Expr) -> bool {
        DocumentEvaluator::new(&hero()).evaluate(&expr).unwrap()
    }

    #[test]
    fn compares_nested_and_numeric_values() {
        assert!(eval(Filter::eq("biography.full_name", "Anthony Edward Stark")));
        assert!(eval(Filter::gte("rating", 8.0)));
        assert!(!eval(Filter::gt("rating", 8)));
        assert!(eval(Filter::lt("biography.first_appearance", 1970)));
    }

    #[test]
    fn paths_descend_into_arrays_of_documents() {
        assert!(eval(Filter::eq("powers.name", "Flight")));
        assert!(eval(Filter::gt("powers.level", 90)));
        assert!(!eval(Filter::eq("powers.name", "Telepathy")));
    }

    #[test]
    fn elem_match_requires_a_single_element_to_match_everything() {
        assert!(eval(Filter::elem_match(
            "powers",
            Filter::eq("name", "Flight").and(Filter::lt("level", 80))
        )));
        assert!(!eval(Filter::elem_match(
            "powers",
            Filter::eq("name", "Intellect").and(Filter::lt("level", 80))
        )));
    }

    #[test]
    fn array_membership() {
        assert!(eval(Filter::eq("alter_egos", "Tony Stark")));
        assert!(eval(Filter::contains("alter_egos", "Monger")));
        assert!(eval(Filter::any_of("alter_egos", ["Bruce Wayne", "Tony Stark"])));
        assert!(eval(Filter::none_of("alter_egos", ["Bruce Wayne"])));
        assert!(eval(Filter::in_("publisher", ["DC", "Marvel"])));
        assert!(eval(Filter::nin("publisher", ["DC"])));
    }

    #[test]
    fn string_patterns_are_case_sensitive() {
        assert!(eval(Filter::starts_with("name", "Iron")));
        assert!(!eval(Filter::starts_with("name", "iron")));
        assert!(eval(Filter::ends_with("name", "Man")));
        assert!(eval(Filter::matches("name", r"^I\w+ M")));
        assert!(eval(Filter::contains("name", "on M")));
    }

    #[test]
    fn existence_treats_null_as_missing() {
        assert!(eval(Filter::exists("biography.full_name")));
        assert!(eval(Filter::not_exists("sidekick")));
        assert!(eval(Filter::not_exists("universe")));
        assert!(eval(Filter::ne("universe", "Earth-616")));
    }

    #[test]
    fn invalid_pattern_is_an_error() {
        let result = DocumentEvaluator::new(&hero()).evaluate(&Filter::matches("name", "("));

        assert!(matches!(result, Err(DocumentStoreError::InvalidFilter(_))));
    }

    #[test]
    fn binary_values_compare_by_content() {
        let key = bson::Uuid::parse_str("b38c6fd7-3c0f-44a9-93d9-bcd2e08e18cd").unwrap();
        let other = bson::Uuid::parse_str("e6b8de95-5053-4c41-ab68-32c50246d494").unwrap();
        let document = doc! { "_id": key };

        assert!(DocumentEvaluator::new(&document).evaluate(&Filter::eq("_id", key)).unwrap());
        assert!(!DocumentEvaluator::new(&document).evaluate(&Filter::eq("_id", other)).unwrap());
    }
}
