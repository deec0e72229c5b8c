//! Query construction and filtering API for document stores.
//!
//! This module provides filter construction, validation against a record [`Shape`],
//! sorting, pagination, and a visitor pattern for query execution across different backends.
//!
//! # Query Building
//!
//! Queries can be constructed using the fluent builder API:
//!
//! ```ignore
//! use duoshelf_core::query::{Filter, Query, SortDirection};
//!
//! let query = Query::builder()
//!     .filter(Filter::eq("language_code", "en"))
//!     .limit(10)
//!     .offset(0)
//!     .sort("created_at", SortDirection::Desc)
//!     .build();
//! ```
//!
//! # Filter Expression API
//!
//! The [`Filter`] struct provides a collection of static methods for building filter expressions:
//!
//! - Comparison: `eq`, `ne`, `gt`, `gte`, `lt`, `lte`
//! - Membership: `in_`, `nin`
//! - String: `matches`, `starts_with`, `ends_with`, `contains`
//! - Existence: `exists`, `not_exists`
//! - Array: `contains`, `any_of`, `none_of`, `elem_match`
//! - Logical: `and`, `or`, `not`
//!
//! Paths are dot-delimited and may walk through arrays of objects: `chapters.title.raw`
//! matches a document when any chapter has that title.

use bson::Bson;
use regex::Regex;

use crate::{
    document::{CREATED_AT, PRIMARY_KEY, UPDATED_AT},
    error::{DocumentStoreError, DocumentStoreResult},
    shape::{FieldKind, PathMode, Shape},
};

/// Sort direction for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    /// Ascending order (A to Z, 0 to 9, earliest to latest).
    Asc,
    /// Descending order (Z to A, 9 to 0, latest to earliest).
    Desc,
}

/// Sort specification for query results.
///
/// Specifies which field to sort by and in which direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    /// The field name to sort by.
    pub field: String,
    /// The sort direction.
    pub direction: SortDirection,
}

impl Sort {
    pub fn asc(field: impl Into<String>) -> Self {
        Sort { field: field.into(), direction: SortDirection::Asc }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Sort { field: field.into(), direction: SortDirection::Desc }
    }
}

/// Field comparison operators for filter expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldOp {
    /// Equal to (exact match, or any element for arrays).
    Eq,
    /// Not equal to.
    Ne,
    /// Greater than.
    Gt,
    /// Greater than or equal to.
    Gte,
    /// Less than.
    Lt,
    /// Less than or equal to.
    Lte,
    /// Value is one of the given values.
    In,
    /// Value is none of the given values.
    Nin,
    /// String matches a regular expression.
    Matches,
    /// String contains a substring, or array contains an element.
    Contains,
    /// String starts with value.
    StartsWith,
    /// String ends with value.
    EndsWith,
    /// Array contains any of the values.
    AnyOf,
    /// Array contains none of the values.
    NoneOf,
}

/// A filter expression for querying documents.
///
/// Expressions can be combined using logical operators (`And`, `Or`, `Not`)
/// to build complex filter predicates.
///
/// # Example
///
/// ```ignore
/// use duoshelf_core::query::Filter;
///
/// // Simple equality check
/// let expr1 = Filter::eq("fandom", "Marvel");
///
/// // Complex nested expression
/// let expr2 = Filter::and(vec![
///     Filter::eq("language_code", "en"),
///     Filter::gte("chapter_count", 3)
/// ]);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Logical AND of multiple expressions (all must match).
    And(Vec<Expr>),
    /// Logical OR of multiple expressions (any must match).
    Or(Vec<Expr>),
    /// Logical NOT of an expression (inverts the result).
    Not(Box<Expr>),
    /// Checks if a field exists or doesn't exist.
    Exists(String, bool),
    /// At least one array element matches the element-relative sub-filter.
    ElemMatch(String, Box<Expr>),
    /// Field comparison expression.
    Field {
        /// The field name to compare.
        field: String,
        /// The comparison operator.
        op: FieldOp,
        /// The value to compare against.
        value: Bson,
    },
}

impl Expr {
    /// Creates a field comparison expression.
    pub fn field(field: String, op: FieldOp, value: Bson) -> Self {
        Expr::Field { field, op, value }
    }

    /// Combines this expression with another using logical AND.
    ///
    /// If this expression is already an AND, the other expression is appended
    /// to the list. Otherwise, a new AND expression is created.
    pub fn and(self, other: Expr) -> Self {
        match self {
            Expr::And(mut list) => {
                list.push(other);
                Expr::And(list)
            }
            _ => Expr::And(vec![self, other]),
        }
    }

    /// Combines this expression with another using logical OR.
    ///
    /// If this expression is already an OR, the other expression is appended
    /// to the list. Otherwise, a new OR expression is created.
    pub fn or(self, other: Expr) -> Self {
        match self {
            Expr::Or(mut list) => {
                list.push(other);
                Expr::Or(list)
            }
            _ => Expr::Or(vec![self, other]),
        }
    }

    /// Negates this expression (logical NOT).
    pub fn not(self) -> Self {
        Expr::Not(Box::new(self))
    }

    /// Checks every path and operator against `shape`.
    ///
    /// `_id`, `created_at` and `updated_at` are always accepted.
    ///
    /// # Errors
    ///
    /// [`DocumentStoreError::InvalidFilter`] for unknown paths, operators that do not fit
    /// the field kind, and malformed operands.
    pub fn validate(&self, shape: &Shape) -> DocumentStoreResult<()> {
        match self {
            Expr::And(exprs) | Expr::Or(exprs) => exprs.iter().try_for_each(|e| e.validate(shape)),
            Expr::Not(expr) => expr.validate(shape),
            Expr::Exists(field, _) => resolve(shape, field).map(|_| ()),
            Expr::ElemMatch(field, expr) => match resolve(shape, field)?.element().map(FieldKind::required) {
                Some(FieldKind::Object(element)) => expr.validate(element),
                Some(FieldKind::Any) => Ok(()),
                _ => Err(invalid(format!("elem_match needs an array of objects at {field}"))),
            },
            Expr::Field { field, op, value } => check_field(&resolve(shape, field)?, field, *op, value),
        }
    }

    /// Top-level equality constraints, used to seed documents created by an upsert.
    pub fn equality_fields(&self) -> Vec<(String, Bson)> {
        match self {
            Expr::Field { field, op: FieldOp::Eq, value } => vec![(field.clone(), value.clone())],
            Expr::And(exprs) => exprs.iter().flat_map(Expr::equality_fields).collect(),
            _ => Vec::new(),
        }
    }
}

fn resolve(shape: &Shape, path: &str) -> DocumentStoreResult<FieldKind> {
    match path {
        PRIMARY_KEY => Ok(FieldKind::Any),
        CREATED_AT | UPDATED_AT => Ok(FieldKind::DateTime),
        _ => shape
            .resolve(path, PathMode::Query)
            .cloned()
            .ok_or_else(|| invalid(format!("{path} does not name a field"))),
    }
}

fn check_field(kind: &FieldKind, path: &str, op: FieldOp, value: &Bson) -> DocumentStoreResult<()> {
    let is_text = kind.is_string() || kind.element().is_some_and(FieldKind::is_string);

    match op {
        FieldOp::Eq | FieldOp::Ne => Ok(()),
        FieldOp::Gt | FieldOp::Gte | FieldOp::Lt | FieldOp::Lte if kind.is_ordered() => Ok(()),
        FieldOp::In | FieldOp::Nin if matches!(value, Bson::Array(_)) => Ok(()),
        FieldOp::AnyOf | FieldOp::NoneOf if kind.is_array() && matches!(value, Bson::Array(_)) => Ok(()),
        FieldOp::Matches | FieldOp::StartsWith | FieldOp::EndsWith if is_text && matches!(value, Bson::String(_)) => {
            if op == FieldOp::Matches {
                check_pattern(value)?;
            }
            Ok(())
        }
        FieldOp::Contains if kind.is_array() => Ok(()),
        FieldOp::Contains if kind.is_string() && matches!(value, Bson::String(_)) => Ok(()),
        _ => Err(invalid(format!("{op:?} does not apply to {path} with {:?}", value.element_type()))),
    }
}

fn check_pattern(value: &Bson) -> DocumentStoreResult<()> {
    match value {
        Bson::String(pattern) if pattern.is_empty() => Err(invalid("empty pattern".to_string())),
        Bson::String(pattern) => Regex::new(pattern)
            .map(drop)
            .map_err(|e| invalid(format!("invalid pattern {pattern:?}: {e}"))),
        _ => Ok(()),
    }
}

fn invalid(message: String) -> DocumentStoreError {
    DocumentStoreError::InvalidFilter(message)
}

/// A structured query for retrieving and filtering documents.
///
/// This struct encapsulates filters, limits, offsets, and sort specifications
/// for document queries. Use [`QueryBuilder`] for ergonomic construction.
#[derive(Debug, Clone, Default)]
pub struct Query {
    /// Optional filter expression to match documents.
    pub filter: Option<Expr>,
    /// Maximum number of documents to return.
    pub limit: Option<usize>,
    /// Number of documents to skip (for pagination).
    pub offset: Option<usize>,
    /// Sort keys, most significant first.
    pub sort: Vec<Sort>,
}

impl Query {
    /// Creates a new empty query with no filters or limits.
    pub fn new() -> Self {
        Query::default()
    }

    /// Creates a new query builder for fluent construction.
    pub fn builder() -> QueryBuilder {
        QueryBuilder::new()
    }
}

/// Helper struct for constructing filter expressions.
///
/// Provides static methods to construct common filter expressions in a type-safe manner.
/// All methods accept field names and values as `Into<String>` and `Into<Bson>` for ergonomics.
///
/// # Example
///
/// ```ignore
/// use duoshelf_core::query::Filter;
///
/// let expr = Filter::eq("fandom", "Marvel")
///     .and(Filter::starts_with("title.original.raw", "The"));
/// ```
pub struct Filter;

impl Filter {
    /// Creates an equality filter expression.
    ///
    /// Matches documents where the field equals the specified value.
    pub fn eq(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Eq, value.into())
    }

    /// Creates a not-equal filter expression.
    pub fn ne(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Ne, value.into())
    }

    /// Creates a greater-than filter expression.
    pub fn gt(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Gt, value.into())
    }

    /// Creates a greater-than-or-equal filter expression.
    pub fn gte(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Gte, value.into())
    }

    /// Creates a less-than filter expression.
    pub fn lt(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Lt, value.into())
    }

    /// Creates a less-than-or-equal filter expression.
    pub fn lte(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Lte, value.into())
    }

    /// Matches documents where the field equals one of `values`.
    pub fn in_<I, V>(field: impl Into<String>, values: I) -> Expr
    where
        I: IntoIterator<Item = V>,
        V: Into<Bson>,
    {
        Expr::field(field.into(), FieldOp::In, collect(values))
    }

    /// Matches documents where the field equals none of `values`.
    pub fn nin<I, V>(field: impl Into<String>, values: I) -> Expr
    where
        I: IntoIterator<Item = V>,
        V: Into<Bson>,
    {
        Expr::field(field.into(), FieldOp::Nin, collect(values))
    }

    /// Matches documents where the string field matches the regular expression `pattern`.
    pub fn matches(field: impl Into<String>, pattern: impl Into<String>) -> Expr {
        Expr::field(field.into(), FieldOp::Matches, Bson::String(pattern.into()))
    }

    /// Creates a string prefix filter expression.
    pub fn starts_with(field: impl Into<String>, value: impl Into<String>) -> Expr {
        Expr::field(field.into(), FieldOp::StartsWith, Bson::String(value.into()))
    }

    /// Creates a string suffix filter expression.
    pub fn ends_with(field: impl Into<String>, value: impl Into<String>) -> Expr {
        Expr::field(field.into(), FieldOp::EndsWith, Bson::String(value.into()))
    }

    /// Creates a contains filter expression.
    ///
    /// Matches documents where the field (string or array) contains the specified value.
    pub fn contains(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Contains, value.into())
    }

    /// Creates an existence filter expression.
    ///
    /// Matches documents where the field exists (is not null or missing).
    pub fn exists(field: impl Into<String>) -> Expr {
        Expr::Exists(field.into(), true)
    }

    /// Creates a non-existence filter expression.
    ///
    /// Matches documents where the field does not exist (is null or missing).
    pub fn not_exists(field: impl Into<String>) -> Expr {
        Expr::Exists(field.into(), false)
    }

    /// Matches documents where at least one element of the array field satisfies `filter`.
    ///
    /// Paths inside `filter` are relative to the element.
    pub fn elem_match(field: impl Into<String>, filter: Expr) -> Expr {
        Expr::ElemMatch(field.into(), Box::new(filter))
    }

    /// Creates a logical AND filter expression.
    pub fn and(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::And(exprs.into_iter().collect())
    }

    /// Creates a logical OR filter expression.
    pub fn or(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::Or(exprs.into_iter().collect())
    }

    /// Negates a filter expression.
    pub fn not(expr: Expr) -> Expr {
        expr.not()
    }

    /// Creates an array membership filter expression.
    ///
    /// Matches documents where the array field contains any of the specified values.
    pub fn any_of<I, V>(field: impl Into<String>, values: I) -> Expr
    where
        I: IntoIterator<Item = V>,
        V: Into<Bson>,
    {
        Expr::field(field.into(), FieldOp::AnyOf, collect(values))
    }

    /// Creates an array exclusion filter expression.
    ///
    /// Matches documents where the array field contains none of the specified values.
    pub fn none_of<I, V>(field: impl Into<String>, values: I) -> Expr
    where
        I: IntoIterator<Item = V>,
        V: Into<Bson>,
    {
        Expr::field(field.into(), FieldOp::NoneOf, collect(values))
    }
}

fn collect<I, V>(values: I) -> Bson
where
    I: IntoIterator<Item = V>,
    V: Into<Bson>,
{
    Bson::Array(values.into_iter().map(Into::into).collect())
}

#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    query: Query,
}

impl QueryBuilder {
    /// Creates a new query builder.
    pub fn new() -> Self {
        QueryBuilder { query: Query::default() }
    }

    /// Sets the filter expression for this query.
    pub fn filter(mut self, filter: Expr) -> Self {
        self.query.filter = Some(filter);
        self
    }

    /// Sets the maximum number of documents to return.
    pub fn limit(mut self, limit: usize) -> Self {
        self.query.limit = Some(limit);
        self
    }

    /// Sets the number of documents to skip (for pagination).
    pub fn offset(mut self, offset: usize) -> Self {
        self.query.offset = Some(offset);
        self
    }

    /// Adds a sort key. Earlier keys take precedence.
    pub fn sort(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.query.sort.push(Sort { field: field.into(), direction });
        self
    }

    /// Builds and returns the final query.
    pub fn build(self) -> Query {
        self.query
    }
}

pub trait QueryVisitor {
    type Output;
    type Error: Into<DocumentStoreError>;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error>;
    fn visit_exists(
        &mut self,
        field: &str,
        should_exist: bool,
    ) -> Result<Self::Output, Self::Error>;
    fn visit_elem_match(&mut self, field: &str, expr: &Expr) -> Result<Self::Output, Self::Error>;
    fn visit_field(
        &mut self,
        field: &str,
        op: &FieldOp,
        value: &Bson,
    ) -> Result<Self::Output, Self::Error>;

    fn visit_expr(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        match expr {
            Expr::And(exprs) => self.visit_and(exprs),
            Expr::Or(exprs) => self.visit_or(exprs),
            Expr::Not(expr) => self.visit_not(expr),
            Expr::Exists(field, should_exist) => self.visit_exists(field, *should_exist),
            Expr::ElemMatch(field, expr) => self.visit_elem_match(field, expr),
            Expr::Field { field, op, value } => self.visit_field(field, op, value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shape() -> Shape {
        Shape::new()
            .field("id", FieldKind::String)
            .field("fandom", FieldKind::String)
            .field("language_code", FieldKind::String)
            .field("tags", FieldKind::array(FieldKind::String))
            .field("rating", FieldKind::optional(FieldKind::Number))
            .field(
                "chapters",
                FieldKind::array(FieldKind::Object(
                    Shape::new()
                        .field("number", FieldKind::Number)
                        .field("title", FieldKind::String),
                )),
            )
    }

    #[test]
    fn accepts_paths_through_arrays_of_objects() {
        let filter = Filter::and([
            Filter::eq("chapters.title", "Prologue"),
            Filter::gte("chapters.number", 2),
            Filter::elem_match("chapters", Filter::lt("number", 3)),
            Filter::gt("created_at", bson::DateTime::from_millis(0)),
        ]);

        assert!(filter.validate(&shape()).is_ok());
    }

    #[test]
    fn rejects_unknown_paths_and_mismatched_operators() {
        let cases = [
            Filter::eq("missing", 1),
            Filter::starts_with("rating", "1"),
            Filter::any_of("fandom", ["a"]),
            Filter::elem_match("tags", Filter::eq("x", 1)),
            Filter::elem_match("chapters", Filter::eq("missing", 1)),
            Filter::matches("fandom", ""),
            Filter::matches("fandom", "("),
            Expr::field("fandom".into(), FieldOp::In, Bson::String("x".into())),
        ];

        for filter in cases {
            assert!(
                matches!(filter.validate(&shape()), Err(DocumentStoreError::InvalidFilter(_))),
                "{filter:?}"
            );
        }
    }

    #[test]
    fn string_operators_apply_to_string_arrays() {
        assert!(Filter::starts_with("tags", "hurt").validate(&shape()).is_ok());
        assert!(Filter::contains("tags", "fluff").validate(&shape()).is_ok());
        assert!(Filter::not(Filter::in_("language_code", ["en", "fr"])).validate(&shape()).is_ok());
    }

    #[test]
    fn collects_top_level_equalities() {
        let filter = Filter::eq("fandom", "Marvel")
            .and(Filter::gt("rating", 3))
            .and(Filter::eq("language_code", "en"));

        assert_eq!(
            filter.equality_fields(),
            vec![
                ("fandom".to_string(), Bson::String("Marvel".into())),
                ("language_code".to_string(), Bson::String("en".into())),
            ]
        );
        assert!(Filter::or([Filter::eq("fandom", "X")]).equality_fields().is_empty());
    }
}
