//! Partial update operations.
//!
//! An [`Update`] is an ordered list of field mutations applied atomically to one document.
//! It is validated against the record's [`Shape`] before it reaches a backend; the layer
//! then injects the `updated_at` bump (see [`crate::identity::on_update`]).
//!
//! ```ignore
//! use duoshelf_core::update::Update;
//!
//! let update = Update::new()
//!     .set("fandom", "Marvel")
//!     .push("title.translations", bson::doc! { "raw": "Hallo", "language_code": "de" })
//!     .inc("stats.kudos", 1);
//! ```

use bson::{Bson, Document, ser::serialize_to_bson};
use serde::Serialize;

use crate::{
    document::{CREATED_AT, ID, PRIMARY_KEY, UPDATED_AT},
    error::{DocumentStoreError, DocumentStoreResult},
    projection::is_ancestor,
    shape::{FieldKind, PathMode, Shape},
};

/// A single field mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOp {
    /// Replace the value at the path.
    Set(String, Bson),
    /// Remove the field.
    Unset(String),
    /// Add a number to a numeric field.
    Inc(String, Bson),
    /// Append values to an array, in order.
    Push(String, Vec<Bson>),
    /// Remove every array element equal to the value.
    Pull(String, Bson),
    /// Append the values that are not in the array yet.
    AddToSet(String, Vec<Bson>),
    /// Set only when the update creates the document.
    SetOnInsert(String, Bson),
}

impl UpdateOp {
    pub fn path(&self) -> &str {
        match self {
            UpdateOp::Set(path, _)
            | UpdateOp::Unset(path)
            | UpdateOp::Inc(path, _)
            | UpdateOp::Push(path, _)
            | UpdateOp::Pull(path, _)
            | UpdateOp::AddToSet(path, _)
            | UpdateOp::SetOnInsert(path, _) => path,
        }
    }

    fn operator(&self) -> &'static str {
        match self {
            UpdateOp::Set(..) => "$set",
            UpdateOp::Unset(_) => "$unset",
            UpdateOp::Inc(..) => "$inc",
            UpdateOp::Push(..) => "$push",
            UpdateOp::Pull(..) => "$pull",
            UpdateOp::AddToSet(..) => "$addToSet",
            UpdateOp::SetOnInsert(..) => "$setOnInsert",
        }
    }
}

/// Ordered set of field mutations for a single document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Update {
    ops: Vec<UpdateOp>,
}

impl Update {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, path: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.ops.push(UpdateOp::Set(path.into(), value.into()));
        self
    }

    /// Like [`set`](Self::set), for any serializable value.
    pub fn try_set<T: Serialize>(self, path: impl Into<String>, value: &T) -> DocumentStoreResult<Self> {
        Ok(self.set(path, serialize_to_bson(value)?))
    }

    pub fn unset(mut self, path: impl Into<String>) -> Self {
        self.ops.push(UpdateOp::Unset(path.into()));
        self
    }

    pub fn inc(mut self, path: impl Into<String>, amount: impl Into<Bson>) -> Self {
        self.ops.push(UpdateOp::Inc(path.into(), amount.into()));
        self
    }

    pub fn push(mut self, path: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.ops.push(UpdateOp::Push(path.into(), vec![value.into()]));
        self
    }

    /// Like [`push`](Self::push), for any serializable value.
    pub fn try_push<T: Serialize>(self, path: impl Into<String>, value: &T) -> DocumentStoreResult<Self> {
        Ok(self.push(path, serialize_to_bson(value)?))
    }

    /// Appends several values in one operation, keeping their order.
    pub fn push_each<I, V>(mut self, path: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Bson>,
    {
        self.ops.push(UpdateOp::Push(path.into(), values.into_iter().map(Into::into).collect()));
        self
    }

    pub fn pull(mut self, path: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.ops.push(UpdateOp::Pull(path.into(), value.into()));
        self
    }

    pub fn add_to_set(mut self, path: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.ops.push(UpdateOp::AddToSet(path.into(), vec![value.into()]));
        self
    }

    pub(crate) fn set_on_insert(mut self, path: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.ops.push(UpdateOp::SetOnInsert(path.into(), value.into()));
        self
    }

    pub fn ops(&self) -> &[UpdateOp] {
        &self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Whether any operation writes to exactly `path`.
    pub fn targets(&self, path: &str) -> bool {
        self.ops.iter().any(|op| op.path() == path)
    }

    /// Drops every operation on `path`.
    pub fn without(mut self, path: &str) -> Self {
        self.ops.retain(|op| op.path() != path);
        self
    }

    /// Checks every operation against `shape`.
    ///
    /// `updated_at` is accepted here because the layer overwrites it anyway.
    ///
    /// # Errors
    ///
    /// [`DocumentStoreError::InvalidUpdate`] when an operation targets an identity field,
    /// names an unknown path, does not fit the field kind, or overlaps another operation.
    pub fn validate(&self, shape: &Shape) -> DocumentStoreResult<()> {
        for (index, op) in self.ops.iter().enumerate() {
            let path = op.path();

            if [ID, PRIMARY_KEY, CREATED_AT].contains(&path) {
                return Err(invalid(format!("{path} cannot be updated")));
            }

            for other in &self.ops[index + 1..] {
                let other = other.path();
                if other == path || is_ancestor(path, other) || is_ancestor(other, path) {
                    return Err(invalid(format!("{path} and {other} overlap")));
                }
            }

            if path == UPDATED_AT {
                continue;
            }

            let kind = shape
                .resolve(path, PathMode::Field)
                .ok_or_else(|| invalid(format!("{path} does not name an updatable field")))?;

            check_op(op, kind)?;
        }

        Ok(())
    }

    /// Native update document, operators in order of first use.
    pub fn to_document(&self) -> Document {
        let mut document = Document::new();

        for op in &self.ops {
            let operator = op.operator();

            if !document.contains_key(operator) {
                document.insert(operator, Document::new());
            }

            let Some(Bson::Document(clause)) = document.get_mut(operator) else {
                continue;
            };

            match op {
                UpdateOp::Set(path, value)
                | UpdateOp::Inc(path, value)
                | UpdateOp::Pull(path, value)
                | UpdateOp::SetOnInsert(path, value) => {
                    clause.insert(path.clone(), value.clone());
                }
                UpdateOp::Unset(path) => {
                    clause.insert(path.clone(), "");
                }
                UpdateOp::Push(path, values) | UpdateOp::AddToSet(path, values) => {
                    let mut each = Document::new();
                    each.insert("$each", values.clone());
                    clause.insert(path.clone(), each);
                }
            }
        }

        document
    }
}

fn check_op(op: &UpdateOp, kind: &FieldKind) -> DocumentStoreResult<()> {
    match op {
        UpdateOp::Set(path, value) | UpdateOp::SetOnInsert(path, value) => {
            if !kind.accepts(value) {
                return Err(invalid(format!("{path} cannot hold {:?}", value.element_type())));
            }
        }
        UpdateOp::Unset(path) => {
            if !matches!(kind, FieldKind::Optional(_) | FieldKind::Any) {
                return Err(invalid(format!("{path} is required and cannot be unset")));
            }
        }
        UpdateOp::Inc(path, amount) => {
            let numeric = matches!(amount, Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_));
            if !kind.is_number() || !numeric {
                return Err(invalid(format!("{path} requires a numeric field and amount")));
            }
        }
        UpdateOp::Push(path, values) | UpdateOp::AddToSet(path, values) => {
            let element = array_element(path, kind)?;
            if let Some(value) = values.iter().find(|v| !element.accepts(v)) {
                return Err(invalid(format!("{path} cannot hold element {:?}", value.element_type())));
            }
        }
        UpdateOp::Pull(path, _) => {
            array_element(path, kind)?;
        }
    }

    Ok(())
}

fn array_element<'a>(path: &str, kind: &'a FieldKind) -> DocumentStoreResult<&'a FieldKind> {
    match kind.required() {
        FieldKind::Any => Ok(&FieldKind::Any),
        FieldKind::Array(element) => Ok(element),
        _ => Err(invalid(format!("{path} is not an array"))),
    }
}

fn invalid(message: String) -> DocumentStoreError {
    DocumentStoreError::InvalidUpdate(message)
}

#[cfg(test)]
mod tests {
    use bson::doc;

    use super::*;

    fn shape() -> Shape {
        Shape::new()
            .field("id", FieldKind::String)
            .field("fandom", FieldKind::String)
            .field("kudos", FieldKind::Number)
            .field("summary", FieldKind::optional(FieldKind::String))
            .field(
                "title",
                FieldKind::Object(
                    Shape::new()
                        .field("original", FieldKind::String)
                        .field("translations", FieldKind::array(FieldKind::String)),
                ),
            )
    }

    #[test]
    fn accepts_well_typed_operations() {
        let update = Update::new()
            .set("fandom", "Marvel")
            .inc("kudos", 2)
            .unset("summary")
            .push("title.translations", "Hallo")
            .set("updated_at", bson::DateTime::now());

        assert!(update.validate(&shape()).is_ok());
    }

    #[test]
    fn rejects_identity_fields() {
        for path in ["id", "_id", "created_at"] {
            let update = Update::new().set(path, "x");
            assert!(matches!(update.validate(&shape()), Err(DocumentStoreError::InvalidUpdate(_))));
        }
    }

    #[test]
    fn rejects_kind_mismatches() {
        let cases = [
            Update::new().set("fandom", 3),
            Update::new().inc("fandom", 1),
            Update::new().push("fandom", "x"),
            Update::new().push("title.translations", 7),
            Update::new().unset("fandom"),
            Update::new().set("missing", "x"),
        ];

        for update in cases {
            assert!(
                matches!(update.validate(&shape()), Err(DocumentStoreError::InvalidUpdate(_))),
                "{update:?}"
            );
        }
    }

    #[test]
    fn rejects_overlapping_paths() {
        let update = Update::new()
            .set("title", doc! { "original": "a", "translations": [] })
            .push("title.translations", "b");

        assert!(matches!(update.validate(&shape()), Err(DocumentStoreError::InvalidUpdate(_))));
    }

    #[test]
    fn groups_operations_by_operator() {
        let update = Update::new()
            .set("fandom", "Marvel")
            .push_each("title.translations", ["a", "b"])
            .set("kudos", 4)
            .unset("summary");

        assert_eq!(
            update.to_document(),
            doc! {
                "$set": { "fandom": "Marvel", "kudos": 4 },
                "$push": { "title.translations": { "$each": ["a", "b"] } },
                "$unset": { "summary": "" },
            }
        );
    }

    #[test]
    fn without_drops_only_the_named_path() {
        let update = Update::new().set("updated_at", 1).set("fandom", "X").without("updated_at");

        assert!(!update.targets("updated_at"));
        assert!(update.targets("fandom"));
    }
}
