//! Static structural descriptions of record types.
//!
//! A [`Shape`] lists the fields of a record and their kinds. The filter, projection and
//! update algebra resolve dot-paths against it, so a typo in a path or an operator that
//! does not fit the field is rejected before anything reaches the backend.
//!
//! # Example
//!
//! ```ignore
//! use duoshelf_core::shape::{FieldKind, Shape};
//!
//! let author = Shape::new()
//!     .field("name", FieldKind::String)
//!     .field("url", FieldKind::String);
//!
//! let shape = Shape::new()
//!     .field("id", FieldKind::String)
//!     .field("author", FieldKind::Object(author))
//!     .field("tags", FieldKind::array(FieldKind::String));
//!
//! assert!(shape.resolve("author.name", PathMode::Field).is_some());
//! ```

use bson::Bson;

use crate::projection::Projection;

/// The kind of a single field in a [`Shape`].
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    /// UTF-8 string.
    String,
    /// Any BSON number (int32, int64, double).
    Number,
    /// Boolean.
    Bool,
    /// BSON date-time.
    DateTime,
    /// Embedded document with its own shape.
    Object(Shape),
    /// Array of elements of the given kind.
    Array(Box<FieldKind>),
    /// Field that may be null or absent.
    Optional(Box<FieldKind>),
    /// Field whose content is not described further (free-form BSON).
    Any,
}

impl FieldKind {
    /// Convenience constructor for [`FieldKind::Array`].
    pub fn array(element: FieldKind) -> Self {
        FieldKind::Array(Box::new(element))
    }

    /// Convenience constructor for [`FieldKind::Optional`].
    pub fn optional(inner: FieldKind) -> Self {
        FieldKind::Optional(Box::new(inner))
    }

    /// Strips any number of `Optional` wrappers.
    pub fn required(&self) -> &FieldKind {
        match self {
            FieldKind::Optional(inner) => inner.required(),
            other => other,
        }
    }

    pub fn is_string(&self) -> bool {
        matches!(self.required(), FieldKind::String | FieldKind::Any)
    }

    pub fn is_number(&self) -> bool {
        matches!(self.required(), FieldKind::Number | FieldKind::Any)
    }

    pub fn is_array(&self) -> bool {
        matches!(self.required(), FieldKind::Array(_) | FieldKind::Any)
    }

    /// Whether values of this kind have a total order the store can compare on.
    pub fn is_ordered(&self) -> bool {
        match self.required() {
            FieldKind::String | FieldKind::Number | FieldKind::DateTime | FieldKind::Any => true,
            FieldKind::Array(element) => element.is_ordered(),
            _ => false,
        }
    }

    /// Element kind for arrays, `None` otherwise.
    pub fn element(&self) -> Option<&FieldKind> {
        match self.required() {
            FieldKind::Array(element) => Some(element),
            _ => None,
        }
    }

    /// Whether `value` may be stored in a field of this kind.
    ///
    /// Object fields only check that the value is a document; its keys are not
    /// matched against the sub-shape.
    pub fn accepts(&self, value: &Bson) -> bool {
        match (self, value) {
            (FieldKind::Any, _) => true,
            (FieldKind::Optional(_), Bson::Null) => true,
            (FieldKind::Optional(inner), value) => inner.accepts(value),
            (FieldKind::String, Bson::String(_)) => true,
            (FieldKind::Number, Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_)) => true,
            (FieldKind::Bool, Bson::Boolean(_)) => true,
            (FieldKind::DateTime, Bson::DateTime(_)) => true,
            (FieldKind::Object(_), Bson::Document(_)) => true,
            (FieldKind::Array(element), Bson::Array(values)) => values.iter().all(|v| element.accepts(v)),
            _ => false,
        }
    }
}

/// How a dot-path may traverse arrays while it is being resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathMode {
    /// Used by filters: a segment after an array of objects addresses the field of every element.
    Query,
    /// Used by projections and updates: arrays are opaque leaves.
    Field,
}

/// A named field of a [`Shape`].
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: &'static str,
    pub kind: FieldKind,
}

/// Ordered list of the fields of a record or embedded document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Shape {
    fields: Vec<Field>,
}

impl Shape {
    pub fn new() -> Self {
        Self { fields: Vec::new() }
    }

    /// Appends a field. A field with the same name replaces the previous one.
    pub fn field(mut self, name: &'static str, kind: FieldKind) -> Self {
        self.fields.retain(|f| f.name != name);
        self.fields.push(Field { name, kind });
        self
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn get(&self, name: &str) -> Option<&FieldKind> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| &f.kind)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Resolves a dot-path to the kind of the addressed field.
    ///
    /// Returns `None` when any segment is unknown, or when the path crosses an array
    /// in [`PathMode::Field`].
    pub fn resolve(&self, path: &str, mode: PathMode) -> Option<&FieldKind> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut kind = self.get(first)?;

        for segment in segments {
            kind = match kind.required() {
                FieldKind::Object(shape) => shape.get(segment)?,
                FieldKind::Array(element) if mode == PathMode::Query => match element.required() {
                    FieldKind::Object(shape) => shape.get(segment)?,
                    _ => return None,
                },
                _ => return None,
            };
        }

        Some(kind)
    }

    /// Every dot-path a projection may exclude, parents before children.
    ///
    /// Arrays are listed as whole fields only.
    pub fn projection_paths(&self) -> Vec<String> {
        let mut paths = Vec::new();
        self.collect_paths("", &mut paths);
        paths
    }

    fn collect_paths(&self, prefix: &str, paths: &mut Vec<String>) {
        for field in &self.fields {
            let path = if prefix.is_empty() {
                field.name.to_string()
            } else {
                format!("{prefix}.{}", field.name)
            };

            paths.push(path.clone());

            if let FieldKind::Object(shape) = field.kind.required() {
                shape.collect_paths(&path, paths);
            }
        }
    }

    /// Returns the shape that remains after applying `projection`.
    ///
    /// Excluding an object removes the whole sub-object; excluding a leaf removes only
    /// that key from its parent. Paths that do not resolve are ignored here; use
    /// [`Projection::validate`] to reject them.
    pub fn project(&self, projection: &Projection) -> Shape {
        let excluded = projection.normalize();
        self.project_with_prefix("", &excluded)
    }

    fn project_with_prefix(&self, prefix: &str, projection: &Projection) -> Shape {
        let fields = self
            .fields
            .iter()
            .filter_map(|field| {
                let path = if prefix.is_empty() {
                    field.name.to_string()
                } else {
                    format!("{prefix}.{}", field.name)
                };

                if projection.excludes(&path) {
                    return None;
                }

                let kind = match &field.kind {
                    FieldKind::Object(shape) => FieldKind::Object(shape.project_with_prefix(&path, projection)),
                    FieldKind::Optional(inner) => match inner.as_ref() {
                        FieldKind::Object(shape) => {
                            FieldKind::optional(FieldKind::Object(shape.project_with_prefix(&path, projection)))
                        }
                        _ => field.kind.clone(),
                    },
                    other => other.clone(),
                };

                Some(Field { name: field.name, kind })
            })
            .collect();

        Shape { fields }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hero() -> Shape {
        Shape::new()
            .field("id", FieldKind::String)
            .field("name", FieldKind::String)
            .field(
                "biography",
                FieldKind::Object(
                    Shape::new()
                        .field("full_name", FieldKind::String)
                        .field("aliases", FieldKind::array(FieldKind::String)),
                ),
            )
            .field(
                "appearance",
                FieldKind::Object(
                    Shape::new()
                        .field("gender", FieldKind::String)
                        .field("hair_color", FieldKind::String),
                ),
            )
            .field(
                "powers",
                FieldKind::array(FieldKind::Object(
                    Shape::new()
                        .field("name", FieldKind::String)
                        .field("level", FieldKind::Number),
                )),
            )
    }

    #[test]
    fn resolves_nested_paths() {
        let shape = hero();

        assert_eq!(shape.resolve("appearance.gender", PathMode::Field), Some(&FieldKind::String));
        assert!(shape.resolve("appearance.height", PathMode::Field).is_none());
        assert!(shape.resolve("name.first", PathMode::Field).is_none());
    }

    #[test]
    fn arrays_are_opaque_outside_queries() {
        let shape = hero();

        assert_eq!(shape.resolve("powers.level", PathMode::Query), Some(&FieldKind::Number));
        assert!(shape.resolve("powers.level", PathMode::Field).is_none());
        assert!(shape.resolve("powers", PathMode::Field).is_some());
    }

    #[test]
    fn projecting_a_leaf_keeps_siblings() {
        let shape = hero();
        let projected = shape.project(&Projection::new().exclude("appearance.gender"));

        let appearance = match projected.get("appearance") {
            Some(FieldKind::Object(shape)) => shape.clone(),
            other => panic!("unexpected {other:?}"),
        };

        assert!(appearance.get("gender").is_none());
        assert!(appearance.get("hair_color").is_some());
        assert_eq!(projected.get("biography"), shape.get("biography"));
    }

    #[test]
    fn projecting_an_object_removes_it() {
        let projected = hero().project(&Projection::new().exclude("appearance"));

        assert!(projected.get("appearance").is_none());
        assert_eq!(projected.len(), 4);
    }

    #[test]
    fn projection_is_idempotent() {
        let projection = Projection::new().exclude("appearance.gender").exclude("powers");
        let once = hero().project(&projection);
        let twice = once.project(&projection);

        assert_eq!(once, twice);
    }

    #[test]
    fn lists_projection_paths() {
        let paths = hero().projection_paths();

        assert!(paths.contains(&"biography.aliases".to_string()));
        assert!(paths.contains(&"powers".to_string()));
        assert!(!paths.contains(&"powers.level".to_string()));
    }
}
