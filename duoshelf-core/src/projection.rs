//! Exclusion-only projections.
//!
//! A [`Projection`] names the dot-paths that must be left out of a read result. Inclusion
//! projections are deliberately not expressible: a view that lists what it wants would
//! silently drop fields added to the record later.
//!
//! The primary key `_id` is hidden unless [`Projection::with_primary_key`] is used.
//! When a parent and one of its children are both excluded, the parent wins.

use std::collections::BTreeSet;

use bson::{Bson, Document};

use crate::{
    document::{CREATED_AT, ID, PRIMARY_KEY, UPDATED_AT},
    error::{DocumentStoreError, DocumentStoreResult},
    shape::{PathMode, Shape},
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Projection {
    excluded: BTreeSet<String>,
    include_primary_key: bool,
}

impl Projection {
    /// The identity projection: the full record, primary key hidden.
    pub fn new() -> Self {
        Self::default()
    }

    /// Excludes the field at `path` (and everything below it).
    pub fn exclude(mut self, path: impl Into<String>) -> Self {
        self.excluded.insert(path.into());
        self
    }

    pub fn exclude_all<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded.extend(paths.into_iter().map(Into::into));
        self
    }

    /// Keeps `_id` in results.
    pub fn with_primary_key(mut self) -> Self {
        self.include_primary_key = true;
        self
    }

    pub fn includes_primary_key(&self) -> bool {
        self.include_primary_key
    }

    /// Whether this projection leaves the record untouched.
    pub fn is_identity(&self) -> bool {
        self.excluded.is_empty()
    }

    pub fn excluded(&self) -> impl Iterator<Item = &str> {
        self.excluded.iter().map(String::as_str)
    }

    /// Union of both exclusion sets. The primary key is kept if either side asks for it.
    pub fn merge(mut self, other: &Projection) -> Self {
        self.excluded.extend(other.excluded.iter().cloned());
        self.include_primary_key = self.include_primary_key || other.include_primary_key;
        self
    }

    /// Whether `path`, or one of its ancestors, is excluded.
    pub fn excludes(&self, path: &str) -> bool {
        self.excluded
            .iter()
            .any(|excluded| excluded == path || is_ancestor(excluded, path))
    }

    /// Drops every path already covered by an excluded ancestor.
    pub fn normalize(&self) -> Projection {
        let excluded = self
            .excluded
            .iter()
            .filter(|path| !self.excluded.iter().any(|other| is_ancestor(other, path)))
            .cloned()
            .collect();

        Projection { excluded, include_primary_key: self.include_primary_key }
    }

    /// Checks every path against `shape` and returns the normalized projection.
    ///
    /// # Errors
    ///
    /// [`DocumentStoreError::InvalidProjection`] when a path is unknown, crosses an array,
    /// or targets `id` or one of the timestamps.
    pub fn validate(&self, shape: &Shape) -> DocumentStoreResult<Projection> {
        for path in &self.excluded {
            if [ID, CREATED_AT, UPDATED_AT, PRIMARY_KEY].contains(&path.as_str()) {
                return Err(DocumentStoreError::InvalidProjection(format!(
                    "{path} is always returned"
                )));
            }

            if shape.resolve(path, PathMode::Field).is_none() {
                return Err(DocumentStoreError::InvalidProjection(format!(
                    "{path} does not name a projectable field"
                )));
            }
        }

        Ok(self.normalize())
    }

    /// Native projection document: `{ path: 0, ..., _id: 0 }`, or `None` when nothing
    /// has to be hidden.
    pub fn to_document(&self) -> Option<Document> {
        let normalized = self.normalize();
        let mut document = Document::new();

        for path in &normalized.excluded {
            document.insert(path.clone(), 0);
        }

        if !normalized.include_primary_key {
            document.insert(PRIMARY_KEY, 0);
        }

        if document.is_empty() { None } else { Some(document) }
    }

    /// Removes the excluded paths from `document` in place.
    ///
    /// Applying the same projection twice leaves the document unchanged the second time.
    pub fn apply(&self, document: &mut Document) {
        if !self.include_primary_key {
            document.remove(PRIMARY_KEY);
        }

        for path in &self.normalize().excluded {
            remove_path(document, path);
        }
    }
}

/// Whether `ancestor` is a strict dot-path prefix of `path`.
pub(crate) fn is_ancestor(ancestor: &str, path: &str) -> bool {
    path.len() > ancestor.len()
        && path.starts_with(ancestor)
        && path.as_bytes()[ancestor.len()] == b'.'
}

fn remove_path(document: &mut Document, path: &str) {
    match path.split_once('.') {
        None => {
            document.remove(path);
        }
        Some((head, rest)) => {
            if let Some(Bson::Document(child)) = document.get_mut(head) {
                remove_path(child, rest);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use bson::doc;

    use super::*;
    use crate::shape::FieldKind;

    fn shape() -> Shape {
        Shape::new()
            .field("id", FieldKind::String)
            .field("fandom", FieldKind::String)
            .field(
                "title",
                FieldKind::Object(
                    Shape::new()
                        .field("original", FieldKind::String)
                        .field("translations", FieldKind::array(FieldKind::String)),
                ),
            )
            .field("chapters", FieldKind::array(FieldKind::Any))
    }

    #[test]
    fn parent_exclusion_wins_over_child() {
        let projection = Projection::new().exclude("title").exclude("title.original");
        let normalized = projection.normalize();

        assert_eq!(normalized.excluded().collect::<Vec<_>>(), vec!["title"]);
    }

    #[test]
    fn sibling_prefixes_are_not_ancestors() {
        let projection = Projection::new().exclude("title").exclude("titles");

        assert_eq!(projection.normalize().excluded().count(), 2);
        assert!(!projection.excludes("titlesque"));
        assert!(projection.excludes("title.original"));
    }

    #[test]
    fn rejects_unknown_and_identity_paths() {
        assert!(matches!(
            Projection::new().exclude("missing").validate(&shape()),
            Err(DocumentStoreError::InvalidProjection(_))
        ));
        assert!(matches!(
            Projection::new().exclude("id").validate(&shape()),
            Err(DocumentStoreError::InvalidProjection(_))
        ));
        assert!(matches!(
            Projection::new().exclude("chapters.title").validate(&shape()),
            Err(DocumentStoreError::InvalidProjection(_))
        ));
    }

    #[test]
    fn native_document_hides_primary_key_by_default() {
        assert_eq!(Projection::new().to_document(), Some(doc! { "_id": 0 }));
        assert_eq!(Projection::new().with_primary_key().to_document(), None);
        assert_eq!(
            Projection::new().exclude("chapters").to_document(),
            Some(doc! { "chapters": 0, "_id": 0 })
        );
    }

    #[test]
    fn apply_removes_nested_leaf_and_is_idempotent() {
        let mut document = doc! {
            "_id": 1,
            "id": "a",
            "fandom": "X",
            "title": { "original": "t", "translations": ["u"] },
        };
        let projection = Projection::new().exclude("title.translations");

        projection.apply(&mut document);
        let once = document.clone();
        projection.apply(&mut document);

        assert_eq!(once, document);
        assert_eq!(document, doc! { "id": "a", "fandom": "X", "title": { "original": "t" } });
    }

    #[test]
    fn merge_unions_exclusions_and_keeps_requested_primary_key() {
        let merged = Projection::new()
            .exclude("chapters")
            .merge(&Projection::new().exclude("fandom").with_primary_key());

        assert!(merged.includes_primary_key());
        assert!(merged.excludes("chapters"));
        assert!(merged.excludes("fandom"));
        assert!(!Projection::new().merge(&Projection::new()).includes_primary_key());
    }
}
