//! Applies update operations to documents held in memory.

use bson::{Bson, Document};

use duoshelf_core::{
    error::{DocumentStoreError, DocumentStoreResult},
    update::UpdateOp,
};

use crate::evaluator::Comparable;

/// Applies `ops` in order. Insert-only operations run only when `inserting` is set.
///
/// Returns whether the document changed. On error the document may be partially
/// updated; callers work on a copy.
pub(crate) fn apply(document: &mut Document, ops: &[UpdateOp], inserting: bool) -> DocumentStoreResult<bool> {
    let before = document.clone();

    for op in ops {
        match op {
            UpdateOp::Set(path, value) => set_path(document, path, value.clone())?,
            UpdateOp::SetOnInsert(path, value) => {
                if inserting {
                    set_path(document, path, value.clone())?;
                }
            }
            UpdateOp::Unset(path) => unset_path(document, path),
            UpdateOp::Inc(path, amount) => {
                let current = get_path(document, path).cloned().unwrap_or(Bson::Int32(0));
                set_path(document, path, add(path, &current, amount)?)?;
            }
            UpdateOp::Push(path, values) => {
                let array = array_at(document, path)?;
                array.extend(values.iter().cloned());
            }
            UpdateOp::AddToSet(path, values) => {
                let array = array_at(document, path)?;
                for value in values {
                    let candidate = Comparable::from(value);
                    if !array.iter().any(|item| Comparable::from(item) == candidate) {
                        array.push(value.clone());
                    }
                }
            }
            UpdateOp::Pull(path, value) => {
                if get_path(document, path).is_some() {
                    let target = Comparable::from(value);
                    array_at(document, path)?.retain(|item| Comparable::from(item) != target);
                }
            }
        }
    }

    Ok(*document != before)
}

/// Writes `value` at a dot-path, creating intermediate documents.
pub(crate) fn set_path(document: &mut Document, path: &str, value: Bson) -> DocumentStoreResult<()> {
    match path.split_once('.') {
        None => {
            document.insert(path, value);
            Ok(())
        }
        Some((head, rest)) => {
            if !document.contains_key(head) {
                document.insert(head, Document::new());
            }

            match document.get_mut(head) {
                Some(Bson::Document(child)) => set_path(child, rest, value),
                _ => Err(DocumentStoreError::InvalidUpdate(format!("{head} is not a document"))),
            }
        }
    }
}

fn get_path<'a>(document: &'a Document, path: &str) -> Option<&'a Bson> {
    match path.split_once('.') {
        None => document.get(path),
        Some((head, rest)) => match document.get(head)? {
            Bson::Document(child) => get_path(child, rest),
            _ => None,
        },
    }
}

fn unset_path(document: &mut Document, path: &str) {
    match path.split_once('.') {
        None => {
            document.remove(path);
        }
        Some((head, rest)) => {
            if let Some(Bson::Document(child)) = document.get_mut(head) {
                unset_path(child, rest);
            }
        }
    }
}

/// The array at `path`, created empty when missing.
fn array_at<'a>(document: &'a mut Document, path: &str) -> DocumentStoreResult<&'a mut Vec<Bson>> {
    if get_path(document, path).is_none() {
        set_path(document, path, Bson::Array(Vec::new()))?;
    }

    match get_path_mut(document, path) {
        Some(Bson::Array(array)) => Ok(array),
        _ => Err(DocumentStoreError::InvalidUpdate(format!("{path} is not an array"))),
    }
}

fn get_path_mut<'a>(document: &'a mut Document, path: &str) -> Option<&'a mut Bson> {
    match path.split_once('.') {
        None => document.get_mut(path),
        Some((head, rest)) => match document.get_mut(head)? {
            Bson::Document(child) => get_path_mut(child, rest),
            _ => None,
        },
    }
}

fn add(path: &str, current: &Bson, amount: &Bson) -> DocumentStoreResult<Bson> {
    let sum = match (current, amount) {
        (Bson::Int32(a), Bson::Int32(b)) => a.checked_add(*b).map_or(Bson::Int64(i64::from(*a) + i64::from(*b)), Bson::Int32),
        (Bson::Int32(a), Bson::Int64(b)) => Bson::Int64(checked(path, i64::from(*a), *b)?),
        (Bson::Int64(a), Bson::Int32(b)) => Bson::Int64(checked(path, *a, i64::from(*b))?),
        (Bson::Int64(a), Bson::Int64(b)) => Bson::Int64(checked(path, *a, *b)?),
        (Bson::Double(a), other) | (other, Bson::Double(a)) => match other {
            Bson::Int32(b) => Bson::Double(a + *b as f64),
            Bson::Int64(b) => Bson::Double(a + *b as f64),
            Bson::Double(b) => Bson::Double(a + b),
            _ => return Err(not_numeric(path)),
        },
        _ => return Err(not_numeric(path)),
    };

    Ok(sum)
}

fn checked(path: &str, a: i64, b: i64) -> DocumentStoreResult<i64> {
    a.checked_add(b)
        .ok_or_else(|| DocumentStoreError::InvalidUpdate(format!("increment overflows the value at {path}")))
}

fn not_numeric(path: &str) -> DocumentStoreError {
    DocumentStoreError::InvalidUpdate(format!("cannot increment non-numeric value at {path}"))
}

#[cfg(test)]
mod tests {
    use bson::doc;
    use duoshelf_core::update::Update;

    use super::*;

    #[test]
    fn sequential_pushes_keep_order() {
        let mut document = doc! { "title": { "original": "Hi", "translations": [] } };

        apply(&mut document, Update::new().push("title.translations", "a").ops(), false).unwrap();
        apply(&mut document, Update::new().push("title.translations", "b").ops(), false).unwrap();

        assert_eq!(document, doc! { "title": { "original": "Hi", "translations": ["a", "b"] } });
    }

    #[test]
    fn set_creates_intermediate_documents_and_unset_removes() {
        let mut document = doc! { "name": "Batman" };
        let update = Update::new().set("biography.full_name", "Bruce Wayne").unset("name");

        assert!(apply(&mut document, update.ops(), false).unwrap());
        assert_eq!(document, doc! { "biography": { "full_name": "Bruce Wayne" } });
    }

    #[test]
    fn increments_promote_numeric_types() {
        let mut document = doc! { "a": 1, "b": 1.5, "c": (i32::MAX) };
        let update = Update::new().inc("a", 2).inc("b", 1).inc("c", 1).inc("d", 5);

        apply(&mut document, update.ops(), false).unwrap();

        assert_eq!(document, doc! { "a": 3, "b": 2.5, "c": (i32::MAX as i64 + 1), "d": 5 });
    }

    #[test]
    fn overflowing_increment_is_rejected() {
        let mut document = doc! { "kudos": i64::MAX };

        let result = apply(&mut document, Update::new().inc("kudos", 1i64).ops(), false);

        assert!(matches!(result, Err(DocumentStoreError::InvalidUpdate(_))));
    }

    #[test]
    fn add_to_set_and_pull() {
        let mut document = doc! { "tags": ["fluff", "angst"] };

        apply(&mut document, Update::new().add_to_set("tags", "fluff").ops(), false).unwrap();
        apply(&mut document, Update::new().add_to_set("tags", "au").ops(), false).unwrap();
        apply(&mut document, Update::new().pull("tags", "angst").ops(), false).unwrap();

        assert_eq!(document, doc! { "tags": ["fluff", "au"] });
    }

    #[test]
    fn unchanged_document_reports_no_modification() {
        let mut document = doc! { "name": "Batman" };

        assert!(!apply(&mut document, Update::new().set("name", "Batman").ops(), false).unwrap());
    }

    #[test]
    fn rejects_push_onto_scalar() {
        let mut document = doc! { "name": "Batman" };

        assert!(matches!(
            apply(&mut document, Update::new().push("name", "x").ops(), false),
            Err(DocumentStoreError::InvalidUpdate(_))
        ));
    }
}
