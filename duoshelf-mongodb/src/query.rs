//! Query translation from duoshelf filter expressions to MongoDB query syntax.
//!
//! This module translates abstract filter expressions into MongoDB BSON documents for
//! execution by the MongoDB query engine. String helpers (`starts_with`, `ends_with`,
//! substring `contains`) become anchored, escaped, case-sensitive regular expressions.

use bson::{Bson, Document, doc};

use duoshelf_core::{
    error::DocumentStoreError,
    query::{Expr, FieldOp, QueryVisitor},
};

/// Translates filter expressions into MongoDB query documents.
///
/// This struct implements the [`QueryVisitor`] trait to convert abstract
/// query expressions into MongoDB's native BSON query syntax.
pub(crate) struct MongoQueryTranslator;

impl MongoQueryTranslator {
    /// The query document for an optional filter; `{}` matches everything.
    pub(crate) fn translate(filter: Option<&Expr>) -> Result<Document, DocumentStoreError> {
        filter.map_or_else(|| Ok(Document::new()), |expr| MongoQueryTranslator.visit_expr(expr))
    }

    fn visit_all(&mut self, exprs: &[Expr]) -> Result<Vec<Document>, DocumentStoreError> {
        exprs.iter().map(|expr| self.visit_expr(expr)).collect()
    }
}

fn literal(value: &Bson, op: &str) -> Result<String, DocumentStoreError> {
    match value {
        Bson::String(s) => Ok(regex::escape(s)),
        _ => Err(DocumentStoreError::InvalidFilter(format!("{op} requires a string value"))),
    }
}

impl QueryVisitor for MongoQueryTranslator {
    type Output = Document;
    type Error = DocumentStoreError;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        Ok(doc! { "$and": self.visit_all(exprs)? })
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        Ok(doc! { "$or": self.visit_all(exprs)? })
    }

    // `$not` only applies to operator expressions, so a whole sub-filter is negated with `$nor`.
    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        Ok(doc! { "$nor": [self.visit_expr(expr)?] })
    }

    // A field holding null counts as missing.
    fn visit_exists(&mut self, field: &str, should_exist: bool) -> Result<Self::Output, Self::Error> {
        Ok(if should_exist {
            doc! { field: { "$ne": Bson::Null } }
        } else {
            doc! { field: { "$eq": Bson::Null } }
        })
    }

    fn visit_elem_match(&mut self, field: &str, expr: &Expr) -> Result<Self::Output, Self::Error> {
        Ok(doc! { field: { "$elemMatch": self.visit_expr(expr)? } })
    }

    fn visit_field(&mut self, field: &str, op: &FieldOp, value: &Bson) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            field: match op {
                FieldOp::Eq => doc! { "$eq": value },
                FieldOp::Ne => doc! { "$ne": value },
                FieldOp::Gt => doc! { "$gt": value },
                FieldOp::Gte => doc! { "$gte": value },
                FieldOp::Lt => doc! { "$lt": value },
                FieldOp::Lte => doc! { "$lte": value },
                FieldOp::In | FieldOp::AnyOf => doc! { "$in": value },
                FieldOp::Nin | FieldOp::NoneOf => doc! { "$nin": value },
                FieldOp::Matches => match value {
                    Bson::String(pattern) => doc! { "$regex": pattern },
                    _ => return Err(DocumentStoreError::InvalidFilter("matches requires a pattern".to_string())),
                },
                FieldOp::StartsWith => doc! { "$regex": format!("^{}", literal(value, "starts_with")?) },
                FieldOp::EndsWith => doc! { "$regex": format!("{}$", literal(value, "ends_with")?) },
                FieldOp::Contains => match value {
                    Bson::String(s) => doc! { "$regex": regex::escape(s) },
                    other => doc! { "$eq": other },
                },
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use duoshelf_core::query::Filter;

    use super::*;

    fn translate(expr: Expr) -> Document {
        MongoQueryTranslator::translate(Some(&expr)).unwrap()
    }

    #[test]
    fn empty_filter_matches_everything() {
        assert_eq!(MongoQueryTranslator::translate(None).unwrap(), doc! {});
    }

    #[test]
    fn translates_comparisons_and_sets() {
        assert_eq!(translate(Filter::eq("fandom", "Marvel")), doc! { "fandom": { "$eq": "Marvel" } });
        assert_eq!(translate(Filter::gte("chapters.number", 2)), doc! { "chapters.number": { "$gte": 2 } });
        assert_eq!(
            translate(Filter::in_("language_code", ["en", "fr"])),
            doc! { "language_code": { "$in": ["en", "fr"] } }
        );
        assert_eq!(translate(Filter::none_of("tags", ["angst"])), doc! { "tags": { "$nin": ["angst"] } });
    }

    #[test]
    fn string_helpers_are_escaped_regexes() {
        assert_eq!(translate(Filter::starts_with("title", "Mr. ")), doc! { "title": { "$regex": "^Mr\\. " } });
        assert_eq!(translate(Filter::ends_with("title", "(AU)")), doc! { "title": { "$regex": "\\(AU\\)$" } });
        assert_eq!(translate(Filter::contains("title", "a+b")), doc! { "title": { "$regex": "a\\+b" } });
        assert_eq!(translate(Filter::contains("ratings", 5)), doc! { "ratings": { "$eq": 5 } });
        assert_eq!(translate(Filter::matches("title", "^The")), doc! { "title": { "$regex": "^The" } });
    }

    #[test]
    fn translates_logical_operators() {
        let expr = Filter::and([
            Filter::or([Filter::eq("a", 1), Filter::eq("b", 2)]),
            Filter::not(Filter::eq("c", 3)),
        ]);

        assert_eq!(
            translate(expr),
            doc! {
                "$and": [
                    { "$or": [{ "a": { "$eq": 1 } }, { "b": { "$eq": 2 } }] },
                    { "$nor": [{ "c": { "$eq": 3 } }] },
                ]
            }
        );
    }

    #[test]
    fn translates_presence_and_element_match() {
        assert_eq!(translate(Filter::exists("rating")), doc! { "rating": { "$ne": null } });
        assert_eq!(translate(Filter::not_exists("rating")), doc! { "rating": { "$eq": null } });
        assert_eq!(
            translate(Filter::elem_match("chapters", Filter::lt("number", 3))),
            doc! { "chapters": { "$elemMatch": { "number": { "$lt": 3 } } } }
        );
    }
}
