//! Chapters, paragraphs and authors.

use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

use super::text::{TEXT_SHAPE, TEXT_WITH_TRANSLATIONS_SHAPE, Text, TextWithTranslations};
use crate::shape::{FieldKind, Shape};

pub const ANONYMOUS: &str = "Anonymous";

/// One paragraph of a chapter with its translations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paragraph {
    pub index: i64,
    /// Content hash computed upstream; empty when unknown.
    #[serde(default)]
    pub hash: String,
    pub original: Text,
    #[serde(default)]
    pub translations: Vec<Text>,
}

impl Paragraph {
    pub fn new(index: i64, original: Text) -> Self {
        Self { index, hash: String::new(), original, translations: Vec::new() }
    }

    pub fn main_translation(&self) -> Option<&Text> {
        self.translations.first()
    }
}

/// A chapter. One-shots have a single chapter without title or summary.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Chapter {
    #[serde(default)]
    pub title: Option<TextWithTranslations>,
    #[serde(default)]
    pub paragraphs: Vec<Paragraph>,
    #[serde(default)]
    pub summary: Option<TextWithTranslations>,
}

impl Chapter {
    pub fn one_shot(paragraphs: Vec<Paragraph>) -> Self {
        Self { title: None, paragraphs, summary: None }
    }

    pub fn titled(title: TextWithTranslations, paragraphs: Vec<Paragraph>) -> Self {
        Self { title: Some(title), paragraphs, summary: None }
    }

    /// Looks a paragraph up by its hash.
    pub fn paragraph(&self, hash: &str) -> Option<&Paragraph> {
        self.paragraphs.iter().find(|p| p.hash == hash)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub name: String,
    pub url: String,
}

impl Author {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self { name: name.into(), url: url.into() }
    }
}

pub(crate) static PARAGRAPH_SHAPE: LazyLock<Shape> = LazyLock::new(|| {
    Shape::new()
        .field("index", FieldKind::Number)
        .field("hash", FieldKind::String)
        .field("original", FieldKind::Object(TEXT_SHAPE.clone()))
        .field("translations", FieldKind::array(FieldKind::Object(TEXT_SHAPE.clone())))
});

pub(crate) static CHAPTER_SHAPE: LazyLock<Shape> = LazyLock::new(|| {
    Shape::new()
        .field("title", FieldKind::optional(FieldKind::Object(TEXT_WITH_TRANSLATIONS_SHAPE.clone())))
        .field("paragraphs", FieldKind::array(FieldKind::Object(PARAGRAPH_SHAPE.clone())))
        .field("summary", FieldKind::optional(FieldKind::Object(TEXT_WITH_TRANSLATIONS_SHAPE.clone())))
});

pub(crate) static AUTHOR_SHAPE: LazyLock<Shape> = LazyLock::new(|| {
    Shape::new()
        .field("name", FieldKind::String)
        .field("url", FieldKind::String)
});
