//! Multi-language text values shared by titles, summaries, chapters and paragraphs.

use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

use crate::shape::{FieldKind, Shape};

/// A piece of text in one language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Text {
    pub raw: String,
    /// Marked-up rendition of `raw`, empty when there is none.
    #[serde(default)]
    pub rich: String,
    pub language_code: String,
    pub language: String,
}

impl Text {
    pub fn new(raw: impl Into<String>, language_code: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            rich: String::new(),
            language_code: language_code.into(),
            language: language.into(),
        }
    }

    pub fn with_rich(mut self, rich: impl Into<String>) -> Self {
        self.rich = rich.into();
        self
    }

    /// The rich rendition when present, the raw text otherwise.
    pub fn display(&self) -> &str {
        if self.rich.is_empty() { &self.raw } else { &self.rich }
    }
}

/// An original text and its translations, main translation first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextWithTranslations {
    pub original: Text,
    #[serde(default)]
    pub translations: Vec<Text>,
}

impl TextWithTranslations {
    pub fn new(original: Text) -> Self {
        Self { original, translations: Vec::new() }
    }

    pub fn with_translation(mut self, translation: Text) -> Self {
        self.translations.push(translation);
        self
    }

    pub fn main_translation(&self) -> Option<&Text> {
        self.translations.first()
    }
}

pub(crate) static TEXT_SHAPE: LazyLock<Shape> = LazyLock::new(|| {
    Shape::new()
        .field("raw", FieldKind::String)
        .field("rich", FieldKind::String)
        .field("language_code", FieldKind::String)
        .field("language", FieldKind::String)
});

pub(crate) static TEXT_WITH_TRANSLATIONS_SHAPE: LazyLock<Shape> = LazyLock::new(|| {
    Shape::new()
        .field("original", FieldKind::Object(TEXT_SHAPE.clone()))
        .field("translations", FieldKind::array(FieldKind::Object(TEXT_SHAPE.clone())))
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefers_rich_text() {
        let plain = Text::new("Hello", "en", "English");

        assert_eq!(plain.display(), "Hello");
        assert_eq!(plain.clone().with_rich("<p>Hello</p>").display(), "<p>Hello</p>");
    }

    #[test]
    fn main_translation_is_the_first() {
        let title = TextWithTranslations::new(Text::new("Hola", "es", "Spanish"))
            .with_translation(Text::new("Hello", "en", "English"))
            .with_translation(Text::new("Bonjour", "fr", "French"));

        assert_eq!(title.main_translation().map(|t| t.raw.as_str()), Some("Hello"));
    }

    #[test]
    fn missing_optional_fields_default() {
        let text: TextWithTranslations = serde_json::from_value(serde_json::json!({
            "original": { "raw": "Hi", "language_code": "en", "language": "English" }
        }))
        .unwrap();

        assert_eq!(text.original.rich, "");
        assert!(text.translations.is_empty());
    }
}
