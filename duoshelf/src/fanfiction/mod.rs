//! The fanfiction catalog record.
//!
//! [`Fanfiction`] is the stored record, built only through [`FanfictionInput`] and
//! [`NewRecord::from_input`]. Catalog pages read through [`FanfictionCard`], which leaves
//! the chapters out.
//!
//! ```ignore
//! let client = Client::connect(InMemoryStore::builder()).await?;
//! let fanfictions = fanfiction::repository(&client, &StoreConfig::default()).await?;
//!
//! let created = fanfictions.create(input).await?;
//! let update = Fanfiction::add_title_translation(&Text::new("Hello", "en", "English"))?;
//! fanfictions.update(&created.record.id, update).await?;
//! ```

mod chapter;
mod text;

use std::sync::LazyLock;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use chapter::{ANONYMOUS, Author, Chapter, Paragraph};
pub use text::{Text, TextWithTranslations};

use crate::{
    backend::StoreBackend,
    client::Client,
    config::StoreConfig,
    document::{NewRecord, Record, View},
    error::{DocumentStoreError, DocumentStoreResult},
    identity::PrimaryKey,
    projection::Projection,
    repository::Repository,
    shape::{FieldKind, Shape},
    update::Update,
};

pub const KIND: &str = "fanfiction";

/// Repository over the fanfiction collection, reading catalog cards by default.
pub type FanfictionRepository<B> = Repository<B, Fanfiction, FanfictionCard>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fanfiction {
    pub id: String,
    pub kind: String,
    pub author: Author,
    /// Identifier of the work on the site it was taken from.
    pub origin_id: String,
    pub origin_url: String,
    /// Host name of `origin_url` unless given explicitly.
    pub source: String,
    pub language: String,
    pub language_code: String,
    pub title: TextWithTranslations,
    pub summary: TextWithTranslations,
    pub fandom: String,
    pub relationship_characters: Vec<String>,
    /// `relationship_characters` joined with `/`.
    pub relationship: String,
    pub is_romantic: bool,
    pub is_one_shot: bool,
    /// Empty when read with `chapters` excluded.
    #[serde(default)]
    pub chapters: Vec<Chapter>,
}

static FANFICTION_SHAPE: LazyLock<Shape> = LazyLock::new(|| {
    let text = || FieldKind::Object(text::TEXT_WITH_TRANSLATIONS_SHAPE.clone());

    Shape::new()
        .field("id", FieldKind::String)
        .field("kind", FieldKind::String)
        .field("author", FieldKind::Object(chapter::AUTHOR_SHAPE.clone()))
        .field("origin_id", FieldKind::String)
        .field("origin_url", FieldKind::String)
        .field("source", FieldKind::String)
        .field("language", FieldKind::String)
        .field("language_code", FieldKind::String)
        .field("title", text())
        .field("summary", text())
        .field("fandom", FieldKind::String)
        .field("relationship_characters", FieldKind::array(FieldKind::String))
        .field("relationship", FieldKind::String)
        .field("is_romantic", FieldKind::Bool)
        .field("is_one_shot", FieldKind::Bool)
        .field("chapters", FieldKind::array(FieldKind::Object(chapter::CHAPTER_SHAPE.clone())))
});

impl Record for Fanfiction {
    fn id(&self) -> &str {
        &self.id
    }

    fn collection_name() -> &'static str {
        "fanfictions"
    }

    fn shape() -> &'static Shape {
        &FANFICTION_SHAPE
    }
}

impl Fanfiction {
    /// Appends a translation of the title.
    pub fn add_title_translation(translation: &Text) -> DocumentStoreResult<Update> {
        Update::new().try_push("title.translations", translation)
    }

    /// Appends a translation of the summary.
    pub fn add_summary_translation(translation: &Text) -> DocumentStoreResult<Update> {
        Update::new().try_push("summary.translations", translation)
    }

    pub fn add_chapter(chapter: &Chapter) -> DocumentStoreResult<Update> {
        Update::new().try_push("chapters", chapter)
    }
}

fn default_true() -> bool {
    true
}

/// Unvalidated fanfiction data, as received from the import pipeline or the API.
#[derive(Debug, Clone, Deserialize)]
pub struct FanfictionInput {
    /// Generated when missing.
    #[serde(default)]
    pub id: Option<String>,
    pub author: Author,
    pub origin_id: String,
    pub origin_url: String,
    #[serde(default)]
    pub source: String,
    pub language: String,
    pub language_code: String,
    pub title: TextWithTranslations,
    pub summary: TextWithTranslations,
    pub fandom: String,
    #[serde(default)]
    pub relationship_characters: Vec<String>,
    #[serde(default)]
    pub relationship: String,
    #[serde(default = "default_true")]
    pub is_romantic: bool,
    pub is_one_shot: bool,
    #[serde(default)]
    pub chapters: Vec<Chapter>,
}

impl NewRecord for Fanfiction {
    type Input = FanfictionInput;

    fn from_input(input: FanfictionInput) -> DocumentStoreResult<Self> {
        let id = match input.id {
            Some(id) => {
                PrimaryKey::parse(&id).map_err(|_| invalid(format!("id {id:?} is not a UUID")))?;
                id
            }
            None => Uuid::new_v4().to_string(),
        };

        let origin_id = input.origin_id.trim().to_string();
        if origin_id.is_empty() {
            return Err(invalid("origin_id must not be empty"));
        }

        let source = match input.source.trim() {
            "" => host_of(&input.origin_url)
                .ok_or_else(|| invalid(format!("origin_url {:?} is not an absolute URL", input.origin_url)))?
                .to_string(),
            source => source.to_string(),
        };

        if input.relationship_characters.iter().any(|c| c.trim().is_empty()) {
            return Err(invalid("relationship characters must not be empty"));
        }
        let relationship = if input.relationship_characters.is_empty() {
            input.relationship
        } else {
            input.relationship_characters.join("/")
        };

        let author = Author {
            name: match input.author.name.trim() {
                "" => ANONYMOUS.to_string(),
                name => name.to_string(),
            },
            url: input.author.url,
        };

        Ok(Fanfiction {
            id,
            kind: KIND.to_string(),
            author,
            origin_id,
            origin_url: input.origin_url,
            source,
            language: input.language,
            language_code: input.language_code,
            title: input.title,
            summary: input.summary,
            fandom: input.fandom,
            relationship_characters: input.relationship_characters,
            relationship,
            is_romantic: input.is_romantic,
            is_one_shot: input.is_one_shot,
            chapters: input.chapters,
        })
    }
}

fn invalid(message: impl Into<String>) -> DocumentStoreError {
    DocumentStoreError::Validation(message.into())
}

/// Host part of an absolute URL.
fn host_of(url: &str) -> Option<&str> {
    let (scheme, rest) = url.trim().split_once("://")?;
    if scheme.is_empty() || !scheme.chars().all(|c| c.is_ascii_alphanumeric() || "+-.".contains(c)) {
        return None;
    }

    let authority = rest.split(['/', '?', '#']).next()?;
    let host = authority.rsplit_once('@').map_or(authority, |(_, host)| host);
    let host = host.split(':').next()?;

    (!host.is_empty()).then_some(host)
}

/// Catalog card: the whole record except its chapters.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FanfictionCard {
    pub id: String,
    pub kind: String,
    pub author: Author,
    pub origin_id: String,
    pub origin_url: String,
    pub source: String,
    pub language: String,
    pub language_code: String,
    pub title: TextWithTranslations,
    pub summary: TextWithTranslations,
    pub fandom: String,
    pub relationship_characters: Vec<String>,
    pub relationship: String,
    pub is_romantic: bool,
    pub is_one_shot: bool,
}

impl View for FanfictionCard {
    type Record = Fanfiction;

    fn projection() -> Projection {
        Projection::new().exclude("chapters")
    }
}

/// Binds [`Fanfiction`] to the configured collection and returns its repository.
pub async fn repository<B: StoreBackend>(
    client: &Client<B>,
    config: &StoreConfig,
) -> DocumentStoreResult<FanfictionRepository<B>> {
    let collection = client
        .register_collection::<Fanfiction>(Some(&config.collection))
        .await?;

    Ok(Repository::new(collection))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> FanfictionInput {
        serde_json::from_value(serde_json::json!({
            "author": { "name": "", "url": "https://archiveofourown.org/users/someone" },
            "origin_id": " 12345 ",
            "origin_url": "https://archiveofourown.org/works/12345?view_adult=true",
            "language": "Spanish",
            "language_code": "es",
            "title": { "original": { "raw": "Hola", "language_code": "es", "language": "Spanish" } },
            "summary": { "original": { "raw": "Resumen", "language_code": "es", "language": "Spanish" } },
            "fandom": "Marvel",
            "relationship_characters": ["Tony Stark", "Steve Rogers"],
            "is_one_shot": true
        }))
        .unwrap()
    }

    #[test]
    fn normalizes_input() {
        let fanfiction = Fanfiction::from_input(input()).unwrap();

        assert!(PrimaryKey::parse(&fanfiction.id).is_ok());
        assert_eq!(fanfiction.kind, "fanfiction");
        assert_eq!(fanfiction.origin_id, "12345");
        assert_eq!(fanfiction.source, "archiveofourown.org");
        assert_eq!(fanfiction.relationship, "Tony Stark/Steve Rogers");
        assert_eq!(fanfiction.author.name, ANONYMOUS);
        assert!(fanfiction.is_romantic);
        assert!(fanfiction.chapters.is_empty());
    }

    #[test]
    fn keeps_explicit_id_and_source() {
        let mut input = input();
        input.id = Some("b38c6fd7-3c0f-44a9-93d9-bcd2e08e18cd".to_string());
        input.source = "AO3".to_string();

        let fanfiction = Fanfiction::from_input(input).unwrap();

        assert_eq!(fanfiction.id, "b38c6fd7-3c0f-44a9-93d9-bcd2e08e18cd");
        assert_eq!(fanfiction.source, "AO3");
    }

    #[test]
    fn rejects_invalid_input() {
        let mut bad_id = input();
        bad_id.id = Some("12345".to_string());

        let mut bad_url = input();
        bad_url.origin_url = "archiveofourown.org/works/12345".to_string();

        let mut no_origin = input();
        no_origin.origin_id = "  ".to_string();

        for input in [bad_id, bad_url, no_origin] {
            assert!(matches!(Fanfiction::from_input(input), Err(DocumentStoreError::Validation(_))));
        }
    }

    #[test]
    fn extracts_hosts() {
        assert_eq!(host_of("https://www.fanfiction.net/s/1/1/"), Some("www.fanfiction.net"));
        assert_eq!(host_of("http://user@example.com:8080"), Some("example.com"));
        assert_eq!(host_of("mailto:someone"), None);
        assert_eq!(host_of("https:///path"), None);
    }

    #[test]
    fn card_projection_and_updates_fit_the_shape() {
        let shape = Fanfiction::shape();

        assert!(FanfictionCard::projection().validate(shape).is_ok());
        assert!(shape.project(&FanfictionCard::projection()).get("chapters").is_none());

        let text = Text::new("Hello", "en", "English");
        assert!(Fanfiction::add_title_translation(&text).unwrap().validate(shape).is_ok());
        assert!(Fanfiction::add_chapter(&Chapter::one_shot(Vec::new())).unwrap().validate(shape).is_ok());
    }
}
