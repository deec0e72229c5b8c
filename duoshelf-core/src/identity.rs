//! Document identity and timestamp lifecycle.
//!
//! Every write goes through this module: [`create_document`] turns a record into a
//! [`StoredDocument`] and [`on_update`] stamps an [`Update`] with a fresh `updated_at`.
//! Timestamps come from a process-wide clock that never hands out the same
//! millisecond twice, so a document updated right after creation still ends up with
//! `updated_at > created_at`.

use std::{
    fmt,
    sync::atomic::{AtomicI64, Ordering},
};

use bson::{Binary, Bson, DateTime, Uuid, spec::BinarySubtype};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    document::{CREATED_AT, ID, Record, StoredDocument, UPDATED_AT},
    error::{DocumentStoreError, DocumentStoreResult},
    update::Update,
};

static LAST_STAMP: AtomicI64 = AtomicI64::new(i64::MIN);

/// Storage-native primary key derived from a record id.
///
/// Record ids must be UUID strings; the key is their 16-byte binary form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrimaryKey(Uuid);

impl PrimaryKey {
    /// Parses a record id.
    ///
    /// # Errors
    ///
    /// [`DocumentStoreError::InvalidIdentifier`] when `id` is not a UUID.
    pub fn parse(id: &str) -> DocumentStoreResult<Self> {
        Uuid::parse_str(id)
            .map(PrimaryKey)
            .map_err(|e| DocumentStoreError::InvalidIdentifier(id.to_string(), e.to_string()))
    }

    /// Reads a key back from its stored form (binary subtype 4).
    pub fn from_bson(value: Bson) -> DocumentStoreResult<Self> {
        match value {
            Bson::Binary(Binary { subtype: BinarySubtype::Uuid, bytes }) => {
                let bytes: [u8; 16] = bytes.try_into().map_err(|_| {
                    DocumentStoreError::Serialization("_id must hold 16 bytes".to_string())
                })?;
                Ok(PrimaryKey(Uuid::from_bytes(bytes)))
            }
            other => Err(DocumentStoreError::Serialization(format!(
                "_id must be a UUID, got {:?}",
                other.element_type()
            ))),
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.0
    }

    pub fn to_bson(&self) -> Bson {
        Bson::from(self.0)
    }

    /// The record id this key was parsed from, in canonical lowercase form.
    pub fn as_id_string(&self) -> String {
        self.0.to_string()
    }
}

impl fmt::Display for PrimaryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Current time in milliseconds, strictly greater than any value returned before.
pub fn now() -> DateTime {
    let wall = Utc::now().timestamp_millis();
    let previous = LAST_STAMP
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| Some(wall.max(last.saturating_add(1))))
        .unwrap_or_else(|last| last);

    DateTime::from_millis(wall.max(previous.saturating_add(1)))
}

/// Wraps a record with its primary key and matching creation/update timestamps.
pub fn create_document<R: Record>(record: R) -> DocumentStoreResult<StoredDocument<R>> {
    let primary_key = PrimaryKey::parse(record.id())?;
    let stamp = now();

    Ok(StoredDocument {
        primary_key: Some(primary_key),
        created_at: stamp,
        updated_at: stamp,
        record,
    })
}

/// Batch form of [`create_document`]. Fails on the first record with an invalid id.
pub fn create_documents<R, I>(records: I) -> DocumentStoreResult<Vec<StoredDocument<R>>>
where
    R: Record,
    I: IntoIterator<Item = R>,
{
    records.into_iter().map(create_document).collect()
}

/// Forces `updated_at` to the current time, replacing any caller-supplied value.
pub fn on_update(update: Update) -> Update {
    stamp_update(update, now())
}

/// Like [`on_update`], and fills in `id` and `created_at` if the update creates the document.
pub fn on_upsert(update: Update, id: &str) -> Update {
    let stamp = now();

    stamp_update(update, stamp)
        .set_on_insert(ID, id)
        .set_on_insert(CREATED_AT, stamp)
}

fn stamp_update(update: Update, stamp: DateTime) -> Update {
    if update.targets(UPDATED_AT) {
        debug!("overwriting caller-supplied {UPDATED_AT}");
    }

    update.without(UPDATED_AT).set(UPDATED_AT, stamp)
}

#[cfg(test)]
mod tests {
    use std::sync::LazyLock;

    use serde::{Deserialize, Serialize};

    use super::*;
    use crate::{
        shape::{FieldKind, Shape},
        update::UpdateOp,
    };

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Hero {
        id: String,
        name: String,
    }

    static HERO_SHAPE: LazyLock<Shape> = LazyLock::new(|| {
        Shape::new().field("id", FieldKind::String).field("name", FieldKind::String)
    });

    impl Record for Hero {
        fn id(&self) -> &str {
            &self.id
        }

        fn collection_name() -> &'static str {
            "heroes"
        }

        fn shape() -> &'static Shape {
            &HERO_SHAPE
        }
    }

    fn iron_man() -> Hero {
        Hero { id: "b38c6fd7-3c0f-44a9-93d9-bcd2e08e18cd".to_string(), name: "Iron Man".to_string() }
    }

    #[test]
    fn created_document_keeps_id_and_equal_timestamps() {
        let document = create_document(iron_man()).unwrap();

        assert_eq!(document.record, iron_man());
        assert_eq!(document.created_at, document.updated_at);
        assert_eq!(
            document.primary_key.unwrap().as_id_string(),
            "b38c6fd7-3c0f-44a9-93d9-bcd2e08e18cd"
        );
    }

    #[test]
    fn malformed_id_is_rejected() {
        let hero = Hero { id: "a1".to_string(), name: "Nobody".to_string() };

        assert!(matches!(
            create_document(hero),
            Err(DocumentStoreError::InvalidIdentifier(id, _)) if id == "a1"
        ));
    }

    #[test]
    fn primary_key_round_trips_through_bson() {
        let key = PrimaryKey::parse("e6b8de95-5053-4c41-ab68-32c50246d494").unwrap();

        assert_eq!(PrimaryKey::from_bson(key.to_bson()).unwrap(), key);
        assert!(PrimaryKey::from_bson(Bson::String("x".into())).is_err());
    }

    #[test]
    fn clock_is_strictly_increasing() {
        let stamps: Vec<_> = (0..1000).map(|_| now()).collect();

        assert!(stamps.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn stamped_update_replaces_caller_timestamp() {
        let before = now();
        let update = on_update(Update::new().set("name", "Tony").set("updated_at", DateTime::from_millis(0)));

        let stamps: Vec<_> = update
            .ops()
            .iter()
            .filter_map(|op| match op {
                UpdateOp::Set(path, Bson::DateTime(at)) if path == "updated_at" => Some(*at),
                _ => None,
            })
            .collect();

        assert_eq!(stamps.len(), 1);
        assert!(stamps[0] > before);
        assert!(update.targets("name"));
    }

    #[test]
    fn upsert_fills_insert_only_fields() {
        let update = on_upsert(Update::new().set("name", "Bruce"), "bcf0faef-9ae0-424d-a3f3-3403174e7d7c");

        assert!(update.ops().iter().any(|op| matches!(op, UpdateOp::SetOnInsert(path, _) if path == "id")));
        assert!(update.ops().iter().any(|op| matches!(op, UpdateOp::SetOnInsert(path, _) if path == "created_at")));
    }
}
