//! Local persistence of user supplied mockup images.
//!
//! Records live in a single SQLite table keyed by id. The store owns its
//! connection; callers open it once and pass the handle to whoever needs it.

use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{CarouselError, Result};
use crate::image_handler;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// A persisted mockup. Immutable once saved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MockupImage {
    pub id: String,
    pub data_url: String,
    /// Creation time in epoch milliseconds.
    pub timestamp: i64,
}

/// Result of one file in a batch upload.
#[derive(Debug)]
pub struct UploadOutcome {
    pub path: PathBuf,
    pub result: Result<MockupImage>,
}

pub struct MockupStore {
    conn: Connection,
    db_path: Option<PathBuf>,
}

impl MockupStore {
    /// Open (or create) the store at `path`.
    ///
    /// Creating the schema is idempotent: an existing database is reused
    /// as-is, and SQLite serialises concurrent first opens.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                CarouselError::StorageLocation(format!("{}: {}", parent.display(), e))
            })?;
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        let store = MockupStore {
            conn,
            db_path: Some(path.to_path_buf()),
        };
        store.init_schema()?;
        info!(path = %path.display(), "mockup store opened");
        Ok(store)
    }

    /// A store that lives only as long as the handle.
    pub fn open_in_memory() -> Result<Self> {
        let store = MockupStore {
            conn: Connection::open_in_memory()?,
            db_path: None,
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS mockups (
                id          TEXT PRIMARY KEY NOT NULL,
                data_url    TEXT NOT NULL,
                timestamp   INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_mockups_timestamp
                ON mockups(timestamp DESC);",
        )?;
        Ok(())
    }

    /// Location of the database file, `None` for in-memory stores.
    pub fn path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Persist `data_url` as a new mockup with a fresh id and the current time.
    pub fn save(&self, data_url: &str) -> Result<MockupImage> {
        let mockup = MockupImage {
            id: Uuid::new_v4().to_string(),
            data_url: data_url.to_string(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        };

        self.conn.execute(
            "INSERT INTO mockups (id, data_url, timestamp) VALUES (?1, ?2, ?3)",
            params![mockup.id, mockup.data_url, mockup.timestamp],
        )?;

        debug!(id = %mockup.id, bytes = data_url.len(), "mockup saved");
        Ok(mockup)
    }

    /// Read an image file, encode it as a data URL and persist it.
    pub fn save_file(&self, path: impl AsRef<Path>) -> Result<MockupImage> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let data_url = image_handler::encode_data_url(&bytes)?;
        self.save(&data_url)
    }

    /// Save each file in order, one at a time.
    ///
    /// Every input yields an outcome in the same position, so a failure can
    /// be traced back to the file that caused it.
    pub fn save_files<P: AsRef<Path>>(&self, paths: &[P]) -> Vec<UploadOutcome> {
        paths
            .iter()
            .map(|path| {
                let path = path.as_ref();
                let result = self.save_file(path);
                if let Err(e) = &result {
                    warn!(path = %path.display(), error = %e, "mockup upload failed");
                }
                UploadOutcome {
                    path: path.to_path_buf(),
                    result,
                }
            })
            .collect()
    }

    pub fn get(&self, id: &str) -> Result<Option<MockupImage>> {
        let mockup = self
            .conn
            .query_row(
                "SELECT id, data_url, timestamp FROM mockups WHERE id = ?1",
                params![id],
                |row| {
                    Ok(MockupImage {
                        id: row.get(0)?,
                        data_url: row.get(1)?,
                        timestamp: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(mockup)
    }

    /// All mockups, most recent first.
    ///
    /// Records sharing a timestamp come back newest-inserted first.
    pub fn list(&self) -> Result<Vec<MockupImage>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, data_url, timestamp FROM mockups ORDER BY timestamp DESC, rowid DESC",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok(MockupImage {
                id: row.get(0)?,
                data_url: row.get(1)?,
                timestamp: row.get(2)?,
            })
        })?;

        let mut mockups = Vec::new();
        for mockup in rows {
            mockups.push(mockup?);
        }
        Ok(mockups)
    }

    /// Remove the mockup with `id`. Returns whether a record was removed;
    /// an unknown id is not an error.
    pub fn delete(&self, id: &str) -> Result<bool> {
        let removed = self
            .conn
            .execute("DELETE FROM mockups WHERE id = ?1", params![id])?;
        debug!(id, removed, "mockup delete");
        Ok(removed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn png_data_url() -> String {
        let img = image::RgbImage::from_pixel(2, 2, image::Rgb([1, 2, 3]));
        let png = image_handler::save_image_to_bytes(&image::DynamicImage::ImageRgb8(img)).unwrap();
        image_handler::encode_data_url(&png).unwrap()
    }

    fn scratch_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("carousel-store-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_empty_store_lists_nothing() {
        let store = MockupStore::open_in_memory().unwrap();
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn test_saved_record_listed_exactly_once() {
        let store = MockupStore::open_in_memory().unwrap();
        let saved = store.save("data:image/png;base64,AAAA").unwrap();

        let listed = store.list().unwrap();
        assert_eq!(listed.iter().filter(|m| m.id == saved.id).count(), 1);
        assert_eq!(listed[0], saved);
    }

    #[test]
    fn test_ids_are_unique() {
        let store = MockupStore::open_in_memory().unwrap();
        let ids: HashSet<String> = (0..50)
            .map(|i| store.save(&format!("payload-{}", i)).unwrap().id)
            .collect();
        assert_eq!(ids.len(), 50);
    }

    #[test]
    fn test_list_is_most_recent_first() {
        let store = MockupStore::open_in_memory().unwrap();
        let a = store.save("a").unwrap();
        let b = store.save("b").unwrap();
        let c = store.save("c").unwrap();

        let listed: Vec<String> = store.list().unwrap().into_iter().map(|m| m.id).collect();
        assert_eq!(listed, vec![c.id.clone(), b.id.clone(), a.id.clone()]);

        assert!(store.delete(&b.id).unwrap());
        let listed: Vec<String> = store.list().unwrap().into_iter().map(|m| m.id).collect();
        assert_eq!(listed, vec![c.id, a.id]);
    }

    #[test]
    fn test_list_sorted_by_timestamp_descending() {
        let store = MockupStore::open_in_memory().unwrap();
        // Rows written with explicit, out-of-order timestamps.
        for (id, ts) in [("x", 30_i64), ("y", 10), ("z", 20), ("w", 20)] {
            store
                .conn
                .execute(
                    "INSERT INTO mockups (id, data_url, timestamp) VALUES (?1, '', ?2)",
                    params![id, ts],
                )
                .unwrap();
        }
        let listed = store.list().unwrap();
        for pair in listed.windows(2) {
            assert!(pair[0].timestamp >= pair[1].timestamp);
        }
        let ids: Vec<&str> = listed.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["x", "w", "z", "y"]);
    }

    #[test]
    fn test_delete_unknown_id_is_noop() {
        let store = MockupStore::open_in_memory().unwrap();
        let kept = store.save("keep").unwrap();
        assert!(!store.delete("no-such-id").unwrap());
        assert_eq!(store.list().unwrap(), vec![kept]);
    }

    #[test]
    fn test_deleted_record_is_gone() {
        let store = MockupStore::open_in_memory().unwrap();
        let m = store.save("gone").unwrap();
        store.delete(&m.id).unwrap();
        assert!(store.get(&m.id).unwrap().is_none());
        assert!(store.list().unwrap().iter().all(|x| x.id != m.id));
        // Second delete is still fine.
        assert!(!store.delete(&m.id).unwrap());
    }

    #[test]
    fn test_reopen_reuses_existing_schema() {
        let dir = scratch_dir();
        let db = dir.join("nested").join("mockups.db");

        let saved = {
            let store = MockupStore::open(&db).unwrap();
            store.save("persisted").unwrap()
        };

        let first = MockupStore::open(&db).unwrap();
        let second = MockupStore::open(&db).unwrap();
        assert_eq!(first.list().unwrap(), vec![saved.clone()]);
        assert_eq!(second.get(&saved.id).unwrap(), Some(saved));
        assert_eq!(first.path(), Some(db.as_path()));

        drop(first);
        drop(second);
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_save_files_reports_per_file_outcome() {
        let dir = scratch_dir();
        let good = dir.join("good.png");
        let bad = dir.join("bad.png");
        let missing = dir.join("missing.png");

        let (_, png) = image_handler::decode_data_url(&png_data_url()).unwrap();
        std::fs::write(&good, png).unwrap();
        std::fs::write(&bad, b"not an image").unwrap();

        let store = MockupStore::open_in_memory().unwrap();
        let outcomes = store.save_files(&[&good, &bad, &missing]);

        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes[0].path, good);
        assert!(outcomes[0].result.is_ok());
        assert!(matches!(
            outcomes[1].result,
            Err(CarouselError::ImageLoad(_))
        ));
        assert!(matches!(outcomes[2].result, Err(CarouselError::IoError(_))));

        let listed = store.list().unwrap();
        assert_eq!(listed.len(), 1);
        assert!(listed[0].data_url.starts_with("data:image/png;base64,"));

        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_unopenable_location_is_storage_error() {
        let dir = scratch_dir();
        let blocker = dir.join("file");
        std::fs::write(&blocker, b"x").unwrap();

        let err = MockupStore::open(blocker.join("mockups.db")).err().unwrap();
        assert!(err.is_storage());

        std::fs::remove_dir_all(dir).unwrap();
    }
}
