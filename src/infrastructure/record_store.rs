// Record store - JSON test and ripple records with daily identifiers
use crate::application::repositories::{RecordKind, RecordRepository};
use crate::domain::error::PersistenceFailure;
use crate::domain::record::{RecordEntry, RippleRecord, TestRecord};
use crate::infrastructure::json_file::{read_json, write_json};
use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDate};
use rand::Rng;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

const SUFFIX_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const SUFFIX_LEN: usize = 4;

/// Per-family counter, reset when the date changes.
#[derive(Debug, Serialize, Deserialize)]
struct IdTracker {
    date: NaiveDate,
    test_number: u32,
}

/// Listing projection of a test record.
#[derive(Deserialize)]
struct TestHeader {
    test_id: String,
    date: DateTime<Local>,
    phase1_pass: bool,
    phase2_pass: bool,
    phase3_pass: bool,
    short_circuit_pass: bool,
}

#[derive(Deserialize)]
struct RippleHeader {
    test_id: String,
    date: DateTime<Local>,
    pass: bool,
}

/// Layout under `root`:
///
/// ```text
/// tests/<test_id>.json
/// ripple/<test_id>.json
/// test_id_tracker.json
/// ripple_id_tracker.json
/// ```
pub struct JsonRecordStore {
    root: PathBuf,
    ids: Mutex<()>,
}

impl JsonRecordStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ids: Mutex::new(()),
        }
    }

    fn dir(&self, kind: RecordKind) -> PathBuf {
        match kind {
            RecordKind::Test => self.root.join("tests"),
            RecordKind::Ripple => self.root.join("ripple"),
        }
    }

    fn tracker_path(&self, kind: RecordKind) -> PathBuf {
        match kind {
            RecordKind::Test => self.root.join("test_id_tracker.json"),
            RecordKind::Ripple => self.root.join("ripple_id_tracker.json"),
        }
    }

    fn record_path(&self, kind: RecordKind, test_id: &str) -> Result<PathBuf, PersistenceFailure> {
        if test_id.is_empty() || test_id.contains(['/', '\\']) || test_id.starts_with('.') {
            return Err(PersistenceFailure::NotFound(test_id.to_string()));
        }
        Ok(self.dir(kind).join(format!("{test_id}.json")))
    }

    async fn save<T: Serialize + Sync>(
        &self,
        kind: RecordKind,
        test_id: &str,
        record: &T,
    ) -> Result<PathBuf, PersistenceFailure> {
        let path = self.record_path(kind, test_id)?;
        write_json(&path, record).await?;
        tracing::info!("saved {}", path.display());
        Ok(path)
    }

    async fn load<T: DeserializeOwned>(
        &self,
        kind: RecordKind,
        test_id: &str,
    ) -> Result<T, PersistenceFailure> {
        let path = self.record_path(kind, test_id)?;
        read_json(&path)
            .await?
            .ok_or_else(|| PersistenceFailure::NotFound(test_id.to_string()))
    }

    async fn delete(&self, kind: RecordKind, test_id: &str) -> Result<(), PersistenceFailure> {
        let path = self.record_path(kind, test_id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                tracing::info!("deleted {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(PersistenceFailure::NotFound(test_id.to_string()))
            }
            Err(e) => Err(PersistenceFailure::io(path, e)),
        }
    }

    /// Decodes every `*.json` in `dir`. Unreadable files are skipped with a warning.
    async fn scan<H: DeserializeOwned>(dir: &Path) -> Result<Vec<H>, PersistenceFailure> {
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(PersistenceFailure::io(dir, e)),
        };

        let mut headers = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| PersistenceFailure::io(dir, e))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match read_json::<H>(&path).await {
                Ok(Some(header)) => headers.push(header),
                Ok(None) => {}
                Err(e) => tracing::warn!("skipping {}: {}", path.display(), e),
            }
        }
        Ok(headers)
    }
}

fn random_suffix() -> String {
    let mut rng = rand::thread_rng();
    (0..SUFFIX_LEN)
        .map(|_| char::from(SUFFIX_ALPHABET[rng.gen_range(0..SUFFIX_ALPHABET.len())]))
        .collect()
}

fn file_safe(prefix: &str) -> String {
    prefix
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

fn newest_first(entries: &mut [RecordEntry]) {
    entries.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| a.test_id.cmp(&b.test_id)));
}

#[async_trait]
impl RecordRepository for JsonRecordStore {
    async fn next_id(&self, kind: RecordKind, prefix: &str) -> Result<String, PersistenceFailure> {
        let _guard = self.ids.lock().await;
        let path = self.tracker_path(kind);
        let today = Local::now().date_naive();

        let test_number = match read_json::<IdTracker>(&path).await? {
            Some(tracker) if tracker.date == today => tracker.test_number + 1,
            _ => 1,
        };
        write_json(
            &path,
            &IdTracker {
                date: today,
                test_number,
            },
        )
        .await?;

        let prefix = match kind {
            RecordKind::Test => file_safe(prefix).to_uppercase(),
            RecordKind::Ripple => file_safe(prefix),
        };
        Ok(format!(
            "{}-{}-{:03}-{}",
            prefix,
            today.format("%Y%m%d"),
            test_number,
            random_suffix()
        ))
    }

    async fn save_test(&self, record: &TestRecord) -> Result<PathBuf, PersistenceFailure> {
        self.save(RecordKind::Test, &record.summary.test_id, record).await
    }

    async fn load_test(&self, test_id: &str) -> Result<TestRecord, PersistenceFailure> {
        self.load(RecordKind::Test, test_id).await
    }

    async fn list_tests(&self) -> Result<Vec<RecordEntry>, PersistenceFailure> {
        let headers: Vec<TestHeader> = Self::scan(&self.dir(RecordKind::Test)).await?;
        let mut entries: Vec<RecordEntry> = headers
            .into_iter()
            .map(|h| RecordEntry {
                pass: h.phase1_pass && h.phase2_pass && h.phase3_pass && h.short_circuit_pass,
                test_id: h.test_id,
                date: h.date,
            })
            .collect();
        newest_first(&mut entries);
        Ok(entries)
    }

    async fn delete_test(&self, test_id: &str) -> Result<(), PersistenceFailure> {
        self.delete(RecordKind::Test, test_id).await
    }

    async fn save_ripple(&self, record: &RippleRecord) -> Result<PathBuf, PersistenceFailure> {
        self.save(RecordKind::Ripple, &record.test_id, record).await
    }

    async fn load_ripple(&self, test_id: &str) -> Result<RippleRecord, PersistenceFailure> {
        self.load(RecordKind::Ripple, test_id).await
    }

    async fn list_ripples(&self) -> Result<Vec<RecordEntry>, PersistenceFailure> {
        let headers: Vec<RippleHeader> = Self::scan(&self.dir(RecordKind::Ripple)).await?;
        let mut entries: Vec<RecordEntry> = headers
            .into_iter()
            .map(|h| RecordEntry {
                test_id: h.test_id,
                date: h.date,
                pass: h.pass,
            })
            .collect();
        newest_first(&mut entries);
        Ok(entries)
    }

    async fn delete_ripple(&self, test_id: &str) -> Result<(), PersistenceFailure> {
        self.delete(RecordKind::Ripple, test_id).await
    }
}
