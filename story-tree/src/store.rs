//! Scenelet persistence.
//!
//! The growth engine only ever talks to a [`SceneletStore`]. Two
//! implementations ship with the crate: [`MemoryStore`] for tests and
//! embedding, and [`JsonFileStore`] which keeps every story in one versioned
//! JSON document on disk.
//!
//! Each write is atomic on its own. No transaction spans several writes, so a
//! crash between two writes leaves the tree partially grown, which the resume
//! planner is responsible for detecting.

use crate::scenelet::{NewScenelet, SceneletRecord};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;
use tokio::fs;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Current store file version.
const STORE_VERSION: u32 = 1;

/// Errors from persistence operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unknown scenelet: {0}")]
    UnknownScenelet(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Persistence port for scenelets.
#[async_trait]
pub trait SceneletStore: Send + Sync {
    /// Persist a new scenelet. The store assigns `id` and `created_at`.
    async fn create_scenelet(&self, scenelet: NewScenelet) -> Result<SceneletRecord, StoreError>;

    /// Flag a scenelet as a branch point with the given prompt.
    async fn mark_scenelet_as_branch_point(
        &self,
        id: &str,
        choice_prompt: &str,
    ) -> Result<(), StoreError>;

    /// Flag a scenelet as terminal.
    async fn mark_scenelet_as_terminal(&self, id: &str) -> Result<(), StoreError>;

    /// All scenelets of a story, in no particular order.
    async fn list_scenelets_by_story(&self, story_id: &str)
        -> Result<Vec<SceneletRecord>, StoreError>;
}

/// All scenelets held by a store, in creation order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Scenelets {
    records: Vec<SceneletRecord>,
}

impl Scenelets {
    fn create(&mut self, scenelet: NewScenelet) -> SceneletRecord {
        let record = SceneletRecord {
            id: Uuid::new_v4().to_string(),
            story_id: scenelet.story_id,
            parent_id: scenelet.parent_id,
            choice_label_from_parent: scenelet.choice_label_from_parent,
            choice_prompt: None,
            content: scenelet.content,
            is_branch_point: false,
            is_terminal_node: false,
            created_at: self.next_timestamp(),
        };
        self.records.push(record.clone());
        record
    }

    /// Wall-clock time, nudged forward so timestamps never repeat.
    fn next_timestamp(&self) -> DateTime<Utc> {
        let now = Utc::now();
        match self.records.iter().map(|r| r.created_at).max() {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        }
    }

    fn get_mut(&mut self, id: &str) -> Result<&mut SceneletRecord, StoreError> {
        self.records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| StoreError::UnknownScenelet(id.to_string()))
    }

    fn mark_branch_point(&mut self, id: &str, choice_prompt: &str) -> Result<(), StoreError> {
        let record = self.get_mut(id)?;
        record.is_branch_point = true;
        record.choice_prompt = Some(choice_prompt.to_string());
        Ok(())
    }

    fn mark_terminal(&mut self, id: &str) -> Result<(), StoreError> {
        self.get_mut(id)?.is_terminal_node = true;
        Ok(())
    }

    fn by_story(&self, story_id: &str) -> Vec<SceneletRecord> {
        self.records
            .iter()
            .filter(|r| r.story_id == story_id)
            .cloned()
            .collect()
    }
}

/// In-process scenelet store.
#[derive(Debug)]
pub struct MemoryStore {
    scenelets: Mutex<Scenelets>,
    /// Writes still allowed before every write fails; `usize::MAX` means unlimited.
    write_budget: AtomicUsize,
}

impl MemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            scenelets: Mutex::new(Scenelets::default()),
            write_budget: AtomicUsize::new(usize::MAX),
        }
    }

    /// Create a store pre-populated with records, kept exactly as given.
    pub fn with_records(records: Vec<SceneletRecord>) -> Self {
        Self {
            scenelets: Mutex::new(Scenelets { records }),
            write_budget: AtomicUsize::new(usize::MAX),
        }
    }

    /// Fail every write after the next `writes` succeed.
    ///
    /// Used to simulate a crash part-way through a growth run.
    pub fn fail_after_writes(&self, writes: usize) {
        self.write_budget.store(writes, Ordering::SeqCst);
    }

    /// Allow writes again after [`fail_after_writes`](Self::fail_after_writes).
    pub fn heal(&self) {
        self.write_budget.store(usize::MAX, Ordering::SeqCst);
    }

    /// Every record in creation order, across all stories.
    pub async fn records(&self) -> Vec<SceneletRecord> {
        self.scenelets.lock().await.records.clone()
    }

    /// Number of stored scenelets across all stories.
    pub async fn len(&self) -> usize {
        self.scenelets.lock().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn spend_write(&self) -> Result<(), StoreError> {
        let spent = self
            .write_budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |budget| match budget {
                usize::MAX => Some(usize::MAX),
                0 => None,
                n => Some(n - 1),
            });
        spent
            .map(|_| ())
            .map_err(|_| StoreError::Unavailable("write budget exhausted".to_string()))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SceneletStore for MemoryStore {
    async fn create_scenelet(&self, scenelet: NewScenelet) -> Result<SceneletRecord, StoreError> {
        self.spend_write()?;
        Ok(self.scenelets.lock().await.create(scenelet))
    }

    async fn mark_scenelet_as_branch_point(
        &self,
        id: &str,
        choice_prompt: &str,
    ) -> Result<(), StoreError> {
        self.spend_write()?;
        self.scenelets
            .lock()
            .await
            .mark_branch_point(id, choice_prompt)
    }

    async fn mark_scenelet_as_terminal(&self, id: &str) -> Result<(), StoreError> {
        self.spend_write()?;
        self.scenelets.lock().await.mark_terminal(id)
    }

    async fn list_scenelets_by_story(
        &self,
        story_id: &str,
    ) -> Result<Vec<SceneletRecord>, StoreError> {
        Ok(self.scenelets.lock().await.by_story(story_id))
    }
}

/// On-disk layout of a [`JsonFileStore`].
#[derive(Debug, Serialize, Deserialize)]
struct StoreFile {
    /// Format version for compatibility checking.
    version: u32,
    #[serde(flatten)]
    scenelets: Scenelets,
}

/// Scenelet store backed by a single JSON file.
///
/// Every write reloads the file, applies the change and atomically replaces
/// the file through a sibling temp file.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    /// Serializes read-modify-write cycles within this process.
    lock: Mutex<()>,
}

impl JsonFileStore {
    /// Open a store at `path`. The file is created on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Scenelets, StoreError> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Scenelets::default())
            }
            Err(e) => return Err(e.into()),
        };

        let file: StoreFile = serde_json::from_str(&content)?;
        if file.version != STORE_VERSION {
            return Err(StoreError::VersionMismatch {
                expected: STORE_VERSION,
                found: file.version,
            });
        }
        Ok(file.scenelets)
    }

    async fn save(&self, scenelets: Scenelets) -> Result<(), StoreError> {
        let file = StoreFile {
            version: STORE_VERSION,
            scenelets,
        };
        let content = serde_json::to_string_pretty(&file)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, content).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    async fn update<T>(
        &self,
        apply: impl FnOnce(&mut Scenelets) -> Result<T, StoreError> + Send,
    ) -> Result<T, StoreError> {
        let _guard = self.lock.lock().await;
        let mut scenelets = self.load().await?;
        let result = apply(&mut scenelets)?;
        self.save(scenelets).await?;
        Ok(result)
    }
}

#[async_trait]
impl SceneletStore for JsonFileStore {
    async fn create_scenelet(&self, scenelet: NewScenelet) -> Result<SceneletRecord, StoreError> {
        self.update(move |s| Ok(s.create(scenelet))).await
    }

    async fn mark_scenelet_as_branch_point(
        &self,
        id: &str,
        choice_prompt: &str,
    ) -> Result<(), StoreError> {
        self.update(|s| s.mark_branch_point(id, choice_prompt)).await
    }

    async fn mark_scenelet_as_terminal(&self, id: &str) -> Result<(), StoreError> {
        self.update(|s| s.mark_terminal(id)).await
    }

    async fn list_scenelets_by_story(
        &self,
        story_id: &str,
    ) -> Result<Vec<SceneletRecord>, StoreError> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.by_story(story_id))
    }
}
