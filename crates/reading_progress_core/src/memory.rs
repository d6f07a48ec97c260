//! crates/reading_progress_core/src/memory.rs
//!
//! An in-process implementation of `ProgressRepository`. Used when no database is
//! configured and as the test double for the tracker.

use crate::domain::{Chapter, ChapterReadingProgress, ChapterTree, ReadingProgress};
use crate::ports::{PortError, PortResult, ProgressRepository};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

#[derive(Default)]
struct Store {
    chapters: HashMap<Uuid, Vec<Chapter>>,
    progress: HashMap<(Uuid, Uuid), ReadingProgress>,
    chapter_progress: HashMap<(Uuid, Uuid), ChapterReadingProgress>,
}

#[derive(Default)]
pub struct InMemoryProgressRepository {
    store: Mutex<Store>,
}

impl InMemoryProgressRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> PortResult<MutexGuard<'_, Store>> {
        self.store
            .lock()
            .map_err(|e| PortError::Unexpected(format!("store lock poisoned: {}", e)))
    }
}

#[async_trait]
impl ProgressRepository for InMemoryProgressRepository {
    async fn load_chapters(&self, document_id: Uuid) -> PortResult<ChapterTree> {
        let store = self.lock()?;
        let chapters = store.chapters.get(&document_id).cloned().unwrap_or_default();
        Ok(ChapterTree::new(chapters))
    }

    async fn save_chapters(&self, document_id: Uuid, chapters: &[Chapter]) -> PortResult<()> {
        let mut store = self.lock()?;
        if store.chapters.get(&document_id).is_some_and(|c| !c.is_empty()) {
            return Err(PortError::Conflict(format!(
                "document {} already has a chapter hierarchy",
                document_id
            )));
        }
        store.chapters.insert(document_id, chapters.to_vec());
        Ok(())
    }

    async fn find_progress(
        &self,
        user_id: Uuid,
        document_id: Uuid,
    ) -> PortResult<Option<ReadingProgress>> {
        Ok(self.lock()?.progress.get(&(user_id, document_id)).cloned())
    }

    async fn save_progress(&self, progress: &ReadingProgress) -> PortResult<ReadingProgress> {
        let mut store = self.lock()?;
        let key = (progress.user_id, progress.document_id);
        let stored_version = store.progress.get(&key).map(|p| p.version).unwrap_or(0);
        if stored_version != progress.version {
            return Err(PortError::Conflict(format!(
                "progress {} is at version {}, update was based on {}",
                progress.id, stored_version, progress.version
            )));
        }
        let mut saved = progress.clone();
        saved.version += 1;
        store.progress.insert(key, saved.clone());
        Ok(saved)
    }

    async fn list_progress_for_user(&self, user_id: Uuid) -> PortResult<Vec<ReadingProgress>> {
        let store = self.lock()?;
        let mut records: Vec<ReadingProgress> = store
            .progress
            .values()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.last_read_at.cmp(&a.last_read_at));
        Ok(records)
    }

    async fn find_chapter_progress(
        &self,
        progress_id: Uuid,
        chapter_id: Uuid,
    ) -> PortResult<Option<ChapterReadingProgress>> {
        Ok(self
            .lock()?
            .chapter_progress
            .get(&(progress_id, chapter_id))
            .cloned())
    }

    async fn save_chapter_progress(&self, record: &ChapterReadingProgress) -> PortResult<()> {
        self.lock()?
            .chapter_progress
            .insert((record.progress_id, record.chapter_id), record.clone());
        Ok(())
    }

    async fn list_chapter_progress(
        &self,
        progress_id: Uuid,
    ) -> PortResult<Vec<ChapterReadingProgress>> {
        let store = self.lock()?;
        let mut records: Vec<ChapterReadingProgress> = store
            .chapter_progress
            .values()
            .filter(|r| r.progress_id == progress_id)
            .cloned()
            .collect();
        records.sort_by_key(|r| r.last_read_at);
        Ok(records)
    }
}
