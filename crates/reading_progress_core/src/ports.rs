//! crates/reading_progress_core/src/ports.rs
//!
//! Defines the service contracts (traits) the progress engine depends on.
//! These traits form the boundary of the hexagonal architecture, keeping the core
//! independent of a specific database or time source.

use crate::domain::{Chapter, ChapterReadingProgress, ChapterTree, ReadingProgress};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    /// The stored record changed since it was loaded; the caller may retry.
    #[error("Concurrent update conflict: {0}")]
    Conflict(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait ProgressRepository: Send + Sync {
    // --- Chapters ---
    /// Returns the chapters of a document in extraction order. Unknown documents
    /// yield an empty tree.
    async fn load_chapters(&self, document_id: Uuid) -> PortResult<ChapterTree>;

    /// Stores the chapters of a document that has none yet. Fails with
    /// `PortError::Conflict` when the document already has a stored hierarchy.
    async fn save_chapters(&self, document_id: Uuid, chapters: &[Chapter]) -> PortResult<()>;

    // --- Document Progress ---
    async fn find_progress(
        &self,
        user_id: Uuid,
        document_id: Uuid,
    ) -> PortResult<Option<ReadingProgress>>;

    /// Inserts (`version == 0`) or updates the record and returns it with its new version.
    /// Fails with `PortError::Conflict` if the stored version differs from `progress.version`.
    async fn save_progress(&self, progress: &ReadingProgress) -> PortResult<ReadingProgress>;

    async fn list_progress_for_user(&self, user_id: Uuid) -> PortResult<Vec<ReadingProgress>>;

    // --- Chapter Progress ---
    async fn find_chapter_progress(
        &self,
        progress_id: Uuid,
        chapter_id: Uuid,
    ) -> PortResult<Option<ChapterReadingProgress>>;

    async fn save_chapter_progress(&self, record: &ChapterReadingProgress) -> PortResult<()>;

    async fn list_chapter_progress(
        &self,
        progress_id: Uuid,
    ) -> PortResult<Vec<ChapterReadingProgress>>;
}

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
