//! crates/reading_progress_core/src/tracker.rs
//!
//! The use-case entry point. `ProgressTracker` composes the hierarchy, identifier,
//! calculator, completion and session modules around one read-modify-write of a
//! single `ReadingProgress` record.
//!
//! Calls for the same (user, document) pair must be serialized by the caller; a
//! concurrent write surfaces as `PortError::Conflict` and the call can be retried.

use crate::cfi;
use crate::completion::{self, CompletionOutcome};
use crate::domain::{
    Chapter, ChapterReadingProgress, ChapterTree, NavPoint, ProgressSnapshot, ReadingProgress,
    TrackRequest,
};
use crate::hierarchy::extract_chapters;
use crate::ports::{Clock, PortError, PortResult, ProgressRepository};
use crate::progress::{self, ProgressMetrics};
use crate::session;
use chrono::Duration;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct ProgressTracker {
    repo: Arc<dyn ProgressRepository>,
    clock: Arc<dyn Clock>,
}

impl ProgressTracker {
    pub fn new(repo: Arc<dyn ProgressRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { repo, clock }
    }

    //=====================================================================================
    // Ingestion
    //=====================================================================================

    /// Extracts the chapter hierarchy from a navigation tree and stores it.
    ///
    /// Chapters are created once per document. Ingesting a document that already has
    /// a hierarchy returns the stored chapters unchanged, so chapter ids referenced by
    /// existing progress stay valid.
    pub async fn ingest_navigation(
        &self,
        document_id: Uuid,
        nav: &[NavPoint],
    ) -> PortResult<Vec<Chapter>> {
        let existing = self.repo.load_chapters(document_id).await?;
        if !existing.is_empty() {
            info!(%document_id, count = existing.len(), "chapter hierarchy already stored");
            return Ok(existing.into_vec());
        }

        let chapters = extract_chapters(document_id, nav);
        if chapters.is_empty() {
            warn!(%document_id, "navigation tree is empty; document has no tracked structure");
            return Ok(Vec::new());
        }
        match self.repo.save_chapters(document_id, chapters.as_slice()).await {
            Ok(()) => {
                info!(%document_id, count = chapters.len(), "stored chapter hierarchy");
                Ok(chapters.into_vec())
            }
            Err(PortError::Conflict(msg)) => {
                debug!(%document_id, "concurrent ingest won: {}", msg);
                self.chapters(document_id).await
            }
            Err(e) => Err(e),
        }
    }

    pub async fn chapters(&self, document_id: Uuid) -> PortResult<Vec<Chapter>> {
        Ok(self.repo.load_chapters(document_id).await?.into_vec())
    }

    //=====================================================================================
    // Tracking
    //=====================================================================================

    /// Applies one tracking event and returns the updated aggregate.
    ///
    /// A malformed position identifier only skips the position update; the rest of
    /// the request (chapter access, completion) is still applied.
    pub async fn track_reading(&self, request: TrackRequest) -> PortResult<ProgressSnapshot> {
        let now = self.clock.now();
        let TrackRequest {
            document_id,
            user_id,
            chapter_id,
            cfi: position,
            is_completed,
        } = request;

        let valid_position = position
            .as_deref()
            .map(str::trim)
            .filter(|p| cfi::validate(p))
            .map(str::to_string);
        if position.is_some() && valid_position.is_none() {
            debug!(%document_id, %user_id, "skipping position update for malformed identifier");
        }

        let chapters = self.repo.load_chapters(document_id).await?;
        let mut progress = self.load_or_create(user_id, document_id).await?;

        if let Some(position) = &valid_position {
            progress.current_cfi = Some(position.clone());
            if chapter_id.is_some() {
                progress.current_chapter_id = chapter_id;
            }
        }

        let mut chapter_record = match chapter_id {
            Some(chapter_id) => {
                if !chapters.is_empty() && !chapters.contains(chapter_id) {
                    warn!(%document_id, %chapter_id, "tracking a chapter outside the document hierarchy");
                }
                let mut record = self
                    .repo
                    .find_chapter_progress(progress.id, chapter_id)
                    .await?
                    .unwrap_or_else(|| ChapterReadingProgress::new(progress.id, chapter_id, now));
                if let Some(position) = &valid_position {
                    record.last_cfi = Some(position.clone());
                }
                record.last_read_at = now;
                Some(record)
            }
            None => None,
        };

        if let Some(chapter_id) = chapter_id {
            let outcome = completion::apply_completion(
                &mut progress,
                chapter_record.as_mut(),
                chapter_id,
                is_completed,
                &chapters,
                now,
            );
            if outcome == CompletionOutcome::Completed {
                info!(%document_id, %user_id, %chapter_id, "chapter completed");
            }
        } else if is_completed {
            debug!(%document_id, %user_id, "completion reported without a chapter; ignoring");
        }

        self.refresh_metrics(&mut progress, &chapters);
        progress.last_read_at = now;

        let saved = self.repo.save_progress(&progress).await?;
        if let Some(record) = &chapter_record {
            self.repo.save_chapter_progress(record).await?;
        }
        Ok(saved.snapshot())
    }

    //=====================================================================================
    // Sessions
    //=====================================================================================

    pub async fn start_session(
        &self,
        user_id: Uuid,
        document_id: Uuid,
    ) -> PortResult<ProgressSnapshot> {
        let now = self.clock.now();
        let mut progress = self.load_or_create(user_id, document_id).await?;
        if !session::start_session(&mut progress, now) {
            debug!(%document_id, %user_id, "session already open");
            return Ok(progress.snapshot());
        }
        let saved = self.repo.save_progress(&progress).await?;
        Ok(saved.snapshot())
    }

    pub async fn end_session(
        &self,
        user_id: Uuid,
        document_id: Uuid,
    ) -> PortResult<ProgressSnapshot> {
        let now = self.clock.now();
        let mut progress = self.load_or_create(user_id, document_id).await?;
        match session::end_session(&mut progress, now) {
            Some(minutes) => {
                info!(%document_id, %user_id, minutes, "reading session ended");
                let saved = self.repo.save_progress(&progress).await?;
                Ok(saved.snapshot())
            }
            None => Ok(progress.snapshot()),
        }
    }

    /// Ends an open session whose last activity is older than `idle_limit`.
    /// Returns `None` when nothing was closed.
    pub async fn close_stale_session(
        &self,
        user_id: Uuid,
        document_id: Uuid,
        idle_limit: Duration,
    ) -> PortResult<Option<ProgressSnapshot>> {
        let now = self.clock.now();
        let Some(mut progress) = self.repo.find_progress(user_id, document_id).await? else {
            return Ok(None);
        };
        match session::close_if_stale(&mut progress, now, idle_limit) {
            Some(minutes) => {
                info!(%document_id, %user_id, minutes, "closed stale reading session");
                let saved = self.repo.save_progress(&progress).await?;
                Ok(Some(saved.snapshot()))
            }
            None => Ok(None),
        }
    }

    //=====================================================================================
    // Queries
    //=====================================================================================

    pub async fn get_progress(
        &self,
        user_id: Uuid,
        document_id: Uuid,
    ) -> PortResult<ProgressSnapshot> {
        self.repo
            .find_progress(user_id, document_id)
            .await?
            .map(|p| p.snapshot())
            .ok_or_else(|| {
                PortError::NotFound(format!(
                    "No progress for user {} on document {}",
                    user_id, document_id
                ))
            })
    }

    pub async fn list_progress(&self, user_id: Uuid) -> PortResult<Vec<ProgressSnapshot>> {
        let records = self.repo.list_progress_for_user(user_id).await?;
        Ok(records.iter().map(ReadingProgress::snapshot).collect())
    }

    pub async fn chapter_progress(
        &self,
        user_id: Uuid,
        document_id: Uuid,
    ) -> PortResult<Vec<ChapterReadingProgress>> {
        match self.repo.find_progress(user_id, document_id).await? {
            Some(progress) => self.repo.list_chapter_progress(progress.id).await,
            None => Ok(Vec::new()),
        }
    }

    //=====================================================================================
    // Helpers
    //=====================================================================================

    async fn load_or_create(&self, user_id: Uuid, document_id: Uuid) -> PortResult<ReadingProgress> {
        Ok(self
            .repo
            .find_progress(user_id, document_id)
            .await?
            .unwrap_or_else(|| ReadingProgress::new(user_id, document_id, self.clock.now())))
    }

    fn refresh_metrics(&self, progress: &mut ReadingProgress, chapters: &ChapterTree) {
        ProgressMetrics::compute(
            progress.current_cfi.as_deref(),
            &progress.completed_chapters,
            chapters,
        )
        .apply_to(progress);
        if progress::all_roots_completed(&progress.completed_chapters, chapters) {
            progress.is_completed = true;
        }
    }
}
