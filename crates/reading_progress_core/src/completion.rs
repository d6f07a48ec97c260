//! crates/reading_progress_core/src/completion.rs
//!
//! One-way chapter completion. A chapter moves from not-completed to completed
//! exactly once; requests to undo a completion are ignored.

use crate::domain::{ChapterReadingProgress, ChapterTree, ReadingProgress};
use crate::progress;
use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

/// What a completion report did to the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionOutcome {
    /// The chapter was newly marked as completed.
    Completed,
    /// The chapter was already completed; nothing changed.
    AlreadyCompleted,
    /// The report asked to un-complete a completed chapter and was dropped.
    ReversalIgnored,
    /// A not-completed report for a chapter that was never completed.
    Unchanged,
}

/// Applies a completion report for `chapter_id`.
///
/// On a new completion the aggregate percentages are recomputed, the chapter record's
/// timestamp is set (once) and `last_read_at` moves to `now`.
pub fn apply_completion(
    progress: &mut ReadingProgress,
    chapter_record: Option<&mut ChapterReadingProgress>,
    chapter_id: Uuid,
    is_completed: bool,
    chapters: &ChapterTree,
    now: DateTime<Utc>,
) -> CompletionOutcome {
    let already = progress.completed_chapters.contains(&chapter_id);

    let outcome = match (already, is_completed) {
        (true, true) => CompletionOutcome::AlreadyCompleted,
        (true, false) => {
            debug!(%chapter_id, "ignoring request to revert a completed chapter");
            CompletionOutcome::ReversalIgnored
        }
        (false, false) => CompletionOutcome::Unchanged,
        (false, true) => {
            progress.completed_chapters.insert(chapter_id);
            let chapter = progress::chapter_progress(&progress.completed_chapters, chapters);
            progress.chapter_progress = chapter;
            progress.overall_progress = progress::overall_progress(progress.spine_progress, chapter);
            if progress::all_roots_completed(&progress.completed_chapters, chapters) {
                progress.is_completed = true;
            }
            progress.last_read_at = now;
            CompletionOutcome::Completed
        }
    };

    // The chapter record may lag behind the set (e.g. created after the fact);
    // any completed chapter gets its timestamp the first time we see it.
    if let Some(record) = chapter_record {
        if progress.completed_chapters.contains(&chapter_id) && !record.completed {
            record.completed = true;
            record.completed_at.get_or_insert(now);
        }
    }

    outcome
}
