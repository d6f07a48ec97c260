//! crates/reading_progress_core/src/progress.rs
//!
//! Pure percentage calculations. Every value is in [0, 100] with two decimals.

use crate::cfi;
use crate::domain::{ChapterTree, CompletedChapters, ReadingProgress};

/// Weight of the spine position in the overall blend.
pub const SPINE_WEIGHT: f64 = 0.6;
/// Weight of chapter completion in the overall blend.
pub const CHAPTER_WEIGHT: f64 = 0.4;

/// The three progress metrics for one record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressMetrics {
    pub spine: f64,
    pub chapter: f64,
    pub overall: f64,
}

impl ProgressMetrics {
    pub fn compute(
        cfi: Option<&str>,
        completed: &CompletedChapters,
        chapters: &ChapterTree,
    ) -> Self {
        let spine = spine_progress(cfi, chapters);
        let chapter = chapter_progress(completed, chapters);
        Self {
            spine,
            chapter,
            overall: overall_progress(spine, chapter),
        }
    }

    pub fn apply_to(&self, progress: &mut ReadingProgress) {
        progress.spine_progress = self.spine;
        progress.chapter_progress = self.chapter;
        progress.overall_progress = self.overall;
    }
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Progress through the spine, measured against every chapter including nested ones.
pub fn spine_progress(cfi: Option<&str>, chapters: &ChapterTree) -> f64 {
    if chapters.is_empty() {
        return 0.0;
    }
    let Some(position) = cfi.and_then(cfi::resolve) else {
        return 0.0;
    };
    let total = chapters.len();
    if position as usize >= total {
        return 100.0;
    }
    round2(position as f64 / total as f64 * 100.0)
}

/// Share of root-level chapters that are completed. Nested chapters never count.
pub fn chapter_progress(completed: &CompletedChapters, chapters: &ChapterTree) -> f64 {
    let (done, roots) = chapters.roots().fold((0usize, 0usize), |(done, roots), c| {
        (done + usize::from(completed.contains(&c.id)), roots + 1)
    });
    if roots == 0 {
        return 0.0;
    }
    round2(done as f64 / roots as f64 * 100.0)
}

pub fn overall_progress(spine: f64, chapter: f64) -> f64 {
    round2(SPINE_WEIGHT * spine + CHAPTER_WEIGHT * chapter).clamp(0.0, 100.0)
}

/// `true` when every root chapter has been completed.
pub fn all_roots_completed(completed: &CompletedChapters, chapters: &ChapterTree) -> bool {
    let mut roots = chapters.roots().peekable();
    roots.peek().is_some() && roots.all(|c| completed.contains(&c.id))
}
