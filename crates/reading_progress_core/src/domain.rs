//! crates/reading_progress_core/src/domain.rs
//!
//! Defines the pure, core data structures for the reading progress engine.
//! These structs are independent of any database schema; serde derives exist only
//! so the request layer can exchange them as JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

//=========================================================================================
// Navigation Input
//=========================================================================================

/// A node of a document's navigation tree, as produced by the document-container reader.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavPoint {
    pub title: String,
    #[serde(default)]
    pub content_path: Option<String>,
    #[serde(default)]
    pub anchor: Option<String>,
    #[serde(default)]
    pub children: Vec<NavPoint>,
}

//=========================================================================================
// Chapters
//=========================================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChapterStatus {
    #[default]
    Active,
    Archived,
}

impl ChapterStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChapterStatus::Active => "active",
            ChapterStatus::Archived => "archived",
        }
    }

    /// Unknown values fall back to `Active`.
    pub fn parse(value: &str) -> Self {
        match value {
            "archived" => ChapterStatus::Archived,
            _ => ChapterStatus::Active,
        }
    }
}

/// A node in a document's table of contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    pub id: Uuid,
    pub document_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub title: String,
    /// 1-based position among the chapter's siblings.
    pub order: u32,
    pub href: String,
    pub cfi: Option<String>,
    pub status: ChapterStatus,
}

impl Chapter {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// The chapter forest of one document, stored flat with parent back-references.
///
/// Chapters keep the depth-first order they were extracted in. The tree is read-only
/// once built and can be shared freely between requests for different users.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChapterTree {
    chapters: Vec<Chapter>,
}

impl ChapterTree {
    pub fn new(chapters: Vec<Chapter>) -> Self {
        Self { chapters }
    }

    pub fn len(&self) -> usize {
        self.chapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chapters.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Chapter> {
        self.chapters.iter()
    }

    pub fn roots(&self) -> impl Iterator<Item = &Chapter> {
        self.chapters.iter().filter(|c| c.is_root())
    }

    pub fn children_of(&self, parent_id: Uuid) -> impl Iterator<Item = &Chapter> {
        self.chapters
            .iter()
            .filter(move |c| c.parent_id == Some(parent_id))
    }

    pub fn get(&self, chapter_id: Uuid) -> Option<&Chapter> {
        self.chapters.iter().find(|c| c.id == chapter_id)
    }

    pub fn contains(&self, chapter_id: Uuid) -> bool {
        self.get(chapter_id).is_some()
    }

    pub fn as_slice(&self) -> &[Chapter] {
        &self.chapters
    }

    pub fn into_vec(self) -> Vec<Chapter> {
        self.chapters
    }
}

//=========================================================================================
// Completed Chapter Set
//=========================================================================================

/// The set of chapters a user has completed within a document.
///
/// Serialized as a plain list; membership is all that matters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompletedChapters(BTreeSet<Uuid>);

impl CompletedChapters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the chapter was not already present.
    pub fn insert(&mut self, chapter_id: Uuid) -> bool {
        self.0.insert(chapter_id)
    }

    pub fn contains(&self, chapter_id: &Uuid) -> bool {
        self.0.contains(chapter_id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_vec(&self) -> Vec<Uuid> {
        self.0.iter().copied().collect()
    }
}

impl FromIterator<Uuid> for CompletedChapters {
    fn from_iter<I: IntoIterator<Item = Uuid>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

//=========================================================================================
// Progress Records
//=========================================================================================

/// One user's progress through one document.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadingProgress {
    pub id: Uuid,
    pub user_id: Uuid,
    pub document_id: Uuid,
    pub current_cfi: Option<String>,
    pub current_chapter_id: Option<Uuid>,
    pub completed_chapters: CompletedChapters,
    pub spine_progress: f64,
    pub chapter_progress: f64,
    pub overall_progress: f64,
    pub total_reading_time_minutes: u32,
    pub last_read_at: DateTime<Utc>,
    pub session_started_at: Option<DateTime<Utc>>,
    pub is_completed: bool,
    /// Optimistic-concurrency token; `0` means the record has never been stored.
    pub version: i64,
    pub created_at: DateTime<Utc>,
}

impl ReadingProgress {
    /// A fresh, unsaved record for a (user, document) pair.
    pub fn new(user_id: Uuid, document_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            document_id,
            current_cfi: None,
            current_chapter_id: None,
            completed_chapters: CompletedChapters::new(),
            spine_progress: 0.0,
            chapter_progress: 0.0,
            overall_progress: 0.0,
            total_reading_time_minutes: 0,
            last_read_at: now,
            session_started_at: None,
            is_completed: false,
            version: 0,
            created_at: now,
        }
    }

    pub fn has_open_session(&self) -> bool {
        self.session_started_at.is_some()
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            document_id: self.document_id,
            current_cfi: self.current_cfi.clone(),
            current_chapter_id: self.current_chapter_id,
            spine_progress: self.spine_progress,
            chapter_progress: self.chapter_progress,
            overall_progress: self.overall_progress,
            completed_chapter_ids: self.completed_chapters.to_vec(),
            total_reading_time_minutes: self.total_reading_time_minutes,
            last_read_at: self.last_read_at,
            session_started_at: self.session_started_at,
            is_completed: self.is_completed,
        }
    }
}

/// Finer-grained progress for a single chapter a user has visited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterReadingProgress {
    pub id: Uuid,
    pub progress_id: Uuid,
    pub chapter_id: Uuid,
    pub last_cfi: Option<String>,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_read_at: DateTime<Utc>,
}

impl ChapterReadingProgress {
    pub fn new(progress_id: Uuid, chapter_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            progress_id,
            chapter_id,
            last_cfi: None,
            completed: false,
            completed_at: None,
            last_read_at: now,
        }
    }
}

//=========================================================================================
// Requests and Snapshots
//=========================================================================================

/// A single tracking event reported by a reader client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackRequest {
    pub document_id: Uuid,
    pub user_id: Uuid,
    pub chapter_id: Option<Uuid>,
    pub cfi: Option<String>,
    pub is_completed: bool,
}

/// The aggregate state returned to callers after every tracking operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub document_id: Uuid,
    pub current_cfi: Option<String>,
    pub current_chapter_id: Option<Uuid>,
    pub spine_progress: f64,
    pub chapter_progress: f64,
    pub overall_progress: f64,
    pub completed_chapter_ids: Vec<Uuid>,
    pub total_reading_time_minutes: u32,
    pub last_read_at: DateTime<Utc>,
    pub session_started_at: Option<DateTime<Utc>>,
    pub is_completed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completed_chapters_deserialize_collapses_duplicates() {
        let id = Uuid::new_v4();
        let json = format!("[\"{id}\", \"{id}\"]");
        let set: CompletedChapters = serde_json::from_str(&json).unwrap();
        assert_eq!(set.len(), 1);
        assert!(set.contains(&id));
    }

    #[test]
    fn completed_chapters_serialize_as_list() {
        let id = Uuid::new_v4();
        let set: CompletedChapters = [id].into_iter().collect();
        let json = serde_json::to_string(&set).unwrap();
        assert_eq!(json, format!("[\"{id}\"]"));
    }

    #[test]
    fn nav_point_accepts_missing_optional_fields() {
        let nav: NavPoint = serde_json::from_str(r#"{"title": "Preface"}"#).unwrap();
        assert_eq!(nav.title, "Preface");
        assert!(nav.content_path.is_none());
        assert!(nav.children.is_empty());
    }

    #[test]
    fn chapter_status_round_trips_through_str() {
        assert_eq!(ChapterStatus::parse(ChapterStatus::Archived.as_str()), ChapterStatus::Archived);
        assert_eq!(ChapterStatus::parse("bogus"), ChapterStatus::Active);
    }
}
