//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, the concrete implementation of the
//! `ProgressRepository` port from the core crate. It handles all interactions with
//! the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reading_progress_core::domain::{
    Chapter, ChapterReadingProgress, ChapterStatus, ChapterTree, ReadingProgress,
};
use reading_progress_core::ports::{PortError, PortResult, ProgressRepository};
use sqlx::postgres::PgArguments;
use sqlx::query::QueryAs;
use sqlx::{FromRow, PgPool, Postgres};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `ProgressRepository` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

fn hierarchy_exists(document_id: Uuid) -> PortError {
    PortError::Conflict(format!(
        "document {} already has a chapter hierarchy",
        document_id
    ))
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct ChapterRecord {
    id: Uuid,
    document_id: Uuid,
    parent_id: Option<Uuid>,
    title: String,
    sort_order: i32,
    href: String,
    cfi: Option<String>,
    status: String,
}
impl ChapterRecord {
    fn to_domain(self) -> Chapter {
        Chapter {
            id: self.id,
            document_id: self.document_id,
            parent_id: self.parent_id,
            title: self.title,
            order: self.sort_order.max(1) as u32,
            href: self.href,
            cfi: self.cfi,
            status: ChapterStatus::parse(&self.status),
        }
    }
}

#[derive(FromRow)]
struct ProgressRecord {
    id: Uuid,
    user_id: Uuid,
    document_id: Uuid,
    current_cfi: Option<String>,
    current_chapter_id: Option<Uuid>,
    completed_chapter_ids: Vec<Uuid>,
    spine_progress: f64,
    chapter_progress: f64,
    overall_progress: f64,
    total_reading_time_minutes: i32,
    last_read_at: DateTime<Utc>,
    session_started_at: Option<DateTime<Utc>>,
    is_completed: bool,
    version: i64,
    created_at: DateTime<Utc>,
}
impl ProgressRecord {
    fn to_domain(self) -> ReadingProgress {
        ReadingProgress {
            id: self.id,
            user_id: self.user_id,
            document_id: self.document_id,
            current_cfi: self.current_cfi,
            current_chapter_id: self.current_chapter_id,
            completed_chapters: self.completed_chapter_ids.into_iter().collect(),
            spine_progress: self.spine_progress,
            chapter_progress: self.chapter_progress,
            overall_progress: self.overall_progress,
            total_reading_time_minutes: self.total_reading_time_minutes.max(0) as u32,
            last_read_at: self.last_read_at,
            session_started_at: self.session_started_at,
            is_completed: self.is_completed,
            version: self.version,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct ChapterProgressRecord {
    id: Uuid,
    progress_id: Uuid,
    chapter_id: Uuid,
    last_cfi: Option<String>,
    completed: bool,
    completed_at: Option<DateTime<Utc>>,
    last_read_at: DateTime<Utc>,
}
impl ChapterProgressRecord {
    fn to_domain(self) -> ChapterReadingProgress {
        ChapterReadingProgress {
            id: self.id,
            progress_id: self.progress_id,
            chapter_id: self.chapter_id,
            last_cfi: self.last_cfi,
            completed: self.completed,
            completed_at: self.completed_at,
            last_read_at: self.last_read_at,
        }
    }
}

/// Binds parameters `$1..=$14` shared by the insert and update statements.
fn bind_progress<'q>(
    query: QueryAs<'q, Postgres, ProgressRecord, PgArguments>,
    progress: &'q ReadingProgress,
) -> QueryAs<'q, Postgres, ProgressRecord, PgArguments> {
    query
        .bind(progress.id)
        .bind(progress.user_id)
        .bind(progress.document_id)
        .bind(&progress.current_cfi)
        .bind(progress.current_chapter_id)
        .bind(progress.completed_chapters.to_vec())
        .bind(progress.spine_progress)
        .bind(progress.chapter_progress)
        .bind(progress.overall_progress)
        .bind(i32::try_from(progress.total_reading_time_minutes).unwrap_or(i32::MAX))
        .bind(progress.last_read_at)
        .bind(progress.session_started_at)
        .bind(progress.is_completed)
        .bind(progress.version)
}

const PROGRESS_COLUMNS: &str = "id, user_id, document_id, current_cfi, current_chapter_id, \
     completed_chapter_ids, spine_progress, chapter_progress, overall_progress, \
     total_reading_time_minutes, last_read_at, session_started_at, is_completed, version, created_at";

//=========================================================================================
// `ProgressRepository` Trait Implementation
//=========================================================================================

#[async_trait]
impl ProgressRepository for DbAdapter {
    async fn load_chapters(&self, document_id: Uuid) -> PortResult<ChapterTree> {
        let records = sqlx::query_as::<_, ChapterRecord>(
            "SELECT id, document_id, parent_id, title, sort_order, href, cfi, status \
             FROM chapters WHERE document_id = $1 ORDER BY position ASC",
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(ChapterTree::new(
            records.into_iter().map(|r| r.to_domain()).collect(),
        ))
    }

    async fn save_chapters(&self, document_id: Uuid, chapters: &[Chapter]) -> PortResult<()> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;

        let (exists,): (bool,) =
            sqlx::query_as("SELECT EXISTS (SELECT 1 FROM chapters WHERE document_id = $1)")
                .bind(document_id)
                .fetch_one(&mut *tx)
                .await
                .map_err(unexpected)?;
        if exists {
            return Err(hierarchy_exists(document_id));
        }

        // Extraction order is depth-first, so every parent row precedes its children.
        for (position, chapter) in chapters.iter().enumerate() {
            sqlx::query(
                "INSERT INTO chapters (id, document_id, parent_id, title, sort_order, position, href, cfi, status) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
            )
            .bind(chapter.id)
            .bind(document_id)
            .bind(chapter.parent_id)
            .bind(&chapter.title)
            .bind(chapter.order as i32)
            .bind(position as i32)
            .bind(&chapter.href)
            .bind(&chapter.cfi)
            .bind(chapter.status.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                // A concurrent ingest of the same document won the (document_id, position) key.
                if matches!(&e, sqlx::Error::Database(db) if db.is_unique_violation()) {
                    hierarchy_exists(document_id)
                } else {
                    unexpected(e)
                }
            })?;
        }

        tx.commit().await.map_err(unexpected)?;
        Ok(())
    }

    async fn find_progress(
        &self,
        user_id: Uuid,
        document_id: Uuid,
    ) -> PortResult<Option<ReadingProgress>> {
        let record = sqlx::query_as::<_, ProgressRecord>(&format!(
            "SELECT {PROGRESS_COLUMNS} FROM reading_progress WHERE user_id = $1 AND document_id = $2"
        ))
        .bind(user_id)
        .bind(document_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.map(|r| r.to_domain()))
    }

    async fn save_progress(&self, progress: &ReadingProgress) -> PortResult<ReadingProgress> {
        let result = if progress.version == 0 {
            let sql = format!(
                "INSERT INTO reading_progress (id, user_id, document_id, current_cfi, current_chapter_id, \
                 completed_chapter_ids, spine_progress, chapter_progress, overall_progress, \
                 total_reading_time_minutes, last_read_at, session_started_at, is_completed, version, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14 + 1, $15) \
                 ON CONFLICT (user_id, document_id) DO NOTHING \
                 RETURNING {PROGRESS_COLUMNS}"
            );
            bind_progress(sqlx::query_as(&sql), progress)
                .bind(progress.created_at)
                .fetch_optional(&self.pool)
                .await
        } else {
            let sql = format!(
                "UPDATE reading_progress SET current_cfi = $4, current_chapter_id = $5, \
                 completed_chapter_ids = $6, spine_progress = $7, chapter_progress = $8, \
                 overall_progress = $9, total_reading_time_minutes = $10, last_read_at = $11, \
                 session_started_at = $12, is_completed = $13, version = version + 1 \
                 WHERE id = $1 AND user_id = $2 AND document_id = $3 AND version = $14 \
                 RETURNING {PROGRESS_COLUMNS}"
            );
            bind_progress(sqlx::query_as(&sql), progress)
                .fetch_optional(&self.pool)
                .await
        };
        let record = result.map_err(unexpected)?;

        // No row back means another writer got there first.
        record.map(|r| r.to_domain()).ok_or_else(|| {
            PortError::Conflict(format!(
                "progress for user {} on document {} changed since version {}",
                progress.user_id, progress.document_id, progress.version
            ))
        })
    }

    async fn list_progress_for_user(&self, user_id: Uuid) -> PortResult<Vec<ReadingProgress>> {
        let records = sqlx::query_as::<_, ProgressRecord>(&format!(
            "SELECT {PROGRESS_COLUMNS} FROM reading_progress WHERE user_id = $1 ORDER BY last_read_at DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn find_chapter_progress(
        &self,
        progress_id: Uuid,
        chapter_id: Uuid,
    ) -> PortResult<Option<ChapterReadingProgress>> {
        let record = sqlx::query_as::<_, ChapterProgressRecord>(
            "SELECT id, progress_id, chapter_id, last_cfi, completed, completed_at, last_read_at \
             FROM chapter_reading_progress WHERE progress_id = $1 AND chapter_id = $2",
        )
        .bind(progress_id)
        .bind(chapter_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.map(|r| r.to_domain()))
    }

    async fn save_chapter_progress(&self, record: &ChapterReadingProgress) -> PortResult<()> {
        // `completed` only ever moves to true and `completed_at` is never overwritten.
        sqlx::query(
            "INSERT INTO chapter_reading_progress \
             (id, progress_id, chapter_id, last_cfi, completed, completed_at, last_read_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (progress_id, chapter_id) DO UPDATE SET \
             last_cfi = EXCLUDED.last_cfi, \
             completed = chapter_reading_progress.completed OR EXCLUDED.completed, \
             completed_at = COALESCE(chapter_reading_progress.completed_at, EXCLUDED.completed_at), \
             last_read_at = EXCLUDED.last_read_at",
        )
        .bind(record.id)
        .bind(record.progress_id)
        .bind(record.chapter_id)
        .bind(&record.last_cfi)
        .bind(record.completed)
        .bind(record.completed_at)
        .bind(record.last_read_at)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    async fn list_chapter_progress(
        &self,
        progress_id: Uuid,
    ) -> PortResult<Vec<ChapterReadingProgress>> {
        let records = sqlx::query_as::<_, ChapterProgressRecord>(
            "SELECT id, progress_id, chapter_id, last_cfi, completed, completed_at, last_read_at \
             FROM chapter_reading_progress WHERE progress_id = $1 ORDER BY last_read_at ASC",
        )
        .bind(progress_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }
}
