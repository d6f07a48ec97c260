use chrono::{DateTime, Duration, Utc};
use reading_progress_core::{
    Clock, InMemoryProgressRepository, NavPoint, PortError, ProgressRepository, ProgressTracker,
    TrackRequest,
};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

struct ManualClock(Mutex<DateTime<Utc>>);

impl ManualClock {
    fn new() -> Self {
        Self(Mutex::new(Utc::now()))
    }

    fn advance(&self, by: Duration) {
        *self.0.lock().unwrap() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

struct Harness {
    tracker: ProgressTracker,
    repo: Arc<InMemoryProgressRepository>,
    clock: Arc<ManualClock>,
    user_id: Uuid,
    document_id: Uuid,
}

impl Harness {
    fn new() -> Self {
        let repo = Arc::new(InMemoryProgressRepository::new());
        let clock = Arc::new(ManualClock::new());
        Self {
            tracker: ProgressTracker::new(repo.clone(), clock.clone()),
            repo,
            clock,
            user_id: Uuid::new_v4(),
            document_id: Uuid::new_v4(),
        }
    }

    async fn with_flat_chapters(count: usize) -> (Self, Vec<Uuid>) {
        let harness = Self::new();
        let nav: Vec<NavPoint> = (0..count)
            .map(|i| NavPoint {
                title: format!("Chapter {}", i + 1),
                content_path: Some(format!("ch{}.xhtml", i + 1)),
                ..NavPoint::default()
            })
            .collect();
        let chapters = harness
            .tracker
            .ingest_navigation(harness.document_id, &nav)
            .await
            .unwrap();
        let ids = chapters.iter().map(|c| c.id).collect();
        (harness, ids)
    }

    fn request(&self, chapter_id: Option<Uuid>, cfi: Option<&str>, is_completed: bool) -> TrackRequest {
        TrackRequest {
            document_id: self.document_id,
            user_id: self.user_id,
            chapter_id,
            cfi: cfi.map(str::to_string),
            is_completed,
        }
    }
}

#[tokio::test]
async fn four_chapter_scenario_blends_position_and_completion() {
    let (h, ids) = Harness::with_flat_chapters(4).await;

    let snapshot = h
        .tracker
        .track_reading(h.request(Some(ids[1]), Some("epubcfi(/4/2)"), false))
        .await
        .unwrap();
    assert_eq!(snapshot.spine_progress, 50.0);
    assert_eq!(snapshot.chapter_progress, 0.0);
    assert_eq!(snapshot.overall_progress, 30.0);

    let snapshot = h
        .tracker
        .track_reading(h.request(Some(ids[0]), Some("epubcfi(/4/2)"), true))
        .await
        .unwrap();
    assert_eq!(snapshot.chapter_progress, 25.0);
    assert_eq!(snapshot.overall_progress, 40.0);
    assert_eq!(snapshot.completed_chapter_ids, vec![ids[0]]);
    assert!(!snapshot.is_completed);
}

#[tokio::test]
async fn malformed_position_does_not_block_completion() {
    let (h, ids) = Harness::with_flat_chapters(4).await;
    h.tracker
        .track_reading(h.request(Some(ids[0]), Some("epubcfi(/6/2)"), false))
        .await
        .unwrap();

    let snapshot = h
        .tracker
        .track_reading(h.request(Some(ids[1]), Some("epubcfi(/6/2"), true))
        .await
        .unwrap();

    assert_eq!(snapshot.current_cfi.as_deref(), Some("epubcfi(/6/2)"));
    assert_eq!(snapshot.current_chapter_id, Some(ids[0]));
    assert_eq!(snapshot.spine_progress, 75.0);
    assert_eq!(snapshot.chapter_progress, 25.0);
}

#[tokio::test]
async fn completion_cannot_be_reverted_through_tracking() {
    let (h, ids) = Harness::with_flat_chapters(2).await;
    let completed = h
        .tracker
        .track_reading(h.request(Some(ids[0]), Some("epubcfi(/2)"), true))
        .await
        .unwrap();

    let after = h
        .tracker
        .track_reading(h.request(Some(ids[0]), Some("epubcfi(/2)"), false))
        .await
        .unwrap();

    assert_eq!(after.completed_chapter_ids, completed.completed_chapter_ids);
    assert_eq!(after.overall_progress, completed.overall_progress);
}

#[tokio::test]
async fn repeated_completion_keeps_chapter_timestamp() {
    let (h, ids) = Harness::with_flat_chapters(2).await;
    let first = h
        .tracker
        .track_reading(h.request(Some(ids[0]), None, true))
        .await
        .unwrap();
    let completed_at = h
        .tracker
        .chapter_progress(h.user_id, h.document_id)
        .await
        .unwrap()[0]
        .completed_at;
    assert!(completed_at.is_some());

    h.clock.advance(Duration::hours(2));
    let second = h
        .tracker
        .track_reading(h.request(Some(ids[0]), None, true))
        .await
        .unwrap();

    let records = h.tracker.chapter_progress(h.user_id, h.document_id).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].completed_at, completed_at);
    assert_eq!(second.overall_progress, first.overall_progress);
    assert!(second.last_read_at > first.last_read_at);
}

#[tokio::test]
async fn chapter_access_records_last_position() {
    let (h, ids) = Harness::with_flat_chapters(3).await;
    h.tracker
        .track_reading(h.request(Some(ids[2]), Some("epubcfi(/6/4[c3]!/2:5)"), false))
        .await
        .unwrap();

    let records = h.tracker.chapter_progress(h.user_id, h.document_id).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].chapter_id, ids[2]);
    assert_eq!(records[0].last_cfi.as_deref(), Some("epubcfi(/6/4[c3]!/2:5)"));
    assert!(!records[0].completed);
}

#[tokio::test]
async fn document_without_chapters_reports_zero() {
    let h = Harness::new();
    h.tracker.ingest_navigation(h.document_id, &[]).await.unwrap();

    let snapshot = h
        .tracker
        .track_reading(h.request(Some(Uuid::new_v4()), Some("epubcfi(/8/2)"), true))
        .await
        .unwrap();

    assert_eq!(snapshot.spine_progress, 0.0);
    assert_eq!(snapshot.chapter_progress, 0.0);
    assert_eq!(snapshot.overall_progress, 0.0);
    assert!(!snapshot.is_completed);
}

#[tokio::test]
async fn completing_all_roots_completes_the_document() {
    let (h, ids) = Harness::with_flat_chapters(2).await;
    for id in &ids {
        h.tracker
            .track_reading(h.request(Some(*id), Some("epubcfi(/4)"), true))
            .await
            .unwrap();
    }
    let snapshot = h.tracker.get_progress(h.user_id, h.document_id).await.unwrap();
    assert!(snapshot.is_completed);
    assert_eq!(snapshot.overall_progress, 100.0);
}

#[tokio::test]
async fn ninety_second_session_adds_one_minute() {
    let h = Harness::new();
    h.tracker.start_session(h.user_id, h.document_id).await.unwrap();
    h.clock.advance(Duration::seconds(90));
    let snapshot = h.tracker.end_session(h.user_id, h.document_id).await.unwrap();

    assert_eq!(snapshot.total_reading_time_minutes, 1);
    assert!(snapshot.session_started_at.is_none());
    assert_eq!(snapshot.last_read_at, h.clock.now());
}

#[tokio::test]
async fn second_start_does_not_reset_the_session() {
    let h = Harness::new();
    let started = h.tracker.start_session(h.user_id, h.document_id).await.unwrap();
    h.clock.advance(Duration::minutes(4));
    let again = h.tracker.start_session(h.user_id, h.document_id).await.unwrap();
    assert_eq!(again.session_started_at, started.session_started_at);

    h.clock.advance(Duration::minutes(1));
    let ended = h.tracker.end_session(h.user_id, h.document_id).await.unwrap();
    assert_eq!(ended.total_reading_time_minutes, 5);
}

#[tokio::test]
async fn stale_session_is_closed_at_last_activity() {
    let (h, ids) = Harness::with_flat_chapters(2).await;
    h.tracker.start_session(h.user_id, h.document_id).await.unwrap();
    h.clock.advance(Duration::minutes(10));
    h.tracker
        .track_reading(h.request(Some(ids[0]), Some("epubcfi(/2)"), false))
        .await
        .unwrap();
    h.clock.advance(Duration::hours(5));

    let closed = h
        .tracker
        .close_stale_session(h.user_id, h.document_id, Duration::minutes(30))
        .await
        .unwrap()
        .expect("session should be closed");
    assert_eq!(closed.total_reading_time_minutes, 10);

    let nothing = h
        .tracker
        .close_stale_session(h.user_id, h.document_id, Duration::minutes(30))
        .await
        .unwrap();
    assert!(nothing.is_none());
}

#[tokio::test]
async fn missing_progress_is_not_found() {
    let h = Harness::new();
    let err = h.tracker.get_progress(h.user_id, h.document_id).await.unwrap_err();
    assert!(matches!(err, PortError::NotFound(_)));
}

#[tokio::test]
async fn stale_write_is_rejected_as_conflict() {
    let (h, ids) = Harness::with_flat_chapters(2).await;
    h.tracker
        .track_reading(h.request(Some(ids[0]), Some("epubcfi(/2)"), false))
        .await
        .unwrap();
    let stale = h.repo.find_progress(h.user_id, h.document_id).await.unwrap().unwrap();

    h.tracker
        .track_reading(h.request(Some(ids[1]), Some("epubcfi(/4)"), false))
        .await
        .unwrap();

    let err = h.repo.save_progress(&stale).await.unwrap_err();
    assert!(matches!(err, PortError::Conflict(_)));
}

#[tokio::test]
async fn history_only_lists_the_requesting_user() {
    let (h, ids) = Harness::with_flat_chapters(1).await;
    h.tracker
        .track_reading(h.request(Some(ids[0]), Some("epubcfi(/2)"), false))
        .await
        .unwrap();
    let mut other = h.request(Some(ids[0]), Some("epubcfi(/2)"), true);
    other.user_id = Uuid::new_v4();
    h.tracker.track_reading(other).await.unwrap();

    let history = h.tracker.list_progress(h.user_id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].document_id, h.document_id);
    assert!(history[0].completed_chapter_ids.is_empty());
}

#[tokio::test]
async fn resumed_session_survives_the_stale_check() {
    let (h, ids) = Harness::with_flat_chapters(2).await;
    h.tracker
        .track_reading(h.request(Some(ids[0]), Some("epubcfi(/2)"), false))
        .await
        .unwrap();

    h.clock.advance(Duration::hours(24));
    h.tracker.start_session(h.user_id, h.document_id).await.unwrap();
    h.clock.advance(Duration::minutes(20));

    let closed = h
        .tracker
        .close_stale_session(h.user_id, h.document_id, Duration::minutes(30))
        .await
        .unwrap();
    assert!(closed.is_none());
    let tracked = h
        .tracker
        .track_reading(h.request(Some(ids[1]), Some("epubcfi(/4)"), false))
        .await
        .unwrap();
    assert!(tracked.session_started_at.is_some());

    h.clock.advance(Duration::minutes(20));
    let ended = h.tracker.end_session(h.user_id, h.document_id).await.unwrap();
    assert_eq!(ended.total_reading_time_minutes, 40);
}

#[tokio::test]
async fn reingesting_a_document_keeps_its_chapters_and_progress() {
    let (h, ids) = Harness::with_flat_chapters(2).await;
    h.tracker
        .track_reading(h.request(Some(ids[0]), Some("epubcfi(/2)"), true))
        .await
        .unwrap();

    let nav = vec![NavPoint {
        title: "Replacement".to_string(),
        ..NavPoint::default()
    }];
    let again = h.tracker.ingest_navigation(h.document_id, &nav).await.unwrap();
    let again_ids: Vec<Uuid> = again.iter().map(|c| c.id).collect();
    assert_eq!(again_ids, ids);

    let snapshot = h
        .tracker
        .track_reading(h.request(Some(ids[1]), Some("epubcfi(/4)"), false))
        .await
        .unwrap();
    assert_eq!(snapshot.completed_chapter_ids, vec![ids[0]]);
    assert_eq!(snapshot.chapter_progress, 50.0);

    let records = h.tracker.chapter_progress(h.user_id, h.document_id).await.unwrap();
    assert!(records.iter().any(|r| r.chapter_id == ids[0] && r.completed));
}

#[tokio::test]
async fn repository_refuses_a_second_hierarchy() {
    let (h, _) = Harness::with_flat_chapters(1).await;
    let err = h.repo.save_chapters(h.document_id, &[]).await.unwrap_err();
    assert!(matches!(err, PortError::Conflict(_)));
}
