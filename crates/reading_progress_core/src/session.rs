//! crates/reading_progress_core/src/session.rs
//!
//! Reading-session bookkeeping. A record is either idle or has exactly one open
//! session, represented by `ReadingProgress::session_started_at`.

use crate::domain::ReadingProgress;
use chrono::{DateTime, Duration, Utc};

/// Opens a session. Returns `false` if one was already open.
///
/// Opening a session counts as activity and refreshes `last_read_at`.
pub fn start_session(progress: &mut ReadingProgress, now: DateTime<Utc>) -> bool {
    if progress.has_open_session() {
        return false;
    }
    progress.session_started_at = Some(now);
    progress.last_read_at = now;
    true
}

/// Closes the open session and returns the whole minutes credited.
///
/// Returns `None` when no session was open. Sub-minute sessions credit nothing but
/// still refresh `last_read_at`.
pub fn end_session(progress: &mut ReadingProgress, now: DateTime<Utc>) -> Option<u32> {
    let started_at = progress.session_started_at.take()?;
    let minutes = elapsed_minutes(started_at, now);
    progress.total_reading_time_minutes = progress.total_reading_time_minutes.saturating_add(minutes);
    progress.last_read_at = now;
    Some(minutes)
}

/// Ends a session left open longer than `idle_limit` since the last recorded activity.
///
/// The last activity is the later of `last_read_at` and the session start; time is
/// credited only up to that instant.
pub fn close_if_stale(
    progress: &mut ReadingProgress,
    now: DateTime<Utc>,
    idle_limit: Duration,
) -> Option<u32> {
    let started_at = progress.session_started_at?;
    let last_activity = progress.last_read_at.max(started_at);
    if now - last_activity <= idle_limit {
        return None;
    }
    end_session(progress, last_activity)
}

fn elapsed_minutes(started_at: DateTime<Utc>, now: DateTime<Utc>) -> u32 {
    let minutes = (now - started_at).num_minutes();
    u32::try_from(minutes.max(0)).unwrap_or(u32::MAX)
}
