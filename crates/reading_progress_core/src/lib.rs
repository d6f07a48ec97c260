pub mod cfi;
pub mod completion;
pub mod domain;
pub mod hierarchy;
pub mod memory;
pub mod ports;
pub mod progress;
pub mod session;
pub mod tracker;

pub use domain::{
    Chapter, ChapterReadingProgress, ChapterStatus, ChapterTree, CompletedChapters, NavPoint,
    ProgressSnapshot, ReadingProgress, TrackRequest,
};
pub use hierarchy::extract_chapters;
pub use memory::InMemoryProgressRepository;
pub use ports::{Clock, PortError, PortResult, ProgressRepository, SystemClock};
pub use progress::ProgressMetrics;
pub use tracker::ProgressTracker;
