use crate::kiosk::types::{DisplayMode, DisplayState};
use std::time::Duration;
use tokio::time::Instant;

/// Deadline for the next automatic sponsor slide.
///
/// Armed while the display is in showcase mode, re-armed after every tick
/// and whenever the slide duration changes.
#[derive(Debug, Default)]
pub struct SlideshowTimer {
    deadline: Option<Instant>,
    period: Option<Duration>,
}

impl SlideshowTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Align the timer with the current state.
    pub fn sync(&mut self, state: &DisplayState, now: Instant) {
        if state.mode != DisplayMode::SponsorShowcase {
            self.deadline = None;
            self.period = None;
            return;
        }

        let period = Duration::from_secs(u64::from(state.slide_duration_seconds.max(1)));
        if self.period != Some(period) || self.deadline.is_none() {
            self.period = Some(period);
            self.deadline = Some(now + period);
        }
    }

    /// Drop the running deadline; the next `sync` arms a full period.
    pub fn restart(&mut self) {
        self.deadline = None;
    }

    /// Re-arm after the deadline passed.
    pub fn fire(&mut self, now: Instant) {
        self.deadline = self.period.map(|period| now + period);
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }
}

/// Sleep until `deadline`, or forever when there is none.
pub async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
