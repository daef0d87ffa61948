use chrono::{DateTime, Duration, Utc};

/// Span after publication during which a question counts as recent.
const RECENT_WINDOW_HOURS: i64 = 24;

/// Interval during which a question is visible and open for ballots.
///
/// Without an end the window is open-ended; with one it is closed on both
/// sides, so a question is still votable at exactly `end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishWindow {
    pub publish: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
}

impl PublishWindow {
    pub fn new(publish: DateTime<Utc>, end: Option<DateTime<Utc>>) -> Self {
        Self { publish, end }
    }

    pub fn is_published(&self, now: DateTime<Utc>) -> bool {
        match self.end {
            None => now >= self.publish,
            Some(end) => self.publish <= now && now <= end,
        }
    }

    pub fn can_vote(&self, now: DateTime<Utc>) -> bool {
        self.is_published(now)
    }

    pub fn was_published_recently(&self, now: DateTime<Utc>) -> bool {
        now - Duration::hours(RECENT_WINDOW_HOURS) <= self.publish && self.publish <= now
    }
}
