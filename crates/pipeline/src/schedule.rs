//! Posting cadence and the schedule artifact.
//!
//! A schedule is derived data: it is written for people to review and never
//! read back as state.

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveTime, Offset, Utc, Weekday};
use serde::Serialize;

use crate::{ArticleIndex, Insight, Timestamp, VariationIndex};

/// A recurring posting slot: one weekday and wall-clock time at a fixed UTC
/// offset, repeated every `interval_days`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostingCadence {
    weekday: Weekday,
    time: NaiveTime,
    offset: FixedOffset,
    interval_days: u32,
}

impl PostingCadence {
    /// Creates a cadence. Returns `None` if `interval_days` is zero.
    pub fn new(
        weekday: Weekday,
        time: NaiveTime,
        offset: FixedOffset,
        interval_days: u32,
    ) -> Option<Self> {
        (interval_days > 0).then_some(Self {
            weekday,
            time,
            offset,
            interval_days,
        })
    }

    /// Weekly on `weekday` at `time`, UTC.
    pub fn weekly(weekday: Weekday, time: NaiveTime) -> Self {
        Self {
            weekday,
            time,
            offset: Utc.fix(),
            interval_days: 7,
        }
    }

    /// The next slot strictly after `now`.
    ///
    /// Today's slot counts only if its time has not passed yet.
    pub fn first_slot_after(&self, now: DateTime<Utc>) -> DateTime<FixedOffset> {
        let local = now.with_timezone(&self.offset);
        let days_ahead = (7 + self.weekday.num_days_from_monday()
            - local.weekday().num_days_from_monday())
            % 7;
        let date = local.date_naive() + Duration::days(i64::from(days_ahead));
        let candidate = self.at_local(date.and_time(self.time));
        if candidate > local {
            candidate
        } else {
            candidate + Duration::days(7)
        }
    }

    /// Date of plan step `step` (0-based), counted from `first`.
    pub fn slot(&self, first: DateTime<FixedOffset>, step: usize) -> DateTime<FixedOffset> {
        first + Duration::days(i64::from(self.interval_days) * step as i64)
    }

    fn at_local(&self, local: chrono::NaiveDateTime) -> DateTime<FixedOffset> {
        let utc = local - Duration::seconds(i64::from(self.offset.local_minus_utc()));
        DateTime::from_naive_utc_and_offset(utc, self.offset)
    }
}

/// One planned, not yet published post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduleEntry {
    /// 1-based position in the plan.
    pub step: usize,
    pub scheduled_for: DateTime<FixedOffset>,
    pub article: ArticleIndex,
    pub variation: VariationIndex,
    pub article_title: String,
    pub insight: Insight,
    pub draft_text: String,
    /// Effective length of `draft_text` under the active length rule.
    pub length: usize,
}

/// An ordered list of planned posts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Schedule {
    pub generated_at: Timestamp,
    pub entries: Vec<ScheduleEntry>,
}

impl Schedule {
    /// An empty schedule stamped with the current time.
    pub fn new() -> Self {
        Self {
            generated_at: Timestamp::now(),
            entries: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for Schedule {
    fn default() -> Self {
        Self::new()
    }
}
