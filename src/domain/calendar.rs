//! Local wall-clock for visit timestamps
//!
//! Visits are stamped and grouped by the venue's local calendar, which is a
//! fixed UTC offset taken from config (the venue does not observe DST).

use chrono::{FixedOffset, NaiveDateTime, Offset, Timelike, Utc};

/// Storage and display format for visit timestamps
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Format used when listing individual visits
pub const VISIT_LABEL_FORMAT: &str = "%Y/%m/%d %H:%M";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Calendar {
    offset: FixedOffset,
}

impl Default for Calendar {
    fn default() -> Self {
        Self::utc()
    }
}

impl Calendar {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    pub fn utc() -> Self {
        Self { offset: Utc.fix() }
    }

    /// Build from a minute offset; returns None when out of range (±24h)
    pub fn from_offset_minutes(minutes: i32) -> Option<Self> {
        minutes.checked_mul(60).and_then(FixedOffset::east_opt).map(Self::new)
    }

    #[inline]
    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Current local wall-clock time, truncated to whole seconds
    pub fn now(&self) -> NaiveDateTime {
        let local = Utc::now().with_timezone(&self.offset).naive_local();
        local.with_nanosecond(0).unwrap_or(local)
    }
}
