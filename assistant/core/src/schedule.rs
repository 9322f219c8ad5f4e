//! Schedules & Urgency
//!
//! The schedule model, its conversion from backend DTOs, and the urgency
//! summary shown on the home screen: how many upcoming items fall into each
//! time window counted from now.

use chrono::{Duration, Months, NaiveDate, NaiveDateTime, NaiveTime};
use thiserror::Error;
use uuid::Uuid;

use crate::backend::ScheduleDto;

/// A schedule entry
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Schedule {
    /// Local identifier (the server ID, or a generated one)
    pub id: String,
    /// Server identifier, if the backend assigned one
    pub server_id: Option<String>,
    /// What is happening
    pub title: String,
    /// Day it happens
    pub date: NaiveDate,
    /// Time of day, if given
    pub time: Option<NaiveTime>,
    /// Where it happens
    pub location: Option<String>,
    /// Free-form notes
    pub description: Option<String>,
}

impl Schedule {
    /// When the entry starts; entries without a time start at midnight
    #[must_use]
    pub fn starts_at(&self) -> NaiveDateTime {
        self.date.and_time(self.time.unwrap_or_default())
    }
}

/// Why a DTO could not be turned into a [`Schedule`]
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ScheduleParseError {
    /// Date is not `YYYY-MM-DD`
    #[error("invalid schedule date {0:?}")]
    InvalidDate(String),
    /// Time is neither `HH:mm:ss` nor `HH:mm`
    #[error("invalid schedule time {0:?}")]
    InvalidTime(String),
}

impl TryFrom<ScheduleDto> for Schedule {
    type Error = ScheduleParseError;

    fn try_from(dto: ScheduleDto) -> Result<Self, Self::Error> {
        let date = NaiveDate::parse_from_str(dto.date.trim(), "%Y-%m-%d")
            .map_err(|_| ScheduleParseError::InvalidDate(dto.date.clone()))?;
        let time = parse_time(&dto.time)?;

        let id = dto.id.trim();
        let (id, server_id) = if id.is_empty() {
            (Uuid::new_v4().to_string(), None)
        } else {
            (id.to_string(), Some(id.to_string()))
        };

        Ok(Self {
            id,
            server_id,
            title: dto.title,
            date,
            time,
            location: dto.location.filter(|l| !l.trim().is_empty()),
            description: dto.description.filter(|d| !d.trim().is_empty()),
        })
    }
}

/// Parse `HH:mm:ss` or `HH:mm`; blank means no time
fn parse_time(raw: &str) -> Result<Option<NaiveTime>, ScheduleParseError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    NaiveTime::parse_from_str(raw, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
        .map(Some)
        .map_err(|_| ScheduleParseError::InvalidTime(raw.to_string()))
}

/// Convert backend DTOs, skipping entries that do not parse
///
/// The result is sorted by start time.
#[must_use]
pub fn parse_schedules(dtos: Vec<ScheduleDto>) -> Vec<Schedule> {
    let mut schedules: Vec<Schedule> = dtos
        .into_iter()
        .filter_map(|dto| {
            let title = dto.title.clone();
            match Schedule::try_from(dto) {
                Ok(schedule) => Some(schedule),
                Err(e) => {
                    tracing::warn!(title = %title, error = %e, "Skipping unparseable schedule");
                    None
                }
            }
        })
        .collect();
    schedules.sort_by_key(Schedule::starts_at);
    schedules
}

// ============================================
// Urgency
// ============================================

/// Time window a schedule falls into, counted from now
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum UrgencyBucket {
    /// Already started
    Overdue,
    /// Within 12 hours
    WithinHalfDay,
    /// Within a day
    WithinDay,
    /// Within three days
    WithinThreeDays,
    /// Within a week
    WithinWeek,
    /// Within a calendar month
    WithinMonth,
    /// Later than that
    BeyondMonth,
}

impl UrgencyBucket {
    /// All buckets, most urgent first
    pub const ALL: [Self; 7] = [
        Self::Overdue,
        Self::WithinHalfDay,
        Self::WithinDay,
        Self::WithinThreeDays,
        Self::WithinWeek,
        Self::WithinMonth,
        Self::BeyondMonth,
    ];

    /// Bucket for a start time
    #[must_use]
    pub fn classify(starts_at: NaiveDateTime, now: NaiveDateTime) -> Self {
        if starts_at < now {
            Self::Overdue
        } else if starts_at < now + Duration::hours(12) {
            Self::WithinHalfDay
        } else if starts_at < now + Duration::days(1) {
            Self::WithinDay
        } else if starts_at < now + Duration::days(3) {
            Self::WithinThreeDays
        } else if starts_at < now + Duration::days(7) {
            Self::WithinWeek
        } else if now
            .checked_add_months(Months::new(1))
            .is_some_and(|limit| starts_at < limit)
        {
            Self::WithinMonth
        } else {
            Self::BeyondMonth
        }
    }

    /// Display label
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Overdue => "Overdue",
            Self::WithinHalfDay => "Within 12 hours",
            Self::WithinDay => "Within a day",
            Self::WithinThreeDays => "Within 3 days",
            Self::WithinWeek => "Within a week",
            Self::WithinMonth => "Within a month",
            Self::BeyondMonth => "Later",
        }
    }

    /// Display colour as `0xRRGGBB`
    #[must_use]
    pub fn color(self) -> u32 {
        match self {
            Self::Overdue => 0xFF_00_00,
            Self::WithinHalfDay => 0xFF_57_22,
            Self::WithinDay => 0xFF_98_00,
            Self::WithinThreeDays => 0xFF_C1_07,
            Self::WithinWeek => 0xFF_EB_3B,
            Self::WithinMonth => 0xBD_BD_BD,
            Self::BeyondMonth => 0x9E_9E_9E,
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Schedule counts per urgency bucket
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UrgencySummary {
    counts: [usize; 7],
}

impl UrgencySummary {
    /// Count schedules per bucket relative to `now`
    pub fn tally<'a>(schedules: impl IntoIterator<Item = &'a Schedule>, now: NaiveDateTime) -> Self {
        let mut summary = Self::default();
        for schedule in schedules {
            let bucket = UrgencyBucket::classify(schedule.starts_at(), now);
            summary.counts[bucket.index()] += 1;
        }
        summary
    }

    /// Schedules in a bucket
    #[must_use]
    pub fn count(&self, bucket: UrgencyBucket) -> usize {
        self.counts[bucket.index()]
    }

    /// Schedules counted
    #[must_use]
    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }

    /// Share of a bucket in `0.0..=1.0`; zero when nothing was counted
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn proportion(&self, bucket: UrgencyBucket) -> f64 {
        match self.total() {
            0 => 0.0,
            total => self.count(bucket) as f64 / total as f64,
        }
    }

    /// `(bucket, count)` pairs, most urgent first
    pub fn iter(&self) -> impl Iterator<Item = (UrgencyBucket, usize)> + '_ {
        UrgencyBucket::ALL
            .into_iter()
            .map(|bucket| (bucket, self.count(bucket)))
    }
}
