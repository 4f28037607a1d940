//! Daily post statistics.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::ids::PostId;

/// One row of daily statistics.
///
/// Counts are absolute totals as of `date`, not deltas. At most one row
/// exists per `(post_id, date)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyStatistics {
    /// The post these counts belong to.
    pub post_id: PostId,
    /// Calendar day.
    pub date: NaiveDate,
    /// Total views as of `date`.
    pub daily_view_count: u64,
    /// Total likes as of `date`.
    pub daily_like_count: u64,
}

/// What a daily statistics upsert did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatisticsWrite {
    /// First fetch of the day; a row was inserted.
    Created,
    /// A row for the day already existed and was overwritten.
    Updated,
}
