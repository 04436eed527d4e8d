//! Day-streak bookkeeping.

use chrono::NaiveDate;

/// Streak after a habit completion on `today`, given the streak and the day
/// of the previous habit completion.
///
/// - previous completion today: unchanged (already counted)
/// - previous completion yesterday: one more day
/// - anything else, including no previous completion: a fresh streak of 1
pub fn next_streak(current: u32, last_completed_on: Option<NaiveDate>, today: NaiveDate) -> u32 {
    match last_completed_on.map(|last| (today - last).num_days()) {
        Some(0) => current.max(1),
        Some(1) => current.saturating_add(1),
        _ => 1,
    }
}

/// Streak as it should be displayed on `today`: a streak whose last day is
/// older than yesterday is already broken.
pub fn live_streak(current: u32, last_completed_on: Option<NaiveDate>, today: NaiveDate) -> u32 {
    match last_completed_on.map(|last| (today - last).num_days()) {
        Some(0) | Some(1) => current,
        _ => 0,
    }
}
