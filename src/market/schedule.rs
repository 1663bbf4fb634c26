//! Strategy update boundaries.
//!
//! Strategy picks are published three times a day, ten minutes after each
//! 8-hour funding settlement (00:10, 08:10, 16:10 UTC). Every evaluation is
//! stamped with the boundary it belongs to.

use chrono::{DateTime, Duration, NaiveTime, Utc};

/// Boundaries as minutes after midnight UTC, ascending.
pub const STRATEGY_UPDATE_SCHEDULE: [i64; 3] = [10, 8 * 60 + 10, 16 * 60 + 10];

fn day_start(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.date_naive().and_time(NaiveTime::MIN).and_utc()
}

/// Latest schedule boundary at or before `ts`.
///
/// A timestamp exactly on a boundary maps to that boundary. Before the first
/// boundary of the day, the last boundary of the previous day is returned.
pub fn align_to_strategy_schedule(ts: DateTime<Utc>) -> DateTime<Utc> {
    let midnight = day_start(ts);

    let mut last_match = None;
    for minutes in STRATEGY_UPDATE_SCHEDULE {
        let candidate = midnight + Duration::minutes(minutes);
        if candidate <= ts {
            last_match = Some(candidate);
        } else {
            break;
        }
    }

    last_match.unwrap_or_else(|| {
        let last = STRATEGY_UPDATE_SCHEDULE[STRATEGY_UPDATE_SCHEDULE.len() - 1];
        midnight - Duration::days(1) + Duration::minutes(last)
    })
}

/// First schedule boundary strictly after `ts`.
pub fn next_strategy_boundary(ts: DateTime<Utc>) -> DateTime<Utc> {
    let midnight = day_start(ts);
    STRATEGY_UPDATE_SCHEDULE
        .iter()
        .map(|minutes| midnight + Duration::minutes(*minutes))
        .find(|candidate| *candidate > ts)
        .unwrap_or_else(|| midnight + Duration::days(1) + Duration::minutes(STRATEGY_UPDATE_SCHEDULE[0]))
}
