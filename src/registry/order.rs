//! Priority ordering of discovered implementations.
//!
//! Non-negative priorities come first in ascending order, then every entry
//! without a priority in discovery order, then negative priorities with `-1`
//! before `-2` and so on. Without any priority the discovery order is kept.

/// Sort key: (group, rank within group).
fn rank(priority: Option<i32>) -> (u8, i64) {
    match priority {
        Some(p) if p >= 0 => (0, i64::from(p)),
        None => (1, 0),
        Some(p) => (2, -i64::from(p)),
    }
}

/// Order `(priority, item)` pairs. The sort is stable.
pub fn by_priority<T>(mut entries: Vec<(Option<i32>, T)>) -> Vec<T> {
    if entries.iter().any(|(priority, _)| priority.is_some()) {
        entries.sort_by_key(|(priority, _)| rank(*priority));
    }
    entries.into_iter().map(|(_, item)| item).collect()
}
