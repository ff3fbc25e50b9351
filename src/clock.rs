//! Wall-clock helpers shared by stall detection and token expiry checks.

use std::time::{SystemTime, UNIX_EPOCH};

/// Returns the current wall-clock time as epoch milliseconds.
///
/// A clock set before the Unix epoch yields `0`, which every caller treats as
/// "no timestamp".
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn epoch_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_millis() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epoch_millis_is_after_2020() {
        // 2020-01-01T00:00:00Z
        assert!(epoch_millis() > 1_577_836_800_000);
    }
}
