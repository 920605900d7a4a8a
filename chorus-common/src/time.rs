//! Timestamp utilities

use chrono::Utc;

/// Current wall-clock time as microseconds since the Unix epoch.
///
/// On the coordinator this reading *is* the reference clock; agents only
/// ever compare their own reading against probe replies.
pub fn now_us() -> i64 {
    Utc::now().timestamp_micros()
}
