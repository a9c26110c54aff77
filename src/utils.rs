use chrono::{DateTime, FixedOffset, Utc};

pub const CHART_TIME_FORMAT: &str = "%H:%M";
pub const FULL_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Short clock time used on chart axes.
pub fn format_chart_time(ts: DateTime<Utc>, offset: FixedOffset) -> String {
    ts.with_timezone(&offset).format(CHART_TIME_FORMAT).to_string()
}

pub fn format_full_time(ts: DateTime<Utc>, offset: FixedOffset) -> String {
    ts.with_timezone(&offset).format(FULL_TIME_FORMAT).to_string()
}
