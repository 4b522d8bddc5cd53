//! Timestamps travel over GraphQL as milliseconds since the Unix epoch,
//! rendered as strings. The same encoding is used for pagination cursors.

use time::OffsetDateTime;

pub fn to_millis_string(ts: OffsetDateTime) -> String {
    (ts.unix_timestamp_nanos() / 1_000_000).to_string()
}

pub fn parse_millis(raw: &str) -> Option<OffsetDateTime> {
    let millis = raw.trim().parse::<i64>().ok()?;
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000).ok()
}
