use std::time::{SystemTime, UNIX_EPOCH};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

pub mod health;
pub mod history;
pub mod round;
pub mod sse;

fn format_system_time(time: SystemTime) -> String {
    let nanos = match time.duration_since(UNIX_EPOCH) {
        Ok(elapsed) => elapsed.as_nanos() as i128,
        Err(err) => -(err.duration().as_nanos() as i128),
    };
    OffsetDateTime::from_unix_timestamp_nanos(nanos)
        .ok()
        .and_then(|datetime| datetime.format(&Rfc3339).ok())
        .unwrap_or_else(|| "invalid-timestamp".into())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn formats_epoch_milliseconds_as_rfc3339() {
        let time = UNIX_EPOCH + Duration::from_millis(1_700_000_000_123);
        assert_eq!(format_system_time(time), "2023-11-14T22:13:20.123Z");
    }

    #[test]
    fn out_of_range_time_is_reported_instead_of_panicking() {
        let time = UNIX_EPOCH + Duration::from_millis(99_999_999_999_999_999);
        assert_eq!(format_system_time(time), "invalid-timestamp");
    }
}
