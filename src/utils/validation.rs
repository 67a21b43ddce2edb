use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::error::ApiError;

/// Parse a path parameter as a UUID, mapping failures to the 400
/// "Invalid Parameter" problem instead of a framework rejection.
pub fn parse_uuid(value: &str) -> Result<Uuid, ApiError> {
    value
        .parse()
        .map_err(|_| ApiError::InvalidInput(format!("'{}' is not a valid UUID", value)))
}

/// Metrics queries: default to the last 24 hours, cap the span at 90 days.
pub fn resolve_metrics_window(
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
) -> Result<(DateTime<Utc>, DateTime<Utc>), ApiError> {
    let to = to.unwrap_or_else(Utc::now);
    let from = from.unwrap_or(to - Duration::hours(24));

    if from >= to {
        return Err(ApiError::InvalidInput(
            "'from' must be before 'to'".to_string(),
        ));
    }
    if to - from > Duration::days(90) {
        return Err(ApiError::InvalidInput(
            "metrics range must not exceed 90 days".to_string(),
        ));
    }
    Ok((from, to))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn rejects_malformed_uuids() {
        assert!(parse_uuid("not-a-uuid").is_err());
        assert!(parse_uuid("8e0bd9f6-6ff8-44f8-9a77-10b157cf0333").is_ok());
    }

    #[test]
    fn window_defaults_to_last_day() {
        let (from, to) = resolve_metrics_window(None, None).unwrap();
        assert_eq!(to - from, Duration::hours(24));
    }

    #[test]
    fn window_rejects_inverted_and_oversize_ranges() {
        let t0 = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        assert!(resolve_metrics_window(Some(t0), Some(t0)).is_err());
        assert!(resolve_metrics_window(Some(t0 + Duration::hours(1)), Some(t0)).is_err());
        assert!(resolve_metrics_window(Some(t0), Some(t0 + Duration::days(91))).is_err());
        assert!(resolve_metrics_window(Some(t0), Some(t0 + Duration::days(90))).is_ok());
    }
}
