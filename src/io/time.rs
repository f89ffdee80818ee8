//! Mission time encodings

use crate::types::{PlotError, PlotResult};
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc};

const MICROSECONDS_PER_DAY: f64 = 86_400_000_000.0;

/// Format of the CloudSat `start_time` swath attribute
pub const CLOUDSAT_START_TIME_FORMAT: &str = "%Y%m%d%H%M%S";

/// Decode a CALIPSO `yymmdd.ffffffff` time (fraction of day after the point).
pub fn calipso_time_to_datetime(time: f64) -> PlotResult<DateTime<Utc>> {
    if !time.is_finite() || time < 0.0 {
        return Err(PlotError::InvalidFormat(format!(
            "Invalid CALIPSO time {}",
            time
        )));
    }

    let day = (time % 100.0).trunc();
    let month = ((time - day) % 10_000.0).trunc();
    let year = (time - month - day).trunc();

    let date = NaiveDate::from_ymd_opt(
        2000 + (year / 10_000.0) as i32,
        (month / 100.0) as u32,
        day as u32,
    )
    .ok_or_else(|| PlotError::InvalidFormat(format!("Invalid CALIPSO date in time {}", time)))?;

    let offset = Duration::microseconds(((time % 1.0) * MICROSECONDS_PER_DAY).round() as i64);
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| PlotError::InvalidFormat(format!("Invalid CALIPSO time {}", time)))?;

    Ok(Utc.from_utc_datetime(&midnight) + offset)
}

/// Encode a timestamp as CALIPSO `yymmdd.ffffffff`.
pub fn datetime_to_calipso_time(time: &DateTime<Utc>) -> f64 {
    let date = (time.year() - 2000) as f64 * 10_000.0 + time.month() as f64 * 100.0 + time.day() as f64;
    let micros = time.num_seconds_from_midnight() as f64 * 1e6 + (time.nanosecond() / 1000) as f64;
    date + micros / MICROSECONDS_PER_DAY
}

/// Parse the CloudSat `start_time` attribute (`YYYYMMDDHHMMSS`).
pub fn parse_cloudsat_start_time(text: &str) -> PlotResult<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(text.trim(), CLOUDSAT_START_TIME_FORMAT)
        .map_err(|e| PlotError::InvalidFormat(format!("Invalid start_time \"{}\": {}", text, e)))?;
    Ok(Utc.from_utc_datetime(&naive))
}

/// CloudSat profile time: seconds since the granule start time.
pub fn cloudsat_time_to_datetime(start_time: &DateTime<Utc>, seconds: f64) -> PlotResult<DateTime<Utc>> {
    if !seconds.is_finite() {
        return Err(PlotError::InvalidFormat(format!(
            "Invalid CloudSat profile time {}",
            seconds
        )));
    }
    Ok(*start_time + Duration::microseconds((seconds * 1e6).round() as i64))
}

/// Raw time encoding of a product's along-track time axis
#[derive(Debug, Clone, PartialEq)]
pub enum TimeEncoding {
    Calipso,
    CloudSat { start_time: DateTime<Utc> },
}

impl TimeEncoding {
    pub fn to_datetime(&self, raw: f64) -> PlotResult<DateTime<Utc>> {
        match self {
            TimeEncoding::Calipso => calipso_time_to_datetime(raw),
            TimeEncoding::CloudSat { start_time } => cloudsat_time_to_datetime(start_time, raw),
        }
    }

    /// Decode a whole time axis
    pub fn decode_all(&self, raw: &[f64]) -> PlotResult<Vec<DateTime<Utc>>> {
        raw.iter().map(|t| self.to_datetime(*t)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calipso_decoding() {
        let t = calipso_time_to_datetime(130429.5).unwrap();
        assert_eq!(t, Utc.with_ymd_and_hms(2013, 4, 29, 12, 0, 0).unwrap());
    }

    #[test]
    fn test_calipso_round_trip() {
        let original = Utc.with_ymd_and_hms(2008, 1, 31, 23, 17, 42).unwrap() + Duration::milliseconds(250);
        let decoded = calipso_time_to_datetime(datetime_to_calipso_time(&original)).unwrap();
        let error = (decoded - original).num_microseconds().unwrap().abs();
        assert!(error < 1000, "round trip error {} us", error);
    }

    #[test]
    fn test_calipso_invalid_month() {
        assert!(calipso_time_to_datetime(131329.0).is_err());
    }

    #[test]
    fn test_cloudsat_time() {
        let start = parse_cloudsat_start_time("20130429200420").unwrap();
        assert_eq!(start, Utc.with_ymd_and_hms(2013, 4, 29, 20, 4, 20).unwrap());

        let t = cloudsat_time_to_datetime(&start, 61.5).unwrap();
        assert_eq!(t, Utc.with_ymd_and_hms(2013, 4, 29, 20, 5, 21).unwrap() + Duration::milliseconds(500));
        assert!(parse_cloudsat_start_time("2013-04-29").is_err());
    }
}
