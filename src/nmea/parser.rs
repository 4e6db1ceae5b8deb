//! # RMC Sentence Parser
//!
//! Turns one `RMC` (recommended minimum) sentence into a [`Fix`].
//!
//! ```text
//! $GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W*6A
//!        |      | |        | |         | |     |     |
//!        time   | lat      | lon       | speed course date
//!               status     N/S         E/W
//! ```
//!
//! Every rejection is an [`NmeaError`]; callers treat it as "keep waiting".

use thiserror::Error;

use crate::store::Fix;

/// Sentence tags accepted as an RMC sentence
pub const RECOGNIZED_TAGS: &[&str] = &["$GPRMC", "$GNRMC"];

/// Minimum sentence length in characters
pub const MIN_SENTENCE_LEN: usize = 20;

/// Fields kept after tokenizing
const MAX_FIELDS: usize = 12;

/// Fields that must be present
const MIN_FIELDS: usize = 10;

const FIELD_TIME: usize = 1;
const FIELD_STATUS: usize = 2;
const FIELD_LAT: usize = 3;
const FIELD_LAT_HEMISPHERE: usize = 4;
const FIELD_LON: usize = 5;
const FIELD_LON_HEMISPHERE: usize = 6;
const FIELD_DATE: usize = 9;

/// Fix status marker for an active (valid) fix
const STATUS_ACTIVE: &str = "A";

const MINUTES_PER_DAY: i32 = 24 * 60;

/// Reasons a sentence is rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NmeaError {
    #[error("sentence too short ({0} chars)")]
    TooShort(usize),

    #[error("not an RMC sentence")]
    UnrecognizedSentence,

    #[error("not enough RMC fields ({0})")]
    NotEnoughFields(usize),

    #[error("missing {0} field")]
    MissingField(&'static str),

    #[error("invalid time field")]
    InvalidTime,

    #[error("invalid date field")]
    InvalidDate,

    #[error("no fix (status {0:?})")]
    NoFix(String),

    #[error("invalid {0} coordinate")]
    InvalidCoordinate(&'static str),
}

/// Static offset from UTC applied to the GPS time of day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeOffset {
    pub hours: i8,
    pub minutes: i8,
}

impl TimeOffset {
    pub const UTC: TimeOffset = TimeOffset { hours: 0, minutes: 0 };

    pub fn new(hours: i8, minutes: i8) -> Self {
        Self { hours, minutes }
    }

    pub fn total_minutes(self) -> i32 {
        self.hours as i32 * 60 + self.minutes as i32
    }
}

/// Quick pre-filter used while streaming: recognised tag and more than
/// [`MIN_SENTENCE_LEN`] characters
pub fn is_candidate(line: &str) -> bool {
    line.len() > MIN_SENTENCE_LEN && RECOGNIZED_TAGS.iter().any(|tag| line.starts_with(tag))
}

/// Parse an RMC sentence into a fix in local time
///
/// # Arguments
///
/// * `line` - One sentence without the trailing newline
/// * `offset` - Offset added to the UTC time of day
///
/// # Errors
///
/// Returns an [`NmeaError`] when the sentence is short, unrecognised, has too
/// few fields, malformed date/time/coordinates, or a non-active fix status.
///
/// # Examples
///
/// ```
/// use geolinker_agent::nmea::parser::{parse_rmc, TimeOffset};
///
/// let line = "$GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W*6A";
/// let fix = parse_rmc(line, TimeOffset::UTC).unwrap();
/// assert_eq!(fix.timestamp, "2094-03-23 12:35:19");
/// ```
pub fn parse_rmc(line: &str, offset: TimeOffset) -> Result<Fix, NmeaError> {
    if line.len() < MIN_SENTENCE_LEN {
        return Err(NmeaError::TooShort(line.len()));
    }

    if !RECOGNIZED_TAGS.iter().any(|tag| line.starts_with(tag)) {
        return Err(NmeaError::UnrecognizedSentence);
    }

    let fields: Vec<&str> = line.split(',').take(MAX_FIELDS).collect();
    if fields.len() < MIN_FIELDS {
        return Err(NmeaError::NotEnoughFields(fields.len()));
    }

    let time = required(&fields, FIELD_TIME, "time")?;
    let status = required(&fields, FIELD_STATUS, "status")?;
    let lat = required(&fields, FIELD_LAT, "latitude")?;
    let lat_hemisphere = required(&fields, FIELD_LAT_HEMISPHERE, "latitude hemisphere")?;
    let lon = required(&fields, FIELD_LON, "longitude")?;
    let lon_hemisphere = required(&fields, FIELD_LON_HEMISPHERE, "longitude hemisphere")?;
    let date = required(&fields, FIELD_DATE, "date")?;

    if time.len() < 6 || !all_digits(&time.as_bytes()[..6]) {
        return Err(NmeaError::InvalidTime);
    }
    if date.len() != 6 || !all_digits(date.as_bytes()) {
        return Err(NmeaError::InvalidDate);
    }

    if status != STATUS_ACTIVE {
        return Err(NmeaError::NoFix(status.to_string()));
    }

    let latitude = parse_coordinate(lat, lat_hemisphere, 'S', 90.0, "latitude")?;
    let longitude = parse_coordinate(lon, lon_hemisphere, 'W', 180.0, "longitude")?;

    let date = date.as_bytes();
    let day = digit_pair(&date[0..2]);
    let month = digit_pair(&date[2..4]);
    let year = digit_pair(&date[4..6]);

    let time = time.as_bytes();
    let hour = digit_pair(&time[0..2]);
    let minute = digit_pair(&time[2..4]);
    let second = digit_pair(&time[4..6]);

    if hour > 23 || minute > 59 || second > 60 {
        return Err(NmeaError::InvalidTime);
    }
    if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        return Err(NmeaError::InvalidDate);
    }

    let (hour, minute) = apply_offset(hour, minute, offset);

    Ok(Fix {
        latitude,
        longitude,
        timestamp: format_timestamp(year, month, day, hour, minute, second),
    })
}

/// Add `offset` to a time of day, wrapping into `[0, 1440)` minutes
///
/// Only the time of day wraps; the caller's date is left untouched, so a fix
/// just before midnight under a positive offset keeps the previous day's date.
pub fn apply_offset(hour: u8, minute: u8, offset: TimeOffset) -> (u8, u8) {
    let mut total = hour as i32 * 60 + minute as i32 + offset.total_minutes();
    if total < 0 {
        total += MINUTES_PER_DAY;
    }
    if total >= MINUTES_PER_DAY {
        total -= MINUTES_PER_DAY;
    }
    // Offsets are validated to less than a day, this only guards bad input
    let total = total.rem_euclid(MINUTES_PER_DAY);

    ((total / 60) as u8, (total % 60) as u8)
}

/// `YYYY-MM-DD HH:MM:SS`, century fixed to `20`
pub fn format_timestamp(year: u8, month: u8, day: u8, hour: u8, minute: u8, second: u8) -> String {
    format!(
        "20{:02}-{:02}-{:02} {:02}:{:02}:{:02}",
        year, month, day, hour, minute, second
    )
}

/// Convert `DDMM.MMMM` / `DDDMM.MMMM` plus hemisphere into signed decimal degrees
fn parse_coordinate(
    raw: &str,
    hemisphere: &str,
    negative: char,
    limit: f64,
    name: &'static str,
) -> Result<f64, NmeaError> {
    let value: f64 = raw.parse().map_err(|_| NmeaError::InvalidCoordinate(name))?;
    if !value.is_finite() || value < 0.0 {
        return Err(NmeaError::InvalidCoordinate(name));
    }

    let degrees = (value / 100.0).trunc();
    let minutes = value - degrees * 100.0;
    let mut decimal = degrees + minutes / 60.0;

    if hemisphere.starts_with(negative) {
        decimal = -decimal;
    }

    if decimal.abs() > limit {
        return Err(NmeaError::InvalidCoordinate(name));
    }

    Ok(decimal)
}

fn required<'a>(
    fields: &[&'a str],
    index: usize,
    name: &'static str,
) -> Result<&'a str, NmeaError> {
    match fields.get(index) {
        Some(field) if !field.is_empty() => Ok(*field),
        _ => Err(NmeaError::MissingField(name)),
    }
}

fn all_digits(bytes: &[u8]) -> bool {
    bytes.iter().all(u8::is_ascii_digit)
}

/// Two ASCII digits to a number: `10 * (c0 - '0') + (c1 - '0')`
fn digit_pair(pair: &[u8]) -> u8 {
    10 * (pair[0] - b'0') + (pair[1] - b'0')
}

#[cfg(test)]
mod tests {
    use super::*;

    const MUNICH: &str = "$GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W*6A";

    fn sentence(
        time: &str,
        status: &str,
        lat: &str,
        ns: &str,
        lon: &str,
        ew: &str,
        date: &str,
    ) -> String {
        format!("$GPRMC,{time},{status},{lat},{ns},{lon},{ew},000.5,054.7,{date},020.3,E*68")
    }

    #[test]
    fn test_parse_reference_sentence() {
        let fix = parse_rmc(MUNICH, TimeOffset::UTC).unwrap();

        assert!((fix.latitude - 48.1173).abs() < 1e-6);
        assert!((fix.longitude - 11.516_666).abs() < 1e-5);
        assert_eq!(fix.timestamp, "2094-03-23 12:35:19");
    }

    #[test]
    fn test_void_fix_is_rejected() {
        let line = MUNICH.replace(",A,", ",V,");
        assert_eq!(parse_rmc(&line, TimeOffset::UTC), Err(NmeaError::NoFix("V".to_string())));
    }

    #[test]
    fn test_hemisphere_signs() {
        let cases = [
            ("N", "E", 1.0, 1.0),
            ("S", "E", -1.0, 1.0),
            ("N", "W", 1.0, -1.0),
            ("S", "W", -1.0, -1.0),
        ];

        for (ns, ew, lat_sign, lon_sign) in cases {
            let line = sentence("091500", "A", "3351.9085", ns, "15112.5528", ew, "150625");
            let fix = parse_rmc(&line, TimeOffset::UTC).unwrap();

            let lat = 33.0 + 51.9085 / 60.0;
            let lon = 151.0 + 12.5528 / 60.0;
            assert!((fix.latitude - lat_sign * lat).abs() < 1e-9, "{ns}{ew} latitude");
            assert!((fix.longitude - lon_sign * lon).abs() < 1e-9, "{ns}{ew} longitude");
        }
    }

    #[test]
    fn test_three_digit_longitude_degrees() {
        let line = sentence("000000", "A", "0000.000", "N", "17959.940", "W", "010125");
        let fix = parse_rmc(&line, TimeOffset::UTC).unwrap();
        assert!((fix.longitude + (179.0 + 59.94 / 60.0)).abs() < 1e-9);
        assert_eq!(fix.latitude, 0.0);
    }

    #[test]
    fn test_short_line_rejected() {
        assert_eq!(parse_rmc("$GPRMC,1,A", TimeOffset::UTC), Err(NmeaError::TooShort(10)));
    }

    #[test]
    fn test_unrecognized_tag_rejected() {
        let line = "$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47";
        assert_eq!(parse_rmc(line, TimeOffset::UTC), Err(NmeaError::UnrecognizedSentence));
    }

    #[test]
    fn test_gnss_talker_accepted() {
        let line = MUNICH.replace("$GPRMC", "$GNRMC");
        assert!(parse_rmc(&line, TimeOffset::UTC).is_ok());
    }

    #[test]
    fn test_not_enough_fields() {
        let line = "$GPRMC,123519,A,4807.038,N,01131.000,E,022.4";
        assert_eq!(parse_rmc(line, TimeOffset::UTC), Err(NmeaError::NotEnoughFields(8)));
    }

    #[test]
    fn test_empty_fields_keep_position() {
        // Speed and course empty: date stays in field 9
        let line = "$GPRMC,123519,A,4807.038,N,01131.000,E,,,230394,,,A*6A";
        let fix = parse_rmc(line, TimeOffset::UTC).unwrap();
        assert_eq!(fix.timestamp, "2094-03-23 12:35:19");
    }

    #[test]
    fn test_void_sentence_with_empty_fields() {
        let line = "$GPRMC,235959,V,,,,,,,311224,,,N*4C";
        assert!(parse_rmc(line, TimeOffset::UTC).is_err());
    }

    #[test]
    fn test_invalid_time_length() {
        let line = sentence("12351", "A", "4807.038", "N", "01131.000", "E", "230394");
        assert_eq!(parse_rmc(&line, TimeOffset::UTC), Err(NmeaError::InvalidTime));
    }

    #[test]
    fn test_invalid_date_length() {
        for date in ["23039", "2303944"] {
            let line = sentence("123519", "A", "4807.038", "N", "01131.000", "E", date);
            assert_eq!(
                parse_rmc(&line, TimeOffset::UTC),
                Err(NmeaError::InvalidDate),
                "date {date}"
            );
        }
    }

    #[test]
    fn test_fractional_seconds_accepted() {
        let line = sentence("123519.00", "A", "4807.038", "N", "01131.000", "E", "230394");
        assert_eq!(parse_rmc(&line, TimeOffset::UTC).unwrap().timestamp, "2094-03-23 12:35:19");
    }

    #[test]
    fn test_non_digit_time_rejected() {
        let line = sentence("12a519", "A", "4807.038", "N", "01131.000", "E", "230394");
        assert_eq!(parse_rmc(&line, TimeOffset::UTC), Err(NmeaError::InvalidTime));
    }

    #[test]
    fn test_garbage_coordinate_rejected() {
        let line = sentence("123519", "A", "48o7.038", "N", "01131.000", "E", "230394");
        assert_eq!(
            parse_rmc(&line, TimeOffset::UTC),
            Err(NmeaError::InvalidCoordinate("latitude"))
        );
    }

    #[test]
    fn test_out_of_range_latitude_rejected() {
        let line = sentence("123519", "A", "9130.000", "N", "01131.000", "E", "230394");
        assert_eq!(
            parse_rmc(&line, TimeOffset::UTC),
            Err(NmeaError::InvalidCoordinate("latitude"))
        );
    }

    #[test]
    fn test_positive_offset() {
        let fix = parse_rmc(MUNICH, TimeOffset::new(5, 30)).unwrap();
        assert_eq!(fix.timestamp, "2094-03-23 18:05:19");
    }

    #[test]
    fn test_negative_offset() {
        let fix = parse_rmc(MUNICH, TimeOffset::new(-3, -45)).unwrap();
        assert_eq!(fix.timestamp, "2094-03-23 08:50:19");
    }

    /// The date is not rolled over when the offset wraps past midnight.
    #[test]
    fn test_offset_wraps_time_but_not_date() {
        let line = sentence("235000", "A", "4807.038", "N", "01131.000", "E", "230394");
        let fix = parse_rmc(&line, TimeOffset::new(0, 20)).unwrap();
        assert_eq!(fix.timestamp, "2094-03-23 00:10:00");
    }

    #[test]
    fn test_negative_offset_wraps_before_midnight() {
        let line = sentence("001500", "A", "4807.038", "N", "01131.000", "E", "010194");
        let fix = parse_rmc(&line, TimeOffset::new(-1, 0)).unwrap();
        assert_eq!(fix.timestamp, "2094-01-01 23:15:00");
    }

    #[test]
    fn test_apply_offset() {
        assert_eq!(apply_offset(23, 50, TimeOffset::new(0, 20)), (0, 10));
        assert_eq!(apply_offset(0, 0, TimeOffset::new(0, -1)), (23, 59));
        assert_eq!(apply_offset(12, 0, TimeOffset::UTC), (12, 0));
        assert_eq!(apply_offset(20, 0, TimeOffset::new(14, 0)), (10, 0));
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(5, 1, 2, 3, 4, 5), "2005-01-02 03:04:05");
    }

    #[test]
    fn test_is_candidate() {
        assert!(is_candidate(MUNICH));
        assert!(!is_candidate("$GPRMC,123519,A,4807"));
        assert!(!is_candidate("$GPGSV,3,1,11,03,03,111,00,04,15,270,00,06,01,010,00*74"));
    }

    #[test]
    fn test_time_offset_total_minutes() {
        assert_eq!(TimeOffset::new(5, 30).total_minutes(), 330);
        assert_eq!(TimeOffset::new(-9, -30).total_minutes(), -570);
        assert_eq!(TimeOffset::default(), TimeOffset::UTC);
    }
}
