//! # HTTP Request Builder
//!
//! Hand-built JSON payload and HTTP/1.1 request for the GeoLinker endpoint.
//!
//! The payload shape is fixed by the server API. Single-element arrays are
//! part of that contract:
//!
//! ```text
//! {"device_id":"<id>","lat":[<lat>],"long":[<lon>],"timestamp":["<ts>"]}
//! ```

use tracing::warn;

use crate::store::StoredFix;

/// Remote endpoint
pub const REMOTE_HOST: &str = "www.circuitdigest.cloud";
pub const REMOTE_PORT: u16 = 80;
pub const REQUEST_PATH: &str = "/geolinker";

/// Ctrl-Z: ends the payload in the modem's send mode
pub const END_OF_DATA: u8 = 0x1A;

const CRLF: &str = "\r\n";

/// Build the JSON body for one stored fix
///
/// Coordinates are re-rendered with 6 fraction digits; a slot that does not
/// hold a number is sent as `0.000000`.
///
/// # Examples
///
/// ```
/// use geolinker_agent::store::StoredFix;
/// use geolinker_agent::upload::http::build_payload;
///
/// let fix = StoredFix {
///     latitude: "48.117300".into(),
///     longitude: "11.516666".into(),
///     timestamp: "2094-03-23 12:35:19".into(),
/// };
/// assert_eq!(
///     build_payload("tracker-1", &fix),
///     r#"{"device_id":"tracker-1","lat":[48.117300],"long":[11.516666],"timestamp":["2094-03-23 12:35:19"]}"#
/// );
/// ```
pub fn build_payload(device_id: &str, fix: &StoredFix) -> String {
    format!(
        "{{\"device_id\":\"{}\",\"lat\":[{}],\"long\":[{}],\"timestamp\":[\"{}\"]}}",
        device_id,
        format_coordinate(&fix.latitude),
        format_coordinate(&fix.longitude),
        fix.timestamp
    )
}

/// Build the complete POST request, without the send-mode terminator
///
/// `Authorization` carries the raw API key, no scheme prefix.
pub fn build_request(api_key: &str, body: &str) -> String {
    let mut request = String::with_capacity(160 + body.len());

    request.push_str(&format!("POST {} HTTP/1.1{}", REQUEST_PATH, CRLF));
    request.push_str(&format!("Host: {}{}", REMOTE_HOST, CRLF));
    request.push_str(&format!("Authorization: {}{}", api_key, CRLF));
    request.push_str(&format!("Content-Type: application/json{}", CRLF));
    request.push_str(&format!("Content-Length: {}{}", body.len(), CRLF));
    request.push_str(CRLF);
    request.push_str(body);

    request
}

/// Parse a stored coordinate and render it with 6 fraction digits
pub fn format_coordinate(raw: &str) -> String {
    let value = match raw.trim().parse::<f64>() {
        Ok(value) if value.is_finite() => value,
        _ => {
            warn!("Stored coordinate {:?} is not a number, sending 0", raw);
            0.0
        }
    };
    format!("{:.6}", value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored(lat: &str, lon: &str, ts: &str) -> StoredFix {
        StoredFix {
            latitude: lat.to_string(),
            longitude: lon.to_string(),
            timestamp: ts.to_string(),
        }
    }

    #[test]
    fn test_payload_exact_shape() {
        let payload = build_payload(
            "GeoLinker_tracker",
            &stored("-33.865143", "151.209900", "2025-06-15 09:15:00"),
        );
        assert_eq!(
            payload,
            "{\"device_id\":\"GeoLinker_tracker\",\"lat\":[-33.865143],\"long\":[151.209900],\"timestamp\":[\"2025-06-15 09:15:00\"]}"
        );
    }

    #[test]
    fn test_payload_is_valid_json() {
        let fix = stored("48.117300", "11.516666", "2094-03-23 12:35:19");
        let payload = build_payload("dev", &fix);
        let value: serde_json::Value = serde_json::from_str(&payload).unwrap();

        assert_eq!(value["device_id"], "dev");
        assert_eq!(value["lat"][0].as_f64(), Some(48.1173));
        assert_eq!(value["long"][0].as_f64(), Some(11.516666));
        assert_eq!(value["timestamp"][0], "2094-03-23 12:35:19");
    }

    #[test]
    fn test_payload_with_cleared_store() {
        let payload = build_payload("dev", &StoredFix::default());
        assert!(payload.contains("\"lat\":[0.000000]"));
        assert!(payload.contains("\"timestamp\":[\"\"]"));
    }

    #[test]
    fn test_format_coordinate() {
        assert_eq!(format_coordinate("48.1173"), "48.117300");
        assert_eq!(format_coordinate("-0.5"), "-0.500000");
        assert_eq!(format_coordinate("junk"), "0.000000");
        assert_eq!(format_coordinate(""), "0.000000");
    }

    #[test]
    fn test_request_layout() {
        let body = "{\"a\":1}";
        let request = build_request("secret-key", body);

        assert_eq!(
            request,
            "POST /geolinker HTTP/1.1\r\n\
             Host: www.circuitdigest.cloud\r\n\
             Authorization: secret-key\r\n\
             Content-Type: application/json\r\n\
             Content-Length: 7\r\n\
             \r\n\
             {\"a\":1}"
        );
    }

    #[test]
    fn test_content_length_counts_bytes() {
        let body = build_payload("capteur-é", &stored("1.0", "2.0", "2025-01-01 00:00:00"));
        let request = build_request("k", &body);
        assert!(request.contains(&format!("Content-Length: {}\r\n", body.as_bytes().len())));
        assert!(request.ends_with(&body));
    }

    #[test]
    fn test_endpoint_constants() {
        assert_eq!(REMOTE_PORT, 80);
        assert_eq!(REQUEST_PATH, "/geolinker");
        assert_eq!(END_OF_DATA, 0x1A);
    }
}
