//! # AT Command Set
//!
//! Commands and reply markers for SIM800-class GSM modems.

/// Close the current TCP connection
pub const CIPCLOSE: &str = "AT+CIPCLOSE";
pub const CIPCLOSE_EXPECT: &str = "CLOSE";

/// Deactivate the PDP context
pub const CIPSHUT: &str = "AT+CIPSHUT";
pub const CIPSHUT_EXPECT: &str = "SHUT OK";

/// Network registration status query
pub const CREG_QUERY: &str = "AT+CREG?";
pub const CREG_PREFIX: &str = "+CREG:";

/// Packet domain attach query / attach
pub const CGATT_QUERY: &str = "AT+CGATT?";
pub const CGATT_PREFIX: &str = "+CGATT:";
pub const CGATT_ATTACH: &str = "AT+CGATT=1";

/// Single-connection mode
pub const CIPMUX_SINGLE: &str = "AT+CIPMUX=0";

/// Bring up the wireless connection
pub const CIICR: &str = "AT+CIICR";

/// Local IP address; the reply is a dotted quad
pub const CIFSR: &str = "AT+CIFSR";
pub const CIFSR_EXPECT: &str = ".";

/// Enter send mode; the modem answers with a `>` prompt
pub const CIPSEND: &str = "AT+CIPSEND";
pub const CIPSEND_PROMPT: &str = ">";

pub const OK: &str = "OK";

/// Connect confirmations after `AT+CIPSTART`
pub const CONNECT_OK: &str = "CONNECT OK";
pub const ALREADY_CONNECT: &str = "ALREADY CONNECT";
pub const CONNECT_FAIL: &str = "CONNECT FAIL";

/// Marker preceding the 3-digit status code in the server reply
pub const HTTP_STATUS_MARKER: &str = "HTTP/1.1 ";

/// `+CREG` status: registered, home network
pub const REGISTERED_HOME: u8 = 1;

/// `+CREG` status: registered, roaming
pub const REGISTERED_ROAMING: u8 = 5;

/// Set the bearer APN
pub fn cstt(apn: &str) -> String {
    format!("AT+CSTT=\"{}\"", apn)
}

/// Open a TCP connection
pub fn cipstart(host: &str, port: u16) -> String {
    format!("AT+CIPSTART=\"TCP\",\"{}\",{}", host, port)
}

/// Registration status from a `+CREG?` reply
///
/// The status is the digit right after the first comma following `+CREG:`
/// (or after the first comma of the reply when the prefix is missing).
pub fn parse_registration(response: &str) -> Option<u8> {
    let search_from = response.find(CREG_PREFIX).unwrap_or(0);
    let comma = search_from + response[search_from..].find(',')?;
    let digit = response[comma + 1..].chars().next()?;
    digit.to_digit(10).map(|d| d as u8)
}

pub fn is_registered(status: u8) -> bool {
    status == REGISTERED_HOME || status == REGISTERED_ROAMING
}

/// Attach state from a `+CGATT?` reply, `None` when the reply has no state
pub fn parse_attach(response: &str) -> Option<bool> {
    let start = response.find(CGATT_PREFIX)? + CGATT_PREFIX.len();
    let state = response[start..].trim_start().chars().next()?;
    match state {
        '1' => Some(true),
        '0' => Some(false),
        _ => None,
    }
}
