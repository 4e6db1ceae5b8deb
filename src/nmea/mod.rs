//! # NMEA Module
//!
//! GPS receiver sentence handling.
//!
//! This module handles:
//! - Assembling receiver bytes into sentence lines
//! - Validating RMC sentences and the fix status
//! - Converting degrees-minutes to decimal degrees
//! - Applying the local time offset and formatting the timestamp

pub mod line_buffer;
pub mod parser;

pub use line_buffer::LineBuffer;
pub use parser::{parse_rmc, NmeaError, TimeOffset};
