//! # GeoLinker Agent Library
//!
//! Two-phase GPS tracker: acquire a fix, reboot, upload it over a GSM modem.
//!
//! This library provides the core functionality of a battery-cycled tracker
//! that hands one GPS fix across a reset through a small persistent store and
//! posts it to the GeoLinker cloud using plain AT-command exchanges.

pub mod agent;
pub mod config;
pub mod error;
pub mod modem;
pub mod nmea;
pub mod reset;
pub mod serial;
pub mod store;
pub mod upload;
