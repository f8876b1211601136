//! Configuration module for the dailies tool
//!
//! Loads the base configuration shared with the external daily encoder and
//! produces per-run overlay copies of it.

pub mod config;

pub use config::*;
