//! Foundation module - Core utilities shared by every subsystem
//!
//! Currently only the logging entry points live here.

pub mod logging;
