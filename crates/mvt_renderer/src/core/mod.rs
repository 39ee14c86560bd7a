//! Core renderer types
//!
//! Houses the unified configuration system.

pub mod config;
