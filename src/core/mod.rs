//! Core application module
//!
//! This module contains:
//! - The interactive shell driving a session from stdin

pub mod app;
