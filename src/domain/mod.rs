//! Pure domain types with minimal dependencies
//!
//! This module contains core types used throughout the application.
//! Types here know nothing about engines, sessions or the async runtime.

pub mod annotation;
pub mod geometry;
pub mod handles;
pub mod mode;
pub mod tiles;

pub use annotation::*;
pub use geometry::*;
pub use handles::*;
pub use mode::*;
pub use tiles::*;
