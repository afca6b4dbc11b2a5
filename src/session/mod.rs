//! Annotation session management
//!
//! This module contains:
//! - Shared session state and the context handle components write through
//! - Commands accepted from the toolbar
//! - The tool mode state machine
//! - [`lifecycle::Session`], which owns the viewer and overlay lifecycle

pub mod lifecycle;
pub mod messages;
pub mod mode;
pub mod state;

pub use lifecycle::Session;
pub use messages::Command;
pub use state::{SessionContext, SessionState};
