//! Rendering backends
//!
//! Only a headless backend ships: it implements the viewer and overlay
//! engine seams without a display, reports the same events a native backend
//! would, and exposes probes for driving gestures from the shell and tests.

pub mod headless;
