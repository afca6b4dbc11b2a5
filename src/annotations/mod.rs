//! Annotation overlay attached to a live viewer
//!
//! This module provides:
//! - The [`OverlayEngine`] / [`OverlayInstance`] seam to the overlay library
//! - [`AnnotationSessionController`], owner of the session's overlay
//! - Stock handlers for annotation events

pub mod controller;
pub mod handlers;

pub use controller::AnnotationSessionController;

use anyhow::Result;

use crate::config::AnnotationStyle;
use crate::domain::{Annotation, DrawingTool};
use crate::events::EventSender;
use crate::viewer::ViewerInstance;

/// Events an overlay reports upward
#[derive(Debug, Clone, PartialEq)]
pub enum AnnotationEvent {
    Created(Annotation),
    /// An existing shape was moved or resized in edit mode
    Updated(Annotation),
}

impl AnnotationEvent {
    pub fn annotation(&self) -> &Annotation {
        match self {
            AnnotationEvent::Created(a) | AnnotationEvent::Updated(a) => a,
        }
    }
}

/// Factory attaching overlays to viewer instances
pub trait OverlayEngine {
    fn attach(
        &mut self,
        viewer: &mut dyn ViewerInstance,
        style: &AnnotationStyle,
        events: EventSender<AnnotationEvent>,
    ) -> Result<Box<dyn OverlayInstance>>;
}

/// A live overlay
///
/// With drawing enabled, gestures create shapes of the current tool. With
/// drawing disabled, gestures select and edit existing shapes instead.
pub trait OverlayInstance {
    fn set_drawing_tool(&mut self, tool: DrawingTool);
    fn drawing_tool(&self) -> DrawingTool;
    fn set_drawing_enabled(&mut self, enabled: bool);
    fn drawing_enabled(&self) -> bool;

    /// Release overlay resources; must tolerate repeated calls
    fn destroy(&mut self);
}
