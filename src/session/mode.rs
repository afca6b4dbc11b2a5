//! Tool mode state machine
//!
//! Drives the overlay between rectangle drawing, polygon drawing and move
//! (edit) mode. When a tool is selected from move mode, drawing is
//! re-enabled before the tool changes, so a new tool is never armed while
//! existing shapes are still editable.

use crate::annotations::AnnotationSessionController;
use crate::domain::{DrawingTool, ToolMode};
use crate::error::SessionError;

use super::state::SessionContext;

#[derive(Debug, Default)]
pub struct ToolModeController {
    mode: ToolMode,
}

impl ToolModeController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> ToolMode {
        self.mode
    }

    /// Back to the initial mode; used when a new overlay is attached or torn down
    pub fn reset(&mut self, context: &SessionContext) {
        self.mode = ToolMode::default();
        context.set_mode(self.mode);
    }

    /// Select a drawing tool
    pub fn select_tool(
        &mut self,
        tool: DrawingTool,
        overlay: &mut AnnotationSessionController,
        context: &SessionContext,
    ) -> Result<ToolMode, SessionError> {
        ensure_available(overlay)?;
        if self.mode.is_move() {
            overlay.set_drawing_enabled(true)?;
        }
        overlay.set_drawing_tool(tool)?;
        Ok(self.transition(ToolMode::drawing(tool), context))
    }

    /// Enter move mode, or leave it resuming the retained tool
    pub fn toggle_move(
        &mut self,
        overlay: &mut AnnotationSessionController,
        context: &SessionContext,
    ) -> Result<ToolMode, SessionError> {
        ensure_available(overlay)?;
        let next = match self.mode {
            ToolMode::Move { resume } => {
                overlay.set_drawing_enabled(true)?;
                ToolMode::drawing(resume)
            }
            drawing => {
                overlay.set_drawing_enabled(false)?;
                ToolMode::Move {
                    resume: drawing.drawing_tool(),
                }
            }
        };
        Ok(self.transition(next, context))
    }

    fn transition(&mut self, next: ToolMode, context: &SessionContext) -> ToolMode {
        if next != self.mode {
            log::debug!("Tool mode {} -> {}", self.mode, next);
        }
        self.mode = next;
        context.set_mode(next);
        next
    }
}

fn ensure_available(overlay: &AnnotationSessionController) -> Result<(), SessionError> {
    if overlay.is_live() {
        Ok(())
    } else {
        log::error!("Annotator not found, ignoring tool command");
        Err(SessionError::ControllerNotAvailable)
    }
}
