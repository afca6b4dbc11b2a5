//! Drawing tools and the interaction mode

use serde::{Deserialize, Serialize};
use std::fmt;

/// Shape type produced by new-shape gestures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DrawingTool {
    #[default]
    Rectangle,
    Polygon,
}

impl DrawingTool {
    pub fn name(self) -> &'static str {
        match self {
            DrawingTool::Rectangle => "rectangle",
            DrawingTool::Polygon => "polygon",
        }
    }
}

impl fmt::Display for DrawingTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Mutually exclusive interaction mode
///
/// `Move` keeps the tool that was active when it was entered so that leaving
/// move mode resumes drawing with it. `drawing_enabled` and `drawing_tool` are
/// projections of this value and are never stored separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ToolMode {
    #[default]
    RectangleDraw,
    PolygonDraw,
    Move { resume: DrawingTool },
}

impl ToolMode {
    /// Drawing mode for the given tool
    pub fn drawing(tool: DrawingTool) -> Self {
        match tool {
            DrawingTool::Rectangle => ToolMode::RectangleDraw,
            DrawingTool::Polygon => ToolMode::PolygonDraw,
        }
    }

    pub fn drawing_enabled(self) -> bool {
        !self.is_move()
    }

    /// Tool in effect, or retained while in move mode
    pub fn drawing_tool(self) -> DrawingTool {
        match self {
            ToolMode::RectangleDraw => DrawingTool::Rectangle,
            ToolMode::PolygonDraw => DrawingTool::Polygon,
            ToolMode::Move { resume } => resume,
        }
    }

    pub fn is_move(self) -> bool {
        matches!(self, ToolMode::Move { .. })
    }

    /// Whether the toolbar button for `tool` should render as active
    pub fn highlights(self, tool: DrawingTool) -> bool {
        !self.is_move() && self.drawing_tool() == tool
    }
}

impl fmt::Display for ToolMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolMode::RectangleDraw => f.write_str("rectangle"),
            ToolMode::PolygonDraw => f.write_str("polygon"),
            ToolMode::Move { resume } => write!(f, "move (resume {resume})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn projections_follow_the_variant() {
        assert!(ToolMode::RectangleDraw.drawing_enabled());
        assert_eq!(ToolMode::PolygonDraw.drawing_tool(), DrawingTool::Polygon);

        let moving = ToolMode::Move {
            resume: DrawingTool::Polygon,
        };
        assert!(!moving.drawing_enabled());
        assert_eq!(moving.drawing_tool(), DrawingTool::Polygon);
        assert!(!moving.highlights(DrawingTool::Polygon));
    }

    #[test]
    fn default_mode_is_rectangle_draw() {
        assert_eq!(ToolMode::default(), ToolMode::RectangleDraw);
        assert!(ToolMode::default().highlights(DrawingTool::Rectangle));
    }
}
