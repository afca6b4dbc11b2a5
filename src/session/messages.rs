//! Commands accepted from the UI

use std::str::FromStr;

use crate::domain::DrawingTool;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    SelectRectangle,
    SelectPolygon,
    ToggleMoveMode,
    /// Re-run tile loading after a failure
    RetryLoad,
}

impl Command {
    /// Drawing tool this command selects, if any
    pub fn tool(self) -> Option<DrawingTool> {
        match self {
            Command::SelectRectangle => Some(DrawingTool::Rectangle),
            Command::SelectPolygon => Some(DrawingTool::Polygon),
            Command::ToggleMoveMode | Command::RetryLoad => None,
        }
    }
}

impl FromStr for Command {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rect" | "rectangle" => Ok(Command::SelectRectangle),
            "poly" | "polygon" => Ok(Command::SelectPolygon),
            "move" => Ok(Command::ToggleMoveMode),
            "retry" => Ok(Command::RetryLoad),
            other => Err(format!("unknown command '{other}'")),
        }
    }
}
