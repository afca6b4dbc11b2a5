//! Session error taxonomy
//!
//! Provider, config and I/O failures travel as `anyhow::Error` until they
//! reach the session, where they are classified into [`SessionError`].

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// Tile source resolution failed after the automatic retry
    #[error("failed to load tile sources: {0}")]
    TileLoad(String),
    /// A single tile failed after the viewer opened
    #[error("tile failed to load: {0}")]
    TileLoadFailedPartial(String),
    /// Viewer or overlay construction failed
    #[error("failed to initialize viewer: {0}")]
    ViewerInit(String),
    /// A mode or tool command was issued with no live annotator
    #[error("controller not available")]
    ControllerNotAvailable,
    #[error("viewer {0} is not live")]
    ViewerNotLive(String),
    #[error("viewer {0} still has an attached annotator")]
    ViewerInUse(String),
    #[error("tile source set is empty")]
    EmptyTileSources,
    #[error("no mount point is attached")]
    MountUnavailable,
}

impl SessionError {
    /// Message shown in the session's error slot
    pub fn user_message(&self) -> String {
        match self {
            SessionError::TileLoad(reason) => reason.clone(),
            SessionError::TileLoadFailedPartial(_) => "Failed to load image tiles".to_string(),
            SessionError::ViewerInit(_) | SessionError::EmptyTileSources => {
                "Failed to initialize viewer".to_string()
            }
            other => other.to_string(),
        }
    }

    /// Whether the session stays usable after this error
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SessionError::TileLoad(_) | SessionError::ViewerInit(_) | SessionError::EmptyTileSources
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_messages_match_the_error_class() {
        assert_eq!(
            SessionError::TileLoad("HTTP 404".into()).user_message(),
            "HTTP 404"
        );
        assert_eq!(
            SessionError::TileLoadFailedPartial("tile 0/1/2".into()).user_message(),
            "Failed to load image tiles"
        );
        assert_eq!(
            SessionError::ViewerInit("no gpu".into()).user_message(),
            "Failed to initialize viewer"
        );
        assert_eq!(
            SessionError::ControllerNotAvailable.user_message(),
            "controller not available"
        );
    }

    #[test]
    fn partial_tile_failures_are_not_fatal() {
        assert!(!SessionError::TileLoadFailedPartial("x".into()).is_fatal());
        assert!(!SessionError::ControllerNotAvailable.is_fatal());
        assert!(SessionError::ViewerInit("x".into()).is_fatal());
    }
}
