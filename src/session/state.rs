use std::cell::RefCell;
use std::rc::Rc;

use crate::domain::{AnnotatorHandle, ToolMode, ViewerHandle};

/// Session-level fields every UI surface renders from
///
/// Fields are only reachable through [`SessionContext`] setters so that every
/// write goes through one place.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionState {
    viewer: Option<ViewerHandle>,
    annotator: Option<AnnotatorHandle>,
    loading: bool,
    error: Option<String>,
    mode: ToolMode,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            viewer: None,
            annotator: None,
            loading: true,
            error: None,
            mode: ToolMode::default(),
        }
    }
}

impl SessionState {
    pub fn viewer(&self) -> Option<ViewerHandle> {
        self.viewer
    }

    pub fn annotator(&self) -> Option<AnnotatorHandle> {
        self.annotator
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn mode(&self) -> ToolMode {
        self.mode
    }
}

/// Shared handle to the session state, injected into each component
///
/// Cloning shares the same state. Single-threaded by construction.
#[derive(Clone, Debug, Default)]
pub struct SessionContext {
    state: Rc<RefCell<SessionState>>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current state for rendering
    pub fn snapshot(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn error(&self) -> Option<String> {
        self.state.borrow().error.clone()
    }

    pub fn mode(&self) -> ToolMode {
        self.state.borrow().mode
    }

    pub fn set_viewer(&self, viewer: Option<ViewerHandle>) {
        self.state.borrow_mut().viewer = viewer;
    }

    pub fn set_annotator(&self, annotator: Option<AnnotatorHandle>) {
        self.state.borrow_mut().annotator = annotator;
    }

    pub fn set_loading(&self, loading: bool) {
        self.state.borrow_mut().loading = loading;
    }

    pub fn set_error(&self, error: Option<String>) {
        self.state.borrow_mut().error = error;
    }

    pub fn set_mode(&self, mode: ToolMode) {
        self.state.borrow_mut().mode = mode;
    }

    /// Null both handles and return to the initial loading state
    ///
    /// The caller must have destroyed the instances behind the handles.
    pub fn cleanup(&self) {
        let mut state = self.state.borrow_mut();
        state.viewer = None;
        state.annotator = None;
        state.loading = true;
        state.error = None;
        state.mode = ToolMode::default();
    }
}
