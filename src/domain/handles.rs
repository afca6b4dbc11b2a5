//! Ownership-tracked handles for live viewer and overlay instances
//!
//! A handle is a token naming one live instance. The instance itself is owned
//! by its lifecycle manager; holding a handle grants no access to it. A handle
//! whose instance has been destroyed stays a valid value but every manager
//! operation on it becomes a no-op.

use std::fmt;

/// Render target a viewer is bound to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountPoint {
    id: u64,
    name: String,
}

impl MountPoint {
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewerHandle {
    id: u64,
    mount: u64,
}

impl ViewerHandle {
    pub(crate) fn new(id: u64, mount: &MountPoint) -> Self {
        Self {
            id,
            mount: mount.id(),
        }
    }
}

impl fmt::Display for ViewerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "viewer-{}@mount-{}", self.id, self.mount)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AnnotatorHandle {
    id: u64,
    viewer: ViewerHandle,
}

impl AnnotatorHandle {
    pub(crate) fn new(id: u64, viewer: ViewerHandle) -> Self {
        Self { id, viewer }
    }

    /// The viewer this overlay is attached to
    pub fn viewer(&self) -> ViewerHandle {
        self.viewer
    }
}

impl fmt::Display for AnnotatorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "annotator-{}->{}", self.id, self.viewer)
    }
}
