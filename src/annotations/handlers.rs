//! Stock annotation event handlers
//!
//! The session installs [`log_annotation_event`] on every new overlay.
//! [`AnnotationLog`] keeps the shapes reported so far for UI listings.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use super::AnnotationEvent;
use crate::domain::{Annotation, AnnotationId};

/// Log created and updated annotations as JSON
pub fn log_annotation_event(event: &AnnotationEvent) {
    let json = match serde_json::to_string(event.annotation()) {
        Ok(json) => json,
        Err(err) => {
            log::error!("Failed to serialize annotation: {}", err);
            return;
        }
    };
    match event {
        AnnotationEvent::Created(_) => log::info!("created {}", json),
        AnnotationEvent::Updated(_) => log::info!("updated {}", json),
    }
}

/// Shared record of the annotations seen on the current overlay
#[derive(Clone, Default)]
pub struct AnnotationLog {
    entries: Rc<RefCell<BTreeMap<AnnotationId, Annotation>>>,
}

impl AnnotationLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handler to pass to `AnnotationSessionController::on`
    pub fn handler(&self) -> impl FnMut(&AnnotationEvent) + 'static {
        let entries = self.entries.clone();
        move |event| {
            let annotation = event.annotation().clone();
            entries.borrow_mut().insert(annotation.id, annotation);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Snapshot in id order
    pub fn annotations(&self) -> Vec<Annotation> {
        self.entries.borrow().values().cloned().collect()
    }
}
