//! Ownership of the session's annotation overlay

use crate::config::AnnotationStyle;
use crate::domain::{AnnotatorHandle, DrawingTool, ViewerHandle};
use crate::error::SessionError;
use crate::events::{EventChannel, SubscriptionId};
use crate::viewer::ViewerLifecycleManager;

use super::{AnnotationEvent, OverlayEngine, OverlayInstance};

struct LiveOverlay {
    handle: AnnotatorHandle,
    instance: Box<dyn OverlayInstance>,
    events: EventChannel<AnnotationEvent>,
}

pub struct AnnotationSessionController {
    engine: Box<dyn OverlayEngine>,
    live: Option<LiveOverlay>,
    next_id: u64,
}

impl AnnotationSessionController {
    pub fn new(engine: Box<dyn OverlayEngine>) -> Self {
        Self {
            engine,
            live: None,
            next_id: 0,
        }
    }

    /// Attach an overlay to a live viewer
    ///
    /// The overlay starts with drawing enabled and the rectangle tool. The
    /// viewer is pinned until [`destroy`](Self::destroy) releases it.
    pub fn create(
        &mut self,
        viewers: &mut ViewerLifecycleManager,
        viewer: ViewerHandle,
        style: &AnnotationStyle,
    ) -> Result<AnnotatorHandle, SessionError> {
        if let Some(live) = &self.live {
            log::debug!("Annotator {} already live, skipping create", live.handle);
            return Ok(live.handle);
        }
        style
            .validate()
            .map_err(|err| SessionError::ViewerInit(format!("{err:#}")))?;
        let Some(instance) = viewers.instance_mut(viewer) else {
            return Err(SessionError::ViewerNotLive(viewer.to_string()));
        };

        let (tx, events) = EventChannel::new();
        let mut instance = self
            .engine
            .attach(instance, style, tx)
            .map_err(|err| SessionError::ViewerInit(format!("{err:#}")))?;
        instance.set_drawing_enabled(true);
        instance.set_drawing_tool(DrawingTool::Rectangle);

        viewers.retain(viewer);
        self.next_id += 1;
        let handle = AnnotatorHandle::new(self.next_id, viewer);
        log::info!("Annotator {} attached", handle);
        self.live = Some(LiveOverlay {
            handle,
            instance,
            events,
        });
        Ok(handle)
    }

    pub fn live_handle(&self) -> Option<AnnotatorHandle> {
        self.live.as_ref().map(|live| live.handle)
    }

    pub fn is_live(&self) -> bool {
        self.live.is_some()
    }

    pub fn set_drawing_tool(&mut self, tool: DrawingTool) -> Result<(), SessionError> {
        self.instance_mut()?.set_drawing_tool(tool);
        Ok(())
    }

    /// Last tool selected, whether or not drawing is enabled
    pub fn drawing_tool(&self) -> Result<DrawingTool, SessionError> {
        Ok(self.instance()?.drawing_tool())
    }

    pub fn set_drawing_enabled(&mut self, enabled: bool) -> Result<(), SessionError> {
        self.instance_mut()?.set_drawing_enabled(enabled);
        Ok(())
    }

    pub fn drawing_enabled(&self) -> Result<bool, SessionError> {
        Ok(self.instance()?.drawing_enabled())
    }

    /// Register a handler for annotation events of the live overlay
    pub fn on<F>(&mut self, handler: F) -> Result<SubscriptionId, SessionError>
    where
        F: FnMut(&AnnotationEvent) + 'static,
    {
        let live = self
            .live
            .as_mut()
            .ok_or(SessionError::ControllerNotAvailable)?;
        Ok(live.events.bus_mut().subscribe(handler))
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.live
            .as_mut()
            .is_some_and(|live| live.events.bus_mut().unsubscribe(id))
    }

    pub fn pump_events(&mut self) -> usize {
        self.live.as_mut().map_or(0, |live| live.events.pump())
    }

    /// Destroy the overlay and unpin its viewer
    ///
    /// Unknown or already destroyed handles are a no-op returning false.
    pub fn destroy(
        &mut self,
        handle: AnnotatorHandle,
        viewers: &mut ViewerLifecycleManager,
    ) -> bool {
        if self.live_handle() != Some(handle) {
            log::debug!("Annotator {} already destroyed", handle);
            return false;
        }
        if let Some(mut live) = self.live.take() {
            live.events.close();
            live.instance.destroy();
            viewers.release(handle.viewer());
            log::info!("Annotator {} destroyed", handle);
        }
        true
    }

    fn instance(&self) -> Result<&dyn OverlayInstance, SessionError> {
        self.live
            .as_ref()
            .map(|live| live.instance.as_ref())
            .ok_or(SessionError::ControllerNotAvailable)
    }

    fn instance_mut(&mut self) -> Result<&mut Box<dyn OverlayInstance>, SessionError> {
        self.live
            .as_mut()
            .map(|live| &mut live.instance)
            .ok_or(SessionError::ControllerNotAvailable)
    }
}

impl Drop for AnnotationSessionController {
    fn drop(&mut self) {
        if let Some(mut live) = self.live.take() {
            log::warn!("Annotator {} dropped while live, destroying", live.handle);
            live.events.close();
            live.instance.destroy();
        }
    }
}
