//! Viewer lifecycle management
//!
//! [`ViewerLifecycleManager`] owns the single deep-zoom viewer of a session.
//! The engine that actually renders tiles is an opaque [`ViewerEngine`];
//! this module only guards creation, routes the engine's events to
//! subscribers and tears the instance down.

use anyhow::Result;
use std::sync::Arc;

use crate::config::ViewerConfig;
use crate::domain::{MountPoint, TileAddress, TileSourceSet, ViewerHandle};
use crate::error::SessionError;
use crate::events::{EventChannel, EventSender, SubscriptionId};

/// Events a viewer reports upward
#[derive(Debug, Clone, PartialEq)]
pub enum ViewerEvent {
    /// Viewer is ready to display
    Opened,
    TileLoaded(TileAddress),
    /// One tile failed; the viewer stays usable
    TileLoadFailed(String),
}

/// Factory for native viewer instances
pub trait ViewerEngine {
    fn create(
        &mut self,
        mount: &MountPoint,
        tiles: Arc<TileSourceSet>,
        config: &ViewerConfig,
        events: EventSender<ViewerEvent>,
    ) -> Result<Box<dyn ViewerInstance>>;
}

/// A live native viewer
pub trait ViewerInstance {
    fn tile_sources(&self) -> &TileSourceSet;

    /// Release native resources; must tolerate repeated calls
    fn destroy(&mut self);
}

/// Result of a create request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created(ViewerHandle),
    /// A viewer was already live; nothing was created
    AlreadyLive(ViewerHandle),
}

impl CreateOutcome {
    pub fn handle(self) -> ViewerHandle {
        match self {
            CreateOutcome::Created(handle) | CreateOutcome::AlreadyLive(handle) => handle,
        }
    }
}

struct LiveViewer {
    handle: ViewerHandle,
    instance: Box<dyn ViewerInstance>,
    events: EventChannel<ViewerEvent>,
    dependents: usize,
}

pub struct ViewerLifecycleManager {
    engine: Box<dyn ViewerEngine>,
    live: Option<LiveViewer>,
    next_id: u64,
}

impl ViewerLifecycleManager {
    pub fn new(engine: Box<dyn ViewerEngine>) -> Self {
        Self {
            engine,
            live: None,
            next_id: 0,
        }
    }

    /// Create the session's viewer
    ///
    /// A second call while a viewer is live is a no-op returning the live
    /// handle, so a re-render never produces a second instance.
    pub fn create(
        &mut self,
        mount: &MountPoint,
        tiles: Arc<TileSourceSet>,
        config: &ViewerConfig,
    ) -> Result<CreateOutcome, SessionError> {
        if let Some(live) = &self.live {
            log::debug!("Viewer {} already live, skipping create", live.handle);
            return Ok(CreateOutcome::AlreadyLive(live.handle));
        }
        if tiles.is_empty() {
            return Err(SessionError::EmptyTileSources);
        }

        log::info!(
            "Initializing viewer on mount '{}' with {} tile levels",
            mount.name(),
            tiles.len()
        );
        let (tx, events) = EventChannel::new();
        let instance = self
            .engine
            .create(mount, tiles, config, tx)
            .map_err(|err| SessionError::ViewerInit(format!("{err:#}")))?;

        self.next_id += 1;
        let handle = ViewerHandle::new(self.next_id, mount);
        self.live = Some(LiveViewer {
            handle,
            instance,
            events,
            dependents: 0,
        });
        Ok(CreateOutcome::Created(handle))
    }

    pub fn live_handle(&self) -> Option<ViewerHandle> {
        self.live.as_ref().map(|live| live.handle)
    }

    pub fn is_live(&self, handle: ViewerHandle) -> bool {
        self.live_handle() == Some(handle)
    }

    pub fn tile_sources(&self, handle: ViewerHandle) -> Option<&TileSourceSet> {
        self.live_for(handle).map(|live| live.instance.tile_sources())
    }

    /// Register a handler for this viewer's events
    pub fn subscribe<F>(&mut self, handle: ViewerHandle, handler: F) -> Option<SubscriptionId>
    where
        F: FnMut(&ViewerEvent) + 'static,
    {
        let live = self.live_for_mut(handle)?;
        Some(live.events.bus_mut().subscribe(handler))
    }

    pub fn unsubscribe(&mut self, handle: ViewerHandle, id: SubscriptionId) -> bool {
        self.live_for_mut(handle)
            .is_some_and(|live| live.events.bus_mut().unsubscribe(id))
    }

    /// Deliver queued engine events to subscribers
    pub fn pump_events(&mut self) -> usize {
        self.live.as_mut().map_or(0, |live| live.events.pump())
    }

    /// Destroy the viewer behind `handle`
    ///
    /// Unknown or already destroyed handles are a no-op returning `Ok(false)`.
    /// Refuses while an overlay is still attached.
    pub fn destroy(&mut self, handle: ViewerHandle) -> Result<bool, SessionError> {
        let Some(live) = self.live_for(handle) else {
            log::debug!("Viewer {} already destroyed", handle);
            return Ok(false);
        };
        if live.dependents > 0 {
            log::error!(
                "Refusing to destroy viewer {} with {} attached annotator(s)",
                handle,
                live.dependents
            );
            return Err(SessionError::ViewerInUse(handle.to_string()));
        }

        if let Some(mut live) = self.live.take() {
            live.events.close();
            live.instance.destroy();
            log::info!("Viewer {} destroyed", handle);
        }
        Ok(true)
    }

    /// Borrow the live instance so an overlay can attach to it
    pub(crate) fn instance_mut(
        &mut self,
        handle: ViewerHandle,
    ) -> Option<&mut (dyn ViewerInstance + 'static)> {
        self.live_for_mut(handle).map(|live| live.instance.as_mut())
    }

    /// Record that an overlay now depends on this viewer
    pub(crate) fn retain(&mut self, handle: ViewerHandle) -> bool {
        match self.live_for_mut(handle) {
            Some(live) => {
                live.dependents += 1;
                true
            }
            None => false,
        }
    }

    pub(crate) fn release(&mut self, handle: ViewerHandle) {
        if let Some(live) = self.live_for_mut(handle) {
            live.dependents = live.dependents.saturating_sub(1);
        }
    }

    fn live_for(&self, handle: ViewerHandle) -> Option<&LiveViewer> {
        self.live.as_ref().filter(|live| live.handle == handle)
    }

    fn live_for_mut(&mut self, handle: ViewerHandle) -> Option<&mut LiveViewer> {
        self.live.as_mut().filter(|live| live.handle == handle)
    }
}

impl Drop for ViewerLifecycleManager {
    fn drop(&mut self) {
        if let Some(mut live) = self.live.take() {
            log::warn!("Viewer {} dropped while live, destroying", live.handle);
            live.events.close();
            live.instance.destroy();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::headless::HeadlessViewerEngine;
    use crate::test_support::sample_tiles;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn manager() -> (ViewerLifecycleManager, crate::render::headless::ViewerProbe) {
        let engine = HeadlessViewerEngine::new();
        let probe = engine.probe();
        (ViewerLifecycleManager::new(Box::new(engine)), probe)
    }

    fn mount() -> MountPoint {
        MountPoint::new(1, "viewer")
    }

    #[test]
    fn second_create_is_a_no_op() {
        let (mut viewers, probe) = manager();
        let tiles = Arc::new(sample_tiles());
        let first = viewers
            .create(&mount(), tiles.clone(), &ViewerConfig::default())
            .unwrap();
        let second = viewers
            .create(&mount(), tiles, &ViewerConfig::default())
            .unwrap();

        assert!(matches!(first, CreateOutcome::Created(_)));
        assert_eq!(second, CreateOutcome::AlreadyLive(first.handle()));
        assert_eq!(probe.created(), 1);
        assert_eq!(probe.live(), 1);
    }

    #[test]
    fn engine_failure_is_a_viewer_init_error() {
        let (mut viewers, probe) = manager();
        probe.fail_next_create("WebGL context lost");
        let err = viewers
            .create(&mount(), Arc::new(sample_tiles()), &ViewerConfig::default())
            .unwrap_err();
        assert!(matches!(err, SessionError::ViewerInit(msg) if msg.contains("WebGL")));
        assert!(viewers.live_handle().is_none());
    }

    #[test]
    fn destroy_is_idempotent() {
        let (mut viewers, probe) = manager();
        let handle = viewers
            .create(&mount(), Arc::new(sample_tiles()), &ViewerConfig::default())
            .unwrap()
            .handle();

        assert_eq!(viewers.destroy(handle), Ok(true));
        assert_eq!(viewers.destroy(handle), Ok(false));
        assert_eq!(probe.destroyed(), 1);
        assert!(!viewers.is_live(handle));
    }

    #[test]
    fn destroy_refused_while_overlay_attached() {
        let (mut viewers, probe) = manager();
        let handle = viewers
            .create(&mount(), Arc::new(sample_tiles()), &ViewerConfig::default())
            .unwrap()
            .handle();
        assert!(viewers.retain(handle));

        assert!(matches!(
            viewers.destroy(handle),
            Err(SessionError::ViewerInUse(_))
        ));
        assert_eq!(probe.live(), 1);

        viewers.release(handle);
        assert_eq!(viewers.destroy(handle), Ok(true));
    }

    #[test]
    fn unsubscribed_handler_stops_receiving() {
        let (mut viewers, probe) = manager();
        let handle = viewers
            .create(&mount(), Arc::new(sample_tiles()), &ViewerConfig::default())
            .unwrap()
            .handle();
        let hits = Rc::new(RefCell::new(0));
        let h = hits.clone();
        let id = viewers
            .subscribe(handle, move |_| *h.borrow_mut() += 1)
            .unwrap();
        viewers.pump_events();
        let before = *hits.borrow();

        assert!(viewers.unsubscribe(handle, id));
        assert!(!viewers.unsubscribe(handle, id));
        assert!(probe.emit(ViewerEvent::Opened));
        assert_eq!(viewers.pump_events(), 1);
        assert_eq!(*hits.borrow(), before);
        assert_eq!(viewers.tile_sources(handle), Some(&sample_tiles()));
    }

    #[test]
    fn events_reach_subscribers_until_destroyed() {
        let (mut viewers, probe) = manager();
        let handle = viewers
            .create(&mount(), Arc::new(sample_tiles()), &ViewerConfig::default())
            .unwrap()
            .handle();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = seen.clone();
        viewers
            .subscribe(handle, move |event| s.borrow_mut().push(event.clone()))
            .unwrap();

        assert!(viewers.pump_events() > 0);
        assert_eq!(seen.borrow().first(), Some(&ViewerEvent::Opened));

        viewers.destroy(handle).unwrap();
        assert!(!probe.emit(ViewerEvent::TileLoadFailed("late".into())));
        let count = seen.borrow().len();
        assert_eq!(viewers.pump_events(), 0);
        assert_eq!(seen.borrow().len(), count);
    }
}
