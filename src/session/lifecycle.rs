//! Session orchestration
//!
//! [`Session`] wires the tile query, the viewer, the overlay and the tool mode
//! machine together and owns their lifecycle:
//!
//! 1. `mount` issues the tile request
//! 2. `on_tiles_resolved` creates the viewer, then attaches the overlay
//! 3. `dispatch` routes toolbar commands
//! 4. `teardown` destroys the overlay, then the viewer, then resets state
//!
//! Outcomes of loads issued before a teardown are ignored, so nothing is ever
//! created against a stale mount point.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use crate::annotations::handlers::log_annotation_event;
use crate::annotations::{AnnotationEvent, AnnotationSessionController, OverlayEngine};
use crate::config::{AnnotationStyle, AppConfig, ViewerConfig};
use crate::domain::{MountPoint, TileSourceSet, ViewerHandle};
use crate::error::SessionError;
use crate::events::SubscriptionId;
use crate::tiles::{QueryStatus, TileOutcome, TileQuery, TileRequest};
use crate::viewer::{CreateOutcome, ViewerEngine, ViewerEvent, ViewerLifecycleManager};

use super::messages::Command;
use super::mode::ToolModeController;
use super::state::SessionContext;

type AnnotationListener = Rc<RefCell<dyn FnMut(&AnnotationEvent)>>;

pub struct Session {
    context: SessionContext,
    query: TileQuery,
    overlays: AnnotationSessionController,
    viewers: ViewerLifecycleManager,
    modes: ToolModeController,
    viewer_config: ViewerConfig,
    style: AnnotationStyle,
    mount: Option<MountPoint>,
    listeners: Vec<AnnotationListener>,
    viewer_subscription: Option<(ViewerHandle, SubscriptionId)>,
    annotation_subscriptions: Vec<SubscriptionId>,
}

impl Session {
    pub fn new(
        context: SessionContext,
        viewer_engine: Box<dyn ViewerEngine>,
        overlay_engine: Box<dyn OverlayEngine>,
        config: &AppConfig,
    ) -> Self {
        Self {
            context,
            query: TileQuery::new(config.tiles.image_url.clone(), config.tiles.options()),
            overlays: AnnotationSessionController::new(overlay_engine),
            viewers: ViewerLifecycleManager::new(viewer_engine),
            modes: ToolModeController::new(),
            viewer_config: config.viewer,
            style: config.annotation_style.clone(),
            mount: None,
            listeners: Vec::new(),
            viewer_subscription: None,
            annotation_subscriptions: Vec::new(),
        }
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    pub fn tiles(&self) -> &TileQuery {
        &self.query
    }

    pub fn viewers(&self) -> &ViewerLifecycleManager {
        &self.viewers
    }

    pub fn overlays(&self) -> &AnnotationSessionController {
        &self.overlays
    }

    /// Bind the session to a render target and start loading tiles
    ///
    /// Mounting the same target again is a no-op; mounting a different one
    /// tears the current session down first.
    pub fn mount(&mut self, mount: MountPoint) -> Option<TileRequest> {
        if self.mount.as_ref() == Some(&mount) {
            log::debug!("Mount '{}' already attached", mount.name());
            return None;
        }
        if self.mount.is_some() {
            self.teardown();
        }
        log::info!("Mounting session on '{}'", mount.name());
        self.mount = Some(mount);
        self.query.start()
    }

    /// Apply the result of a tile request
    pub fn on_tiles_resolved(&mut self, outcome: TileOutcome) {
        if !self.query.resolve(outcome) {
            return;
        }
        match self.query.status().clone() {
            QueryStatus::Success(tiles) => self.initialize(tiles),
            QueryStatus::Error(message) => {
                self.context.set_error(Some(message));
                self.context.set_loading(false);
            }
            QueryStatus::Pending => {}
        }
    }

    fn initialize(&mut self, tiles: Arc<TileSourceSet>) {
        let Some(mount) = self.mount.clone() else {
            log::warn!("Tiles resolved without a mount point, skipping viewer creation");
            return;
        };

        let viewer = match self.viewers.create(&mount, tiles, &self.viewer_config) {
            Ok(CreateOutcome::Created(handle)) => handle,
            Ok(outcome @ CreateOutcome::AlreadyLive(_)) => {
                log::debug!("Keeping live viewer {}", outcome.handle());
                return;
            }
            Err(err) => {
                self.fail(err);
                return;
            }
        };
        self.subscribe_viewer_events(viewer);
        self.context.set_viewer(Some(viewer));

        match self.overlays.create(&mut self.viewers, viewer, &self.style) {
            Ok(handle) => {
                self.subscribe_annotation_events();
                self.modes.reset(&self.context);
                self.context.set_annotator(Some(handle));
            }
            Err(err) => {
                self.unsubscribe_all();
                if let Err(destroy_err) = self.viewers.destroy(viewer) {
                    log::error!("Failed to release viewer {}: {}", viewer, destroy_err);
                }
                self.context.set_viewer(None);
                self.fail(err);
            }
        }
    }

    fn fail(&mut self, err: SessionError) {
        if err.is_fatal() {
            log::error!("Error initializing viewer: {}", err);
        } else {
            log::warn!("Viewer initialization problem: {}", err);
        }
        self.context.set_error(Some(err.user_message()));
        self.context.set_loading(false);
    }

    fn subscribe_viewer_events(&mut self, viewer: ViewerHandle) {
        let context = self.context.clone();
        let subscription = self.viewers.subscribe(viewer, move |event| match event {
            ViewerEvent::Opened => {
                log::info!("Viewer opened successfully");
                context.set_loading(false);
            }
            ViewerEvent::TileLoaded(tile) => {
                log::debug!(
                    "Tile loaded: level {} ({}, {})",
                    tile.level,
                    tile.column,
                    tile.row
                );
            }
            ViewerEvent::TileLoadFailed(reason) => {
                let err = SessionError::TileLoadFailedPartial(reason.clone());
                log::error!("{}", err);
                context.set_error(Some(err.user_message()));
            }
        });
        self.viewer_subscription = subscription.map(|id| (viewer, id));
    }

    fn subscribe_annotation_events(&mut self) {
        match self.overlays.on(log_annotation_event) {
            Ok(id) => self.annotation_subscriptions.push(id),
            Err(err) => log::error!("Failed to subscribe annotation logger: {}", err),
        }
        for listener in self.listeners.clone() {
            self.forward_annotations(listener);
        }
    }

    fn forward_annotations(&mut self, listener: AnnotationListener) {
        match self
            .overlays
            .on(move |event| (&mut *listener.borrow_mut())(event))
        {
            Ok(id) => self.annotation_subscriptions.push(id),
            Err(err) => log::error!("Failed to subscribe annotation listener: {}", err),
        }
    }

    fn unsubscribe_all(&mut self) {
        for id in std::mem::take(&mut self.annotation_subscriptions) {
            if !self.overlays.unsubscribe(id) {
                log::debug!("Annotation subscription {:?} already gone", id);
            }
        }
        if let Some((viewer, id)) = self.viewer_subscription.take()
            && !self.viewers.unsubscribe(viewer, id)
        {
            log::debug!("Viewer subscription {:?} on {} already gone", id, viewer);
        }
    }

    /// Register a handler for annotation events
    ///
    /// Stays registered across overlays: it is attached to the live overlay
    /// now, and to every overlay created later in this session.
    pub fn on_annotation<F>(&mut self, handler: F)
    where
        F: FnMut(&AnnotationEvent) + 'static,
    {
        let listener: AnnotationListener = Rc::new(RefCell::new(handler));
        if self.overlays.is_live() {
            self.forward_annotations(listener.clone());
        }
        self.listeners.push(listener);
    }

    /// Handle a toolbar command
    ///
    /// Failures are logged here; the returned error only tells the caller the
    /// command had no effect. `RetryLoad` yields the request to run.
    pub fn dispatch(&mut self, command: Command) -> Result<Option<TileRequest>, SessionError> {
        match command {
            Command::SelectRectangle | Command::SelectPolygon => {
                let tool = command.tool().unwrap_or_default();
                self.modes
                    .select_tool(tool, &mut self.overlays, &self.context)?;
                Ok(None)
            }
            Command::ToggleMoveMode => {
                self.modes.toggle_move(&mut self.overlays, &self.context)?;
                Ok(None)
            }
            Command::RetryLoad => self.retry_load(),
        }
    }

    fn retry_load(&mut self) -> Result<Option<TileRequest>, SessionError> {
        if self.mount.is_none() {
            log::error!("Retry requested with no mount point");
            return Err(SessionError::MountUnavailable);
        }
        if !self.can_retry() {
            log::debug!("Retry ignored, nothing failed");
            return Ok(None);
        }
        let request = self.query.refetch();
        if request.is_some() {
            self.context.set_error(None);
            self.context.set_loading(true);
        }
        Ok(request)
    }

    /// A failed load, or tiles that loaded but never got a viewer
    fn can_retry(&self) -> bool {
        let status = self.query.status();
        status.is_error()
            || (status.data().is_some()
                && self.viewers.live_handle().is_none()
                && self.context.error().is_some())
    }

    /// Deliver queued viewer and overlay events; call once per UI tick
    pub fn pump(&mut self) -> usize {
        self.viewers.pump_events() + self.overlays.pump_events()
    }

    /// End the session: overlay first, then viewer, then state
    pub fn teardown(&mut self) {
        self.query.cancel();
        self.unsubscribe_all();
        if let Some(annotator) = self.overlays.live_handle() {
            self.overlays.destroy(annotator, &mut self.viewers);
        }
        if let Some(viewer) = self.viewers.live_handle()
            && let Err(err) = self.viewers.destroy(viewer)
        {
            log::error!("Failed to destroy viewer {}: {}", viewer, err);
        }
        if let Some(mount) = self.mount.take() {
            log::info!("Session on '{}' torn down", mount.name());
        }
        self.context.cleanup();
        self.modes.reset(&self.context);
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotations::handlers::AnnotationLog;
    use crate::domain::{DrawingTool, Point, TileSourceOptions, ToolMode};
    use crate::render::headless::{
        HeadlessOverlayEngine, HeadlessViewerEngine, OverlayProbe, ViewerProbe,
    };
    use crate::test_support::{ScriptedTileProvider, sample_tiles};
    use crate::tiles::{RetryPolicy, TileSourceLoader};
    use std::time::Duration;

    struct Harness {
        session: Session,
        viewer: ViewerProbe,
        overlay: OverlayProbe,
    }

    fn harness() -> Harness {
        let viewer_engine = HeadlessViewerEngine::new();
        let overlay_engine = HeadlessOverlayEngine::new();
        let viewer = viewer_engine.probe();
        let overlay = overlay_engine.probe();
        let session = Session::new(
            SessionContext::new(),
            Box::new(viewer_engine),
            Box::new(overlay_engine),
            &AppConfig::default(),
        );
        Harness {
            session,
            viewer,
            overlay,
        }
    }

    fn mount() -> MountPoint {
        MountPoint::new(1, "viewer")
    }

    fn success(request: &TileRequest) -> TileOutcome {
        TileOutcome {
            generation: request.generation,
            attempts: 1,
            result: Ok(Arc::new(sample_tiles())),
        }
    }

    fn opened() -> Harness {
        let mut h = harness();
        let request = h.session.mount(mount()).unwrap();
        h.session.on_tiles_resolved(success(&request));
        h.session.pump();
        h
    }

    #[tokio::test]
    async fn load_failing_twice_surfaces_error_without_viewer() {
        let mut h = harness();
        let provider = Rc::new(ScriptedTileProvider::new(vec![
            Err("HTTP 404".into()),
            Err("HTTP 404".into()),
        ]));
        let loader = TileSourceLoader::new(
            provider.clone(),
            RetryPolicy {
                retries: 1,
                delay: Duration::ZERO,
            },
        );

        let request = h.session.mount(mount()).unwrap();
        let outcome = loader.run(request).await;
        h.session.on_tiles_resolved(outcome);

        let state = h.session.context().snapshot();
        assert_eq!(state.error(), Some("HTTP 404"));
        assert!(!state.is_loading());
        assert!(state.viewer().is_none());
        assert_eq!(h.viewer.created(), 0);
        assert_eq!(provider.calls(), 2);
    }

    #[test]
    fn successful_load_opens_viewer_and_clears_loading() {
        let mut h = harness();
        let request = h.session.mount(mount()).unwrap();
        assert_eq!(request.options, TileSourceOptions { log_latency: true });
        h.session.on_tiles_resolved(success(&request));
        assert!(h.session.context().snapshot().is_loading());

        assert!(h.session.pump() > 0);
        let state = h.session.context().snapshot();
        assert!(!state.is_loading());
        assert!(state.error().is_none());
        assert!(state.viewer().is_some());
        assert_eq!(h.viewer.last_config(), Some(ViewerConfig::default()));
    }

    #[test]
    fn annotator_is_attached_to_the_live_viewer() {
        let h = opened();
        let state = h.session.context().snapshot();
        let annotator = state.annotator().unwrap();
        assert_eq!(Some(annotator.viewer()), state.viewer());
        assert!(h.session.viewers().is_live(annotator.viewer()));
        assert_eq!(state.mode(), ToolMode::RectangleDraw);
    }

    #[test]
    fn select_polygon_from_initial_state() {
        let mut h = opened();
        h.session.dispatch(Command::SelectPolygon).unwrap();
        assert_eq!(h.session.context().mode(), ToolMode::PolygonDraw);
        assert_eq!(
            h.session.overlays().drawing_tool(),
            Ok(DrawingTool::Polygon)
        );
        assert_eq!(h.session.overlays().drawing_enabled(), Ok(true));
    }

    #[test]
    fn move_then_polygon_enables_drawing() {
        let mut h = opened();
        h.session.dispatch(Command::ToggleMoveMode).unwrap();
        assert!(h.session.context().mode().is_move());
        assert_eq!(h.session.overlays().drawing_enabled(), Ok(false));

        h.session.dispatch(Command::SelectPolygon).unwrap();
        assert_eq!(h.session.context().mode(), ToolMode::PolygonDraw);
        assert_eq!(h.session.overlays().drawing_enabled(), Ok(true));
    }

    #[test]
    fn partial_tile_failure_keeps_viewer_live() {
        let mut h = opened();
        let viewer = h.session.context().snapshot().viewer().unwrap();
        assert!(
            h.viewer
                .emit(ViewerEvent::TileLoadFailed("tile 3/0/1 timed out".into()))
        );
        h.session.pump();

        assert_eq!(
            h.session.context().error().as_deref(),
            Some("Failed to load image tiles")
        );
        assert!(h.session.viewers().is_live(viewer));
        assert_eq!(h.viewer.destroyed(), 0);
    }

    #[test]
    fn viewer_init_failure_is_fatal_and_skips_annotator() {
        let mut h = harness();
        h.viewer.fail_next_create("no WebGL context");
        let request = h.session.mount(mount()).unwrap();
        h.session.on_tiles_resolved(success(&request));

        let state = h.session.context().snapshot();
        assert_eq!(state.error(), Some("Failed to initialize viewer"));
        assert!(!state.is_loading());
        assert!(state.annotator().is_none());
        assert_eq!(h.overlay.attached(), 0);
    }

    #[test]
    fn overlay_failure_releases_the_viewer() {
        let mut h = harness();
        h.overlay.fail_next_attach("overlay script missing");
        let request = h.session.mount(mount()).unwrap();
        h.session.on_tiles_resolved(success(&request));

        let state = h.session.context().snapshot();
        assert!(state.viewer().is_none());
        assert!(state.annotator().is_none());
        assert_eq!(h.viewer.created(), 1);
        assert_eq!(h.viewer.destroyed(), 1);
    }

    #[test]
    fn resolution_after_teardown_is_ignored() {
        let mut h = harness();
        let request = h.session.mount(mount()).unwrap();
        h.session.teardown();

        h.session.on_tiles_resolved(success(&request));
        assert_eq!(h.viewer.created(), 0);
        assert!(h.session.context().snapshot().viewer().is_none());
    }

    #[test]
    fn duplicate_resolution_never_creates_second_viewer() {
        let mut h = harness();
        let request = h.session.mount(mount()).unwrap();
        h.session.on_tiles_resolved(success(&request));
        h.session.on_tiles_resolved(success(&request));
        assert!(h.session.mount(mount()).is_none());

        assert_eq!(h.viewer.created(), 1);
        assert_eq!(h.viewer.live(), 1);
    }

    #[test]
    fn teardown_releases_overlay_before_viewer_and_resets_state() {
        let mut h = opened();
        h.session.dispatch(Command::ToggleMoveMode).unwrap();

        h.session.teardown();
        // The viewer refuses to go while an overlay is attached, so both being
        // destroyed means the overlay went first.
        assert_eq!(h.overlay.destroyed(), 1);
        assert_eq!(h.viewer.destroyed(), 1);
        assert_eq!(
            h.session.context().snapshot(),
            crate::session::state::SessionState::default()
        );

        h.session.teardown();
        assert_eq!(h.viewer.destroyed(), 1);
    }

    #[test]
    fn commands_before_overlay_exists_are_reported() {
        let mut h = harness();
        assert_eq!(
            h.session.dispatch(Command::SelectPolygon),
            Err(SessionError::ControllerNotAvailable)
        );
        assert_eq!(h.session.context().mode(), ToolMode::RectangleDraw);
    }

    #[test]
    fn retry_after_error_reenters_loading() {
        let mut h = harness();
        let request = h.session.mount(mount()).unwrap();
        h.session.on_tiles_resolved(TileOutcome {
            generation: request.generation,
            attempts: 2,
            result: Err(SessionError::TileLoad("network down".into())),
        });
        assert!(!h.session.context().snapshot().is_loading());

        let retry = h.session.dispatch(Command::RetryLoad).unwrap().unwrap();
        assert!(h.session.context().snapshot().is_loading());
        assert!(h.session.context().error().is_none());
        assert!(h.session.tiles().status().is_pending());

        h.session.on_tiles_resolved(success(&retry));
        h.session.pump();
        assert!(h.session.context().snapshot().viewer().is_some());
        assert!(!h.session.context().snapshot().is_loading());
    }

    #[test]
    fn retry_after_viewer_init_failure_creates_viewer() {
        let mut h = harness();
        h.viewer.fail_next_create("no WebGL context");
        let request = h.session.mount(mount()).unwrap();
        h.session.on_tiles_resolved(success(&request));
        assert_eq!(
            h.session.context().error().as_deref(),
            Some("Failed to initialize viewer")
        );

        let retry = h.session.dispatch(Command::RetryLoad).unwrap().unwrap();
        assert!(h.session.context().snapshot().is_loading());
        assert!(h.session.context().error().is_none());

        h.session.on_tiles_resolved(success(&retry));
        h.session.pump();
        let state = h.session.context().snapshot();
        assert!(state.viewer().is_some());
        assert!(state.annotator().is_some());
        assert!(state.error().is_none());
        assert_eq!(h.viewer.live(), 1);
    }

    #[test]
    fn retry_without_error_is_ignored() {
        let mut h = opened();
        assert_eq!(h.session.dispatch(Command::RetryLoad), Ok(None));
        assert_eq!(h.viewer.created(), 1);
    }

    #[test]
    fn listeners_follow_the_overlay_across_sessions() {
        let mut h = harness();
        let log = AnnotationLog::new();
        h.session.on_annotation(log.handler());

        let request = h.session.mount(mount()).unwrap();
        h.session.on_tiles_resolved(success(&request));
        h.overlay
            .draw(&[Point::new(1.0, 1.0), Point::new(9.0, 9.0)])
            .unwrap();
        h.session.pump();
        assert_eq!(log.len(), 1);

        h.session.teardown();
        let request = h.session.mount(MountPoint::new(2, "viewer")).unwrap();
        h.session.on_tiles_resolved(success(&request));
        h.overlay
            .draw(&[Point::new(20.0, 20.0), Point::new(30.0, 40.0)])
            .unwrap();
        h.session.pump();
        assert_eq!(log.len(), 2);
    }
}
