//! Headless viewer and overlay engines
//!
//! The engines keep their bookkeeping behind a shared probe so the caller can
//! observe instance counts and inject gestures after handing the engine's
//! ownership to a lifecycle manager.

use anyhow::{Result, bail};
use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;
use std::sync::Arc;

use crate::annotations::{AnnotationEvent, OverlayEngine, OverlayInstance};
use crate::config::{AnnotationStyle, ViewerConfig};
use crate::domain::{
    Annotation, AnnotationId, DrawingTool, MountPoint, Point, Rect, Shape, TileAddress,
    TileSourceSet,
};
use crate::events::EventSender;
use crate::viewer::{ViewerEngine, ViewerEvent, ViewerInstance};

fn send<E: std::fmt::Debug>(tx: &EventSender<E>, event: E) {
    if let Err(err) = tx.send(event) {
        log::debug!("Dropping {:?}, event receiver is gone", err.0);
    }
}

#[derive(Default)]
struct ViewerLog {
    created: usize,
    destroyed: usize,
    fail_next_create: Option<String>,
    failing_tiles: HashSet<TileAddress>,
    last_config: Option<ViewerConfig>,
    events: Option<EventSender<ViewerEvent>>,
}

/// Shared view into a [`HeadlessViewerEngine`]
#[derive(Clone, Default)]
pub struct ViewerProbe {
    log: Rc<RefCell<ViewerLog>>,
}

impl ViewerProbe {
    pub fn created(&self) -> usize {
        self.log.borrow().created
    }

    pub fn destroyed(&self) -> usize {
        self.log.borrow().destroyed
    }

    /// Instances created and not yet destroyed
    pub fn live(&self) -> usize {
        let log = self.log.borrow();
        log.created - log.destroyed
    }

    pub fn last_config(&self) -> Option<ViewerConfig> {
        self.log.borrow().last_config
    }

    /// Make the next `create` fail with `reason`
    pub fn fail_next_create(&self, reason: &str) {
        self.log.borrow_mut().fail_next_create = Some(reason.to_string());
    }

    /// Report this tile as failed when the next viewer opens
    pub fn fail_tile(&self, level: u32, column: u32, row: u32) {
        self.log
            .borrow_mut()
            .failing_tiles
            .insert(TileAddress { level, column, row });
    }

    /// Push an event from the live viewer; false once it is destroyed
    pub fn emit(&self, event: ViewerEvent) -> bool {
        self.log
            .borrow()
            .events
            .as_ref()
            .is_some_and(|tx| tx.send(event).is_ok())
    }
}

pub struct HeadlessViewerEngine {
    probe: ViewerProbe,
}

impl HeadlessViewerEngine {
    pub fn new() -> Self {
        Self {
            probe: ViewerProbe::default(),
        }
    }

    pub fn probe(&self) -> ViewerProbe {
        self.probe.clone()
    }
}

impl Default for HeadlessViewerEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ViewerEngine for HeadlessViewerEngine {
    fn create(
        &mut self,
        mount: &MountPoint,
        tiles: Arc<TileSourceSet>,
        config: &ViewerConfig,
        events: EventSender<ViewerEvent>,
    ) -> Result<Box<dyn ViewerInstance>> {
        let mut log = self.probe.log.borrow_mut();
        if let Some(reason) = log.fail_next_create.take() {
            bail!("{reason}");
        }
        let Some(coarsest) = tiles.coarsest() else {
            bail!("no tile levels to open");
        };

        log::debug!(
            "Headless viewer on '{}': {} levels, navigator {:?}",
            mount.name(),
            tiles.len(),
            config.navigator_position
        );
        send(&events, ViewerEvent::Opened);
        for tile in coarsest.tiles() {
            let event = if log.failing_tiles.contains(&tile) {
                ViewerEvent::TileLoadFailed(format!(
                    "tile {}/{}/{} failed to load",
                    tile.level, tile.column, tile.row
                ))
            } else {
                ViewerEvent::TileLoaded(tile)
            };
            send(&events, event);
        }

        log.created += 1;
        log.last_config = Some(*config);
        log.events = Some(events);
        Ok(Box::new(HeadlessViewer {
            tiles,
            probe: self.probe.clone(),
            destroyed: false,
        }))
    }
}

struct HeadlessViewer {
    tiles: Arc<TileSourceSet>,
    probe: ViewerProbe,
    destroyed: bool,
}

impl ViewerInstance for HeadlessViewer {
    fn tile_sources(&self) -> &TileSourceSet {
        &self.tiles
    }

    fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        let mut log = self.probe.log.borrow_mut();
        log.destroyed += 1;
        log.events = None;
    }
}

/// Calls made on the live overlay, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayCall {
    SetDrawingTool(DrawingTool),
    SetDrawingEnabled(bool),
}

#[derive(Default)]
struct OverlayLog {
    attached: usize,
    destroyed: usize,
    fail_next_attach: Option<String>,
    calls: Vec<OverlayCall>,
    tool: DrawingTool,
    drawing_enabled: bool,
    style: Option<AnnotationStyle>,
    annotations: Vec<Annotation>,
    next_id: u64,
    events: Option<EventSender<AnnotationEvent>>,
}

impl OverlayLog {
    fn is_live(&self) -> bool {
        self.events.is_some()
    }
}

/// Shared view into a [`HeadlessOverlayEngine`]
#[derive(Clone, Default)]
pub struct OverlayProbe {
    log: Rc<RefCell<OverlayLog>>,
}

impl OverlayProbe {
    pub fn attached(&self) -> usize {
        self.log.borrow().attached
    }

    pub fn destroyed(&self) -> usize {
        self.log.borrow().destroyed
    }

    /// Drain the call log
    pub fn take_calls(&self) -> Vec<OverlayCall> {
        std::mem::take(&mut self.log.borrow_mut().calls)
    }

    pub fn style(&self) -> Option<AnnotationStyle> {
        self.log.borrow().style.clone()
    }

    /// Shapes on the live overlay
    pub fn annotations(&self) -> Vec<Annotation> {
        self.log.borrow().annotations.clone()
    }

    pub fn fail_next_attach(&self, reason: &str) {
        self.log.borrow_mut().fail_next_attach = Some(reason.to_string());
    }

    /// Draw a shape with the current tool through `points`
    ///
    /// A rectangle spans the first and last point and must have an area; a
    /// polygon needs at least three points. Returns `None` when the gesture
    /// is rejected or drawing is disabled.
    pub fn draw(&self, points: &[Point]) -> Option<AnnotationId> {
        let mut log = self.log.borrow_mut();
        if !log.is_live() || !log.drawing_enabled {
            log::debug!("Draw gesture ignored, drawing is disabled");
            return None;
        }
        let shape = match log.tool {
            DrawingTool::Rectangle => {
                let (first, last) = (points.first()?, points.last()?);
                let rect = Rect::from_corners(*first, *last);
                if rect.is_empty() {
                    return None;
                }
                Shape::Rectangle(rect)
            }
            DrawingTool::Polygon if points.len() >= 3 => Shape::Polygon {
                points: points.to_vec(),
            },
            DrawingTool::Polygon => return None,
        };

        log.next_id += 1;
        let annotation = Annotation::new(AnnotationId(log.next_id), shape);
        let id = annotation.id;
        log.annotations.push(annotation.clone());
        if let Some(tx) = &log.events {
            send(tx, AnnotationEvent::Created(annotation));
        }
        Some(id)
    }

    /// Move an existing shape; only possible with drawing disabled
    pub fn drag(&self, id: AnnotationId, dx: f64, dy: f64) -> bool {
        let mut log = self.log.borrow_mut();
        if !log.is_live() || log.drawing_enabled {
            log::debug!("Drag gesture ignored, overlay is not in edit mode");
            return false;
        }
        let Some(index) = log.annotations.iter().position(|a| a.id == id) else {
            return false;
        };
        log.annotations[index].shape.translate(dx, dy);
        let updated = log.annotations[index].clone();
        if let Some(tx) = &log.events {
            send(tx, AnnotationEvent::Updated(updated));
        }
        true
    }
}

pub struct HeadlessOverlayEngine {
    probe: OverlayProbe,
}

impl HeadlessOverlayEngine {
    pub fn new() -> Self {
        Self {
            probe: OverlayProbe::default(),
        }
    }

    pub fn probe(&self) -> OverlayProbe {
        self.probe.clone()
    }
}

impl Default for HeadlessOverlayEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl OverlayEngine for HeadlessOverlayEngine {
    fn attach(
        &mut self,
        viewer: &mut dyn ViewerInstance,
        style: &AnnotationStyle,
        events: EventSender<AnnotationEvent>,
    ) -> Result<Box<dyn OverlayInstance>> {
        let mut log = self.probe.log.borrow_mut();
        if let Some(reason) = log.fail_next_attach.take() {
            bail!("{reason}");
        }
        log::debug!(
            "Headless overlay attached over {} (fill {} @ {})",
            viewer.tile_sources().url(),
            style.fill,
            style.fill_opacity
        );
        log.attached += 1;
        log.tool = DrawingTool::default();
        log.drawing_enabled = false;
        log.style = Some(style.clone());
        log.annotations.clear();
        log.events = Some(events);
        Ok(Box::new(HeadlessOverlay {
            probe: self.probe.clone(),
            destroyed: false,
        }))
    }
}

struct HeadlessOverlay {
    probe: OverlayProbe,
    destroyed: bool,
}

impl OverlayInstance for HeadlessOverlay {
    fn set_drawing_tool(&mut self, tool: DrawingTool) {
        let mut log = self.probe.log.borrow_mut();
        log.tool = tool;
        log.calls.push(OverlayCall::SetDrawingTool(tool));
    }

    fn drawing_tool(&self) -> DrawingTool {
        self.probe.log.borrow().tool
    }

    fn set_drawing_enabled(&mut self, enabled: bool) {
        let mut log = self.probe.log.borrow_mut();
        log.drawing_enabled = enabled;
        log.calls.push(OverlayCall::SetDrawingEnabled(enabled));
    }

    fn drawing_enabled(&self) -> bool {
        self.probe.log.borrow().drawing_enabled
    }

    fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        let mut log = self.probe.log.borrow_mut();
        log.destroyed += 1;
        log.events = None;
        log.annotations.clear();
    }
}
