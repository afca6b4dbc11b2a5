use anyhow::{Context, Result, anyhow, bail};
use std::rc::Rc;
use std::str::FromStr;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use crate::annotations::handlers::AnnotationLog;
use crate::config::AppConfig;
use crate::domain::{AnnotationId, DrawingTool, MountPoint, Point, TileAddress, TileSourceSet, ToolMode};
use crate::render::headless::{
    HeadlessOverlayEngine, HeadlessViewerEngine, OverlayProbe, ViewerProbe,
};
use crate::session::{Command, Session, SessionContext, SessionState};
use crate::tiles::{
    PyramidTileProvider, QueryStatus, RetryPolicy, TileOutcome, TileQuery, TileRequest,
    TileSourceLoader,
};
use crate::viewer::ViewerEvent;

pub(crate) fn run(config: AppConfig) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build async runtime")?;
    let local = tokio::task::LocalSet::new();
    let result = local.block_on(&runtime, App::new(&config).run());
    // The stdin reader sits in a blocking read that never completes on its own.
    runtime.shutdown_background();
    result
}

/// Everything the shell loop reacts to
#[derive(Debug)]
enum Message {
    TilesResolved(TileOutcome),
    Input(String),
    InputClosed,
}

/// One line typed into the shell
#[derive(Debug, Clone, PartialEq)]
enum ShellCommand {
    Session(Command),
    /// Gesture with the current tool through the given image points
    Draw(Vec<Point>),
    Drag {
        id: AnnotationId,
        dx: f64,
        dy: f64,
    },
    /// Make the next engine call fail
    Fail(Fault),
    /// Report a tile failure from the live viewer
    TileError(String),
    State,
    List,
    Engines,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq)]
enum Fault {
    Viewer(String),
    Overlay(String),
    Tile(TileAddress),
}

impl FromStr for ShellCommand {
    type Err = anyhow::Error;

    fn from_str(line: &str) -> Result<Self> {
        let mut words = line.split_whitespace();
        let Some(head) = words.next() else {
            bail!("empty command");
        };
        let command = match head.to_ascii_lowercase().as_str() {
            "draw" => ShellCommand::Draw(words.map(parse_point).collect::<Result<_>>()?),
            "drag" => {
                let args: Vec<&str> = words.collect();
                let [id, dx, dy] = args[..] else {
                    bail!("usage: drag <id> <dx> <dy>");
                };
                ShellCommand::Drag {
                    id: AnnotationId(id.trim_start_matches('#').parse().context("bad id")?),
                    dx: dx.parse().context("bad dx")?,
                    dy: dy.parse().context("bad dy")?,
                }
            }
            "fail" => ShellCommand::Fail(parse_fault(words.collect())?),
            "tile-error" => ShellCommand::TileError(reason(words.collect())),
            "state" => ShellCommand::State,
            "list" => ShellCommand::List,
            "engines" => ShellCommand::Engines,
            "help" => ShellCommand::Help,
            "quit" | "exit" => ShellCommand::Quit,
            _ => ShellCommand::Session(line.parse::<Command>().map_err(|err| anyhow!(err))?),
        };
        Ok(command)
    }
}

fn parse_fault(args: Vec<&str>) -> Result<Fault> {
    let fault = match args.split_first() {
        Some((&"viewer", rest)) => Fault::Viewer(reason(rest.to_vec())),
        Some((&"overlay", rest)) => Fault::Overlay(reason(rest.to_vec())),
        Some((&"tile", [level, column, row])) => Fault::Tile(TileAddress {
            level: level.parse().context("bad level")?,
            column: column.parse().context("bad column")?,
            row: row.parse().context("bad row")?,
        }),
        _ => bail!("usage: fail viewer|overlay [reason] or fail tile <level> <column> <row>"),
    };
    Ok(fault)
}

fn reason(words: Vec<&str>) -> String {
    if words.is_empty() {
        "injected failure".to_string()
    } else {
        words.join(" ")
    }
}

fn parse_point(word: &str) -> Result<Point> {
    let (x, y) = word
        .split_once(',')
        .with_context(|| format!("expected x,y but got '{word}'"))?;
    Ok(Point::new(
        x.trim().parse().with_context(|| format!("bad x in '{word}'"))?,
        y.trim().parse().with_context(|| format!("bad y in '{word}'"))?,
    ))
}

const HELP: &str = "\
commands:
  rect | poly          select a drawing tool
  move                 toggle move (edit) mode
  retry                reload tiles after a failure
  draw x,y x,y ...     draw with the current tool
  drag <id> <dx> <dy>  move a shape while in move mode
  fail viewer|overlay [reason]     fail the next viewer or overlay creation
  fail tile <level> <col> <row>    fail one tile when the next viewer opens
  tile-error [reason]  report a tile failure from the live viewer
  state | list | engines | help | quit";

fn describe(state: &SessionState) -> String {
    let viewer = state
        .viewer()
        .map_or_else(|| "none".to_string(), |v| v.to_string());
    let annotator = state
        .annotator()
        .map_or_else(|| "none".to_string(), |a| a.to_string());
    let mut out = format!(
        "viewer: {viewer}  annotator: {annotator}  loading: {}  mode: {}",
        state.is_loading(),
        state.mode()
    );
    if let Some(error) = state.error() {
        out.push_str(&format!("  error: {error}"));
    }
    out
}

/// Toolbar buttons, active ones in brackets
fn toolbar(mode: ToolMode) -> String {
    let button = |label: &str, active: bool| {
        if active {
            format!("[{label}]")
        } else {
            label.to_string()
        }
    };
    format!(
        "toolbar: {} {} {}",
        button("rect", mode.highlights(DrawingTool::Rectangle)),
        button("poly", mode.highlights(DrawingTool::Polygon)),
        button("move", mode.is_move())
    )
}

fn describe_tiles(query: &TileQuery, shown: Option<&TileSourceSet>) -> String {
    let status = match query.status() {
        QueryStatus::Error(reason) => format!("failed ({reason})"),
        status if status.is_pending() => "pending".to_string(),
        _ => "loaded".to_string(),
    };
    let mut out = format!(
        "tiles: {} {status}, {} attempt(s)",
        query.url(),
        query.attempts()
    );
    if let Some(tiles) = shown
        && let Some(full) = tiles.full_resolution()
    {
        let levels: Vec<String> = tiles
            .sources()
            .iter()
            .map(|source| format!("{}x{}", source.width, source.height))
            .collect();
        out.push_str(&format!(
            "  image: {} tile(s) at full resolution, levels {}",
            full.tile_count(),
            levels.join(" ")
        ));
    }
    out
}

struct App {
    session: Session,
    viewer: ViewerProbe,
    overlay: OverlayProbe,
    annotations: AnnotationLog,
    loader: Rc<TileSourceLoader>,
    tx: mpsc::UnboundedSender<Message>,
    rx: mpsc::UnboundedReceiver<Message>,
}

impl App {
    fn new(config: &AppConfig) -> Self {
        let viewer_engine = HeadlessViewerEngine::new();
        let overlay_engine = HeadlessOverlayEngine::new();
        let viewer = viewer_engine.probe();
        let overlay = overlay_engine.probe();
        let mut session = Session::new(
            SessionContext::new(),
            Box::new(viewer_engine),
            Box::new(overlay_engine),
            config,
        );
        let annotations = AnnotationLog::new();
        session.on_annotation(annotations.handler());

        let provider = Rc::new(PyramidTileProvider::new(
            &config.tiles.asset_root,
            config.tiles.tile_size,
        ));
        let loader = TileSourceLoader::new(
            provider,
            RetryPolicy {
                retries: config.tiles.retry,
                delay: config.tiles.retry_delay(),
            },
        );
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            session,
            viewer,
            overlay,
            annotations,
            loader: Rc::new(loader),
            tx,
            rx,
        }
    }

    async fn run(mut self) -> Result<()> {
        self.spawn_input_reader();
        if let Some(request) = self.session.mount(MountPoint::new(1, "viewer")) {
            self.spawn_load(request);
        }
        println!("{HELP}");

        while let Some(message) = self.rx.recv().await {
            let keep_running = self.update(message);
            self.session.pump();
            if !keep_running {
                break;
            }
        }

        self.session.teardown();
        log::info!("Shell exited with {} annotation(s)", self.annotations.len());
        Ok(())
    }

    fn update(&mut self, message: Message) -> bool {
        match message {
            Message::TilesResolved(outcome) => {
                self.session.on_tiles_resolved(outcome);
                self.session.pump();
                println!("{}", describe(&self.session.context().snapshot()));
            }
            Message::Input(line) if line.trim().is_empty() => {}
            Message::Input(line) => match line.parse::<ShellCommand>() {
                Ok(command) => return self.execute(command),
                Err(err) => println!("{err:#}"),
            },
            Message::InputClosed => return false,
        }
        true
    }

    fn execute(&mut self, command: ShellCommand) -> bool {
        match command {
            ShellCommand::Session(command) => match self.session.dispatch(command) {
                Ok(Some(request)) => self.spawn_load(request),
                Ok(None) => println!("mode: {}", self.session.context().mode()),
                Err(err) => println!("{err}"),
            },
            ShellCommand::Draw(points) => match self.overlay.draw(&points) {
                Some(id) => println!("created {id}"),
                None => println!("nothing drawn"),
            },
            ShellCommand::Drag { id, dx, dy } => {
                if !self.overlay.drag(id, dx, dy) {
                    println!("cannot move {id}");
                }
            }
            ShellCommand::Fail(Fault::Viewer(reason)) => self.viewer.fail_next_create(&reason),
            ShellCommand::Fail(Fault::Overlay(reason)) => self.overlay.fail_next_attach(&reason),
            ShellCommand::Fail(Fault::Tile(address)) => {
                self.viewer
                    .fail_tile(address.level, address.column, address.row);
            }
            ShellCommand::TileError(reason) => {
                if !self.viewer.emit(ViewerEvent::TileLoadFailed(reason)) {
                    println!("no live viewer");
                }
            }
            ShellCommand::State => self.print_state(),
            ShellCommand::List => {
                if self.annotations.is_empty() {
                    println!("no annotations");
                }
                for annotation in self.annotations.annotations() {
                    let bounds = annotation.shape.bounds();
                    println!(
                        "{} {} at ({}, {}) {}x{}",
                        annotation.id,
                        annotation.shape.name(),
                        bounds.x,
                        bounds.y,
                        bounds.width,
                        bounds.height
                    );
                }
            }
            ShellCommand::Engines => self.print_engines(),
            ShellCommand::Help => println!("{HELP}"),
            ShellCommand::Quit => return false,
        }
        true
    }

    fn print_state(&self) {
        let state = self.session.context().snapshot();
        println!("{}", describe(&state));
        println!("{}", toolbar(state.mode()));
        let shown = self
            .session
            .viewers()
            .live_handle()
            .and_then(|handle| self.session.viewers().tile_sources(handle));
        println!("{}", describe_tiles(self.session.tiles(), shown));
        let overlays = self.session.overlays();
        if let (Ok(tool), Ok(enabled)) = (overlays.drawing_tool(), overlays.drawing_enabled()) {
            println!("overlay: tool {tool}, drawing {}", if enabled { "on" } else { "off" });
        }
    }

    fn print_engines(&self) {
        println!(
            "viewers: {} created, {} live, {} destroyed",
            self.viewer.created(),
            self.viewer.live(),
            self.viewer.destroyed()
        );
        if let Some(config) = self.viewer.last_config() {
            println!("  last config: {config:?}");
        }
        println!(
            "overlays: {} attached, {} destroyed, {} shape(s) on the live overlay",
            self.overlay.attached(),
            self.overlay.destroyed(),
            self.overlay.annotations().len()
        );
        if let Some(style) = self.overlay.style() {
            println!("  style: fill {} at {}", style.fill, style.fill_opacity);
        }
        for call in self.overlay.take_calls() {
            println!("  {call:?}");
        }
    }

    fn spawn_load(&self, request: TileRequest) {
        let loader = self.loader.clone();
        let tx = self.tx.clone();
        tokio::task::spawn_local(async move {
            let outcome = loader.run(request).await;
            if tx.send(Message::TilesResolved(outcome)).is_err() {
                log::debug!("Shell closed before tile load finished");
            }
        });
    }

    fn spawn_input_reader(&self) {
        let tx = self.tx.clone();
        tokio::task::spawn_local(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if tx.send(Message::Input(line)).is_err() {
                            return;
                        }
                    }
                    Ok(None) => break,
                    Err(err) => {
                        log::error!("Failed to read stdin: {}", err);
                        break;
                    }
                }
            }
            if tx.send(Message::InputClosed).is_err() {
                log::debug!("Shell closed before end of input");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TileSourceOptions;
    use crate::test_support::sample_tiles;
    use std::sync::Arc;

    #[test]
    fn parses_gestures() {
        assert_eq!(
            "draw 0,0 10.5,20".parse::<ShellCommand>().unwrap(),
            ShellCommand::Draw(vec![Point::new(0.0, 0.0), Point::new(10.5, 20.0)])
        );
        assert_eq!(
            "drag #3 5 -2".parse::<ShellCommand>().unwrap(),
            ShellCommand::Drag {
                id: AnnotationId(3),
                dx: 5.0,
                dy: -2.0
            }
        );
        assert!("drag 3 5".parse::<ShellCommand>().is_err());
        assert!("draw 1;2".parse::<ShellCommand>().is_err());
    }

    #[test]
    fn falls_back_to_session_commands() {
        assert_eq!(
            "poly".parse::<ShellCommand>().unwrap(),
            ShellCommand::Session(Command::SelectPolygon)
        );
        assert_eq!("exit".parse::<ShellCommand>().unwrap(), ShellCommand::Quit);
        assert!("zoom".parse::<ShellCommand>().is_err());
    }

    #[test]
    fn describe_reports_error_only_when_set() {
        let context = SessionContext::new();
        assert!(!describe(&context.snapshot()).contains("error"));

        context.set_loading(false);
        context.set_error(Some("Failed to load image tiles".into()));
        context.set_mode(ToolMode::Move {
            resume: DrawingTool::Polygon,
        });
        let line = describe(&context.snapshot());
        assert!(line.contains("loading: false"));
        assert!(line.contains("error: Failed to load image tiles"));
    }

    #[test]
    fn parses_fault_injection() {
        assert_eq!(
            "fail viewer gpu lost".parse::<ShellCommand>().unwrap(),
            ShellCommand::Fail(Fault::Viewer("gpu lost".into()))
        );
        assert_eq!(
            "fail overlay".parse::<ShellCommand>().unwrap(),
            ShellCommand::Fail(Fault::Overlay("injected failure".into()))
        );
        assert_eq!(
            "fail tile 0 1 2".parse::<ShellCommand>().unwrap(),
            ShellCommand::Fail(Fault::Tile(TileAddress {
                level: 0,
                column: 1,
                row: 2
            }))
        );
        assert_eq!(
            "tile-error timeout".parse::<ShellCommand>().unwrap(),
            ShellCommand::TileError("timeout".into())
        );
        assert!("fail tile 0 1".parse::<ShellCommand>().is_err());
        assert!("fail disk".parse::<ShellCommand>().is_err());
    }

    #[test]
    fn toolbar_brackets_active_buttons() {
        assert_eq!(toolbar(ToolMode::RectangleDraw), "toolbar: [rect] poly move");
        assert_eq!(
            toolbar(ToolMode::Move {
                resume: DrawingTool::Polygon
            }),
            "toolbar: rect poly [move]"
        );
    }

    #[test]
    fn describe_tiles_follows_query_status() {
        let mut query = TileQuery::new("/image.tif", TileSourceOptions::default());
        assert!(describe_tiles(&query, None).contains("pending"));

        let request = query.start().unwrap();
        query.resolve(TileOutcome {
            generation: request.generation,
            attempts: 2,
            result: Ok(Arc::new(sample_tiles())),
        });
        let tiles = sample_tiles();
        let line = describe_tiles(&query, Some(&tiles));
        assert!(line.contains("/image.tif loaded, 2 attempt(s)"));
        assert!(line.contains("8 tile(s) at full resolution"));
        assert!(line.contains("levels 1024x512 512x256 256x128"));
    }
}
