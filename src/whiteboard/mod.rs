//! The mounted board: physics world, body registry and drawing surface bound
//! to one lifecycle, driven by two independently scheduled tasks.

mod clock;

use std::{path::PathBuf, time::Instant};

use rand::{SeedableRng, rngs::StdRng};

pub use clock::RepeatingTask;

use crate::{
    commands::{BoardPort, ThoughtList},
    config::{self, Settings},
    error::WhiteboardError,
    export::{DocumentWriter, ExportDocument, JsonDocumentWriter},
    physics::{DragEvent, PhysicsWorld, RigidBodyEngine},
    registry::{BodyRegistry, SyncReport},
    render::{self, DrawSurface, FrameItem, Rasterize},
    types::{PositionMap, Thought, Vec2},
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PointerCursor {
    #[default]
    Default,
    Grab,
    Grabbing,
}

impl PointerCursor {
    pub fn label(self) -> &'static str {
        match self {
            PointerCursor::Default => "default",
            PointerCursor::Grab => "grab",
            PointerCursor::Grabbing => "grabbing",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PumpReport {
    pub steps: u32,
    pub rendered: bool,
}

pub struct Whiteboard<S: DrawSurface> {
    world: PhysicsWorld,
    registry: BodyRegistry,
    surface: Option<S>,
    writer: Box<dyn DocumentWriter>,
    physics_task: RepeatingTask,
    render_task: RepeatingTask,
    step_dt: f32,
    thoughts: Vec<Thought>,
    observed: Option<u64>,
    cursor: PointerCursor,
    pixel_ratio: f32,
    torn_down: bool,
}

impl<S: DrawSurface> Whiteboard<S> {
    /// Binds a surface to a fresh world sized to the container and starts
    /// both tasks. Fails without side effects when there is no surface or
    /// the container has no area.
    pub fn mount(
        width: f32,
        height: f32,
        surface: Option<S>,
        settings: &Settings,
        now: Instant,
    ) -> Result<Self, WhiteboardError> {
        let usable = width.is_finite() && height.is_finite() && width > 0.0 && height > 0.0;
        let Some(mut surface) = surface.filter(|_| usable) else {
            tracing::warn!(width, height, "surface unavailable, mount skipped");
            return Err(WhiteboardError::SurfaceUnavailable { width, height });
        };

        surface.resize(width, height);
        let pixel_ratio = surface.device_pixel_ratio();
        let (world_rng, registry_rng) = match settings.seed {
            Some(seed) => (
                StdRng::seed_from_u64(seed),
                StdRng::seed_from_u64(seed.wrapping_add(1)),
            ),
            None => (StdRng::from_entropy(), StdRng::from_entropy()),
        };

        let sim_hz = settings.sim_hz();
        let mut physics_task = RepeatingTask::from_hz(sim_hz);
        let mut render_task = RepeatingTask::from_hz(settings.render_hz());
        physics_task.start(now);
        render_task.start(now);

        tracing::info!(width, height, pixel_ratio, "whiteboard mounted");
        Ok(Self {
            world: PhysicsWorld::new(width, height, world_rng),
            registry: BodyRegistry::new(registry_rng),
            surface: Some(surface),
            writer: Box::new(JsonDocumentWriter::new(settings.export_dir())),
            physics_task,
            render_task,
            step_dt: 1.0 / sim_hz,
            thoughts: Vec::new(),
            observed: None,
            cursor: PointerCursor::Default,
            pixel_ratio,
            torn_down: false,
        })
    }

    pub fn with_writer(mut self, writer: Box<dyn DocumentWriter>) -> Self {
        self.writer = writer;
        self
    }

    pub fn world(&self) -> &PhysicsWorld {
        &self.world
    }

    pub fn registry(&self) -> &BodyRegistry {
        &self.registry
    }

    pub fn surface(&self) -> Option<&S> {
        self.surface.as_ref()
    }

    pub fn cursor(&self) -> PointerCursor {
        self.cursor
    }

    pub fn pixel_ratio(&self) -> f32 {
        self.pixel_ratio
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    /// Runs whatever physics steps and render frame are due at `now`.
    pub fn pump(&mut self, now: Instant) -> PumpReport {
        if self.torn_down {
            return PumpReport::default();
        }
        let steps = self
            .physics_task
            .fixed_steps(now, config::MAX_CATCH_UP_STEPS);
        for _ in 0..steps {
            self.world.step(self.step_dt);
        }
        self.apply_drag_events();

        let rendered = self.render_task.due(now);
        if rendered {
            self.render_now();
        }
        PumpReport { steps, rendered }
    }

    /// Reconciles bodies with `thoughts` if this revision has not been seen.
    pub fn observe(&mut self, thoughts: &ThoughtList) -> Option<SyncReport> {
        if self.torn_down || self.observed == Some(thoughts.revision()) {
            return None;
        }
        self.observed = Some(thoughts.revision());
        self.thoughts = thoughts.items().to_vec();
        let surface = self
            .surface
            .as_mut()
            .map(|s| s as &mut (dyn DrawSurface + '_));
        let report = self.registry.sync(&self.thoughts, &mut self.world, surface);
        if !report.is_empty() {
            tracing::debug!(
                created = report.created.len(),
                removed = report.removed.len(),
                "bodies synced"
            );
        }
        Some(report)
    }

    pub fn resize(&mut self, width: f32, height: f32) {
        if self.torn_down {
            return;
        }
        if !(width.is_finite() && height.is_finite() && width > 0.0 && height > 0.0) {
            tracing::debug!(width, height, "ignoring degenerate resize");
            return;
        }
        if let Some(surface) = self.surface.as_mut() {
            surface.resize(width, height);
            self.pixel_ratio = surface.device_pixel_ratio();
        }
        self.world.resize(width, height);
        tracing::info!(width, height, pixel_ratio = self.pixel_ratio, "whiteboard resized");
    }

    pub fn pointer_down(&mut self, point: Vec2) {
        self.world.pointer_down(point, self.registry.handles());
        self.apply_drag_events();
    }

    pub fn pointer_move(&mut self, point: Vec2) {
        self.world.pointer_move(point, self.registry.handles());
        self.apply_drag_events();
    }

    pub fn pointer_up(&mut self) {
        self.world.pointer_up();
        self.apply_drag_events();
    }

    /// Draws one frame from the latest body transforms.
    pub fn render_now(&mut self) {
        let Some(surface) = self.surface.as_mut() else {
            return;
        };
        let drag = self.world.drag();
        let focus = drag.grabbed().or(drag.hovered());
        let engine = self.world.engine();
        let items: Vec<FrameItem<'_>> = self
            .thoughts
            .iter()
            .filter_map(|thought| {
                let handle = self.registry.handle(thought.id)?;
                let state = engine.state(handle)?;
                Some(FrameItem {
                    thought,
                    state,
                    highlighted: focus == Some(handle),
                })
            })
            .collect();
        render::draw_frame(surface, items);
    }

    /// Stops both tasks, unhooks pointer input, drops every body and
    /// releases the surface. Safe to call more than once.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        self.physics_task.stop();
        self.render_task.stop();
        self.world.detach_drag();
        self.registry.clear(&mut self.world);
        self.world.clear();
        self.thoughts.clear();
        self.observed = None;
        self.cursor = PointerCursor::Default;
        self.surface = None;
        tracing::info!("whiteboard torn down");
    }

    fn apply_drag_events(&mut self) {
        for event in self.world.drain_drag_events() {
            self.cursor = match event {
                DragEvent::StartDrag(_) => PointerCursor::Grabbing,
                DragEvent::EndDrag(_) if self.world.drag().hovered().is_some() => {
                    PointerCursor::Grab
                }
                DragEvent::EndDrag(_) => PointerCursor::Default,
                DragEvent::Hover(_) if self.cursor == PointerCursor::Grabbing => {
                    PointerCursor::Grabbing
                }
                DragEvent::Hover(Some(_)) => PointerCursor::Grab,
                DragEvent::Hover(None) => PointerCursor::Default,
            };
        }
    }
}

impl<S: DrawSurface + Rasterize> Whiteboard<S> {
    /// Renders the current frame into a one-page document.
    fn capture(&mut self) -> Result<ExportDocument, WhiteboardError> {
        self.render_now();
        let Some(surface) = self.surface.as_ref() else {
            return Err(WhiteboardError::SurfaceUnavailable {
                width: 0.0,
                height: 0.0,
            });
        };
        Ok(ExportDocument::from_raster(surface.rasterize())?)
    }
}

impl<S: DrawSurface> Drop for Whiteboard<S> {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl<S: DrawSurface + Rasterize> BoardPort for Whiteboard<S> {
    fn sync(&mut self, thoughts: &ThoughtList) {
        self.observe(thoughts);
    }

    fn snapshot_positions(&self) -> PositionMap {
        self.registry.snapshot_positions(&self.world)
    }

    fn restore_positions(&mut self, positions: &PositionMap) -> usize {
        self.registry.restore_positions(positions, &mut self.world)
    }

    fn shake(&mut self) {
        let handles: Vec<_> = self.registry.handles().collect();
        self.world.apply_shake(handles);
    }

    /// Renders the current frame and hands it to the configured writer.
    fn export(&mut self) -> Result<PathBuf, WhiteboardError> {
        let document = self.capture()?;
        Ok(self.writer.write(&document)?)
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc, time::Duration};

    use super::*;
    use crate::{
        error::ExportError,
        render::{CellCanvas, testing::RecordingSurface},
        types::ThoughtId,
    };

    fn settings() -> Settings {
        Settings {
            seed: Some(7),
            ..Settings::default()
        }
    }

    fn mounted(now: Instant) -> Whiteboard<CellCanvas> {
        Whiteboard::mount(800.0, 600.0, Some(CellCanvas::new(800.0, 600.0)), &settings(), now)
            .unwrap()
    }

    fn list_of(texts: &[&str]) -> ThoughtList {
        let mut list = ThoughtList::new();
        for (i, text) in texts.iter().enumerate() {
            list.push(Thought::new(ThoughtId(i as u64 + 1), *text));
        }
        list
    }

    #[derive(Clone, Default)]
    struct MemoryWriter {
        written: Rc<RefCell<Vec<ExportDocument>>>,
    }

    impl DocumentWriter for MemoryWriter {
        fn write(&mut self, document: &ExportDocument) -> Result<PathBuf, ExportError> {
            let mut written = self.written.borrow_mut();
            written.push(document.clone());
            Ok(PathBuf::from(format!("doc-{}", written.len())))
        }
    }

    mod mount {
        use super::*;

        #[test]
        fn missing_surface_is_unavailable() {
            let result =
                Whiteboard::<CellCanvas>::mount(800.0, 600.0, None, &settings(), Instant::now());
            assert!(matches!(result, Err(WhiteboardError::SurfaceUnavailable { .. })));
        }

        #[test]
        fn zero_sized_container_is_unavailable() {
            let result = Whiteboard::mount(
                0.0,
                600.0,
                Some(CellCanvas::new(0.0, 600.0)),
                &settings(),
                Instant::now(),
            );
            assert!(matches!(result, Err(WhiteboardError::SurfaceUnavailable { .. })));
        }

        #[test]
        fn builds_walls_and_reads_pixel_ratio() {
            let board = Whiteboard::mount(
                800.0,
                600.0,
                Some(CellCanvas::new(10.0, 10.0).with_pixel_ratio(2.0)),
                &settings(),
                Instant::now(),
            )
            .unwrap();
            assert_eq!(board.world().engine().len(), 4);
            assert_eq!(board.pixel_ratio(), 2.0);
            assert_eq!(board.surface().map(|s| s.size()), Some((800.0, 600.0)));
        }
    }

    mod observe {
        use super::*;

        #[test]
        fn syncs_once_per_revision() {
            let mut board = mounted(Instant::now());
            let list = list_of(&["a", "b"]);

            let report = board.observe(&list).unwrap();
            assert_eq!(report.created.len(), 2);
            assert!(board.observe(&list).is_none());
            assert_eq!(board.registry().len(), 2);
        }

        #[test]
        fn removal_drops_bodies() {
            let mut board = mounted(Instant::now());
            let mut list = list_of(&["a", "b"]);
            board.observe(&list);
            list.replace(list.items()[..1].to_vec());

            let report = board.observe(&list).unwrap();
            assert_eq!(report.removed, vec![ThoughtId(2)]);
            assert_eq!(board.world().engine().len(), 5);
        }
    }

    mod pump {
        use super::*;

        #[test]
        fn physics_and_render_run_on_their_own_clocks() {
            let t0 = Instant::now();
            let mut board = mounted(t0);
            board.observe(&list_of(&["hello"]));

            let report = board.pump(t0 + Duration::from_millis(40));
            assert_eq!(report.steps, 2);
            assert!(report.rendered);

            let report = board.pump(t0 + Duration::from_millis(50));
            assert!(!report.rendered);
        }

        #[test]
        fn rendered_frame_contains_text() {
            let t0 = Instant::now();
            let mut board = mounted(t0);
            board.observe(&list_of(&["hello"]));
            board.render_now();

            let canvas = board.surface().unwrap();
            let found = (0..canvas.rows()).any(|row| canvas.row_text(row).contains("hello"));
            assert!(found);
        }

        #[test]
        fn stall_is_capped() {
            let t0 = Instant::now();
            let mut board = mounted(t0);
            let report = board.pump(t0 + Duration::from_secs(10));
            assert_eq!(report.steps, config::MAX_CATCH_UP_STEPS);
        }
    }

    mod resize {
        use super::*;

        #[test]
        fn moves_walls_not_thoughts() {
            let mut board = mounted(Instant::now());
            board.observe(&list_of(&["a", "b", "c"]));
            let before = board.snapshot_positions();
            let walls_before = board.world().bounds().walls();

            board.resize(400.0, 300.0);

            assert_eq!(board.snapshot_positions(), before);
            assert_ne!(board.world().bounds().walls(), walls_before);
            assert_eq!(board.world().bounds().width, 400.0);
            assert_eq!(board.surface().map(|s| s.size()), Some((400.0, 300.0)));
        }

        #[test]
        fn rereads_pixel_ratio() {
            let surface = RecordingSurface::new(800.0, 600.0).moving_to_ratio(3.0);
            let mut board =
                Whiteboard::mount(800.0, 600.0, Some(surface), &settings(), Instant::now())
                    .unwrap();
            // mount resizes the surface once, so move it again
            board.surface.as_mut().unwrap().ratio_after_resize = Some(1.5);
            assert_eq!(board.pixel_ratio(), 3.0);

            board.resize(640.0, 480.0);

            assert_eq!(board.pixel_ratio(), 1.5);
            assert_eq!(board.surface().map(|s| s.size()), Some((640.0, 480.0)));
        }

        #[test]
        fn degenerate_size_is_ignored() {
            let mut board = mounted(Instant::now());
            board.resize(0.0, 300.0);
            assert_eq!(board.world().bounds().width, 800.0);
        }
    }

    mod pointer {
        use super::*;

        #[test]
        fn cursor_follows_hover_and_drag() {
            let mut board = mounted(Instant::now());
            board.observe(&list_of(&["drag me"]));
            let handle = board.registry().handle(ThoughtId(1)).unwrap();
            let at = board.world().engine().state(handle).unwrap().position;

            board.pointer_move(at);
            assert_eq!(board.cursor(), PointerCursor::Grab);
            board.pointer_down(at);
            assert_eq!(board.cursor(), PointerCursor::Grabbing);
            board.pointer_up();
            assert_eq!(board.cursor(), PointerCursor::Grab);
            board.pointer_move(Vec2::new(-500.0, -500.0));
            assert_eq!(board.cursor(), PointerCursor::Default);
        }
    }

    mod port {
        use super::*;

        #[test]
        fn shake_keeps_bodies_upright() {
            let mut board = mounted(Instant::now());
            board.observe(&list_of(&["a", "b"]));
            BoardPort::shake(&mut board);
            for handle in board.registry().handles() {
                let state = board.world().engine().state(handle).unwrap();
                assert_eq!(state.angle, 0.0);
                assert_eq!(state.angular_velocity, 0.0);
            }
        }

        #[test]
        fn export_uses_canvas_pixels() {
            let writer = MemoryWriter::default();
            let mut board = mounted(Instant::now()).with_writer(Box::new(writer.clone()));
            board.observe(&list_of(&["a"]));

            let path = BoardPort::export(&mut board).unwrap();

            assert_eq!(path, PathBuf::from("doc-1"));
            let written = writer.written.borrow();
            let doc = &written[0];
            assert_eq!((doc.page_width_px, doc.page_height_px), (800, 600));
            assert_eq!(doc.pages, 1);
        }

        #[test]
        fn export_through_port_uses_configured_writer() {
            let mut board = mounted(Instant::now())
                .with_writer(Box::new(MemoryWriter::default()));
            assert_eq!(BoardPort::export(&mut board).unwrap(), PathBuf::from("doc-1"));
            assert_eq!(BoardPort::export(&mut board).unwrap(), PathBuf::from("doc-2"));
        }
    }

    mod teardown {
        use super::*;

        #[test]
        fn releases_everything_and_is_idempotent() {
            let t0 = Instant::now();
            let mut board = mounted(t0);
            board.observe(&list_of(&["a", "b"]));

            board.teardown();
            board.teardown();

            assert!(board.is_torn_down());
            assert!(board.surface().is_none());
            assert!(board.registry().is_empty());
            assert!(board.world().engine().is_empty());
            assert!(!board.world().drag().is_attached());
            assert_eq!(board.pump(t0 + Duration::from_secs(1)), PumpReport::default());
            assert!(board.observe(&list_of(&["c"])).is_none());
        }

        #[test]
        fn export_after_teardown_reports_unavailable() {
            let writer = MemoryWriter::default();
            let mut board = mounted(Instant::now()).with_writer(Box::new(writer.clone()));
            board.teardown();
            assert!(matches!(
                BoardPort::export(&mut board),
                Err(WhiteboardError::SurfaceUnavailable { .. })
            ));
            assert!(writer.written.borrow().is_empty());
        }
    }
}
