pub mod engine;

use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::{config, spatial::Aabb, types::Vec2};

pub use engine::{BodyDesc, BodyHandle, BodyKind, ImpulseEngine, Material, RigidBodyEngine};

/// Static walls enclosing the canvas. The bottom wall sits above the true
/// bottom edge so the input strip stays clear.
#[derive(Clone, Copy, Debug)]
pub struct WorldBounds {
    pub width: f32,
    pub height: f32,
    walls: [BodyHandle; 4],
}

impl WorldBounds {
    fn build<E: RigidBodyEngine>(engine: &mut E, width: f32, height: f32) -> Self {
        let walls = Self::wall_descs(width, height).map(|desc| engine.insert(desc));
        Self {
            width,
            height,
            walls,
        }
    }

    /// Left, right, top, bottom.
    pub fn wall_descs(width: f32, height: f32) -> [BodyDesc; 4] {
        let half_t = config::WALL_THICKNESS / 2.0;
        [
            BodyDesc::fixed(Vec2::new(0.0, height / 2.0), Vec2::new(half_t, height / 2.0)),
            BodyDesc::fixed(Vec2::new(width, height / 2.0), Vec2::new(half_t, height / 2.0)),
            BodyDesc::fixed(Vec2::new(width / 2.0, 0.0), Vec2::new(width / 2.0, half_t)),
            BodyDesc::fixed(
                Vec2::new(width / 2.0, height - config::INPUT_STRIP),
                Vec2::new(width / 2.0, half_t),
            ),
        ]
    }

    pub fn walls(&self) -> [BodyHandle; 4] {
        self.walls
    }

    /// Region new bodies may spawn in: the canvas minus `margin` on every side,
    /// with the input strip removed from the bottom. The margin shrinks on
    /// small canvases so the region is never inverted.
    pub fn spawn_area(&self, margin: f32) -> Aabb {
        let usable_h = (self.height - config::INPUT_STRIP).max(0.0);
        let mx = margin.min(self.width * 0.25).max(0.0);
        let my = margin.min(usable_h * 0.25).max(0.0);
        Aabb {
            min: Vec2::new(mx, my),
            max: Vec2::new((self.width - mx).max(mx), (usable_h - my).max(my)),
        }
    }

    /// Space between the inner faces of the walls.
    pub fn interior(&self) -> Aabb {
        let half_t = config::WALL_THICKNESS / 2.0;
        let bottom = self.height - config::INPUT_STRIP - half_t;
        Aabb {
            min: Vec2::new(half_t, half_t),
            max: Vec2::new((self.width - half_t).max(half_t), bottom.max(half_t)),
        }
    }

    /// Largest full body size that fits between the walls with
    /// [`config::BODY_FIT_SLACK`] to spare on every side.
    pub fn max_body_extents(&self) -> Vec2 {
        let interior = self.interior();
        let room = interior.max - interior.min;
        Vec2::new(
            (room.x - 2.0 * config::BODY_FIT_SLACK).max(1.0),
            (room.y - 2.0 * config::BODY_FIT_SLACK).max(1.0),
        )
    }

    /// Nearest centre to `point` at which a body of `half` extents lies fully
    /// between the walls. Axes the body cannot fit on collapse to the middle.
    pub fn fit_center(&self, half: Vec2, point: Vec2) -> Vec2 {
        let interior = self.interior();
        let axis = |lo: f32, hi: f32, half: f32, v: f32| {
            let (lo, hi) = (lo + half, hi - half);
            if lo <= hi { v.clamp(lo, hi) } else { (lo + hi) / 2.0 }
        };
        Vec2::new(
            axis(interior.min.x, interior.max.x, half.x, point.x),
            axis(interior.min.y, interior.max.y, half.y, point.y),
        )
    }

    pub fn fits(&self, half: Vec2) -> bool {
        let interior = self.interior();
        2.0 * half.x <= interior.max.x - interior.min.x
            && 2.0 * half.y <= interior.max.y - interior.min.y
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DragEvent {
    Hover(Option<BodyHandle>),
    StartDrag(BodyHandle),
    EndDrag(BodyHandle),
}

#[derive(Clone, Copy, Debug)]
struct Grab {
    handle: BodyHandle,
    offset: Vec2,
}

/// Spring that pulls a grabbed body's grab point toward the pointer.
#[derive(Debug)]
pub struct DragConstraint {
    stiffness: f32,
    damping: f32,
    pointer: Option<Vec2>,
    grab: Option<Grab>,
    hovered: Option<BodyHandle>,
    events: Vec<DragEvent>,
    attached: bool,
}

impl Default for DragConstraint {
    fn default() -> Self {
        Self {
            stiffness: config::DRAG_STIFFNESS,
            damping: config::DRAG_DAMPING,
            pointer: None,
            grab: None,
            hovered: None,
            events: Vec::new(),
            attached: true,
        }
    }
}

impl DragConstraint {
    pub fn grabbed(&self) -> Option<BodyHandle> {
        self.grab.map(|g| g.handle)
    }

    pub fn hovered(&self) -> Option<BodyHandle> {
        self.hovered
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    fn apply<E: RigidBodyEngine>(&mut self, engine: &mut E, dt: f32) {
        let (Some(grab), Some(pointer)) = (self.grab, self.pointer) else {
            return;
        };
        let Some(state) = engine.state(grab.handle) else {
            self.grab = None;
            self.events.push(DragEvent::EndDrag(grab.handle));
            return;
        };

        let delta = pointer - (state.position + grab.offset);
        let target = delta * (self.stiffness / dt);
        let velocity = target * (1.0 - self.damping) + state.velocity * self.damping;
        engine.set_velocity(grab.handle, velocity);
        engine.set_angle(grab.handle, 0.0);
        engine.set_angular_velocity(grab.handle, 0.0);
    }

    fn detach(&mut self) {
        self.pointer = None;
        self.grab = None;
        self.hovered = None;
        self.events.clear();
        self.attached = false;
    }
}

pub struct PhysicsWorld<E: RigidBodyEngine = ImpulseEngine> {
    engine: E,
    bounds: WorldBounds,
    drag: DragConstraint,
    /// Bodies drifting back inside after ending up behind a wall.
    recalling: Vec<BodyHandle>,
    rng: StdRng,
}

impl PhysicsWorld<ImpulseEngine> {
    pub fn new(width: f32, height: f32, rng: StdRng) -> Self {
        Self::with_engine(ImpulseEngine::new(), width, height, rng)
    }

    pub fn seeded(width: f32, height: f32, seed: u64) -> Self {
        Self::new(width, height, StdRng::seed_from_u64(seed))
    }
}

impl<E: RigidBodyEngine> PhysicsWorld<E> {
    pub fn with_engine(mut engine: E, width: f32, height: f32, rng: StdRng) -> Self {
        engine.set_gravity(Vec2::ZERO);
        let bounds = WorldBounds::build(&mut engine, width, height);
        Self {
            engine,
            bounds,
            drag: DragConstraint::default(),
            recalling: Vec::new(),
            rng,
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn bounds(&self) -> &WorldBounds {
        &self.bounds
    }

    pub fn drag(&self) -> &DragConstraint {
        &self.drag
    }

    pub fn is_recalling(&self, handle: BodyHandle) -> bool {
        self.recalling.contains(&handle)
    }

    /// Rebuilds the walls for a new container size. Thought bodies stay put;
    /// any left behind a wall drift back in over the following steps.
    pub fn resize(&mut self, width: f32, height: f32) {
        for wall in self.bounds.walls {
            self.engine.remove(wall);
        }
        self.bounds = WorldBounds::build(&mut self.engine, width, height);
        tracing::debug!(width, height, "walls rebuilt");
    }

    /// Kicks every listed body in a random direction and stands it upright.
    pub fn apply_shake<I>(&mut self, handles: I)
    where
        I: IntoIterator<Item = BodyHandle>,
    {
        for handle in handles {
            let angle = self.rng.gen_range(0.0..std::f32::consts::TAU);
            let speed = self
                .rng
                .gen_range(config::SHAKE_SPEED_MIN..config::SHAKE_SPEED_MAX);
            self.engine
                .apply_impulse(handle, Vec2::from_angle(angle) * (speed * config::BODY_MASS));
            self.engine.set_angle(handle, 0.0);
            self.engine.set_angular_velocity(handle, 0.0);
        }
    }

    pub fn step(&mut self, dt: f32) {
        if self.drag.attached {
            self.drag.apply(&mut self.engine, dt);
        }
        self.steer_strays(dt);
        self.engine.step(dt);
    }

    /// A body whose centre is outside the walls turns into a ghost and glides
    /// toward the middle of the canvas at [`config::RECALL_SPEED`]. It turns
    /// solid again at the first spot where it fits between the walls. A body
    /// too large for the current walls waits in the middle as a ghost.
    fn steer_strays(&mut self, dt: f32) {
        if !(dt.is_finite() && dt > 0.0) {
            return;
        }
        let interior = self.bounds.interior();
        let home = (interior.min + interior.max) * 0.5;
        let slack = Vec2::new(config::BODY_FIT_SLACK, config::BODY_FIT_SLACK);
        for handle in self.engine.dynamic_handles() {
            let (Some(state), Some(half)) =
                (self.engine.state(handle), self.engine.half_extents(handle))
            else {
                continue;
            };
            let recalling = self.recalling.contains(&handle);
            if !recalling && interior.contains(state.position) {
                continue;
            }

            let padded = half + slack;
            if recalling
                && self.bounds.fits(padded)
                && self.bounds.fit_center(padded, state.position) == state.position
            {
                self.engine.set_velocity(handle, Vec2::ZERO);
                self.engine.set_ghost(handle, false);
                self.recalling.retain(|&h| h != handle);
                tracing::debug!(
                    x = state.position.x,
                    y = state.position.y,
                    "stray body back inside"
                );
                continue;
            }

            let to_home = home - state.position;
            let distance = to_home.length();
            let velocity = if distance > f32::EPSILON {
                to_home * (config::RECALL_SPEED.min(distance / dt) / distance)
            } else {
                Vec2::ZERO
            };
            self.engine.set_velocity(handle, velocity);
            self.engine.set_angle(handle, 0.0);
            self.engine.set_angular_velocity(handle, 0.0);
            if !recalling {
                self.engine.set_ghost(handle, true);
                self.recalling.push(handle);
                tracing::debug!(
                    x = state.position.x,
                    y = state.position.y,
                    "recalling stray body"
                );
            }
        }
        let engine = &self.engine;
        self.recalling.retain(|&h| engine.contains(h));
    }

    /// Topmost candidate under `point`. Later candidates draw on top.
    pub fn hit_test<I>(&self, point: Vec2, candidates: I) -> Option<BodyHandle>
    where
        I: IntoIterator<Item = BodyHandle>,
    {
        candidates
            .into_iter()
            .filter(|&h| self.engine.contains_point(h, point))
            .last()
    }

    pub fn pointer_down<I>(&mut self, point: Vec2, candidates: I)
    where
        I: IntoIterator<Item = BodyHandle>,
    {
        if !self.drag.attached {
            return;
        }
        self.drag.pointer = Some(point);
        let Some(handle) = self.hit_test(point, candidates) else {
            return;
        };
        let Some(state) = self.engine.state(handle) else {
            return;
        };
        self.drag.grab = Some(Grab {
            handle,
            offset: point - state.position,
        });
        self.drag.events.push(DragEvent::StartDrag(handle));
    }

    pub fn pointer_move<I>(&mut self, point: Vec2, candidates: I)
    where
        I: IntoIterator<Item = BodyHandle>,
    {
        if !self.drag.attached {
            return;
        }
        self.drag.pointer = Some(point);
        if self.drag.grab.is_some() {
            return;
        }
        let hovered = self.hit_test(point, candidates);
        if hovered != self.drag.hovered {
            self.drag.hovered = hovered;
            self.drag.events.push(DragEvent::Hover(hovered));
        }
    }

    pub fn pointer_up(&mut self) {
        if let Some(grab) = self.drag.grab.take() {
            self.drag.events.push(DragEvent::EndDrag(grab.handle));
        }
    }

    pub fn drain_drag_events(&mut self) -> Vec<DragEvent> {
        std::mem::take(&mut self.drag.events)
    }

    /// Unhooks pointer input. Pointer calls are ignored afterwards.
    pub fn detach_drag(&mut self) {
        self.drag.detach();
    }

    /// Removes every body, walls included.
    pub fn clear(&mut self) {
        self.engine.clear();
        self.recalling.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f32 = 1.0 / 60.0;

    fn spawn(world: &mut PhysicsWorld, x: f32, y: f32) -> BodyHandle {
        world
            .engine_mut()
            .insert(BodyDesc::dynamic(Vec2::new(x, y), Vec2::new(40.0, 20.0)))
    }

    mod walls {
        use super::*;

        #[test]
        fn four_static_walls_sized_to_container() {
            let world = PhysicsWorld::seeded(800.0, 600.0, 1);
            let walls = world.bounds().walls();
            for wall in walls {
                assert_eq!(world.engine().kind(wall), Some(BodyKind::Static));
            }
            let right = world.engine().state(walls[1]).unwrap().position;
            assert_eq!(right, Vec2::new(800.0, 300.0));
        }

        #[test]
        fn bottom_wall_leaves_input_strip() {
            let world = PhysicsWorld::seeded(800.0, 600.0, 1);
            let bottom = world.bounds().walls()[3];
            let y = world.engine().state(bottom).unwrap().position.y;
            assert_eq!(y, 600.0 - config::INPUT_STRIP);
        }

        #[test]
        fn spawn_area_excludes_margin_and_strip() {
            let world = PhysicsWorld::seeded(800.0, 600.0, 1);
            let area = world.bounds().spawn_area(100.0);
            assert_eq!(area.min, Vec2::new(100.0, 100.0));
            assert_eq!(area.max, Vec2::new(700.0, 600.0 - config::INPUT_STRIP - 100.0));
        }

        #[test]
        fn spawn_area_never_inverts() {
            let world = PhysicsWorld::seeded(40.0, 30.0, 1);
            let area = world.bounds().spawn_area(100.0);
            assert!(area.min.x <= area.max.x);
            assert!(area.min.y <= area.max.y);
        }
    }

    mod resize {
        use super::*;

        #[test]
        fn moves_walls_but_not_thoughts() {
            let mut world = PhysicsWorld::seeded(800.0, 600.0, 1);
            let body = spawn(&mut world, 200.0, 150.0);
            let old_walls = world.bounds().walls();

            world.resize(400.0, 300.0);

            for wall in old_walls {
                assert!(!world.engine().contains(wall));
            }
            let right = world.bounds().walls()[1];
            assert_eq!(
                world.engine().state(right).unwrap().position,
                Vec2::new(400.0, 150.0)
            );
            assert_eq!(
                world.engine().state(body).unwrap().position,
                Vec2::new(200.0, 150.0)
            );
            assert_eq!(world.engine().len(), 5);
        }

        #[test]
        fn bodies_left_outside_drift_back_in() {
            let mut world = PhysicsWorld::seeded(800.0, 600.0, 4);
            let handles: Vec<_> = [
                (613.5, 401.6),
                (476.0, 190.2),
                (318.8, 321.1),
                (464.3, 368.9),
                (707.7, 366.2),
                (150.0, 120.0),
            ]
            .into_iter()
            .map(|(x, y)| spawn(&mut world, x, y))
            .collect();

            world.resize(400.0, 300.0);
            world.step(DT);
            assert!(world.is_recalling(handles[0]));
            assert!(!world.is_recalling(handles[5]));

            for _ in 0..600 {
                world.step(DT);
            }
            let interior = world.bounds().interior();
            for h in &handles {
                let p = world.engine().state(*h).unwrap().position;
                assert!(interior.contains(p), "stranded at {p:?}");
                assert!(!world.is_recalling(*h));
            }
        }

        #[test]
        fn returned_bodies_are_solid_again() {
            let mut world = PhysicsWorld::seeded(800.0, 600.0, 8);
            let h = spawn(&mut world, 700.0, 200.0);
            world.resize(400.0, 300.0);
            for _ in 0..120 {
                world.step(DT);
            }
            assert!(!world.is_recalling(h));

            world.engine_mut().set_velocity(h, Vec2::new(900.0, 0.0));
            for _ in 0..10 {
                world.step(DT);
            }
            let state = world.engine().state(h).unwrap();
            assert!(state.position.x <= world.bounds().interior().max.x - 40.0 + 1e-3);
        }

        #[test]
        fn oversized_body_waits_in_the_middle() {
            let mut world = PhysicsWorld::seeded(800.0, 600.0, 2);
            let h = world
                .engine_mut()
                .insert(BodyDesc::dynamic(Vec2::new(400.0, 200.0), Vec2::new(300.0, 20.0)));
            world.resize(400.0, 300.0);
            for _ in 0..120 {
                world.step(DT);
            }
            assert!(world.is_recalling(h));
            let p = world.engine().state(h).unwrap().position;
            assert!((p.x - 200.0).abs() < 1.0, "x = {}", p.x);
        }
    }

    mod bounds {
        use super::*;

        #[test]
        fn interior_is_inside_wall_faces() {
            let world = PhysicsWorld::seeded(800.0, 600.0, 1);
            let interior = world.bounds().interior();
            let half_t = config::WALL_THICKNESS / 2.0;
            assert_eq!(interior.min, Vec2::new(half_t, half_t));
            assert_eq!(
                interior.max,
                Vec2::new(800.0 - half_t, 600.0 - config::INPUT_STRIP - half_t)
            );
        }

        #[test]
        fn fit_center_pulls_bodies_clear_of_walls() {
            let world = PhysicsWorld::seeded(800.0, 600.0, 1);
            let half = Vec2::new(40.0, 20.0);
            let fitted = world.bounds().fit_center(half, Vec2::new(-100.0, 1000.0));
            let interior = world.bounds().interior();
            assert_eq!(fitted.x, interior.min.x + 40.0);
            assert_eq!(fitted.y, interior.max.y - 20.0);
            assert!(world.bounds().fits(half));
            assert!(!world.bounds().fits(Vec2::new(500.0, 20.0)));
        }
    }

    mod apply_shake {
        use super::*;

        #[test]
        fn perturbs_velocity_and_keeps_bodies_upright() {
            let mut world = PhysicsWorld::seeded(800.0, 600.0, 9);
            let a = spawn(&mut world, 200.0, 200.0);
            let b = spawn(&mut world, 500.0, 300.0);
            world.engine_mut().set_angle(a, 0.7);
            world.engine_mut().set_angular_velocity(b, 2.0);

            world.apply_shake([a, b]);

            for h in [a, b] {
                let state = world.engine().state(h).unwrap();
                assert!(state.velocity.length() >= config::SHAKE_SPEED_MIN - 1e-3);
                assert_eq!(state.angle, 0.0);
                assert_eq!(state.angular_velocity, 0.0);
            }
        }

        #[test]
        fn shaken_bodies_stay_inside_walls() {
            let mut world = PhysicsWorld::seeded(800.0, 600.0, 3);
            let handles: Vec<_> = (0..6)
                .map(|i| spawn(&mut world, 150.0 + i as f32 * 90.0, 250.0))
                .collect();
            for _ in 0..5 {
                world.apply_shake(handles.iter().copied());
                for _ in 0..60 {
                    world.step(DT);
                }
            }
            for h in handles {
                let p = world.engine().state(h).unwrap().position;
                assert!(p.x > 0.0 && p.x < 800.0, "x escaped: {}", p.x);
                assert!(p.y > 0.0 && p.y < 600.0 - config::INPUT_STRIP, "y escaped: {}", p.y);
            }
        }
    }

    mod drag {
        use super::*;

        #[test]
        fn grab_pull_release() {
            let mut world = PhysicsWorld::seeded(800.0, 600.0, 1);
            let h = spawn(&mut world, 200.0, 200.0);

            world.pointer_down(Vec2::new(205.0, 200.0), [h]);
            assert_eq!(world.drag().grabbed(), Some(h));
            world.pointer_move(Vec2::new(400.0, 200.0), [h]);
            for _ in 0..30 {
                world.step(DT);
            }
            assert!(world.engine().state(h).unwrap().position.x > 300.0);

            world.pointer_up();
            assert_eq!(world.drag().grabbed(), None);
            assert_eq!(
                world.drain_drag_events(),
                vec![DragEvent::StartDrag(h), DragEvent::EndDrag(h)]
            );
        }

        #[test]
        fn hover_reports_changes_only() {
            let mut world = PhysicsWorld::seeded(800.0, 600.0, 1);
            let h = spawn(&mut world, 200.0, 200.0);
            world.pointer_move(Vec2::new(200.0, 200.0), [h]);
            world.pointer_move(Vec2::new(201.0, 200.0), [h]);
            world.pointer_move(Vec2::new(600.0, 500.0), [h]);
            assert_eq!(
                world.drain_drag_events(),
                vec![DragEvent::Hover(Some(h)), DragEvent::Hover(None)]
            );
        }

        #[test]
        fn pressing_empty_space_grabs_nothing() {
            let mut world = PhysicsWorld::seeded(800.0, 600.0, 1);
            let h = spawn(&mut world, 200.0, 200.0);
            world.pointer_down(Vec2::new(600.0, 400.0), [h]);
            assert_eq!(world.drag().grabbed(), None);
            assert!(world.drain_drag_events().is_empty());
        }

        #[test]
        fn removed_body_releases_grab() {
            let mut world = PhysicsWorld::seeded(800.0, 600.0, 1);
            let h = spawn(&mut world, 200.0, 200.0);
            world.pointer_down(Vec2::new(200.0, 200.0), [h]);
            world.engine_mut().remove(h);
            world.step(DT);
            assert_eq!(world.drag().grabbed(), None);
            assert_eq!(
                world.drain_drag_events(),
                vec![DragEvent::StartDrag(h), DragEvent::EndDrag(h)]
            );
        }

        #[test]
        fn detached_constraint_ignores_pointer() {
            let mut world = PhysicsWorld::seeded(800.0, 600.0, 1);
            let h = spawn(&mut world, 200.0, 200.0);
            world.detach_drag();
            world.pointer_down(Vec2::new(200.0, 200.0), [h]);
            assert!(!world.drag().is_attached());
            assert_eq!(world.drag().grabbed(), None);
            assert!(world.drain_drag_events().is_empty());
        }
    }
}
