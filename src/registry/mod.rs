use std::collections::{BTreeMap, HashSet};

use rand::{Rng, rngs::StdRng};

use crate::{
    config,
    format,
    physics::{BodyDesc, BodyHandle, PhysicsWorld, RigidBodyEngine},
    render::{self, DrawSurface},
    types::{PositionMap, Thought, ThoughtId, Vec2},
};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Entry {
    pub handle: BodyHandle,
    /// Full width and height, fixed at creation.
    pub extents: Vec2,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub created: Vec<ThoughtId>,
    pub removed: Vec<ThoughtId>,
}

impl SyncReport {
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.removed.is_empty()
    }
}

/// Owns the thought id -> body table. Every insertion and removal goes
/// through [`BodyRegistry::sync`], so the live body set always mirrors the
/// last thought list it saw.
pub struct BodyRegistry {
    entries: BTreeMap<ThoughtId, Entry>,
    rng: StdRng,
}

impl BodyRegistry {
    pub fn new(rng: StdRng) -> Self {
        Self {
            entries: BTreeMap::new(),
            rng,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: ThoughtId) -> Option<&Entry> {
        self.entries.get(&id)
    }

    pub fn handle(&self, id: ThoughtId) -> Option<BodyHandle> {
        self.entries.get(&id).map(|e| e.handle)
    }

    pub fn ids(&self) -> impl Iterator<Item = ThoughtId> + '_ {
        self.entries.keys().copied()
    }

    pub fn handles(&self) -> impl Iterator<Item = BodyHandle> + '_ {
        self.entries.values().map(|e| e.handle)
    }

    /// Creates bodies for unseen ids and removes bodies whose ids are gone.
    /// `surface` supplies text metrics; without it, bodies get minimum extents.
    pub fn sync<E: RigidBodyEngine>(
        &mut self,
        thoughts: &[Thought],
        world: &mut PhysicsWorld<E>,
        mut surface: Option<&mut (dyn DrawSurface + '_)>,
    ) -> SyncReport {
        let mut report = SyncReport::default();
        let live: HashSet<ThoughtId> = thoughts.iter().map(|t| t.id).collect();

        let stale: Vec<ThoughtId> = self
            .entries
            .keys()
            .filter(|id| !live.contains(*id))
            .copied()
            .collect();
        for id in stale {
            if let Some(entry) = self.entries.remove(&id) {
                world.engine_mut().remove(entry.handle);
                tracing::debug!(%id, "body removed");
                report.removed.push(id);
            }
        }

        for thought in thoughts {
            if self.entries.contains_key(&thought.id) {
                continue;
            }
            let room = world.bounds().max_body_extents();
            let measured = measure_extents(thought, surface.as_deref_mut());
            let extents = Vec2::new(measured.x.min(room.x), measured.y.min(room.y));
            if extents != measured {
                tracing::debug!(id = %thought.id, width = measured.x, "body clamped to canvas");
            }
            let position = self.pick_spawn(world, extents);
            let velocity = Vec2::new(
                self.rng
                    .gen_range(-config::SPAWN_SPEED_MAX..=config::SPAWN_SPEED_MAX),
                self.rng
                    .gen_range(-config::SPAWN_SPEED_MAX..=config::SPAWN_SPEED_MAX),
            );
            let handle = world.engine_mut().insert(
                BodyDesc::dynamic(position, extents * 0.5).with_velocity(velocity),
            );
            self.entries.insert(thought.id, Entry { handle, extents });
            tracing::debug!(id = %thought.id, x = position.x, y = position.y, "body created");
            report.created.push(thought.id);
        }

        report
    }

    pub fn snapshot_positions<E: RigidBodyEngine>(&self, world: &PhysicsWorld<E>) -> PositionMap {
        self.entries
            .iter()
            .filter_map(|(&id, entry)| {
                world
                    .engine()
                    .state(entry.handle)
                    .map(|state| (id, state.position))
            })
            .collect()
    }

    /// Moves every registered body that has an entry in `positions` and stands
    /// it still and upright. Bodies without an entry are left where they are.
    pub fn restore_positions<E: RigidBodyEngine>(
        &self,
        positions: &PositionMap,
        world: &mut PhysicsWorld<E>,
    ) -> usize {
        let mut restored = 0;
        for (id, entry) in &self.entries {
            let Some(&position) = positions.get(id) else {
                continue;
            };
            let engine = world.engine_mut();
            engine.set_position(entry.handle, position);
            engine.set_velocity(entry.handle, Vec2::ZERO);
            engine.set_angular_velocity(entry.handle, 0.0);
            engine.set_angle(entry.handle, 0.0);
            restored += 1;
        }
        restored
    }

    /// Drops every body this registry created.
    pub fn clear<E: RigidBodyEngine>(&mut self, world: &mut PhysicsWorld<E>) {
        for entry in self.entries.values() {
            world.engine_mut().remove(entry.handle);
        }
        self.entries.clear();
    }

    /// Random point in the spawn area, pulled in far enough that a body of
    /// `extents` starts clear of the walls.
    fn pick_spawn<E: RigidBodyEngine>(&mut self, world: &PhysicsWorld<E>, extents: Vec2) -> Vec2 {
        let bounds = world.bounds();
        let area = bounds.spawn_area(config::SPAWN_MARGIN);
        let x = if area.min.x < area.max.x {
            self.rng.gen_range(area.min.x..area.max.x)
        } else {
            area.min.x
        };
        let y = if area.min.y < area.max.y {
            self.rng.gen_range(area.min.y..area.max.y)
        } else {
            area.min.y
        };
        let slack = Vec2::new(config::BODY_FIT_SLACK, config::BODY_FIT_SLACK);
        bounds.fit_center(extents * 0.5 + slack, Vec2::new(x, y))
    }
}

/// Full body size for a thought: measured text plus padding, never smaller
/// than the minimum footprint.
pub fn measure_extents(thought: &Thought, surface: Option<&mut (dyn DrawSurface + '_)>) -> Vec2 {
    let fallback = Vec2::new(config::BODY_MIN_WIDTH, config::BODY_MIN_HEIGHT);
    let Some(surface) = surface else {
        tracing::debug!(id = %thought.id, "no surface, using fallback extents");
        return fallback;
    };

    let segments = format::parse(&thought.text);
    let base_px = thought.size.font_px();
    let Some(text_width) = render::measure_run(surface, &segments, base_px) else {
        tracing::debug!(id = %thought.id, "text metrics unavailable, using fallback extents");
        return fallback;
    };

    let line_height = segments
        .iter()
        .map(|s| render::Font::for_emphasis(base_px, s.emphasis).size_px)
        .fold(base_px, f32::max)
        * config::LINE_HEIGHT;

    Vec2::new(
        (text_width + 2.0 * config::BODY_PADDING).max(config::BODY_MIN_WIDTH),
        (line_height + 2.0 * config::BODY_PADDING).max(config::BODY_MIN_HEIGHT),
    )
}
