//! Rigid-body integrator behind a small port.
//!
//! [`RigidBodyEngine`] is the only surface the rest of the crate touches, so
//! the integrator can be swapped without the registry or the world noticing.
//! [`ImpulseEngine`] is the bundled implementation: axis-aligned boxes,
//! sequential impulses, infinite rotational inertia.

use crate::{
    config,
    spatial::{Aabb, SpatialHash},
    types::{BodyState, Vec2},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BodyHandle {
    index: u32,
    generation: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BodyKind {
    Static,
    Dynamic,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Material {
    pub friction: f32,
    /// Fraction of velocity lost per 1/60 s.
    pub friction_air: f32,
    pub restitution: f32,
    pub mass: f32,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            friction: config::BODY_FRICTION,
            friction_air: config::BODY_AIR_FRICTION,
            restitution: config::BODY_RESTITUTION,
            mass: config::BODY_MASS,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BodyDesc {
    pub kind: BodyKind,
    pub position: Vec2,
    pub half_extents: Vec2,
    pub velocity: Vec2,
    pub angle: f32,
    pub material: Material,
}

impl BodyDesc {
    pub fn dynamic(position: Vec2, half_extents: Vec2) -> Self {
        Self {
            kind: BodyKind::Dynamic,
            position,
            half_extents,
            velocity: Vec2::ZERO,
            angle: 0.0,
            material: Material::default(),
        }
    }

    pub fn fixed(position: Vec2, half_extents: Vec2) -> Self {
        Self {
            kind: BodyKind::Static,
            ..Self::dynamic(position, half_extents)
        }
    }

    pub fn with_velocity(mut self, velocity: Vec2) -> Self {
        self.velocity = velocity;
        self
    }
}

pub trait RigidBodyEngine {
    fn insert(&mut self, desc: BodyDesc) -> BodyHandle;

    /// Returns `false` if the handle was already gone.
    fn remove(&mut self, handle: BodyHandle) -> bool;

    fn state(&self, handle: BodyHandle) -> Option<BodyState>;

    fn half_extents(&self, handle: BodyHandle) -> Option<Vec2>;

    fn kind(&self, handle: BodyHandle) -> Option<BodyKind>;

    /// Accumulated until the next `step`.
    fn apply_force(&mut self, handle: BodyHandle, force: Vec2);

    /// Immediate change in momentum.
    fn apply_impulse(&mut self, handle: BodyHandle, impulse: Vec2);

    fn set_position(&mut self, handle: BodyHandle, position: Vec2);

    fn set_velocity(&mut self, handle: BodyHandle, velocity: Vec2);

    fn set_angle(&mut self, handle: BodyHandle, angle: f32);

    fn set_angular_velocity(&mut self, handle: BodyHandle, angular_velocity: f32);

    fn set_gravity(&mut self, gravity: Vec2);

    /// Ghost bodies still move but take part in no contacts.
    fn set_ghost(&mut self, handle: BodyHandle, ghost: bool);

    fn dynamic_handles(&self) -> Vec<BodyHandle>;

    fn step(&mut self, dt: f32);

    /// Drops every body. Handles issued before stay invalid.
    fn clear(&mut self);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn contains(&self, handle: BodyHandle) -> bool {
        self.state(handle).is_some()
    }

    fn contains_point(&self, handle: BodyHandle, point: Vec2) -> bool {
        match (self.state(handle), self.half_extents(handle)) {
            (Some(state), Some(half)) => {
                let local = (point - state.position).rotate(-state.angle);
                local.x.abs() <= half.x && local.y.abs() <= half.y
            }
            _ => false,
        }
    }
}

#[derive(Clone, Debug)]
struct Body {
    kind: BodyKind,
    pos: Vec2,
    vel: Vec2,
    angle: f32,
    ang_vel: f32,
    half: Vec2,
    inv_mass: f32,
    force: Vec2,
    material: Material,
    ghost: bool,
}

impl Body {
    fn aabb(&self) -> Aabb {
        Aabb::from_center(self.pos, self.half)
    }

    fn is_dynamic(&self) -> bool {
        self.kind == BodyKind::Dynamic
    }
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    body: Option<Body>,
}

#[derive(Debug)]
pub struct ImpulseEngine {
    slots: Vec<Slot>,
    free: Vec<u32>,
    gravity: Vec2,
    spatial: SpatialHash,
    neighbors: Vec<usize>,
    live: usize,
}

impl Default for ImpulseEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ImpulseEngine {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            gravity: Vec2::ZERO,
            spatial: SpatialHash::new(config::BROAD_PHASE_CELL),
            neighbors: Vec::new(),
            live: 0,
        }
    }

    fn body(&self, handle: BodyHandle) -> Option<&Body> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.body.as_ref())
    }

    fn body_mut(&mut self, handle: BodyHandle) -> Option<&mut Body> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.body.as_mut())
    }

    fn integrate(&mut self, dt: f32) {
        let gravity = self.gravity;
        for body in self.slots.iter_mut().filter_map(|s| s.body.as_mut()) {
            if !body.is_dynamic() {
                body.force = Vec2::ZERO;
                continue;
            }
            body.vel += (gravity + body.force * body.inv_mass) * dt;
            body.force = Vec2::ZERO;

            let keep = (1.0 - body.material.friction_air).clamp(0.0, 1.0).powf(dt * 60.0);
            body.vel = body.vel * keep;
            body.ang_vel *= keep;

            body.pos += body.vel * dt;
            body.angle += body.ang_vel * dt;
        }
    }

    fn resolve_collisions(&mut self) {
        self.spatial.rebuild(
            self.slots
                .iter()
                .enumerate()
                .filter_map(|(i, s)| s.body.as_ref().map(|b| (i, b.aabb()))),
        );

        for i in 0..self.slots.len() {
            let aabb = match &self.slots[i].body {
                Some(body) if body.is_dynamic() && !body.ghost => body.aabb(),
                _ => continue,
            };
            self.spatial.query(&aabb, &mut self.neighbors);
            for &j in &self.neighbors {
                if j == i {
                    continue;
                }
                let (a, b) = pair_mut(&mut self.slots, i, j);
                let (Some(a), Some(b)) = (a, b) else {
                    continue;
                };
                if b.ghost {
                    continue;
                }
                // Dynamic pairs are handled once, from the lower slot.
                if b.is_dynamic() && j < i {
                    continue;
                }
                resolve_pair(a, b);
            }
        }
    }
}

fn pair_mut(slots: &mut [Slot], i: usize, j: usize) -> (Option<&mut Body>, Option<&mut Body>) {
    debug_assert!(i != j);
    if i < j {
        let (left, right) = slots.split_at_mut(j);
        (left[i].body.as_mut(), right[0].body.as_mut())
    } else {
        let (left, right) = slots.split_at_mut(i);
        (right[0].body.as_mut(), left[j].body.as_mut())
    }
}

fn resolve_pair(a: &mut Body, b: &mut Body) {
    let delta = b.pos - a.pos;
    let overlap_x = a.half.x + b.half.x - delta.x.abs();
    let overlap_y = a.half.y + b.half.y - delta.y.abs();
    if overlap_x <= 0.0 || overlap_y <= 0.0 {
        return;
    }

    let (normal, depth) = if overlap_x < overlap_y {
        (Vec2::new(if delta.x < 0.0 { -1.0 } else { 1.0 }, 0.0), overlap_x)
    } else {
        (Vec2::new(0.0, if delta.y < 0.0 { -1.0 } else { 1.0 }), overlap_y)
    };

    let inv_a = if a.is_dynamic() { a.inv_mass } else { 0.0 };
    let inv_b = if b.is_dynamic() { b.inv_mass } else { 0.0 };
    let inv_sum = inv_a + inv_b;
    if inv_sum <= 0.0 {
        return;
    }

    a.pos -= normal * (depth * inv_a / inv_sum);
    b.pos += normal * (depth * inv_b / inv_sum);

    let rel = b.vel - a.vel;
    let rel_normal = rel.dot(normal);
    if rel_normal >= 0.0 {
        return;
    }

    let restitution = a.material.restitution.max(b.material.restitution);
    let jn = -(1.0 + restitution) * rel_normal / inv_sum;
    a.vel -= normal * (jn * inv_a);
    b.vel += normal * (jn * inv_b);

    let tangent = normal.perp();
    let rel_tangent = (b.vel - a.vel).dot(tangent);
    let mu = a.material.friction.min(b.material.friction);
    let jt = (-rel_tangent / inv_sum).clamp(-mu * jn, mu * jn);
    a.vel -= tangent * (jt * inv_a);
    b.vel += tangent * (jt * inv_b);
}

impl RigidBodyEngine for ImpulseEngine {
    fn insert(&mut self, desc: BodyDesc) -> BodyHandle {
        let inv_mass = match desc.kind {
            BodyKind::Dynamic if desc.material.mass > 0.0 => 1.0 / desc.material.mass,
            _ => 0.0,
        };
        let body = Body {
            kind: desc.kind,
            pos: desc.position,
            vel: desc.velocity,
            angle: desc.angle,
            ang_vel: 0.0,
            half: desc.half_extents,
            inv_mass,
            force: Vec2::ZERO,
            material: desc.material,
            ghost: false,
        };

        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.body = Some(body);
            return BodyHandle {
                index,
                generation: slot.generation,
            };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            body: Some(body),
        });
        BodyHandle {
            index,
            generation: 0,
        }
    }

    fn remove(&mut self, handle: BodyHandle) -> bool {
        let Some(slot) = self.slots.get_mut(handle.index as usize) else {
            return false;
        };
        if slot.generation != handle.generation || slot.body.is_none() {
            return false;
        }
        slot.body = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        self.live -= 1;
        true
    }

    fn state(&self, handle: BodyHandle) -> Option<BodyState> {
        self.body(handle).map(|b| BodyState {
            position: b.pos,
            velocity: b.vel,
            angle: b.angle,
            angular_velocity: b.ang_vel,
        })
    }

    fn half_extents(&self, handle: BodyHandle) -> Option<Vec2> {
        self.body(handle).map(|b| b.half)
    }

    fn kind(&self, handle: BodyHandle) -> Option<BodyKind> {
        self.body(handle).map(|b| b.kind)
    }

    fn apply_force(&mut self, handle: BodyHandle, force: Vec2) {
        if let Some(body) = self.body_mut(handle) {
            body.force += force;
        }
    }

    fn apply_impulse(&mut self, handle: BodyHandle, impulse: Vec2) {
        if let Some(body) = self.body_mut(handle) {
            body.vel += impulse * body.inv_mass;
        }
    }

    fn set_position(&mut self, handle: BodyHandle, position: Vec2) {
        if let Some(body) = self.body_mut(handle) {
            body.pos = position;
        }
    }

    fn set_velocity(&mut self, handle: BodyHandle, velocity: Vec2) {
        if let Some(body) = self.body_mut(handle) {
            if body.is_dynamic() {
                body.vel = velocity;
            }
        }
    }

    fn set_angle(&mut self, handle: BodyHandle, angle: f32) {
        if let Some(body) = self.body_mut(handle) {
            body.angle = angle;
        }
    }

    fn set_angular_velocity(&mut self, handle: BodyHandle, angular_velocity: f32) {
        if let Some(body) = self.body_mut(handle) {
            if body.is_dynamic() {
                body.ang_vel = angular_velocity;
            }
        }
    }

    fn set_gravity(&mut self, gravity: Vec2) {
        self.gravity = gravity;
    }

    fn set_ghost(&mut self, handle: BodyHandle, ghost: bool) {
        if let Some(body) = self.body_mut(handle) {
            body.ghost = ghost;
        }
    }

    fn dynamic_handles(&self) -> Vec<BodyHandle> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| {
                slot.body
                    .as_ref()
                    .filter(|b| b.is_dynamic())
                    .map(|_| BodyHandle {
                        index: index as u32,
                        generation: slot.generation,
                    })
            })
            .collect()
    }

    fn step(&mut self, dt: f32) {
        if !(dt.is_finite() && dt > 0.0) {
            return;
        }
        self.integrate(dt);
        self.resolve_collisions();
    }

    fn clear(&mut self) {
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.body.take().is_some() {
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(index as u32);
            }
        }
        self.spatial.clear();
        self.live = 0;
    }

    fn len(&self) -> usize {
        self.live
    }
}
