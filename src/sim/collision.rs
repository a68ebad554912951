//! Overlap tests between hitbox volumes and trigger volumes

use glam::Vec3;
use serde::{Deserialize, Serialize};

use super::hitbox::{Hitbox, HitboxShape};

/// Result of an overlap check
#[derive(Debug, Clone)]
pub struct CollisionResult {
    /// Whether the volumes overlap
    pub hit: bool,
    /// Direction from `b` toward `a` (zero if centers coincide)
    pub normal: Vec3,
    /// Overlap depth along the normal
    pub penetration: f32,
}

impl CollisionResult {
    pub fn miss() -> Self {
        Self {
            hit: false,
            normal: Vec3::ZERO,
            penetration: 0.0,
        }
    }

    fn hit(normal: Vec3, penetration: f32) -> Self {
        Self {
            hit: true,
            normal,
            penetration,
        }
    }
}

/// Check overlap between two shapes placed at `a_pos` and `b_pos`.
///
/// Touching counts as a miss so resting contact does not re-trigger.
pub fn shapes_overlap(a_pos: Vec3, a: &HitboxShape, b_pos: Vec3, b: &HitboxShape) -> CollisionResult {
    match (*a, *b) {
        (HitboxShape::Sphere { radius: ra }, HitboxShape::Sphere { radius: rb }) => {
            let delta = a_pos - b_pos;
            let dist = delta.length();
            let reach = ra + rb;
            if dist < reach {
                CollisionResult::hit(delta.normalize_or_zero(), reach - dist)
            } else {
                CollisionResult::miss()
            }
        }
        (HitboxShape::Box { half_extents: ha }, HitboxShape::Box { half_extents: hb }) => {
            let delta = a_pos - b_pos;
            let overlap = (ha + hb) - delta.abs();
            if overlap.min_element() <= 0.0 {
                return CollisionResult::miss();
            }
            // Separate along the axis of least overlap
            let axis = if overlap.x <= overlap.y && overlap.x <= overlap.z {
                Vec3::X * delta.x.signum()
            } else if overlap.y <= overlap.z {
                Vec3::Y * delta.y.signum()
            } else {
                Vec3::Z * delta.z.signum()
            };
            CollisionResult::hit(axis, overlap.min_element())
        }
        (HitboxShape::Sphere { radius }, HitboxShape::Box { half_extents }) => {
            sphere_box(a_pos, radius, b_pos, half_extents)
        }
        (HitboxShape::Box { half_extents }, HitboxShape::Sphere { radius }) => {
            let mut res = sphere_box(b_pos, radius, a_pos, half_extents);
            res.normal = -res.normal;
            res
        }
    }
}

fn sphere_box(center: Vec3, radius: f32, box_pos: Vec3, half_extents: Vec3) -> CollisionResult {
    let closest = center.clamp(box_pos - half_extents, box_pos + half_extents);
    let delta = center - closest;
    let dist = delta.length();
    if dist < radius {
        CollisionResult::hit(delta.normalize_or_zero(), radius - dist)
    } else {
        CollisionResult::miss()
    }
}

/// Overlap between two enabled hitboxes
pub fn hitboxes_overlap(a: &Hitbox, b: &Hitbox) -> CollisionResult {
    if !a.enabled || !b.enabled {
        return CollisionResult::miss();
    }
    shapes_overlap(a.position, &a.config.shape, b.position, &b.config.shape)
}

/// What happens to combat entities entering a volume
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VolumeKind {
    /// Instantly kills anything with health
    Kill,
    /// Reaching it wins the game
    Goal,
}

/// Axis-aligned trigger volume, only evaluated by the authority
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Volume {
    pub kind: VolumeKind,
    pub min: Vec3,
    pub max: Vec3,
}

impl Volume {
    pub fn new(kind: VolumeKind, a: Vec3, b: Vec3) -> Self {
        Self {
            kind,
            min: a.min(b),
            max: a.max(b),
        }
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn half_extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    /// Whether a hitbox overlaps this volume
    pub fn overlaps(&self, hitbox: &Hitbox) -> bool {
        let shape = HitboxShape::Box {
            half_extents: self.half_extents(),
        };
        shapes_overlap(hitbox.position, &hitbox.config.shape, self.center(), &shape).hit
    }
}
