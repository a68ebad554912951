//! Combat hitboxes and the collision authority protocol
//!
//! Both hitboxes of an overlapping pair see the overlap. Exactly one of them
//! is picked to resolve it (see [`Hitbox::should_process`]); it computes the
//! outcome for both sides and the other side only receives the result.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use super::role::{Controller, NetMode, resolves_locally};
use super::state::EntityId;
use crate::consts::*;
use crate::lerp;

/// Network-visible hitbox identifier, assigned by the authority
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HitboxId(pub i32);

impl HitboxId {
    /// Not yet assigned by the authority
    pub const INVALID: HitboxId = HitboxId(-1);

    pub fn is_valid(self) -> bool {
        self.0 >= 0
    }
}

impl Default for HitboxId {
    fn default() -> Self {
        Self::INVALID
    }
}

/// Coarse team alignment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Hostility {
    #[default]
    Neutral,
    Friendly,
    Enemy,
}

impl Hostility {
    /// Total order used to pick the processing side (higher processes)
    pub fn rank(self) -> u8 {
        match self {
            Hostility::Neutral => 0,
            Hostility::Enemy => 1,
            Hostility::Friendly => 2,
        }
    }

    /// Collision profile name for overlap filtering
    pub fn profile(self) -> &'static str {
        match self {
            Hostility::Neutral => "NeutralHitbox",
            Hostility::Friendly => "FriendlyHitbox",
            Hostility::Enemy => "EnemyHitbox",
        }
    }
}

/// Hitbox volume, centered on the hitbox position
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum HitboxShape {
    Sphere { radius: f32 },
    Box { half_extents: Vec3 },
}

impl HitboxShape {
    /// Half of the vertical extent
    pub fn half_height(&self) -> f32 {
        match *self {
            HitboxShape::Sphere { radius } => radius,
            HitboxShape::Box { half_extents } => half_extents.z,
        }
    }

    /// Radius of the enclosing sphere
    pub fn bounding_radius(&self) -> f32 {
        match *self {
            HitboxShape::Sphere { radius } => radius,
            HitboxShape::Box { half_extents } => half_extents.length(),
        }
    }

    fn validated(self) -> Self {
        match self {
            HitboxShape::Sphere { radius } => HitboxShape::Sphere {
                radius: radius.max(0.0),
            },
            HitboxShape::Box { half_extents } => HitboxShape::Box {
                half_extents: half_extents.max(Vec3::ZERO),
            },
        }
    }
}

/// Per-hitbox combat configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HitboxConfig {
    /// Launches whatever lands on it
    pub bouncy: bool,
    pub bounce_impulse: Vec3,
    /// Owner accepts being launched
    pub can_be_bounced: bool,
    pub deals_damage: bool,
    pub damage: f32,
    pub can_be_damaged: bool,
    /// Fraction of the vertical extent that counts as "on top"
    pub threshold_fraction: f32,
    pub shape: HitboxShape,
}

impl Default for HitboxConfig {
    fn default() -> Self {
        Self {
            bouncy: true,
            bounce_impulse: Vec3::new(0.0, 0.0, DEFAULT_BOUNCE_IMPULSE_Z),
            can_be_bounced: false,
            deals_damage: true,
            damage: DEFAULT_DAMAGE,
            can_be_damaged: true,
            threshold_fraction: DEFAULT_THRESHOLD_FRACTION,
            shape: HitboxShape::Sphere {
                radius: DEFAULT_HITBOX_RADIUS,
            },
        }
    }
}

impl HitboxConfig {
    pub fn validated(mut self) -> Self {
        self.threshold_fraction = self.threshold_fraction.clamp(0.0, 1.0);
        self.damage = self.damage.max(0.0);
        self.shape = self.shape.validated();
        self
    }
}

/// Bounce and damage applied to one side of a collision
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Effect {
    pub impulse: Vec3,
    pub damage: f32,
}

impl Effect {
    pub const NONE: Effect = Effect {
        impulse: Vec3::ZERO,
        damage: 0.0,
    };

    pub fn is_none(&self) -> bool {
        self.impulse == Vec3::ZERO && self.damage == 0.0
    }
}

/// Role assignment of a resolved collision, from the processor's side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CollisionOutcome {
    pub bounced_this: bool,
    pub bounced_other: bool,
    pub damaged_this: bool,
    pub damaged_other: bool,
}

impl CollisionOutcome {
    /// Same outcome seen from the other hitbox
    pub fn mirrored(self) -> Self {
        Self {
            bounced_this: self.bounced_other,
            bounced_other: self.bounced_this,
            damaged_this: self.damaged_other,
            damaged_other: self.damaged_this,
        }
    }

    pub fn is_empty(&self) -> bool {
        !(self.bounced_this || self.bounced_other || self.damaged_this || self.damaged_other)
    }
}

/// Result of [`Hitbox::process_collision`]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CollisionResolution {
    /// Processor landed above the other hitbox's threshold
    pub above: bool,
    pub outcome: CollisionOutcome,
    /// Effect on the processor, gated for this machine
    pub to_this: Effect,
    /// Effect on the other hitbox, gated for this machine
    pub to_other: Effect,
}

/// A combat volume attached to an entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hitbox {
    pub id: HitboxId,
    pub owner: EntityId,
    /// Controller of the owning entity on this machine
    pub owner_controller: Controller,
    pub hostility: Hostility,
    pub config: HitboxConfig,
    /// World-space center
    pub position: Vec3,
    pub enabled: bool,
}

impl Hitbox {
    pub fn new(owner: EntityId, owner_controller: Controller, hostility: Hostility, config: HitboxConfig) -> Self {
        Self {
            id: HitboxId::INVALID,
            owner,
            owner_controller,
            hostility,
            config: config.validated(),
            position: Vec3::ZERO,
            enabled: true,
        }
    }

    pub fn enable(&mut self) {
        self.enabled = true;
    }

    pub fn disable(&mut self) {
        self.enabled = false;
    }

    pub fn min_z(&self) -> f32 {
        self.position.z - self.config.shape.half_height()
    }

    pub fn max_z(&self) -> f32 {
        self.position.z + self.config.shape.half_height()
    }

    pub fn radius(&self) -> f32 {
        self.config.shape.bounding_radius()
    }

    /// Height another hitbox's bottom must clear to count as landing on this one
    pub fn threshold_height(&self) -> f32 {
        lerp(
            self.min_z(),
            self.max_z(),
            self.config.threshold_fraction.clamp(0.0, 1.0),
        )
    }

    /// Pawns are only bounced where they are locally controlled, since the
    /// bounce has to be predicted by whoever moves them.
    pub fn can_be_bounced(&self, mode: NetMode) -> bool {
        if !self.config.can_be_bounced {
            return false;
        }
        if self.owner_controller.is_pawn() {
            return self.owner_controller.is_locally_controlled(mode);
        }
        true
    }

    /// Damage is only ever applied by the authority
    pub fn can_be_damaged(&self, mode: NetMode) -> bool {
        self.config.can_be_damaged && mode.has_authority()
    }

    /// Whether this hitbox resolves its overlap with `other` on this machine.
    ///
    /// Complementary across the pair: when hostility differs and the pair
    /// resolves locally, exactly one side returns true.
    pub fn should_process(&self, other: &Hitbox, mode: NetMode) -> bool {
        if !self.enabled || !other.enabled {
            return false;
        }
        if self.hostility == other.hostility {
            return false;
        }
        if self.hostility.rank() <= other.hostility.rank() {
            return false;
        }
        resolves_locally(mode, self.owner_controller, other.owner_controller)
    }

    /// Resolve a collision with `other`, with `self` as the processor
    pub fn process_collision(&self, other: &Hitbox, mode: NetMode) -> CollisionResolution {
        let above = self.min_z() > other.threshold_height();
        let mut res = CollisionResolution {
            above,
            ..Default::default()
        };

        if above {
            res.outcome.damaged_other = self.config.deals_damage && other.config.can_be_damaged;
            res.outcome.bounced_this = self.config.can_be_bounced && other.config.bouncy;
            if res.outcome.damaged_other && other.can_be_damaged(mode) {
                res.to_other.damage = self.config.damage;
            }
            if res.outcome.bounced_this && self.can_be_bounced(mode) {
                res.to_this.impulse = other.config.bounce_impulse;
            }
        } else {
            res.outcome.damaged_this = other.config.deals_damage && self.config.can_be_damaged;
            res.outcome.bounced_other = other.config.can_be_bounced && self.config.bouncy;
            if res.outcome.damaged_this && self.can_be_damaged(mode) {
                res.to_this.damage = other.config.damage;
            }
            if res.outcome.bounced_other && other.can_be_bounced(mode) {
                res.to_other.impulse = self.config.bounce_impulse;
            }
        }

        res
    }
}
