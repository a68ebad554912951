//! Combat capability contract and collision notifications

use serde::{Deserialize, Serialize};

use super::health::{Health, HealthEvent};
use super::hitbox::{CollisionOutcome, CollisionResolution, Effect, Hitbox, HitboxId, Hostility};
use super::state::EntityId;

/// Collision result delivered to the owner of one hitbox.
///
/// Always expressed from the receiving hitbox's side: `to_this` is what
/// happens to the receiver.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HitboxCollision {
    pub this_id: HitboxId,
    pub this_owner: EntityId,
    pub other_id: HitboxId,
    pub other_owner: EntityId,
    pub to_this: Effect,
    pub to_other: Effect,
    pub outcome: CollisionOutcome,
    /// Produced by the authority confirming a predicted collision
    pub confirmed: bool,
}

impl HitboxCollision {
    /// Notification for the processing hitbox
    pub fn from_resolution(this: &Hitbox, other: &Hitbox, res: &CollisionResolution) -> Self {
        Self {
            this_id: this.id,
            this_owner: this.owner,
            other_id: other.id,
            other_owner: other.owner,
            to_this: res.to_this,
            to_other: res.to_other,
            outcome: res.outcome,
            confirmed: false,
        }
    }

    /// Same collision seen from the other hitbox
    pub fn mirrored(&self) -> Self {
        Self {
            this_id: self.other_id,
            this_owner: self.other_owner,
            other_id: self.this_id,
            other_owner: self.this_owner,
            to_this: self.to_other,
            to_other: self.to_this,
            outcome: self.outcome.mirrored(),
            confirmed: self.confirmed,
        }
    }

    /// Authority-side re-application of one direction of a collision
    pub fn confirmed(instigator: &Hitbox, target: &Hitbox, apply_damage: bool, apply_bounce: bool) -> Self {
        let mut to_this = Effect::NONE;
        if apply_damage && instigator.config.deals_damage && target.config.can_be_damaged {
            to_this.damage = instigator.config.damage;
        }
        if apply_bounce && instigator.config.bouncy {
            to_this.impulse = instigator.config.bounce_impulse;
        }
        Self {
            this_id: target.id,
            this_owner: target.owner,
            other_id: instigator.id,
            other_owner: instigator.owner,
            to_this,
            to_other: Effect::NONE,
            outcome: CollisionOutcome {
                bounced_this: apply_bounce,
                damaged_this: apply_damage,
                ..Default::default()
            },
            confirmed: true,
        }
    }
}

/// Anything that can fight: exposes health and alignment and can be killed
pub trait CombatEntity {
    fn health(&self) -> Option<&Health>;

    fn hostility(&self) -> Hostility;

    /// Kill outright. Only takes effect with authority.
    fn instant_kill(&mut self, authority: bool) -> Vec<HealthEvent>;

    fn is_alive(&self) -> bool {
        self.health().is_none_or(|h| h.is_alive())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::role::Controller;
    use glam::Vec3;

    fn pair() -> (Hitbox, Hitbox) {
        let mut f = Hitbox::new(EntityId(1), Controller::LocalPlayer, Hostility::Friendly, Default::default());
        f.id = HitboxId(0);
        let mut e = Hitbox::new(EntityId(2), Controller::Ai, Hostility::Enemy, Default::default());
        e.id = HitboxId(1);
        (f, e)
    }

    #[test]
    fn test_mirror_swaps_perspective() {
        let (f, e) = pair();
        let res = CollisionResolution {
            above: true,
            outcome: CollisionOutcome {
                bounced_this: true,
                damaged_other: true,
                ..Default::default()
            },
            to_this: Effect {
                impulse: Vec3::Z,
                damage: 0.0,
            },
            to_other: Effect {
                impulse: Vec3::ZERO,
                damage: 50.0,
            },
        };
        let ev = HitboxCollision::from_resolution(&f, &e, &res);
        let m = ev.mirrored();
        assert_eq!(m.this_owner, EntityId(2));
        assert_eq!(m.other_id, HitboxId(0));
        assert_eq!(m.to_this.damage, 50.0);
        assert!(m.outcome.damaged_this);
        assert_eq!(m.mirrored(), ev);
    }

    #[test]
    fn test_confirmed_masks_by_flags() {
        let (f, e) = pair();
        let ev = HitboxCollision::confirmed(&e, &f, true, false);
        assert_eq!(ev.this_owner, f.owner);
        assert_eq!(ev.to_this.damage, e.config.damage);
        assert_eq!(ev.to_this.impulse, Vec3::ZERO);
        assert!(ev.confirmed);

        let ev = HitboxCollision::confirmed(&e, &f, false, true);
        assert_eq!(ev.to_this.damage, 0.0);
        assert_eq!(ev.to_this.impulse, e.config.bounce_impulse);
    }
}
