//! World-scoped hitbox directory with lag-compensation history
//!
//! The registry stores ids, never hitboxes: every lookup goes back through a
//! [`HitboxSource`] so a destroyed owner simply stops resolving. Entries are
//! not pruned when owners go away; stale ids resolve to nothing.

use std::collections::BTreeMap;

use glam::Vec3;

use super::combat::HitboxCollision;
use super::hitbox::{Hitbox, HitboxId};
use super::snapshot::SnapshotBuffer;
use super::state::EntityId;
use crate::config::RegistryTuning;

/// Live hitbox lookup by owning entity
pub trait HitboxSource {
    fn hitbox(&self, owner: EntityId) -> Option<&Hitbox>;
}

impl HitboxSource for [Hitbox] {
    fn hitbox(&self, owner: EntityId) -> Option<&Hitbox> {
        self.iter().find(|h| h.owner == owner)
    }
}

impl HitboxSource for Vec<Hitbox> {
    fn hitbox(&self, owner: EntityId) -> Option<&Hitbox> {
        self.as_slice().hitbox(owner)
    }
}

#[derive(Debug, Clone)]
pub struct HitboxRegistry {
    authority: bool,
    next_id: i32,
    owners: BTreeMap<HitboxId, EntityId>,
    /// Authority only
    histories: BTreeMap<HitboxId, SnapshotBuffer>,
    capacity: usize,
    tolerance: f32,
}

impl HitboxRegistry {
    pub fn new(authority: bool, tuning: &RegistryTuning) -> Self {
        Self {
            authority,
            next_id: 0,
            owners: BTreeMap::new(),
            histories: BTreeMap::new(),
            capacity: tuning.snapshot_capacity.max(1),
            tolerance: tuning.tolerance(),
        }
    }

    pub fn has_authority(&self) -> bool {
        self.authority
    }

    pub fn tolerance(&self) -> f32 {
        self.tolerance
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }

    /// Forget everything; called when the world begins play
    pub fn reset(&mut self) {
        self.next_id = 0;
        self.owners.clear();
        self.histories.clear();
    }

    /// Assign the next id to a new hitbox and seed its history.
    ///
    /// Returns [`HitboxId::INVALID`] for a missing hitbox or on an observer.
    pub fn register_new(&mut self, hitbox: Option<&Hitbox>, now: f32) -> HitboxId {
        let Some(hitbox) = hitbox else {
            return HitboxId::INVALID;
        };
        if !self.authority {
            log::warn!("register_new called without authority for entity {}", hitbox.owner.0);
            return HitboxId::INVALID;
        }

        let id = HitboxId(self.next_id);
        self.next_id += 1;
        self.owners.insert(id, hitbox.owner);
        self.histories
            .insert(id, SnapshotBuffer::seeded(self.capacity, now, hitbox.position));
        log::debug!("Registered hitbox {} for entity {}", id.0, hitbox.owner.0);
        id
    }

    /// Record an id received through replication. Never touches history.
    pub fn register_replicated(&mut self, hitbox: Option<&Hitbox>, id: HitboxId) {
        let Some(hitbox) = hitbox else {
            return;
        };
        if !id.is_valid() {
            return;
        }
        self.owners.insert(id, hitbox.owner);
    }

    pub fn owner_of(&self, id: HitboxId) -> Option<EntityId> {
        self.owners.get(&id).copied()
    }

    /// Resolve an id to its live hitbox; stale ids resolve to `None`
    pub fn lookup<'a, S: HitboxSource + ?Sized>(&self, source: &'a S, id: HitboxId) -> Option<&'a Hitbox> {
        if !id.is_valid() {
            return None;
        }
        let owner = self.owner_of(id)?;
        source.hitbox(owner).filter(|h| h.id == id)
    }

    pub fn history(&self, id: HitboxId) -> Option<&SnapshotBuffer> {
        self.histories.get(&id)
    }

    /// Sample every live registered hitbox once. Authority only.
    pub fn record_snapshots<S: HitboxSource + ?Sized>(&mut self, source: &S, now: f32) {
        if !self.authority {
            return;
        }
        for (id, owner) in &self.owners {
            let Some(hitbox) = source.hitbox(*owner).filter(|h| h.id == *id) else {
                continue;
            };
            self.histories
                .entry(*id)
                .or_insert_with(|| SnapshotBuffer::new(self.capacity))
                .push(now, hitbox.position);
        }
    }

    /// Estimated position of `id` at `timestamp`.
    ///
    /// Falls back to the live position past the end of history or when there
    /// is no history; `None` only if neither exists.
    pub fn position_at_time<S: HitboxSource + ?Sized>(
        &self,
        source: &S,
        id: HitboxId,
        timestamp: f32,
    ) -> Option<Vec3> {
        if let Some(pos) = self.histories.get(&id).and_then(|h| h.position_at(timestamp)) {
            return Some(pos);
        }
        self.lookup(source, id).map(|h| h.position)
    }

    /// Whether `a` (now) and `b` (`ping` seconds ago) were plausibly touching.
    ///
    /// The boundary is inclusive.
    pub fn sanity_check_bounce<S: HitboxSource + ?Sized>(
        &self,
        source: &S,
        a: HitboxId,
        b: HitboxId,
        ping: f32,
        now: f32,
    ) -> bool {
        let (Some(ha), Some(hb)) = (self.lookup(source, a), self.lookup(source, b)) else {
            return false;
        };
        let Some(b_then) = self.position_at_time(source, b, now - ping.max(0.0)) else {
            return false;
        };
        let reach = (ha.radius() + hb.radius()) * self.tolerance;
        ha.position.distance_squared(b_then) <= reach * reach
    }

    /// Configured bounce of `id`, zero if it does not resolve
    pub fn bounce_impulse_for<S: HitboxSource + ?Sized>(&self, source: &S, id: HitboxId) -> Vec3 {
        self.lookup(source, id)
            .map(|h| h.config.bounce_impulse)
            .unwrap_or(Vec3::ZERO)
    }

    /// Authority re-application of one direction of a collision.
    ///
    /// Returns the notification for the target's owner, or `None` when either
    /// side no longer resolves.
    pub fn confirm_collision<S: HitboxSource + ?Sized>(
        &self,
        source: &S,
        instigator: HitboxId,
        target: HitboxId,
        apply_damage: bool,
        apply_bounce: bool,
    ) -> Option<HitboxCollision> {
        let inst = self.lookup(source, instigator)?;
        let tgt = self.lookup(source, target)?;
        Some(HitboxCollision::confirmed(inst, tgt, apply_damage, apply_bounce))
    }
}
