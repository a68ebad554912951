//! Scheduled callbacks evaluated on ticks

use serde::{Deserialize, Serialize};

use super::state::EntityId;

/// What a timer does when it fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TimerKind {
    Respawn,
    EndImmunity,
    RegenTick,
}

/// One timer slot per entity and kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimerKey {
    pub entity: EntityId,
    pub kind: TimerKind,
}

impl TimerKey {
    pub fn new(entity: EntityId, kind: TimerKind) -> Self {
        Self { entity, kind }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct Timer {
    key: TimerKey,
    fire_at: f32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimerQueue {
    timers: Vec<Timer>,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `key` at `fire_at`, replacing any pending timer with that key
    pub fn schedule(&mut self, key: TimerKey, fire_at: f32) {
        self.cancel(key);
        self.timers.push(Timer { key, fire_at });
    }

    /// Idempotent
    pub fn cancel(&mut self, key: TimerKey) {
        self.timers.retain(|t| t.key != key);
    }

    /// Cancel every timer of an entity
    pub fn cancel_entity(&mut self, entity: EntityId) {
        self.timers.retain(|t| t.key.entity != entity);
    }

    pub fn is_pending(&self, key: TimerKey) -> bool {
        self.timers.iter().any(|t| t.key == key)
    }

    pub fn fire_time(&self, key: TimerKey) -> Option<f32> {
        self.timers.iter().find(|t| t.key == key).map(|t| t.fire_at)
    }

    /// Remove and return due timers, earliest first (ties by key)
    pub fn poll(&mut self, now: f32) -> Vec<TimerKey> {
        let mut due: Vec<Timer> = Vec::new();
        self.timers.retain(|t| {
            if t.fire_at <= now {
                due.push(*t);
                false
            } else {
                true
            }
        });
        due.sort_by(|a, b| a.fire_at.total_cmp(&b.fire_at).then(a.key.cmp(&b.key)));
        due.into_iter().map(|t| t.key).collect()
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    pub fn clear(&mut self) {
        self.timers.clear();
    }
}
