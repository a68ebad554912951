//! Authoritative health and life state
//!
//! Mutations only happen with authority; observers mirror replicated values
//! through [`Health::apply_replicated`] and get the same notifications.

use serde::{Deserialize, Serialize};

use crate::consts::*;

/// Change notifications produced by health mutations
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum HealthEvent {
    Changed { previous: f32, current: f32, max: f32 },
    LifeStatus { alive: bool },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Health {
    current: f32,
    max: f32,
    alive: bool,
}

impl Default for Health {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HEALTH)
    }
}

impl Health {
    /// Full health; `max` is clamped to at least 1
    pub fn new(max: f32) -> Self {
        let max = if max.is_finite() { max.max(MIN_MAX_HEALTH) } else { MIN_MAX_HEALTH };
        Self {
            current: max,
            max,
            alive: true,
        }
    }

    pub fn current(&self) -> f32 {
        self.current
    }

    pub fn max(&self) -> f32 {
        self.max
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    pub fn is_full(&self) -> bool {
        self.current >= self.max
    }

    /// Fraction of max health remaining
    pub fn fraction(&self) -> f32 {
        self.current / self.max
    }

    /// Add `delta` (negative for damage). Ignored without authority, while
    /// dead, or for a non-finite delta.
    pub fn modify(&mut self, delta: f32, authority: bool) -> Vec<HealthEvent> {
        let mut events = Vec::new();
        if !authority || !self.alive || !delta.is_finite() {
            return events;
        }

        let previous = self.current;
        self.current = (self.current + delta).clamp(0.0, self.max);
        if self.current != previous {
            events.push(HealthEvent::Changed {
                previous,
                current: self.current,
                max: self.max,
            });
            if self.current == 0.0 {
                self.alive = false;
                events.push(HealthEvent::LifeStatus { alive: false });
            }
        }
        events
    }

    pub fn instant_kill(&mut self, authority: bool) -> Vec<HealthEvent> {
        self.modify(-self.max, authority)
    }

    /// Restore full health and life. The only way back from death.
    pub fn reset(&mut self, authority: bool) -> Vec<HealthEvent> {
        let mut events = Vec::new();
        if !authority {
            return events;
        }

        let was_alive = self.alive;
        let previous = self.current;
        self.current = self.max;
        self.alive = true;
        if previous != self.current {
            events.push(HealthEvent::Changed {
                previous,
                current: self.current,
                max: self.max,
            });
        }
        if !was_alive {
            events.push(HealthEvent::LifeStatus { alive: true });
        }
        events
    }

    /// Mirror replicated values on an observer
    pub fn apply_replicated(&mut self, current: f32, max: f32, alive: bool) -> Vec<HealthEvent> {
        let mut events = Vec::new();
        if !current.is_finite() || !max.is_finite() {
            return events;
        }
        self.max = max.max(MIN_MAX_HEALTH);
        let previous = self.current;
        self.current = current.clamp(0.0, self.max);
        if previous != self.current {
            events.push(HealthEvent::Changed {
                previous,
                current: self.current,
                max: self.max,
            });
        }
        if alive != self.alive {
            self.alive = alive;
            events.push(HealthEvent::LifeStatus { alive });
        }
        events
    }
}
