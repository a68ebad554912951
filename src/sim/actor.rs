//! Combat-capable entities: players and NPCs
//!
//! Reactions that need world services (timers, outbound events) take a
//! [`ReactCtx`] borrowed from the world for the duration of the call.

use glam::Vec3;
use rand::Rng;
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use super::combat::{CombatEntity, HitboxCollision};
use super::health::{Health, HealthEvent};
use super::hitbox::{Hitbox, Hostility};
use super::movement::{MoveState, MovementConfig, step};
use super::prediction::PredictedMovement;
use super::role::{Controller, NetMode};
use super::state::{EntityId, MatchEvent, SimEvent};
use super::timer::{TimerKey, TimerKind, TimerQueue};
use crate::config::Tuning;

/// World services available while an actor reacts to something
pub struct ReactCtx<'a> {
    pub mode: NetMode,
    pub now: f32,
    pub tuning: &'a Tuning,
    pub timers: &'a mut TimerQueue,
    pub events: &'a mut Vec<SimEvent>,
}

impl ReactCtx<'_> {
    pub fn authority(&self) -> bool {
        self.mode.has_authority()
    }
}

/// Pending NPC respawn, replicated so clients can show where it will happen
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RespawnInfo {
    pub respawning: bool,
    /// Server time of the respawn
    pub respawn_time: f32,
    pub location: Vec3,
}

/// Entity variant, used in spawn messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActorKind {
    Player,
    Npc,
}

/// Input-driven player character
#[derive(Debug, Clone)]
pub struct Player {
    pub id: EntityId,
    pub controller: Controller,
    pub hitbox: Hitbox,
    pub health: Health,
    pub movement: PredictedMovement,
    pub spawn: Vec3,
    /// Post-damage immunity window active
    pub immune: bool,
}

impl Player {
    pub fn new(id: EntityId, controller: Controller, spawn: Vec3, tuning: &Tuning) -> Self {
        let hitbox = Hitbox::new(id, controller, tuning.player.hostility, tuning.player.hitbox);
        Self {
            id,
            controller,
            hitbox,
            health: Health::new(tuning.player.max_health),
            movement: PredictedMovement::new(MoveState::at(spawn), tuning.net.max_saved_moves),
            spawn,
            immune: false,
        }
    }

    pub fn on_hitbox_collision(&mut self, ev: &HitboxCollision, ctx: &mut ReactCtx) -> Vec<HealthEvent> {
        // Bounces reach players only through their moves
        if !ev.confirmed {
            let local = self.controller.is_locally_controlled(ctx.mode);
            self.movement.on_hitbox_collision(ev, local);
        }
        if ctx.authority() && ev.to_this.damage > 0.0 {
            return self.take_damage(ev.to_this.damage, ctx);
        }
        Vec::new()
    }

    fn take_damage(&mut self, amount: f32, ctx: &mut ReactCtx) -> Vec<HealthEvent> {
        if self.immune {
            log::debug!("Player {} immune, ignoring {amount} damage", self.id.0);
            return Vec::new();
        }
        let events = self.health.modify(-amount, ctx.authority());
        if events.is_empty() || !self.health.is_alive() {
            return events;
        }

        let player = &ctx.tuning.player;
        if player.immunity_secs > 0.0 {
            self.immune = true;
            ctx.timers.schedule(
                TimerKey::new(self.id, TimerKind::EndImmunity),
                ctx.now + player.immunity_secs,
            );
        }
        if player.regenerate {
            ctx.timers.schedule(
                TimerKey::new(self.id, TimerKind::RegenTick),
                ctx.now + player.regen_delay,
            );
        }
        events
    }

    pub fn on_timer(&mut self, kind: TimerKind, ctx: &mut ReactCtx) -> Vec<HealthEvent> {
        match kind {
            TimerKind::EndImmunity => {
                self.immune = false;
                Vec::new()
            }
            TimerKind::RegenTick => {
                if !self.health.is_alive() || self.health.is_full() {
                    return Vec::new();
                }
                let player = &ctx.tuning.player;
                let events = self.health.modify(player.regen_amount, ctx.authority());
                if !self.health.is_full() {
                    ctx.timers.schedule(
                        TimerKey::new(self.id, TimerKind::RegenTick),
                        ctx.now + player.regen_interval,
                    );
                }
                events
            }
            TimerKind::Respawn => Vec::new(),
        }
    }

    pub fn on_life_status(&mut self, alive: bool, ctx: &mut ReactCtx) {
        if alive {
            self.hitbox.enable();
            self.movement.state.enabled = true;
        } else {
            self.hitbox.disable();
            self.movement.state.stop();
            self.movement.state.enabled = false;
            // A stashed bounce dies with the pawn
            self.movement.clear();
            self.immune = false;
            ctx.timers.cancel_entity(self.id);
        }
    }

    pub fn on_match_event(&mut self, ev: MatchEvent, ctx: &mut ReactCtx) -> Vec<HealthEvent> {
        match ev {
            MatchEvent::Started => {
                ctx.timers.cancel_entity(self.id);
                self.immune = false;
                if ctx.authority() {
                    self.movement.state.teleport(self.spawn);
                    self.movement.clear();
                    return self.health.reset(true);
                }
                Vec::new()
            }
            MatchEvent::Ended { .. } => Vec::new(),
        }
    }
}

/// AI-driven enemy
#[derive(Debug, Clone)]
pub struct Npc {
    pub id: EntityId,
    pub hitbox: Hitbox,
    pub health: Health,
    pub movement: MoveState,
    /// Cached start location for respawns and game restarts
    pub home: Vec3,
    pub enabled: bool,
    pub respawn: RespawnInfo,
    moving_forward: bool,
    time_til_jump: f32,
}

impl Npc {
    pub fn new(id: EntityId, home: Vec3, tuning: &Tuning) -> Self {
        let hitbox = Hitbox::new(id, Controller::Ai, tuning.npc.hostility, tuning.npc.hitbox);
        Self {
            id,
            hitbox,
            health: Health::new(tuning.npc.max_health),
            movement: MoveState::at(home),
            home,
            enabled: true,
            respawn: RespawnInfo::default(),
            moving_forward: true,
            time_til_jump: tuning.npc.jump_interval,
        }
    }

    pub fn enable(&mut self) {
        if self.enabled {
            return;
        }
        self.hitbox.enable();
        self.movement.enabled = true;
        self.movement.grounded = false;
        self.enabled = true;
    }

    pub fn disable(&mut self) {
        if !self.enabled {
            return;
        }
        self.hitbox.disable();
        self.movement.stop();
        self.movement.enabled = false;
        self.enabled = false;
    }

    /// Patrol and random jumps. Authority only.
    pub fn think(&mut self, dt: f32, rng: &mut Pcg32, tuning: &Tuning) {
        if !self.enabled || !self.health.is_alive() {
            return;
        }
        let npc = &tuning.npc;
        if !npc.should_move {
            step(&mut self.movement, 0.0, false, dt, &tuning.movement);
            return;
        }

        let mut jump = false;
        if npc.random_jump {
            self.time_til_jump -= dt;
            if self.time_til_jump < 0.0 {
                if rng.random::<f32>() <= npc.jump_chance {
                    jump = true;
                }
                let variance = npc.jump_interval_variance;
                self.time_til_jump = npc.jump_interval + rng.random_range(-variance..=variance);
            }
        }

        // Turn around at the edges of the patrol range
        if self.movement.grounded {
            let x = self.movement.position.x;
            if x >= self.home.x + npc.patrol_half_width {
                self.moving_forward = false;
            } else if x <= self.home.x - npc.patrol_half_width {
                self.moving_forward = true;
            }
        }
        let axis = if self.moving_forward { npc.walk_input } else { -npc.walk_input };
        step(&mut self.movement, axis, jump, dt, &tuning.movement);
    }

    pub fn on_hitbox_collision(&mut self, ev: &HitboxCollision, ctx: &mut ReactCtx) -> Vec<HealthEvent> {
        if !ctx.authority() {
            return Vec::new();
        }
        if ev.to_this.impulse.length_squared() > f32::EPSILON {
            self.movement.launch(ev.to_this.impulse);
        }
        if ev.to_this.damage != 0.0 {
            return self.health.modify(-ev.to_this.damage, true);
        }
        Vec::new()
    }

    pub fn on_life_status(&mut self, alive: bool, ctx: &mut ReactCtx) -> Vec<HealthEvent> {
        if alive {
            self.cancel_respawn(ctx);
            self.enable();
            Vec::new()
        } else {
            self.disable();
            if ctx.authority() && ctx.tuning.npc.can_respawn {
                return self.start_respawn(ctx);
            }
            Vec::new()
        }
    }

    fn start_respawn(&mut self, ctx: &mut ReactCtx) -> Vec<HealthEvent> {
        self.cancel_respawn(ctx);
        let delay = ctx.tuning.npc.respawn_delay;
        if delay <= 0.0 {
            return self.respawn_now(ctx);
        }
        ctx.timers
            .schedule(TimerKey::new(self.id, TimerKind::Respawn), ctx.now + delay);
        self.respawn = RespawnInfo {
            respawning: true,
            respawn_time: ctx.now + delay,
            location: self.home,
        };
        ctx.events.push(SimEvent::Respawn {
            entity: self.id,
            info: self.respawn,
        });
        log::info!("NPC {} respawning at t={:.2}", self.id.0, self.respawn.respawn_time);
        Vec::new()
    }

    fn respawn_now(&mut self, ctx: &mut ReactCtx) -> Vec<HealthEvent> {
        self.cancel_respawn(ctx);
        self.movement.teleport(self.home);
        self.health.reset(ctx.authority())
    }

    /// Clear any pending respawn. Safe to call when nothing is pending.
    pub fn cancel_respawn(&mut self, ctx: &mut ReactCtx) {
        if !ctx.authority() {
            return;
        }
        ctx.timers.cancel(TimerKey::new(self.id, TimerKind::Respawn));
        if self.respawn.respawning {
            self.respawn.respawning = false;
            ctx.events.push(SimEvent::Respawn {
                entity: self.id,
                info: self.respawn,
            });
        }
    }

    pub fn on_timer(&mut self, kind: TimerKind, ctx: &mut ReactCtx) -> Vec<HealthEvent> {
        match kind {
            TimerKind::Respawn => self.respawn_now(ctx),
            TimerKind::EndImmunity | TimerKind::RegenTick => Vec::new(),
        }
    }

    /// Replicated respawn info on an observer
    pub fn apply_respawn_info(&mut self, info: RespawnInfo, ctx: &mut ReactCtx) {
        if info == self.respawn {
            return;
        }
        self.respawn = info;
        ctx.events.push(SimEvent::Respawn { entity: self.id, info });
    }

    pub fn on_match_event(&mut self, ev: MatchEvent, ctx: &mut ReactCtx) -> Vec<HealthEvent> {
        self.cancel_respawn(ctx);
        match ev {
            MatchEvent::Started => {
                let mut events = Vec::new();
                if ctx.authority() {
                    self.movement.teleport(self.home);
                    events = self.health.reset(true);
                }
                self.enable();
                events
            }
            MatchEvent::Ended { .. } => {
                self.disable();
                Vec::new()
            }
        }
    }
}

/// Tagged entity variant stored by the world
#[derive(Debug, Clone)]
pub enum Actor {
    Player(Player),
    Npc(Npc),
}

impl Actor {
    pub fn id(&self) -> EntityId {
        match self {
            Actor::Player(p) => p.id,
            Actor::Npc(n) => n.id,
        }
    }

    pub fn kind(&self) -> ActorKind {
        match self {
            Actor::Player(_) => ActorKind::Player,
            Actor::Npc(_) => ActorKind::Npc,
        }
    }

    pub fn controller(&self) -> Controller {
        match self {
            Actor::Player(p) => p.controller,
            Actor::Npc(_) => Controller::Ai,
        }
    }

    pub fn hitbox(&self) -> &Hitbox {
        match self {
            Actor::Player(p) => &p.hitbox,
            Actor::Npc(n) => &n.hitbox,
        }
    }

    pub fn hitbox_mut(&mut self) -> &mut Hitbox {
        match self {
            Actor::Player(p) => &mut p.hitbox,
            Actor::Npc(n) => &mut n.hitbox,
        }
    }

    pub fn health_mut(&mut self) -> &mut Health {
        match self {
            Actor::Player(p) => &mut p.health,
            Actor::Npc(n) => &mut n.health,
        }
    }

    pub fn move_state(&self) -> &MoveState {
        match self {
            Actor::Player(p) => &p.movement.state,
            Actor::Npc(n) => &n.movement,
        }
    }

    pub fn move_state_mut(&mut self) -> &mut MoveState {
        match self {
            Actor::Player(p) => &mut p.movement.state,
            Actor::Npc(n) => &mut n.movement,
        }
    }

    pub fn position(&self) -> Vec3 {
        self.move_state().position
    }

    /// Keep the hitbox resting on the character's feet
    pub fn sync_hitbox(&mut self) {
        let feet = self.position();
        let hitbox = self.hitbox_mut();
        hitbox.position = feet + Vec3::Z * hitbox.config.shape.half_height();
    }

    pub fn as_player(&self) -> Option<&Player> {
        match self {
            Actor::Player(p) => Some(p),
            Actor::Npc(_) => None,
        }
    }

    pub fn as_player_mut(&mut self) -> Option<&mut Player> {
        match self {
            Actor::Player(p) => Some(p),
            Actor::Npc(_) => None,
        }
    }

    pub fn as_npc(&self) -> Option<&Npc> {
        match self {
            Actor::Npc(n) => Some(n),
            Actor::Player(_) => None,
        }
    }

    pub fn as_npc_mut(&mut self) -> Option<&mut Npc> {
        match self {
            Actor::Npc(n) => Some(n),
            Actor::Player(_) => None,
        }
    }

    pub fn on_hitbox_collision(&mut self, ev: &HitboxCollision, ctx: &mut ReactCtx) {
        let events = match self {
            Actor::Player(p) => p.on_hitbox_collision(ev, ctx),
            Actor::Npc(n) => n.on_hitbox_collision(ev, ctx),
        };
        self.handle_health_events(events, ctx);
    }

    pub fn on_timer(&mut self, kind: TimerKind, ctx: &mut ReactCtx) {
        let events = match self {
            Actor::Player(p) => p.on_timer(kind, ctx),
            Actor::Npc(n) => n.on_timer(kind, ctx),
        };
        self.handle_health_events(events, ctx);
    }

    pub fn on_match_event(&mut self, ev: MatchEvent, ctx: &mut ReactCtx) {
        let events = match self {
            Actor::Player(p) => p.on_match_event(ev, ctx),
            Actor::Npc(n) => n.on_match_event(ev, ctx),
        };
        self.handle_health_events(events, ctx);
    }

    /// Instant kill routed through the normal death handling
    pub fn kill(&mut self, ctx: &mut ReactCtx) {
        let events = self.instant_kill(ctx.authority());
        self.handle_health_events(events, ctx);
    }

    /// Publish health events and run life-status reactions
    pub fn handle_health_events(&mut self, events: Vec<HealthEvent>, ctx: &mut ReactCtx) {
        let id = self.id();
        for event in events {
            ctx.events.push(SimEvent::Health { entity: id, event });
            if let HealthEvent::LifeStatus { alive } = event {
                log::info!("Entity {} is now {}", id.0, if alive { "alive" } else { "dead" });
                let follow_up = match self {
                    Actor::Player(p) => {
                        p.on_life_status(alive, ctx);
                        Vec::new()
                    }
                    Actor::Npc(n) => n.on_life_status(alive, ctx),
                };
                // Instant respawns come back through here once
                for event in follow_up {
                    ctx.events.push(SimEvent::Health { entity: id, event });
                    if let HealthEvent::LifeStatus { alive } = event {
                        if let Actor::Npc(n) = self {
                            n.on_life_status(alive, ctx);
                        }
                    }
                }
            }
        }
    }
}

impl CombatEntity for Actor {
    fn health(&self) -> Option<&Health> {
        match self {
            Actor::Player(p) => Some(&p.health),
            Actor::Npc(n) => Some(&n.health),
        }
    }

    fn hostility(&self) -> Hostility {
        self.hitbox().hostility
    }

    fn instant_kill(&mut self, authority: bool) -> Vec<HealthEvent> {
        self.health_mut().instant_kill(authority)
    }
}
