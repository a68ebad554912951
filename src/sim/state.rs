//! Per-machine world state
//!
//! One `WorldState` exists per machine (server or client). It owns the
//! actors, the hitbox registry, timers, trigger volumes and the outbound
//! event queue. Actors are kept sorted by id for deterministic iteration.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use glam::Vec3;
use rand::SeedableRng;
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use super::actor::{Actor, ActorKind, Npc, Player, ReactCtx, RespawnInfo};
use super::broadcast::ReadyBroadcaster;
use super::collision::Volume;
use super::combat::{CombatEntity, HitboxCollision};
use super::health::HealthEvent;
use super::hitbox::{Hitbox, HitboxId};
use super::prediction::{MoveAck, MoveInput, PendingBounce};
use super::registry::{HitboxRegistry, HitboxSource};
use super::role::{Controller, NetMode};
use super::timer::TimerQueue;
use crate::config::Tuning;

/// Entity id, allocated by the authority and mirrored on clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(pub u32);

/// Match phase changes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchEvent {
    Started,
    Ended { won: bool },
}

/// Outbound notifications, drained after each tick
#[derive(Debug, Clone, PartialEq)]
pub enum SimEvent {
    HitboxCollision(HitboxCollision),
    /// Authority assigned a hitbox id (needs replicating)
    HitboxAssigned { entity: EntityId, id: HitboxId },
    Health { entity: EntityId, event: HealthEvent },
    Respawn { entity: EntityId, info: RespawnInfo },
    Match(MatchEvent),
    /// Local player became ready; `listeners` are the tokens to notify
    LocalPlayerReady { entity: EntityId, listeners: Vec<u64> },
    /// Authority applied a remote move
    MoveAcked { entity: EntityId, ack: MoveAck },
    /// Authority dropped a bounce that failed the sanity check
    MoveRejected { entity: EntityId, bounce: PendingBounce },
    /// Client prediction was reset to the server's state
    Corrected { entity: EntityId },
    Despawned { entity: EntityId },
}

impl HitboxSource for [Actor] {
    fn hitbox(&self, owner: EntityId) -> Option<&Hitbox> {
        self.binary_search_by_key(&owner, Actor::id)
            .ok()
            .map(|i| self[i].hitbox())
    }
}

impl HitboxSource for Vec<Actor> {
    fn hitbox(&self, owner: EntityId) -> Option<&Hitbox> {
        self.as_slice().hitbox(owner)
    }
}

/// Complete simulation state of one machine
#[derive(Debug, Clone)]
pub struct WorldState {
    pub mode: NetMode,
    pub tuning: Tuning,
    /// Seconds since the world was created
    pub time: f32,
    /// Simulation tick counter
    pub time_ticks: u64,
    /// Sorted by id
    pub actors: Vec<Actor>,
    pub volumes: Vec<Volume>,
    pub registry: HitboxRegistry,
    pub timers: TimerQueue,
    pub(crate) events: Vec<SimEvent>,
    /// Seeded from `tuning.seed`; drives NPC jumps
    pub(crate) rng: Pcg32,
    pub(crate) match_phase: ReadyBroadcaster<MatchEvent, EntityId>,
    local_player: ReadyBroadcaster<EntityId, u64>,
    /// Hitbox pairs overlapping at the end of the last tick
    pub(crate) overlaps: BTreeSet<(EntityId, EntityId)>,
    /// (volume index, entity) pairs overlapping at the end of the last tick
    pub(crate) volume_overlaps: BTreeSet<(usize, EntityId)>,
    pub(crate) remote_moves: BTreeMap<EntityId, VecDeque<MoveInput>>,
    pub(crate) outgoing_moves: Vec<(EntityId, MoveInput)>,
    pings: BTreeMap<EntityId, f32>,
    begun: bool,
    next_id: u32,
}

impl WorldState {
    pub fn new(mode: NetMode, tuning: Tuning) -> Self {
        let tuning = tuning.validated();
        Self {
            mode,
            registry: HitboxRegistry::new(mode.has_authority(), &tuning.registry),
            rng: Pcg32::seed_from_u64(tuning.seed),
            tuning,
            time: 0.0,
            time_ticks: 0,
            actors: Vec::new(),
            volumes: Vec::new(),
            timers: TimerQueue::new(),
            events: Vec::new(),
            match_phase: ReadyBroadcaster::new(),
            local_player: ReadyBroadcaster::new(),
            overlaps: BTreeSet::new(),
            volume_overlaps: BTreeSet::new(),
            remote_moves: BTreeMap::new(),
            outgoing_moves: Vec::new(),
            pings: BTreeMap::new(),
            begun: false,
            next_id: 1,
        }
    }

    pub fn has_authority(&self) -> bool {
        self.mode.has_authority()
    }

    /// Allocate a new entity ID
    pub fn next_entity_id(&mut self) -> EntityId {
        let id = EntityId(self.next_id);
        self.next_id += 1;
        id
    }

    pub fn actor_index(&self, id: EntityId) -> Option<usize> {
        self.actors.binary_search_by_key(&id, Actor::id).ok()
    }

    pub fn actor(&self, id: EntityId) -> Option<&Actor> {
        self.actor_index(id).map(|i| &self.actors[i])
    }

    pub fn actor_mut(&mut self, id: EntityId) -> Option<&mut Actor> {
        self.actor_index(id).map(|i| &mut self.actors[i])
    }

    pub fn player(&self, id: EntityId) -> Option<&Player> {
        self.actor(id).and_then(Actor::as_player)
    }

    pub fn npc(&self, id: EntityId) -> Option<&Npc> {
        self.actor(id).and_then(Actor::as_npc)
    }

    pub fn hitbox_of(&self, id: EntityId) -> Option<&Hitbox> {
        self.actors.as_slice().hitbox(id)
    }

    /// Run `f` on an actor with world services borrowed alongside it
    pub fn with_actor<R>(&mut self, id: EntityId, f: impl FnOnce(&mut Actor, &mut ReactCtx) -> R) -> Option<R> {
        let index = self.actor_index(id)?;
        let mut ctx = ReactCtx {
            mode: self.mode,
            now: self.time,
            tuning: &self.tuning,
            timers: &mut self.timers,
            events: &mut self.events,
        };
        Some(f(&mut self.actors[index], &mut ctx))
    }

    /// Spawn a player pawn on the authority
    pub fn spawn_player(&mut self, controller: Controller, position: Vec3) -> EntityId {
        let id = self.next_entity_id();
        let player = Player::new(id, controller, position, &self.tuning);
        self.insert_actor(Actor::Player(player));
        id
    }

    /// Spawn an NPC on the authority
    pub fn spawn_npc(&mut self, position: Vec3) -> EntityId {
        let id = self.next_entity_id();
        let npc = Npc::new(id, position, &self.tuning);
        self.insert_actor(Actor::Npc(npc));
        id
    }

    /// Mirror an entity spawned by the server. `owned` marks the pawn this
    /// client controls.
    pub fn spawn_replicated(&mut self, entity: EntityId, kind: ActorKind, position: Vec3, owned: bool) {
        if self.actor_index(entity).is_some() {
            return;
        }
        self.next_id = self.next_id.max(entity.0 + 1);
        let actor = match kind {
            ActorKind::Player => {
                let controller = if owned { Controller::LocalPlayer } else { Controller::RemotePlayer };
                Actor::Player(Player::new(entity, controller, position, &self.tuning))
            }
            ActorKind::Npc => Actor::Npc(Npc::new(entity, position, &self.tuning)),
        };
        self.insert_actor(actor);
    }

    fn insert_actor(&mut self, mut actor: Actor) {
        let id = actor.id();
        actor.sync_hitbox();
        let index = match self.actors.binary_search_by_key(&id, Actor::id) {
            Ok(i) => {
                self.actors[i] = actor;
                i
            }
            Err(i) => {
                self.actors.insert(i, actor);
                i
            }
        };
        log::debug!("Spawned {:?} entity {}", self.actors[index].kind(), id.0);

        if self.begun {
            self.register_hitbox(index);
        }
        // A late spawn into an ended match starts disabled
        if let Some(MatchEvent::Ended { .. }) = self.match_phase.subscribe(id) {
            if let Some(npc) = self.actors[index].as_npc_mut() {
                npc.disable();
            }
        }
    }

    fn register_hitbox(&mut self, index: usize) {
        if !self.has_authority() {
            return;
        }
        let id = self
            .registry
            .register_new(Some(self.actors[index].hitbox()), self.time);
        let actor = &mut self.actors[index];
        actor.hitbox_mut().id = id;
        self.events.push(SimEvent::HitboxAssigned { entity: actor.id(), id });
    }

    /// Remove an entity. Its registry entry is left to go stale.
    pub fn despawn(&mut self, entity: EntityId) -> bool {
        let Some(index) = self.actor_index(entity) else {
            return false;
        };
        self.actors.remove(index);
        self.timers.cancel_entity(entity);
        self.match_phase.unsubscribe(&entity);
        self.overlaps.retain(|(a, b)| *a != entity && *b != entity);
        self.volume_overlaps.retain(|(_, e)| *e != entity);
        self.remote_moves.remove(&entity);
        self.pings.remove(&entity);
        self.events.push(SimEvent::Despawned { entity });
        true
    }

    pub fn add_volume(&mut self, volume: Volume) {
        self.volumes.push(volume);
    }

    /// Reset the registry and give every existing hitbox an id.
    /// Later spawns are registered as they arrive.
    pub fn begin_play(&mut self) {
        self.registry.reset();
        self.begun = true;
        for index in 0..self.actors.len() {
            self.actors[index].sync_hitbox();
            self.register_hitbox(index);
        }
        log::info!(
            "Begin play ({:?}) with {} entities",
            self.mode,
            self.actors.len()
        );
    }

    pub fn start_game(&mut self) {
        if !self.has_authority() {
            return;
        }
        log::info!("Game started");
        self.apply_match_event(MatchEvent::Started);
    }

    pub fn end_game(&mut self, won: bool) {
        if !self.has_authority() {
            return;
        }
        log::info!("Game ended ({})", if won { "won" } else { "lost" });
        self.apply_match_event(MatchEvent::Ended { won });
    }

    /// Publish a match event and let every subscribed entity react.
    /// Clients call this with replicated events.
    pub fn apply_match_event(&mut self, event: MatchEvent) {
        if self.match_phase.latest() == Some(&event) {
            return;
        }
        for entity in self.match_phase.publish(event) {
            self.with_actor(entity, |actor, ctx| actor.on_match_event(event, ctx));
        }
        self.overlaps.clear();
        self.volume_overlaps.clear();
        self.events.push(SimEvent::Match(event));
    }

    pub fn match_phase(&self) -> Option<MatchEvent> {
        self.match_phase.latest().copied()
    }

    pub fn is_match_running(&self) -> bool {
        self.match_phase() == Some(MatchEvent::Started)
    }

    /// Announce a locally controlled player. Repeat calls for the same
    /// player are ignored.
    pub fn initialize_player(&mut self, entity: EntityId) -> bool {
        let Some(actor) = self.actor(entity) else {
            return false;
        };
        let controller = actor.controller();
        if !controller.is_player() || !controller.is_locally_controlled(self.mode) {
            return false;
        }
        if self.local_player.latest() == Some(&entity) {
            return false;
        }
        let listeners = self.local_player.publish(entity);
        log::info!("Local player {} ready", entity.0);
        self.events.push(SimEvent::LocalPlayerReady { entity, listeners });
        true
    }

    /// Listen for the local player. Returns it right away if already known.
    pub fn subscribe_local_player(&mut self, token: u64) -> Option<EntityId> {
        self.local_player.subscribe(token)
    }

    pub fn local_player(&self) -> Option<EntityId> {
        self.local_player.latest().copied()
    }

    /// Round-trip estimate for the connection driving `entity`, clamped to
    /// `[0, net.max_ping]`
    pub fn set_ping(&mut self, entity: EntityId, rtt: f32) {
        if !rtt.is_finite() {
            return;
        }
        let rtt = rtt.clamp(0.0, self.tuning.net.max_ping);
        self.pings.insert(entity, rtt);
    }

    /// Zero without a measurement
    pub fn ping(&self, entity: EntityId) -> f32 {
        self.pings.get(&entity).copied().unwrap_or(0.0)
    }

    /// Queue a move received from the client driving `entity`
    pub fn queue_remote_move(&mut self, entity: EntityId, input: MoveInput) -> bool {
        if !self.has_authority() {
            return false;
        }
        match self.actor(entity) {
            Some(actor) if actor.controller() == Controller::RemotePlayer => {}
            _ => {
                log::warn!("Move for entity {} is not from a remote player", entity.0);
                return false;
            }
        }
        self.remote_moves.entry(entity).or_default().push_back(input);
        true
    }

    /// Moves predicted this tick, to be sent to the server
    pub fn take_outgoing_moves(&mut self) -> Vec<(EntityId, MoveInput)> {
        std::mem::take(&mut self.outgoing_moves)
    }

    pub fn apply_hitbox_id(&mut self, entity: EntityId, id: HitboxId) {
        let Some(index) = self.actor_index(entity) else {
            return;
        };
        self.actors[index].hitbox_mut().id = id;
        self.registry
            .register_replicated(Some(self.actors[index].hitbox()), id);
    }

    pub fn apply_health(&mut self, entity: EntityId, current: f32, max: f32, alive: bool) {
        self.with_actor(entity, |actor, ctx| {
            let events = actor.health_mut().apply_replicated(current, max, alive);
            actor.handle_health_events(events, ctx);
        });
    }

    pub fn apply_respawn_info(&mut self, entity: EntityId, info: RespawnInfo) {
        self.with_actor(entity, |actor, ctx| {
            if let Some(npc) = actor.as_npc_mut() {
                npc.apply_respawn_info(info, ctx);
            }
        });
    }

    /// Snap a simulated proxy to its replicated transform. The locally
    /// controlled pawn is only moved through acks.
    pub fn apply_transform(&mut self, entity: EntityId, position: Vec3, velocity: Vec3) {
        let Some(actor) = self.actor_mut(entity) else {
            return;
        };
        if actor.controller() == Controller::LocalPlayer {
            return;
        }
        let state = actor.move_state_mut();
        state.position = position;
        state.velocity = velocity;
        actor.sync_hitbox();
    }

    pub fn apply_move_ack(&mut self, entity: EntityId, ack: &MoveAck) -> bool {
        let threshold = self.tuning.net.correction_threshold;
        let cfg = self.tuning.movement;
        let Some(player) = self.actor_mut(entity).and_then(Actor::as_player_mut) else {
            return false;
        };
        let corrected = player.movement.reconcile(ack, threshold, &cfg);
        if corrected {
            log::debug!("Corrected entity {} to {:?}", entity.0, ack.position);
            self.events.push(SimEvent::Corrected { entity });
        }
        corrected
    }

    /// Hand a collision notification to its receiver
    pub fn deliver(&mut self, ev: HitboxCollision) {
        self.events.push(SimEvent::HitboxCollision(ev));
        self.with_actor(ev.this_owner, |actor, ctx| actor.on_hitbox_collision(&ev, ctx));
    }

    pub fn drain_events(&mut self) -> Vec<SimEvent> {
        std::mem::take(&mut self.events)
    }

    /// Whether any player exists and all of them are dead
    pub fn all_players_dead(&self) -> bool {
        let mut players = self
            .actors
            .iter()
            .filter(|a| a.kind() == ActorKind::Player)
            .peekable();
        players.peek().is_some() && players.all(|p| !p.is_alive())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server() -> WorldState {
        WorldState::new(NetMode::DedicatedServer, Tuning::default())
    }

    #[test]
    fn test_ids_assigned_at_begin_play_and_on_spawn() {
        let mut world = server();
        let a = world.spawn_player(Controller::RemotePlayer, Vec3::ZERO);
        let b = world.spawn_npc(Vec3::new(200.0, 0.0, 0.0));
        assert_eq!(world.hitbox_of(a).unwrap().id, HitboxId::INVALID);

        world.begin_play();
        assert_eq!(world.hitbox_of(a).unwrap().id, HitboxId(0));
        assert_eq!(world.hitbox_of(b).unwrap().id, HitboxId(1));

        let c = world.spawn_npc(Vec3::new(400.0, 0.0, 0.0));
        assert_eq!(world.hitbox_of(c).unwrap().id, HitboxId(2));
        let assigned = world
            .drain_events()
            .into_iter()
            .filter(|e| matches!(e, SimEvent::HitboxAssigned { .. }))
            .count();
        assert_eq!(assigned, 3);
    }

    #[test]
    fn test_client_never_assigns_ids() {
        let mut world = WorldState::new(NetMode::Client, Tuning::default());
        world.spawn_replicated(EntityId(5), ActorKind::Npc, Vec3::ZERO, false);
        world.begin_play();
        assert_eq!(world.hitbox_of(EntityId(5)).unwrap().id, HitboxId::INVALID);

        world.apply_hitbox_id(EntityId(5), HitboxId(7));
        assert_eq!(world.hitbox_of(EntityId(5)).unwrap().id, HitboxId(7));
        assert_eq!(world.registry.owner_of(HitboxId(7)), Some(EntityId(5)));
        assert!(world.registry.history(HitboxId(7)).is_none());
    }

    #[test]
    fn test_despawned_id_goes_stale() {
        let mut world = server();
        let npc = world.spawn_npc(Vec3::ZERO);
        world.begin_play();
        let id = world.hitbox_of(npc).unwrap().id;
        assert!(world.despawn(npc));
        assert!(world.registry.lookup(world.actors.as_slice(), id).is_none());
        assert_eq!(
            world.registry.bounce_impulse_for(world.actors.as_slice(), id),
            Vec3::ZERO
        );
    }

    #[test]
    fn test_initialize_player_publishes_once() {
        let mut world = WorldState::new(NetMode::ListenServer, Tuning::default());
        let remote = world.spawn_player(Controller::RemotePlayer, Vec3::ZERO);
        let local = world.spawn_player(Controller::LocalPlayer, Vec3::ZERO);
        assert_eq!(world.subscribe_local_player(1), None);

        assert!(!world.initialize_player(remote));
        assert!(world.initialize_player(local));
        assert!(!world.initialize_player(local));
        assert_eq!(world.subscribe_local_player(2), Some(local));

        let ready: Vec<_> = world
            .drain_events()
            .into_iter()
            .filter_map(|e| match e {
                SimEvent::LocalPlayerReady { entity, listeners } => Some((entity, listeners)),
                _ => None,
            })
            .collect();
        assert_eq!(ready, vec![(local, vec![1])]);
    }

    #[test]
    fn test_match_start_and_end_drive_npcs() {
        let mut world = server();
        let npc = world.spawn_npc(Vec3::new(50.0, 0.0, 0.0));
        world.begin_play();
        world.start_game();
        world.end_game(false);
        assert!(!world.npc(npc).unwrap().enabled);

        // Late spawn into an ended match
        let late = world.spawn_npc(Vec3::ZERO);
        assert!(!world.npc(late).unwrap().enabled);

        world.start_game();
        assert!(world.npc(npc).unwrap().enabled);
        assert!(world.npc(late).unwrap().enabled);
        assert_eq!(world.match_phase(), Some(MatchEvent::Started));
    }

    #[test]
    fn test_remote_moves_only_for_remote_players() {
        let mut world = server();
        let npc = world.spawn_npc(Vec3::ZERO);
        let remote = world.spawn_player(Controller::RemotePlayer, Vec3::ZERO);
        assert!(!world.queue_remote_move(npc, MoveInput::default()));
        assert!(world.queue_remote_move(remote, MoveInput::default()));

        let mut client = WorldState::new(NetMode::Client, Tuning::default());
        client.spawn_replicated(remote, ActorKind::Player, Vec3::ZERO, false);
        assert!(!client.queue_remote_move(remote, MoveInput::default()));
    }

    #[test]
    fn test_ping_defaults_to_zero() {
        let mut world = server();
        assert_eq!(world.ping(EntityId(1)), 0.0);
        world.set_ping(EntityId(1), 0.12);
        assert_eq!(world.ping(EntityId(1)), 0.12);
    }

    #[test]
    fn test_actors_stay_sorted_by_id() {
        let mut world = WorldState::new(NetMode::Client, Tuning::default());
        for id in [9, 2, 5, 1] {
            world.spawn_replicated(EntityId(id), ActorKind::Npc, Vec3::ZERO, false);
        }
        let ids: Vec<u32> = world.actors.iter().map(|a| a.id().0).collect();
        assert_eq!(ids, vec![1, 2, 5, 9]);
        assert!(world.despawn(EntityId(5)));
        assert!(world.npc(EntityId(9)).is_some());
        assert_eq!(world.next_entity_id(), EntityId(10));
    }

    #[test]
    fn test_ping_is_clamped() {
        let mut world = server();
        let max = world.tuning.net.max_ping;
        world.set_ping(EntityId(1), 1000.0);
        assert_eq!(world.ping(EntityId(1)), max);
        world.set_ping(EntityId(1), -3.0);
        assert_eq!(world.ping(EntityId(1)), 0.0);
        world.set_ping(EntityId(1), f32::NAN);
        assert_eq!(world.ping(EntityId(1)), 0.0);
    }

    #[test]
    fn test_replicated_health_disables_dead_npc() {
        let mut world = WorldState::new(NetMode::Client, Tuning::default());
        world.spawn_replicated(EntityId(2), ActorKind::Npc, Vec3::ZERO, false);
        world.apply_health(EntityId(2), 0.0, 100.0, false);
        let npc = world.npc(EntityId(2)).unwrap();
        assert!(!npc.health.is_alive());
        assert!(!npc.enabled);
        assert!(world.timers.is_empty());
    }
}
