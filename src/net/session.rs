//! Server and client sessions
//!
//! Glue between a [`WorldState`] and its connections: decode inbound
//! messages into world calls, tick, then turn world events into outbound
//! messages.

use glam::Vec3;

use super::link::Connection;
use super::protocol::{ClientMessage, ServerMessage};
use crate::config::Tuning;
use crate::sim::actor::Actor;
use crate::sim::broadcast::CallbackBroadcaster;
use crate::sim::combat::CombatEntity;
use crate::sim::role::{Controller, NetMode};
use crate::sim::state::{EntityId, SimEvent, WorldState};
use crate::sim::tick::{TickInput, tick};

/// A connected client as seen by the server
#[derive(Debug)]
struct ClientSlot {
    conn: Connection,
    /// Pawn driven by this client
    entity: EntityId,
    last_ping_sent: Option<f32>,
    /// Ping still waiting for its echo
    awaiting_pong: Option<f32>,
}

/// Authoritative side of the session
#[derive(Debug)]
pub struct ServerSession {
    pub world: WorldState,
    clients: Vec<ClientSlot>,
}

impl ServerSession {
    pub fn new(world: WorldState) -> Self {
        Self {
            world,
            clients: Vec::new(),
        }
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Spawn a pawn for a new client and send it the current world
    pub fn connect(&mut self, conn: Connection, spawn: Vec3) -> EntityId {
        let entity = self.world.spawn_player(Controller::RemotePlayer, spawn);
        let now = self.world.time;

        for actor in &self.world.actors {
            let owned = actor.id() == entity;
            send(&conn, &spawn_message(actor, owned), now);
            if actor.hitbox().id.is_valid() {
                let msg = ServerMessage::HitboxAssigned {
                    entity: actor.id(),
                    id: actor.hitbox().id,
                };
                send(&conn, &msg, now);
            }
            if let Some(msg) = health_message(actor) {
                send(&conn, &msg, now);
            }
            if let Some(npc) = actor.as_npc() {
                if npc.respawn.respawning {
                    let msg = ServerMessage::Respawn {
                        entity: npc.id,
                        info: npc.respawn,
                    };
                    send(&conn, &msg, now);
                }
            }
        }
        if let Some(event) = self.world.match_phase() {
            send(&conn, &ServerMessage::Match { event }, now);
        }

        if let Some(actor) = self.world.actor(entity) {
            let msg = spawn_message(actor, false);
            for slot in &self.clients {
                send(&slot.conn, &msg, now);
            }
        }

        log::info!("Client connected as entity {}", entity.0);
        self.clients.push(ClientSlot {
            conn,
            entity,
            last_ping_sent: None,
            awaiting_pong: None,
        });
        entity
    }

    /// Drop a client and its pawn
    pub fn disconnect(&mut self, entity: EntityId) -> bool {
        let Some(index) = self.clients.iter().position(|c| c.entity == entity) else {
            return false;
        };
        self.clients.remove(index);
        self.world.despawn(entity);
        log::info!("Client for entity {} disconnected", entity.0);
        true
    }

    /// Receive, tick, replicate. Returns the world's events for this step.
    pub fn update(&mut self, input: &TickInput, dt: f32) -> Vec<SimEvent> {
        self.receive();
        tick(&mut self.world, input, dt);
        let events = self.world.drain_events();
        self.replicate(&events);
        self.send_pings();
        events
    }

    fn receive(&mut self) {
        let now = self.world.time;
        for slot in self.clients.iter_mut() {
            for bytes in slot.conn.poll(now) {
                let msg = match ClientMessage::decode(&bytes) {
                    Ok(msg) => msg,
                    Err(err) => {
                        log::warn!("Dropping malformed message from entity {}: {err}", slot.entity.0);
                        continue;
                    }
                };
                match msg {
                    ClientMessage::Move { entity, input } => {
                        if entity != slot.entity {
                            log::warn!(
                                "Entity {} sent a move for entity {}",
                                slot.entity.0,
                                entity.0
                            );
                            continue;
                        }
                        self.world.queue_remote_move(entity, input);
                    }
                    ClientMessage::Pong { sent_at } => {
                        // Only an echo of the outstanding ping counts. The JSON hop
                        // may cost the last bit of the timestamp.
                        let echoes = slot
                            .awaiting_pong
                            .is_some_and(|t| (t - sent_at).abs() <= f32::EPSILON * t.abs().max(1.0));
                        if !echoes {
                            log::warn!(
                                "Ignoring pong from entity {} that echoes no outstanding ping",
                                slot.entity.0
                            );
                            continue;
                        }
                        slot.awaiting_pong = None;
                        self.world.set_ping(slot.entity, now - sent_at);
                    }
                }
            }
        }
    }

    fn replicate(&self, events: &[SimEvent]) {
        let now = self.world.time;
        for event in events {
            match event {
                SimEvent::HitboxAssigned { entity, id } => {
                    self.broadcast(&ServerMessage::HitboxAssigned { entity: *entity, id: *id }, now);
                }
                SimEvent::Health { entity, .. } => {
                    if let Some(msg) = self.world.actor(*entity).and_then(health_message) {
                        self.broadcast(&msg, now);
                    }
                }
                SimEvent::Respawn { entity, info } => {
                    self.broadcast(&ServerMessage::Respawn { entity: *entity, info: *info }, now);
                }
                SimEvent::Match(event) => {
                    self.broadcast(&ServerMessage::Match { event: *event }, now);
                }
                SimEvent::MoveAcked { entity, ack } => {
                    if let Some(slot) = self.clients.iter().find(|c| c.entity == *entity) {
                        send(&slot.conn, &ServerMessage::MoveAck { entity: *entity, ack: *ack }, now);
                    }
                }
                SimEvent::Despawned { entity } => {
                    self.broadcast(&ServerMessage::Despawn { entity: *entity }, now);
                }
                SimEvent::HitboxCollision(_)
                | SimEvent::LocalPlayerReady { .. }
                | SimEvent::MoveRejected { .. }
                | SimEvent::Corrected { .. } => {}
            }
        }

        // Proxies; each client moves its own pawn through acks
        for actor in &self.world.actors {
            let state = actor.move_state();
            let msg = ServerMessage::Transform {
                entity: actor.id(),
                position: state.position,
                velocity: state.velocity,
            };
            for slot in self.clients.iter().filter(|c| c.entity != actor.id()) {
                send(&slot.conn, &msg, now);
            }
        }
    }

    fn send_pings(&mut self) {
        let now = self.world.time;
        let interval = self.world.tuning.net.ping_interval;
        for slot in self.clients.iter_mut() {
            let due = slot.last_ping_sent.is_none_or(|t| now - t >= interval);
            if due {
                send(&slot.conn, &ServerMessage::Ping { sent_at: now }, now);
                slot.last_ping_sent = Some(now);
                slot.awaiting_pong = Some(now);
            }
        }
    }

    fn broadcast(&self, msg: &ServerMessage, now: f32) {
        for slot in &self.clients {
            send(&slot.conn, msg, now);
        }
    }
}

fn send(conn: &Connection, msg: &ServerMessage, now: f32) {
    match msg.encode() {
        Ok(bytes) => {
            if !conn.send(bytes, now) {
                log::debug!("Connection closed, dropping {msg:?}");
            }
        }
        Err(err) => log::warn!("Failed to encode {msg:?}: {err}"),
    }
}

fn spawn_message(actor: &Actor, owned: bool) -> ServerMessage {
    ServerMessage::Spawn {
        entity: actor.id(),
        kind: actor.kind(),
        position: actor.position(),
        owned,
    }
}

fn health_message(actor: &Actor) -> Option<ServerMessage> {
    let health = actor.health()?;
    Some(ServerMessage::Health {
        entity: actor.id(),
        current: health.current(),
        max: health.max(),
        alive: health.is_alive(),
    })
}

/// Predicting side of the session
#[derive(Debug)]
pub struct ClientSession {
    pub world: WorldState,
    conn: Connection,
    /// Pawn this client drives, once the server has spawned it
    entity: Option<EntityId>,
    pawn_ready: CallbackBroadcaster<EntityId>,
}

impl ClientSession {
    pub fn new(tuning: Tuning, conn: Connection) -> Self {
        let mut world = WorldState::new(NetMode::Client, tuning);
        world.begin_play();
        Self {
            world,
            conn,
            entity: None,
            pawn_ready: CallbackBroadcaster::new(),
        }
    }

    pub fn entity(&self) -> Option<EntityId> {
        self.entity
    }

    /// Run `callback` once this client's pawn exists; right away if it
    /// already does.
    pub fn on_pawn_ready(&mut self, callback: impl FnOnce(&EntityId) + 'static) {
        self.pawn_ready.subscribe_once(callback);
    }

    /// Receive, tick, send moves. Returns the world's events for this step.
    pub fn update(&mut self, input: &TickInput, dt: f32) -> Vec<SimEvent> {
        self.receive();
        tick(&mut self.world, input, dt);
        let now = self.world.time;
        for (entity, input) in self.world.take_outgoing_moves() {
            let bytes = ClientMessage::Move { entity, input }.encode();
            self.conn.send(bytes, now);
        }
        self.world.drain_events()
    }

    fn receive(&mut self) {
        let now = self.world.time;
        for bytes in self.conn.poll(now) {
            match ServerMessage::decode(&bytes) {
                Ok(msg) => self.apply(msg),
                Err(err) => log::warn!("Dropping malformed server message: {err}"),
            }
        }
    }

    fn apply(&mut self, msg: ServerMessage) {
        let world = &mut self.world;
        match msg {
            ServerMessage::Spawn {
                entity,
                kind,
                position,
                owned,
            } => {
                world.spawn_replicated(entity, kind, position, owned);
                if owned {
                    self.entity = Some(entity);
                    if world.initialize_player(entity) {
                        self.pawn_ready.publish(entity);
                    }
                }
            }
            ServerMessage::Despawn { entity } => {
                world.despawn(entity);
            }
            ServerMessage::HitboxAssigned { entity, id } => world.apply_hitbox_id(entity, id),
            ServerMessage::Health {
                entity,
                current,
                max,
                alive,
            } => world.apply_health(entity, current, max, alive),
            ServerMessage::Respawn { entity, info } => world.apply_respawn_info(entity, info),
            ServerMessage::Transform {
                entity,
                position,
                velocity,
            } => world.apply_transform(entity, position, velocity),
            ServerMessage::MoveAck { entity, ack } => {
                world.apply_move_ack(entity, &ack);
            }
            ServerMessage::Match { event } => world.apply_match_event(event),
            ServerMessage::Ping { sent_at } => {
                let bytes = ClientMessage::Pong { sent_at }.encode();
                self.conn.send(bytes, world.time);
            }
        }
    }
}
