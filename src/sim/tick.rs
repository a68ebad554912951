//! Fixed timestep simulation tick
//!
//! Advances one machine's world. Order within a tick:
//! timers, local player move, queued remote moves, NPC AI, hitbox sync,
//! hitbox overlaps, trigger volumes, match end, snapshot recording.

use std::collections::BTreeSet;

use super::actor::{Actor, ActorKind};
use super::collision::{VolumeKind, hitboxes_overlap};
use super::combat::{CombatEntity, HitboxCollision};
use super::prediction::{BounceDecision, MAX_MOVE_DT, MoveAck, MoveInput, MoveRole, resolve_bounce};
use super::role::Controller;
use super::state::{EntityId, SimEvent, WorldState};

/// Input commands for a single tick (deterministic)
#[derive(Debug, Clone, Default)]
pub struct TickInput {
    /// Walk input for the local player, in [-1, 1]
    pub axis: f32,
    /// Jump (held)
    pub jump: bool,
}

/// Advance the world by one fixed timestep
pub fn tick(world: &mut WorldState, input: &TickInput, dt: f32) {
    world.time_ticks += 1;
    world.time += dt;

    fire_timers(world);
    move_local_player(world, input, dt);
    if world.has_authority() {
        apply_remote_moves(world);
        run_npcs(world, dt);
    }

    for actor in world.actors.iter_mut() {
        actor.sync_hitbox();
    }
    detect_hitbox_overlaps(world);

    if world.has_authority() {
        check_volumes(world);
        if world.is_match_running() && world.all_players_dead() {
            world.end_game(false);
        }
        let now = world.time;
        world.registry.record_snapshots(world.actors.as_slice(), now);
    }
}

fn fire_timers(world: &mut WorldState) {
    for key in world.timers.poll(world.time) {
        world.with_actor(key.entity, |actor, ctx| actor.on_timer(key.kind, ctx));
    }
}

/// Build, resolve and apply this machine's own player move
fn move_local_player(world: &mut WorldState, input: &TickInput, dt: f32) {
    let Some(index) = world
        .actors
        .iter()
        .position(|a| a.controller() == Controller::LocalPlayer)
    else {
        return;
    };
    let Some(role) = MoveRole::for_entity(world.mode, Controller::LocalPlayer) else {
        return;
    };
    let now = world.time;

    let Some(player) = world.actors[index].as_player_mut() else {
        return;
    };
    if !player.health.is_alive() {
        return;
    }
    let entity = player.id;
    let mv = player.movement.build_move(now, dt, input.axis, input.jump);

    let decision = match &mv.bounce {
        Some(bounce) => resolve_bounce(bounce, role, &world.registry, world.actors.as_slice(), 0.0, now),
        None => BounceDecision::default(),
    };

    let cfg = world.tuning.movement;
    if let Some(player) = world.actors[index].as_player_mut() {
        match role {
            MoveRole::Predicting => player.movement.predict(mv, decision.launch, &cfg),
            MoveRole::AuthorityLocal | MoveRole::AuthorityRemote => {
                player.movement.apply(&mv, decision.launch, &cfg)
            }
        }
    }
    if role == MoveRole::Predicting {
        world.outgoing_moves.push((entity, mv));
    }
}

fn apply_remote_moves(world: &mut WorldState) {
    let queued = std::mem::take(&mut world.remote_moves);
    for (entity, moves) in queued {
        for mv in moves {
            apply_remote_move(world, entity, mv);
        }
    }
}

/// Replay one client move on the authority, validating any bounce it carries
fn apply_remote_move(world: &mut WorldState, entity: EntityId, mut mv: MoveInput) {
    let Some(index) = world.actor_index(entity) else {
        return;
    };
    mv.dt = mv.dt.clamp(0.0, MAX_MOVE_DT);
    let ping = world.ping(entity);
    let now = world.time;

    let decision = match &mv.bounce {
        Some(bounce) => resolve_bounce(
            bounce,
            MoveRole::AuthorityRemote,
            &world.registry,
            world.actors.as_slice(),
            ping,
            now,
        ),
        None => BounceDecision::default(),
    };
    if decision.rejected {
        if let Some(bounce) = mv.bounce {
            world.events.push(SimEvent::MoveRejected { entity, bounce });
        }
    }

    let cfg = world.tuning.movement;
    let Some(player) = world.actors[index].as_player_mut() else {
        return;
    };
    player.movement.apply(&mv, decision.launch, &cfg);
    let ack = MoveAck::from_state(mv.timestamp, &player.movement.state);

    for c in decision.confirmations {
        if !c.apply_damage && !c.apply_bounce {
            continue;
        }
        let confirmed = world.registry.confirm_collision(
            world.actors.as_slice(),
            c.instigator,
            c.target,
            c.apply_damage,
            c.apply_bounce,
        );
        if let Some(ev) = confirmed {
            world.deliver(ev);
        }
    }
    world.events.push(SimEvent::MoveAcked { entity, ack });
}

fn run_npcs(world: &mut WorldState, dt: f32) {
    let WorldState {
        actors, rng, tuning, ..
    } = world;
    for actor in actors.iter_mut() {
        if let Actor::Npc(npc) = actor {
            npc.think(dt, rng, tuning);
        }
    }
}

/// Resolve pairs that started overlapping this tick
fn detect_hitbox_overlaps(world: &mut WorldState) {
    let mut current = BTreeSet::new();
    let mut fresh = Vec::new();
    for i in 0..world.actors.len() {
        for j in (i + 1)..world.actors.len() {
            let (a, b) = (world.actors[i].hitbox(), world.actors[j].hitbox());
            let res = hitboxes_overlap(a, b);
            if !res.hit {
                continue;
            }
            let pair = (a.owner, b.owner);
            current.insert(pair);
            if !world.overlaps.contains(&pair) {
                log::trace!(
                    "Entities {} and {} overlap by {:.1} along {:?}",
                    a.owner.0,
                    b.owner.0,
                    res.penetration,
                    res.normal
                );
                fresh.push(pair);
            }
        }
    }
    world.overlaps = current;

    for (a, b) in fresh {
        resolve_pair(world, a, b);
    }
}

fn resolve_pair(world: &mut WorldState, a: EntityId, b: EntityId) {
    let (Some(ha), Some(hb)) = (world.hitbox_of(a), world.hitbox_of(b)) else {
        return;
    };
    let mode = world.mode;
    let (this, other) = if ha.should_process(hb, mode) {
        (ha, hb)
    } else if hb.should_process(ha, mode) {
        (hb, ha)
    } else {
        return;
    };

    let res = this.process_collision(other, mode);
    let ev = HitboxCollision::from_resolution(this, other, &res);
    log::debug!(
        "Hitbox {} ({:?}) vs {} ({:?}): above={} {:?}",
        this.id.0,
        this.hostility,
        other.id.0,
        other.hostility,
        res.above,
        res.outcome
    );
    world.deliver(ev);
    world.deliver(ev.mirrored());
}

/// Kill and goal volumes, begin-overlap only
fn check_volumes(world: &mut WorldState) {
    let mut current = BTreeSet::new();
    let mut entered = Vec::new();
    for (k, volume) in world.volumes.iter().enumerate() {
        for actor in &world.actors {
            let hitbox = actor.hitbox();
            if !hitbox.enabled || !volume.overlaps(hitbox) {
                continue;
            }
            let key = (k, actor.id());
            current.insert(key);
            if !world.volume_overlaps.contains(&key) {
                entered.push((volume.kind, actor.id(), actor.kind()));
            }
        }
    }
    world.volume_overlaps = current;

    let mut goal_reached = false;
    for (kind, entity, actor_kind) in entered {
        match kind {
            VolumeKind::Kill => {
                log::debug!("Entity {} entered a kill volume", entity.0);
                world.with_actor(entity, |actor, ctx| actor.kill(ctx));
            }
            VolumeKind::Goal => {
                let alive = world.actor(entity).is_some_and(|a| a.is_alive());
                if actor_kind == ActorKind::Player && alive {
                    goal_reached = true;
                }
            }
        }
    }
    if goal_reached && world.is_match_running() {
        world.end_game(true);
    }
}
