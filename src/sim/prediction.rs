//! Client-side prediction of collision bounces
//!
//! A bounce is a one-shot event, not a continuous input, so it travels inside
//! the move that consumed it:
//!
//! 1. A local collision stashes a [`PendingBounce`] on the predicted entity.
//! 2. The next [`MoveInput`] takes it (the stash is cleared).
//! 3. The client applies the move at once and saves it for replay.
//! 4. The server applies the same input, sanity-checking the bounce against
//!    registry history before launching and confirming damage.
//! 5. Acks that disagree with the prediction reset the client to the server
//!    state and replay the unacknowledged moves, launches included.

use std::collections::VecDeque;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use super::combat::HitboxCollision;
use super::hitbox::{CollisionOutcome, HitboxId};
use super::movement::{MoveState, MovementConfig, step};
use super::registry::{HitboxRegistry, HitboxSource};
use super::role::{Controller, NetMode};

/// Longest step the authority accepts from a client move
pub const MAX_MOVE_DT: f32 = 0.1;

/// A locally detected collision waiting for the next move
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingBounce {
    pub this_id: HitboxId,
    pub other_id: HitboxId,
    pub outcome: CollisionOutcome,
}

impl PendingBounce {
    pub fn from_collision(ev: &HitboxCollision) -> Self {
        Self {
            this_id: ev.this_id,
            other_id: ev.other_id,
            outcome: ev.outcome,
        }
    }
}

/// One simulated movement step, as sent over the network
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MoveInput {
    /// Client time the move was generated
    pub timestamp: f32,
    pub dt: f32,
    /// Walk input in [-1, 1]
    pub axis: f32,
    pub jump: bool,
    pub bounce: Option<PendingBounce>,
}

impl MoveInput {
    pub fn wants_bounce(&self) -> bool {
        self.bounce.is_some()
    }
}

/// How the machine running a move relates to the moving entity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveRole {
    /// Client predicting its own pawn
    Predicting,
    /// Authority replaying a remote client's move
    AuthorityRemote,
    /// Authority moving its own local player
    AuthorityLocal,
}

impl MoveRole {
    /// Role for a player pawn, `None` for entities that are not moved by input
    pub fn for_entity(mode: NetMode, controller: Controller) -> Option<MoveRole> {
        match (mode.has_authority(), controller) {
            (false, Controller::LocalPlayer) => Some(MoveRole::Predicting),
            (true, Controller::LocalPlayer) => Some(MoveRole::AuthorityLocal),
            (true, Controller::RemotePlayer) => Some(MoveRole::AuthorityRemote),
            _ => None,
        }
    }
}

/// One direction of an authoritative collision confirmation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Confirmation {
    pub instigator: HitboxId,
    pub target: HitboxId,
    pub apply_damage: bool,
    pub apply_bounce: bool,
}

/// What to do with a move's pending bounce
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BounceDecision {
    pub launch: Option<Vec3>,
    pub confirmations: Vec<Confirmation>,
    /// Failed the authority's sanity check
    pub rejected: bool,
}

/// Decide how a pending bounce affects this move.
///
/// `ping` is the controlling connection's round-trip estimate in seconds.
pub fn resolve_bounce<S: HitboxSource + ?Sized>(
    bounce: &PendingBounce,
    role: MoveRole,
    registry: &HitboxRegistry,
    source: &S,
    ping: f32,
    now: f32,
) -> BounceDecision {
    let mut decision = BounceDecision::default();
    let launch = || {
        bounce
            .outcome
            .bounced_this
            .then(|| registry.bounce_impulse_for(source, bounce.other_id))
    };

    match role {
        MoveRole::Predicting | MoveRole::AuthorityLocal => {
            decision.launch = launch();
        }
        MoveRole::AuthorityRemote => {
            if !registry.sanity_check_bounce(source, bounce.this_id, bounce.other_id, ping, now) {
                log::debug!(
                    "Rejected bounce {} -> {} (ping {:.3}s)",
                    bounce.this_id.0,
                    bounce.other_id.0,
                    ping
                );
                decision.rejected = true;
                return decision;
            }
            decision.launch = launch();
            let o = bounce.outcome;
            decision.confirmations.push(Confirmation {
                instigator: bounce.other_id,
                target: bounce.this_id,
                apply_damage: o.damaged_this,
                apply_bounce: o.bounced_this,
            });
            decision.confirmations.push(Confirmation {
                instigator: bounce.this_id,
                target: bounce.other_id,
                apply_damage: o.damaged_other,
                apply_bounce: o.bounced_other,
            });
        }
    }

    decision
}

/// Deterministic move application: launch first, then integrate
pub fn apply_move(state: &mut MoveState, input: &MoveInput, launch: Option<Vec3>, cfg: &MovementConfig) {
    if let Some(impulse) = launch {
        if impulse != Vec3::ZERO {
            state.launch(impulse);
        }
    }
    step(state, input.axis, input.jump, input.dt, cfg);
}

/// Authoritative state after a client move
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MoveAck {
    pub timestamp: f32,
    pub position: Vec3,
    pub velocity: Vec3,
    pub grounded: bool,
}

impl MoveAck {
    pub fn from_state(timestamp: f32, state: &MoveState) -> Self {
        Self {
            timestamp,
            position: state.position,
            velocity: state.velocity,
            grounded: state.grounded,
        }
    }
}

/// A predicted move kept until the server acknowledges it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SavedMove {
    pub input: MoveInput,
    /// Launch applied when the move was predicted
    pub launch: Option<Vec3>,
    pub result: MoveState,
}

/// Movement of an input-driven pawn, with the pending-bounce stash
#[derive(Debug, Clone)]
pub struct PredictedMovement {
    pub state: MoveState,
    pending: Option<PendingBounce>,
    saved: VecDeque<SavedMove>,
    max_saved: usize,
    corrections: u32,
}

impl PredictedMovement {
    pub fn new(state: MoveState, max_saved: usize) -> Self {
        Self {
            state,
            pending: None,
            saved: VecDeque::new(),
            max_saved: max_saved.max(1),
            corrections: 0,
        }
    }

    /// Stash a collision for the next move. Only locally controlled pawns predict.
    pub fn on_hitbox_collision(&mut self, ev: &HitboxCollision, locally_controlled: bool) {
        if !locally_controlled {
            return;
        }
        if let Some(prev) = self.pending {
            log::debug!(
                "Pending bounce {} -> {} replaced before it was sent",
                prev.this_id.0,
                prev.other_id.0
            );
        }
        self.pending = Some(PendingBounce::from_collision(ev));
    }

    pub fn pending(&self) -> Option<&PendingBounce> {
        self.pending.as_ref()
    }

    /// Build the next move, taking the pending bounce with it
    pub fn build_move(&mut self, timestamp: f32, dt: f32, axis: f32, jump: bool) -> MoveInput {
        MoveInput {
            timestamp,
            dt,
            axis: axis.clamp(-1.0, 1.0),
            jump,
            bounce: self.pending.take(),
        }
    }

    /// Apply a move locally and keep it for replay
    pub fn predict(&mut self, input: MoveInput, launch: Option<Vec3>, cfg: &MovementConfig) {
        apply_move(&mut self.state, &input, launch, cfg);
        self.saved.push_back(SavedMove {
            input,
            launch,
            result: self.state,
        });
        while self.saved.len() > self.max_saved {
            self.saved.pop_front();
        }
    }

    /// Apply a move without saving it (authority side)
    pub fn apply(&mut self, input: &MoveInput, launch: Option<Vec3>, cfg: &MovementConfig) {
        apply_move(&mut self.state, input, launch, cfg);
    }

    /// Fold a server ack into the prediction.
    ///
    /// Returns true when the prediction was corrected and replayed.
    pub fn reconcile(&mut self, ack: &MoveAck, threshold: f32, cfg: &MovementConfig) -> bool {
        let mut acked = None;
        while let Some(front) = self.saved.front() {
            if front.input.timestamp > ack.timestamp {
                break;
            }
            acked = self.saved.pop_front();
        }

        let diverged = match acked {
            Some(m) => m.result.position.distance(ack.position) > threshold,
            // The acked move is gone from history; trust the server
            None => self.saved.is_empty() && self.state.position.distance(ack.position) > threshold,
        };
        if !diverged {
            return false;
        }

        self.state.position = ack.position;
        self.state.velocity = ack.velocity;
        self.state.grounded = ack.grounded;
        for saved in self.saved.iter_mut() {
            apply_move(&mut self.state, &saved.input, saved.launch, cfg);
            saved.result = self.state;
        }
        self.corrections += 1;
        true
    }

    pub fn saved_len(&self) -> usize {
        self.saved.len()
    }

    pub fn corrections(&self) -> u32 {
        self.corrections
    }

    /// Drop predictions and stash (teleport, respawn)
    pub fn clear(&mut self) {
        self.pending = None;
        self.saved.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RegistryTuning;
    use crate::consts::SIM_DT;
    use crate::sim::hitbox::{Hitbox, HitboxConfig, HitboxShape, Hostility};
    use crate::sim::state::EntityId;

    fn world(player_z: f32, enemy_z: f32) -> (HitboxRegistry, Vec<Hitbox>) {
        let tuning = RegistryTuning {
            tolerance_override: Some(2.0),
            ..Default::default()
        };
        let mut registry = HitboxRegistry::new(true, &tuning);
        let shape = HitboxShape::Sphere { radius: 10.0 };
        let mut player = Hitbox::new(
            EntityId(1),
            Controller::RemotePlayer,
            Hostility::Friendly,
            HitboxConfig {
                can_be_bounced: true,
                shape,
                ..Default::default()
            },
        );
        player.position = Vec3::new(0.0, 0.0, player_z);
        let mut enemy = Hitbox::new(
            EntityId(2),
            Controller::Ai,
            Hostility::Enemy,
            HitboxConfig {
                bounce_impulse: Vec3::new(0.0, 0.0, 800.0),
                shape,
                ..Default::default()
            },
        );
        enemy.position = Vec3::new(0.0, 0.0, enemy_z);
        player.id = registry.register_new(Some(&player), 0.0);
        enemy.id = registry.register_new(Some(&enemy), 0.0);
        (registry, vec![player, enemy])
    }

    fn stomp(boxes: &[Hitbox]) -> PendingBounce {
        PendingBounce {
            this_id: boxes[0].id,
            other_id: boxes[1].id,
            outcome: CollisionOutcome {
                bounced_this: true,
                damaged_other: true,
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_predicting_trusts_local_collision() {
        // Far apart: the authority would reject this
        let (registry, boxes) = world(500.0, 0.0);
        let d = resolve_bounce(&stomp(&boxes), MoveRole::Predicting, &registry, &boxes, 0.0, 0.0);
        assert_eq!(d.launch, Some(Vec3::new(0.0, 0.0, 800.0)));
        assert!(d.confirmations.is_empty());
        assert!(!d.rejected);
    }

    #[test]
    fn test_authority_confirms_both_directions() {
        let (registry, boxes) = world(15.0, 0.0);
        let b = stomp(&boxes);
        let d = resolve_bounce(&b, MoveRole::AuthorityRemote, &registry, &boxes, 0.1, 0.0);
        assert_eq!(d.launch, Some(Vec3::new(0.0, 0.0, 800.0)));
        assert_eq!(
            d.confirmations,
            vec![
                Confirmation {
                    instigator: b.other_id,
                    target: b.this_id,
                    apply_damage: false,
                    apply_bounce: true,
                },
                Confirmation {
                    instigator: b.this_id,
                    target: b.other_id,
                    apply_damage: true,
                    apply_bounce: false,
                },
            ]
        );
    }

    #[test]
    fn test_authority_rejects_implausible_bounce() {
        let (registry, boxes) = world(500.0, 0.0);
        let d = resolve_bounce(&stomp(&boxes), MoveRole::AuthorityRemote, &registry, &boxes, 0.0, 0.0);
        assert!(d.rejected);
        assert_eq!(d.launch, None);
        assert!(d.confirmations.is_empty());
    }

    #[test]
    fn test_unassigned_ids_are_rejected() {
        let (registry, boxes) = world(15.0, 0.0);
        let mut b = stomp(&boxes);
        b.other_id = HitboxId::INVALID;
        let d = resolve_bounce(&b, MoveRole::AuthorityRemote, &registry, &boxes, 0.0, 0.0);
        assert!(d.rejected);
    }

    #[test]
    fn test_pending_is_consumed_by_one_move() {
        let (_, boxes) = world(15.0, 0.0);
        let mut pm = PredictedMovement::new(MoveState::at(Vec3::ZERO), 16);
        let ev = HitboxCollision {
            this_id: boxes[0].id,
            this_owner: boxes[0].owner,
            other_id: boxes[1].id,
            other_owner: boxes[1].owner,
            to_this: Default::default(),
            to_other: Default::default(),
            outcome: stomp(&boxes).outcome,
            confirmed: false,
        };

        pm.on_hitbox_collision(&ev, false);
        assert!(pm.pending().is_none());

        pm.on_hitbox_collision(&ev, true);
        let first = pm.build_move(0.0, SIM_DT, 0.0, false);
        let second = pm.build_move(SIM_DT, SIM_DT, 0.0, false);
        assert!(first.wants_bounce());
        assert!(!second.wants_bounce());
        assert!(pm.pending().is_none());
    }

    #[test]
    fn test_server_replay_matches_prediction() {
        let cfg = MovementConfig::default();
        let mut client = PredictedMovement::new(MoveState::at(Vec3::ZERO), 64);
        let mut server = client.clone();
        let launch = Some(Vec3::new(0.0, 0.0, 800.0));

        for i in 0..10 {
            let mut input = client.build_move(i as f32 * SIM_DT, SIM_DT, 1.0, false);
            let l = if i == 3 {
                input.bounce = Some(PendingBounce {
                    this_id: HitboxId(0),
                    other_id: HitboxId(1),
                    outcome: Default::default(),
                });
                launch
            } else {
                None
            };
            client.predict(input, l, &cfg);
            server.apply(&input, l, &cfg);
        }
        assert_eq!(client.state, server.state);
        let ack = MoveAck::from_state(9.0 * SIM_DT, &server.state);
        assert!(!client.reconcile(&ack, 0.5, &cfg));
        assert_eq!(client.saved_len(), 0);
    }

    #[test]
    fn test_correction_replays_launch_once() {
        let cfg = MovementConfig::default();
        let mut client = PredictedMovement::new(MoveState::at(Vec3::ZERO), 64);
        let launch = Some(Vec3::new(0.0, 0.0, 800.0));

        let mut inputs = Vec::new();
        for i in 0..8 {
            let input = client.build_move(i as f32 * SIM_DT, SIM_DT, 0.0, false);
            let l = if i == 5 { launch } else { None };
            client.predict(input, l, &cfg);
            inputs.push((input, l));
        }

        // Server disagrees about where move 2 ended up
        let mut server = MoveState::at(Vec3::ZERO);
        for (input, l) in &inputs[..3] {
            apply_move(&mut server, input, *l, &cfg);
        }
        server.position.x += 40.0;
        let ack = MoveAck::from_state(inputs[2].0.timestamp, &server);

        assert!(client.reconcile(&ack, 1.0, &cfg));
        assert_eq!(client.corrections(), 1);
        assert_eq!(client.saved_len(), 5);

        // Expected: ack state plus moves 3..8 with exactly one launch
        let mut expected = server;
        for (input, l) in &inputs[3..] {
            apply_move(&mut expected, input, *l, &cfg);
        }
        assert_eq!(client.state, expected);
        assert!(client.state.position.x > 39.0);
        assert!(client.state.velocity.z > 0.0);
    }

    #[test]
    fn test_saved_moves_are_bounded() {
        let cfg = MovementConfig::default();
        let mut pm = PredictedMovement::new(MoveState::at(Vec3::ZERO), 4);
        for i in 0..10 {
            let input = pm.build_move(i as f32, SIM_DT, 0.0, false);
            pm.predict(input, None, &cfg);
        }
        assert_eq!(pm.saved_len(), 4);
    }

    #[test]
    fn test_move_roles() {
        assert_eq!(
            MoveRole::for_entity(NetMode::Client, Controller::LocalPlayer),
            Some(MoveRole::Predicting)
        );
        assert_eq!(
            MoveRole::for_entity(NetMode::DedicatedServer, Controller::RemotePlayer),
            Some(MoveRole::AuthorityRemote)
        );
        assert_eq!(
            MoveRole::for_entity(NetMode::ListenServer, Controller::LocalPlayer),
            Some(MoveRole::AuthorityLocal)
        );
        assert_eq!(MoveRole::for_entity(NetMode::Client, Controller::RemotePlayer), None);
        assert_eq!(MoveRole::for_entity(NetMode::Standalone, Controller::Ai), None);
    }
}
