//! Deterministic character movement step
//!
//! Deliberately small: walk along X, jump, asymmetric gravity, a flat floor
//! and a plane constraint on Y. Positions are at the character's feet.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::consts::*;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MovementConfig {
    pub gravity_z: f32,
    /// Gravity scale while moving downward
    pub downward_gravity_multiplier: f32,
    pub max_walk_speed: f32,
    /// Horizontal acceleration toward the input speed
    pub acceleration: f32,
    /// Fraction of `acceleration` available in the air
    pub air_control: f32,
    pub jump_velocity: f32,
    pub floor_z: f32,
    /// Y coordinate characters are locked to
    pub plane_y: f32,
}

impl Default for MovementConfig {
    fn default() -> Self {
        Self {
            gravity_z: GRAVITY_Z,
            downward_gravity_multiplier: DOWNWARD_GRAVITY_MULTIPLIER,
            max_walk_speed: 600.0,
            acceleration: 4096.0,
            air_control: 0.35,
            jump_velocity: 700.0,
            floor_z: 0.0,
            plane_y: 0.0,
        }
    }
}

impl MovementConfig {
    pub fn validated(mut self) -> Self {
        self.downward_gravity_multiplier = self.downward_gravity_multiplier.max(0.0);
        self.max_walk_speed = self.max_walk_speed.max(0.0);
        self.acceleration = self.acceleration.max(0.0);
        self.air_control = self.air_control.clamp(0.0, 1.0);
        self
    }
}

/// Kinematic state of one character
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MoveState {
    pub position: Vec3,
    pub velocity: Vec3,
    pub grounded: bool,
    /// Disabled characters do not move at all
    pub enabled: bool,
}

impl MoveState {
    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            velocity: Vec3::ZERO,
            grounded: false,
            enabled: true,
        }
    }

    /// Launch: horizontal components add, vertical overrides
    pub fn launch(&mut self, impulse: Vec3) {
        self.velocity.x += impulse.x;
        self.velocity.y += impulse.y;
        self.velocity.z = impulse.z;
        self.grounded = false;
    }

    pub fn teleport(&mut self, position: Vec3) {
        self.position = position;
        self.velocity = Vec3::ZERO;
        self.grounded = false;
    }

    pub fn stop(&mut self) {
        self.velocity = Vec3::ZERO;
    }
}

/// Advance `state` by `dt` with walk input `axis` in [-1, 1]
pub fn step(state: &mut MoveState, axis: f32, jump: bool, dt: f32, cfg: &MovementConfig) {
    if !state.enabled || dt <= 0.0 {
        return;
    }

    // Horizontal: approach target speed
    let target = axis.clamp(-1.0, 1.0) * cfg.max_walk_speed;
    let accel = if state.grounded {
        cfg.acceleration
    } else {
        cfg.acceleration * cfg.air_control
    };
    let dv = target - state.velocity.x;
    let max_dv = accel * dt;
    // Launches can push past walk speed; only steer back when grounded
    if state.grounded || state.velocity.x.abs() <= cfg.max_walk_speed {
        state.velocity.x += dv.clamp(-max_dv, max_dv);
    }

    if jump && state.grounded {
        state.velocity.z = cfg.jump_velocity;
        state.grounded = false;
    }

    if !state.grounded {
        let mut g = cfg.gravity_z;
        if state.velocity.z < 0.0 {
            g *= cfg.downward_gravity_multiplier;
        }
        state.velocity.z += g * dt;
    }

    state.position += state.velocity * dt;

    if state.position.z <= cfg.floor_z {
        state.position.z = cfg.floor_z;
        if state.velocity.z < 0.0 {
            state.velocity.z = 0.0;
        }
        state.grounded = state.velocity.z <= 0.0;
    } else {
        state.grounded = false;
    }

    // Plane constraint
    state.position.y = cfg.plane_y;
    state.velocity.y = 0.0;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(state: &mut MoveState, axis: f32, jump: bool, ticks: u32, cfg: &MovementConfig) {
        for _ in 0..ticks {
            step(state, axis, jump, SIM_DT, cfg);
        }
    }

    #[test]
    fn test_falls_to_floor_and_grounds() {
        let cfg = MovementConfig::default();
        let mut state = MoveState::at(Vec3::new(0.0, 0.0, 200.0));
        run(&mut state, 0.0, false, 120, &cfg);
        assert_eq!(state.position.z, cfg.floor_z);
        assert!(state.grounded);
        assert_eq!(state.velocity.z, 0.0);
    }

    #[test]
    fn test_falling_is_faster_than_rising() {
        let cfg = MovementConfig::default();
        let mut rising = MoveState::at(Vec3::new(0.0, 0.0, 500.0));
        rising.velocity.z = 100.0;
        let mut falling = MoveState::at(Vec3::new(0.0, 0.0, 500.0));
        falling.velocity.z = -100.0;
        step(&mut rising, 0.0, false, SIM_DT, &cfg);
        step(&mut falling, 0.0, false, SIM_DT, &cfg);
        let rise_dv = (rising.velocity.z - 100.0).abs();
        let fall_dv = (falling.velocity.z + 100.0).abs();
        assert!((fall_dv / rise_dv - cfg.downward_gravity_multiplier).abs() < 1e-3);
    }

    #[test]
    fn test_plane_constraint() {
        let cfg = MovementConfig::default();
        let mut state = MoveState::at(Vec3::new(0.0, 40.0, 0.0));
        state.launch(Vec3::new(10.0, 300.0, 500.0));
        step(&mut state, 1.0, false, SIM_DT, &cfg);
        assert_eq!(state.position.y, cfg.plane_y);
        assert_eq!(state.velocity.y, 0.0);
    }

    #[test]
    fn test_launch_overrides_vertical() {
        let mut state = MoveState::at(Vec3::ZERO);
        state.velocity = Vec3::new(100.0, 0.0, -400.0);
        state.grounded = true;
        state.launch(Vec3::new(50.0, 0.0, 1000.0));
        assert_eq!(state.velocity, Vec3::new(150.0, 0.0, 1000.0));
        assert!(!state.grounded);
    }

    #[test]
    fn test_jump_only_from_ground() {
        let cfg = MovementConfig::default();
        let mut state = MoveState::at(Vec3::new(0.0, 0.0, 100.0));
        step(&mut state, 0.0, true, SIM_DT, &cfg);
        assert!(state.velocity.z < 0.0);

        run(&mut state, 0.0, false, 120, &cfg);
        step(&mut state, 0.0, true, SIM_DT, &cfg);
        assert!(state.velocity.z > 0.0);
        assert!(state.position.z > cfg.floor_z);
    }

    #[test]
    fn test_walk_reaches_max_speed() {
        let cfg = MovementConfig::default();
        let mut state = MoveState::at(Vec3::ZERO);
        run(&mut state, 0.0, false, 2, &cfg);
        run(&mut state, 1.0, false, 60, &cfg);
        assert!((state.velocity.x - cfg.max_walk_speed).abs() < 1e-3);
    }

    #[test]
    fn test_disabled_does_not_move() {
        let cfg = MovementConfig::default();
        let mut state = MoveState::at(Vec3::new(0.0, 0.0, 100.0));
        state.enabled = false;
        run(&mut state, 1.0, true, 10, &cfg);
        assert_eq!(state.position, Vec3::new(0.0, 0.0, 100.0));
    }

    #[test]
    fn test_deterministic() {
        let cfg = MovementConfig::default();
        let mut a = MoveState::at(Vec3::new(0.0, 0.0, 50.0));
        let mut b = a;
        for i in 0..200 {
            let axis = ((i % 7) as f32 - 3.0) / 3.0;
            let jump = i % 31 == 0;
            step(&mut a, axis, jump, SIM_DT, &cfg);
            step(&mut b, axis, jump, SIM_DT, &cfg);
        }
        assert_eq!(a, b);
    }
}
