//! hitbox-net - combat collision authority for a networked 2D platformer
//!
//! Core modules:
//! - `sim`: Per-machine simulation (hitboxes, registry, health, prediction)
//! - `net`: Wire codec, messages, in-process transport and sessions
//! - `config`: Data-driven tuning

pub mod config;
pub mod net;
pub mod sim;

pub use config::{Tuning, TolerancePreset};

/// Simulation constants
pub mod consts {
    /// Fixed simulation timestep (60 Hz)
    pub const SIM_DT: f32 = 1.0 / 60.0;

    /// Snapshot samples kept per hitbox on the authority
    pub const SNAPSHOT_CAPACITY: usize = 50;
    /// Default sanity-check multiplier applied to the summed radii
    pub const SANITY_TOLERANCE: f32 = 2.5;

    /// Hitbox defaults
    pub const DEFAULT_BOUNCE_IMPULSE_Z: f32 = 1000.0;
    pub const DEFAULT_DAMAGE: f32 = 50.0;
    pub const DEFAULT_THRESHOLD_FRACTION: f32 = 0.75;
    pub const DEFAULT_HITBOX_RADIUS: f32 = 32.0;

    /// Gravity along Z (cm/s²)
    pub const GRAVITY_Z: f32 = -980.0;
    /// Extra gravity while falling so jumps feel snappy
    pub const DOWNWARD_GRAVITY_MULTIPLIER: f32 = 2.0;

    /// Health defaults
    pub const DEFAULT_MAX_HEALTH: f32 = 100.0;
    pub const MIN_MAX_HEALTH: f32 = 1.0;
}

/// Linear interpolation between `a` and `b`
#[inline]
pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}
