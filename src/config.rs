//! Gameplay and network tuning
//!
//! Loaded from JSON; every section falls back to its defaults so partial
//! files are valid.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::consts::*;
use crate::sim::hitbox::{HitboxConfig, Hostility};
use crate::sim::movement::MovementConfig;

/// Errors raised while loading or saving tuning files
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("tuning file I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("tuning file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// How forgiving the server is when validating client-reported bounces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum TolerancePreset {
    Strict,
    #[default]
    Standard,
    Lenient,
}

impl TolerancePreset {
    pub fn as_str(&self) -> &'static str {
        match self {
            TolerancePreset::Strict => "Strict",
            TolerancePreset::Standard => "Standard",
            TolerancePreset::Lenient => "Lenient",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "strict" => Some(TolerancePreset::Strict),
            "standard" | "std" => Some(TolerancePreset::Standard),
            "lenient" | "loose" => Some(TolerancePreset::Lenient),
            _ => None,
        }
    }

    /// Multiplier applied to the summed hitbox radii
    pub fn multiplier(&self) -> f32 {
        match self {
            TolerancePreset::Strict => 1.5,
            TolerancePreset::Standard => SANITY_TOLERANCE,
            TolerancePreset::Lenient => 3.0,
        }
    }
}

/// Registry and lag-compensation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryTuning {
    /// Samples kept per hitbox
    pub snapshot_capacity: usize,
    pub tolerance: TolerancePreset,
    /// Exact multiplier, overrides the preset when set
    pub tolerance_override: Option<f32>,
}

impl Default for RegistryTuning {
    fn default() -> Self {
        Self {
            snapshot_capacity: SNAPSHOT_CAPACITY,
            tolerance: TolerancePreset::Standard,
            tolerance_override: None,
        }
    }
}

impl RegistryTuning {
    /// Effective sanity-check multiplier
    pub fn tolerance(&self) -> f32 {
        self.tolerance_override
            .unwrap_or_else(|| self.tolerance.multiplier())
    }
}

/// Player character settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerTuning {
    pub hostility: Hostility,
    pub hitbox: HitboxConfig,
    pub max_health: f32,

    // === Regeneration ===
    pub regenerate: bool,
    /// Seconds after the last damage before healing starts
    pub regen_delay: f32,
    /// Seconds between heals
    pub regen_interval: f32,
    /// Health restored per heal
    pub regen_amount: f32,

    /// Seconds of damage immunity after being hurt
    pub immunity_secs: f32,
}

impl Default for PlayerTuning {
    fn default() -> Self {
        Self {
            hostility: Hostility::Friendly,
            hitbox: HitboxConfig {
                can_be_bounced: true,
                ..HitboxConfig::default()
            },
            max_health: DEFAULT_MAX_HEALTH,
            regenerate: true,
            regen_delay: 5.0,
            regen_interval: 1.0,
            regen_amount: 1.0,
            immunity_secs: 1.0,
        }
    }
}

/// NPC settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NpcTuning {
    pub hostility: Hostility,
    pub hitbox: HitboxConfig,
    pub max_health: f32,

    // === Respawn ===
    pub can_respawn: bool,
    /// Respawn delay in seconds; zero or less respawns instantly
    pub respawn_delay: f32,

    // === Behaviour ===
    pub should_move: bool,
    /// Patrol distance either side of the spawn point
    pub patrol_half_width: f32,
    /// Walk input scale (0..1 of max walk speed)
    pub walk_input: f32,
    pub random_jump: bool,
    pub jump_interval: f32,
    pub jump_interval_variance: f32,
    /// Probability of jumping at each attempt
    pub jump_chance: f32,
}

impl Default for NpcTuning {
    fn default() -> Self {
        Self {
            hostility: Hostility::Enemy,
            hitbox: HitboxConfig {
                can_be_bounced: true,
                ..HitboxConfig::default()
            },
            max_health: DEFAULT_MAX_HEALTH,
            can_respawn: true,
            respawn_delay: 3.0,
            should_move: true,
            patrol_half_width: 200.0,
            walk_input: 0.5,
            random_jump: true,
            jump_interval: 1.0,
            jump_interval_variance: 0.1,
            jump_chance: 0.3,
        }
    }
}

/// Prediction and transport settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetTuning {
    /// Position error (cm) above which a client replays its saved moves
    pub correction_threshold: f32,
    /// Saved moves kept for replay
    pub max_saved_moves: usize,
    /// Seconds between server pings
    pub ping_interval: f32,
    /// Upper bound (seconds) on a measured round trip. Bounds how far back
    /// the authority rewinds when checking a claimed bounce.
    pub max_ping: f32,
}

impl Default for NetTuning {
    fn default() -> Self {
        Self {
            correction_threshold: 2.0,
            max_saved_moves: 96,
            ping_interval: 0.5,
            max_ping: 0.5,
        }
    }
}

/// All tuning for one world
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Tuning {
    /// Seed for NPC behaviour
    pub seed: u64,
    pub registry: RegistryTuning,
    pub movement: MovementConfig,
    pub player: PlayerTuning,
    pub npc: NpcTuning,
    pub net: NetTuning,
}

impl Tuning {
    /// Parse tuning from JSON and clamp unsafe values
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let tuning: Tuning = serde_json::from_str(json)?;
        Ok(tuning.validated())
    }

    /// Load tuning from a file
    pub fn try_load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Load tuning, falling back to defaults when the file is missing or bad
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::try_load(path) {
            Ok(tuning) => {
                log::info!("Loaded tuning from {}", path.display());
                tuning
            }
            Err(err) => {
                log::info!("Using default tuning ({err})");
                Self::default()
            }
        }
    }

    /// Write tuning as pretty JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Clamp configuration errors to safe values instead of rejecting them
    pub fn validated(mut self) -> Self {
        self.registry.snapshot_capacity = self.registry.snapshot_capacity.max(1);
        if let Some(t) = self.registry.tolerance_override {
            self.registry.tolerance_override = Some(t.max(0.0));
        }
        self.player.hitbox = self.player.hitbox.validated();
        self.npc.hitbox = self.npc.hitbox.validated();
        self.player.max_health = self.player.max_health.max(MIN_MAX_HEALTH);
        self.npc.max_health = self.npc.max_health.max(MIN_MAX_HEALTH);
        self.player.regen_interval = self.player.regen_interval.max(SIM_DT);
        self.player.regen_delay = self.player.regen_delay.max(0.0);
        self.player.immunity_secs = self.player.immunity_secs.max(0.0);
        self.npc.jump_chance = self.npc.jump_chance.clamp(0.0, 1.0);
        self.npc.jump_interval = self.npc.jump_interval.max(SIM_DT);
        self.npc.jump_interval_variance = self
            .npc
            .jump_interval_variance
            .clamp(0.0, self.npc.jump_interval);
        self.npc.walk_input = self.npc.walk_input.clamp(0.0, 1.0);
        self.net.max_saved_moves = self.net.max_saved_moves.max(1);
        self.net.correction_threshold = self.net.correction_threshold.max(0.0);
        self.net.ping_interval = self.net.ping_interval.max(SIM_DT);
        self.net.max_ping = self.net.max_ping.max(0.0);
        self.movement = self.movement.validated();
        self
    }
}
