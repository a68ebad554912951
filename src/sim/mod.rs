//! Deterministic simulation module
//!
//! All gameplay logic lives here. Each machine runs its own copy:
//! - Fixed timestep only
//! - Seeded RNG only
//! - Stable iteration order (by entity ID)
//! - No transport dependencies; the `net` module feeds it messages

pub mod actor;
pub mod broadcast;
pub mod collision;
pub mod combat;
pub mod health;
pub mod hitbox;
pub mod movement;
pub mod prediction;
pub mod registry;
pub mod role;
pub mod snapshot;
pub mod state;
pub mod tick;
pub mod timer;

pub use actor::{Actor, ActorKind, Npc, Player, RespawnInfo};
pub use broadcast::{CallbackBroadcaster, ReadyBroadcaster};
pub use collision::{CollisionResult, Volume, VolumeKind, hitboxes_overlap, shapes_overlap};
pub use combat::{CombatEntity, HitboxCollision};
pub use health::{Health, HealthEvent};
pub use hitbox::{CollisionOutcome, Effect, Hitbox, HitboxConfig, HitboxId, HitboxShape, Hostility};
pub use movement::{MoveState, MovementConfig};
pub use prediction::{MoveAck, MoveInput, PendingBounce, PredictedMovement};
pub use registry::{HitboxRegistry, HitboxSource};
pub use role::{Controller, NetMode, resolves_locally};
pub use snapshot::SnapshotBuffer;
pub use state::{EntityId, MatchEvent, SimEvent, WorldState};
pub use tick::{TickInput, tick};
pub use timer::{TimerKey, TimerKind, TimerQueue};
