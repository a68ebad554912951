//! Network roles as seen from one machine

use serde::{Deserialize, Serialize};

/// What kind of machine is running the simulation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetMode {
    /// Single player, no network
    Standalone,
    /// Server with a local player
    ListenServer,
    DedicatedServer,
    Client,
}

impl NetMode {
    /// Whether this machine owns the authoritative state
    pub fn has_authority(self) -> bool {
        !matches!(self, NetMode::Client)
    }
}

/// Who drives an entity, relative to the machine holding it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Controller {
    /// Not a pawn (props, scenery)
    #[default]
    None,
    /// Driven by server-side AI
    Ai,
    /// Driven by input on this machine
    LocalPlayer,
    /// Driven by a player on another machine
    RemotePlayer,
}

impl Controller {
    pub fn is_pawn(self) -> bool {
        !matches!(self, Controller::None)
    }

    pub fn is_player(self) -> bool {
        matches!(self, Controller::LocalPlayer | Controller::RemotePlayer)
    }

    /// AI runs wherever the authority is
    pub fn is_locally_controlled(self, mode: NetMode) -> bool {
        match self {
            Controller::LocalPlayer => true,
            Controller::Ai => mode.has_authority(),
            Controller::None | Controller::RemotePlayer => false,
        }
    }
}

/// Whether a collision between `a` and `b` should be resolved on this machine.
///
/// With authority, collisions touching a remote player's pawn are left to that
/// player's prediction. On a client only collisions involving the local player
/// are resolved; everything else is the server's business.
pub fn resolves_locally(mode: NetMode, a: Controller, b: Controller) -> bool {
    if mode.has_authority() {
        a != Controller::RemotePlayer && b != Controller::RemotePlayer
    } else {
        a == Controller::LocalPlayer || b == Controller::LocalPlayer
    }
}
