//! hitbox-net headless demo
//!
//! Runs a dedicated server and two predicting clients over simulated
//! latency links and logs what happens. Set `RUST_LOG=debug` to see every
//! collision and rejected bounce.
//!
//! Usage: `hitbox-net [tuning.json]`

use glam::Vec3;

use hitbox_net::Tuning;
use hitbox_net::consts::SIM_DT;
use hitbox_net::net::{ClientSession, ServerSession, link_pair};
use hitbox_net::sim::{MatchEvent, NetMode, SimEvent, TickInput, Volume, VolumeKind, WorldState};

/// Demo length in seconds
const DEMO_SECS: f32 = 12.0;

#[cfg(not(target_arch = "wasm32"))]
fn main() {
    env_logger::init();
    log::info!("hitbox-net demo starting...");

    let tuning = match std::env::args().nth(1) {
        Some(path) => Tuning::load(path),
        None => Tuning::default(),
    };

    let mut world = WorldState::new(NetMode::DedicatedServer, tuning.clone());
    world.spawn_npc(Vec3::new(0.0, 0.0, 0.0));
    world.spawn_npc(Vec3::new(600.0, 0.0, 0.0));
    world.add_volume(Volume::new(
        VolumeKind::Kill,
        Vec3::new(-2000.0, -100.0, -100.0),
        Vec3::new(-1200.0, 100.0, 50.0),
    ));
    world.add_volume(Volume::new(
        VolumeKind::Goal,
        Vec3::new(1800.0, -100.0, 0.0),
        Vec3::new(2000.0, 100.0, 300.0),
    ));
    world.begin_play();
    world.start_game();
    let mut server = ServerSession::new(world);

    // A nearby client dropping onto the first NPC, and a laggy one that walks
    let (server_end, client_end) = link_pair(0.03);
    server.connect(server_end, Vec3::new(0.0, 0.0, 200.0));
    let mut stomper = ClientSession::new(tuning.clone(), client_end);
    stomper.on_pawn_ready(|id| log::info!("Stomper controls entity {}", id.0));

    let (server_end, client_end) = link_pair(0.12);
    server.connect(server_end, Vec3::new(-400.0, 0.0, 0.0));
    let mut runner = ClientSession::new(tuning, client_end);
    runner.on_pawn_ready(|id| log::info!("Runner controls entity {}", id.0));

    let idle = TickInput::default();
    let walk = TickInput {
        axis: 1.0,
        ..Default::default()
    };

    let ticks = (DEMO_SECS / SIM_DT) as u32;
    let mut confirmed = 0u32;
    let mut rejected = 0u32;
    for _ in 0..ticks {
        for event in server.update(&idle, SIM_DT) {
            match event {
                SimEvent::HitboxCollision(c) if c.confirmed => confirmed += 1,
                SimEvent::MoveRejected { entity, .. } => {
                    rejected += 1;
                    log::info!("Server rejected a bounce from entity {}", entity.0);
                }
                SimEvent::Match(MatchEvent::Ended { won }) => {
                    log::info!("Match over: {}", if won { "won" } else { "lost" });
                }
                _ => {}
            }
        }
        stomper.update(&idle, SIM_DT);
        let events = runner.update(&walk, SIM_DT);
        for event in events {
            if let SimEvent::Corrected { entity } = event {
                log::info!("Runner {} corrected by server", entity.0);
            }
        }
    }

    for actor in &server.world.actors {
        let pos = actor.position();
        log::info!(
            "Entity {} ({:?}) at ({:.0}, {:.0})",
            actor.id().0,
            actor.kind(),
            pos.x,
            pos.z
        );
    }
    println!(
        "Ran {ticks} ticks: {confirmed} confirmed hits, {rejected} rejected bounces, match {:?}",
        server.world.match_phase()
    );
}

#[cfg(target_arch = "wasm32")]
fn main() {
    // The demo is native only
}
