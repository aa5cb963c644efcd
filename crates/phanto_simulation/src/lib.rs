//! Phanto Simulation Core
//!
//! ECS-симуляция на Bevy 0.16 для mixed reality комнаты:
//! - `nav`: runtime navmesh поверх скана комнаты (floor + мебель + links)
//! - `behaviour`: FSM врагов (Phantom на navmesh, Phanto в воздухе)
//!
//! Всё тикает в FixedUpdate (60Hz) с детерминистичным RNG.
//! Рендер, физика, pathfinding движка — внешние коллабораторы за трейтами.

use bevy::prelude::*;
use bevy::time::TimeUpdateStrategy;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::time::Duration;

// Публичные модули
pub mod behaviour;
pub mod config;
pub mod error;
pub mod logger;
pub mod nav;
pub mod tasks;

// Re-export для удобства
pub use behaviour::BehaviourPlugin;
pub use config::{NavConfig, PhantoConfig, PhantomConfig, SimConfig, WaveTuning};
pub use error::{BehaviourError, NavError};
pub use logger::{init_logger, log, log_error, log_info, log_warning};
pub use nav::NavigationPlugin;

/// Частота simulation tick
pub const FIXED_HZ: f64 = 60.0;

/// Главный plugin симуляции (объединяет все подсистемы)
pub struct SimulationPlugin;

impl Plugin for SimulationPlugin {
    fn build(&self, app: &mut App) {
        // Seed мог задать host (create_headless_app) — не перетираем
        if !app.world().contains_resource::<DeterministicRng>() {
            app.insert_resource(DeterministicRng::new(42));
        }

        app
            // Fixed timestep 60Hz для simulation tick
            .insert_resource(Time::<Fixed>::from_hz(FIXED_HZ))
            .init_resource::<SimConfig>()
            .add_plugins((NavigationPlugin, BehaviourPlugin));
    }
}

/// Детерминистичный RNG resource (seeded)
#[derive(Resource)]
pub struct DeterministicRng {
    pub rng: ChaCha8Rng,
    pub seed: u64,
}

impl DeterministicRng {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            seed,
        }
    }
}

/// Создаёт minimal Bevy App для headless симуляции
///
/// Время ручное: каждый `app.update()` = ровно один fixed tick.
pub fn create_headless_app(seed: u64) -> App {
    let mut app = App::new();
    init_logger();
    app.add_plugins(MinimalPlugins)
        .insert_resource(DeterministicRng::new(seed))
        .insert_resource(Time::<Fixed>::from_hz(FIXED_HZ))
        .insert_resource(TimeUpdateStrategy::ManualDuration(Duration::from_secs_f64(
            1.0 / FIXED_HZ,
        )));

    app
}

/// Один fixed tick headless app'а
///
/// Первый `update()` только инициализирует часы (delta = 0), поэтому
/// для свежего app'а делаем его дважды.
pub fn step_fixed(app: &mut App) {
    let fresh = app.world().resource::<Time<Real>>().last_update().is_none();
    if fresh {
        app.update();
    }
    app.update();
}

/// Snapshot компонентов для сравнения детерминизма (Debug формат, по Entity)
pub fn world_snapshot<T: Component + std::fmt::Debug>(world: &mut World) -> Vec<u8> {
    let mut query = world.query::<(Entity, &T)>();
    let mut entities: Vec<_> = query.iter(world).collect();

    // Сортируем по Entity ID для детерминизма
    entities.sort_by_key(|(entity, _)| entity.index());

    let mut snapshot = Vec::new();
    for (entity, component) in entities {
        snapshot.extend_from_slice(&entity.index().to_le_bytes());
        snapshot.extend_from_slice(format!("{:?}", component).as_bytes());
    }

    snapshot
}
