//! Behaviour domain — enemy FSM framework, Phantom и Phanto.
//!
//! # Architecture
//!
//! `EnemyBehaviour<H>` (component) = host core + таблица состояний. Системы
//! собирают `BehaviourContext` (transform, цели, navmesh, RNG) и маршрутизируют
//! proximity/collision/урон в текущее состояние, затем делают fixed update.
//! Наружу уходят только события (`EnemyAttack`, `EnemyFeedback`, `EnemyDied`).
//!
//! # Submodules
//!
//! - `machine`: StateMachine, BehaviourHost, EnemyState, EnemyBehaviour
//! - `context`: BehaviourContext + WorldView + outbox
//! - `events`: proximity/collision/damage/feedback события
//! - `targets`: TargetRegistry, TargetsInRange
//! - `agent`: NavAgent (path задачи + recovery links)
//! - `steering`: spring-damper primitives для полёта
//! - `phantom`, `phanto`: наборы состояний врагов
//! - `systems`: ECS системы + spawn helpers

use bevy::prelude::*;
use bevy_rapier3d::prelude::CollisionEvent;

pub mod agent;
pub mod context;
pub mod events;
pub mod machine;
pub mod phanto;
pub mod phantom;
pub mod steering;
pub mod systems;
pub mod targets;

pub use agent::{AgentStatus, NavAgent, PathPoll};
pub use context::{BehaviourContext, BehaviourOutbox, WorldView};
pub use events::{
    should_react, CollisionContact, EnemyAttack, EnemyDamaged, EnemyDied, EnemyFeedback, FeedbackKind,
    GooLanded, GooSpit, ProximityEvent,
};
pub use machine::{BehaviourHost, EnemyBehaviour, EnemyState, StateMachine, MAX_TRANSITION_CHAIN};
pub use phanto::{phanto_behaviour, PhantoCore, PhantoState};
pub use phantom::{phantom_behaviour, PhantomCore, PhantomState};
pub use systems::{spawn_phanto, spawn_phantom, spawn_target, Enemy, EnemySensor};
pub use targets::{Target, TargetCollider, TargetId, TargetKind, TargetRegistry, TargetsInRange};

/// Behaviour Plugin
///
/// Регистрирует события/ресурсы и системы в FixedUpdate после navigation
/// (recovery links этого тика уже разрешены).
/// Порядок выполнения:
/// 1. translate_collision_events — Rapier → ProximityEvent / CollisionContact
/// 2. sync_target_registry — позиции целей, отписка despawned
/// 3. run_enemy_behaviours (Phantom, затем Phanto)
/// 4. drive_nav_agents — пути и движение наземных врагов
/// 5. flush_behaviour_outbox — события наружу
/// 6. land_goo — классификация поверхности под плевком
pub struct BehaviourPlugin;

impl Plugin for BehaviourPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<TargetRegistry>()
            .init_resource::<BehaviourOutbox>()
            // Без RapierPhysicsPlugin событие никто не регистрирует (headless)
            .add_event::<CollisionEvent>()
            .add_event::<ProximityEvent>()
            .add_event::<CollisionContact>()
            .add_event::<EnemyDamaged>()
            .add_event::<EnemyAttack>()
            .add_event::<EnemyDied>()
            .add_event::<EnemyFeedback>()
            .add_event::<GooSpit>()
            .add_event::<GooLanded>();

        app.add_systems(
            FixedUpdate,
            (
                systems::translate_collision_events,
                systems::sync_target_registry,
                systems::run_enemy_behaviours::<PhantomCore>,
                systems::run_enemy_behaviours::<PhantoCore>,
                systems::drive_nav_agents,
                systems::flush_behaviour_outbox,
                systems::land_goo,
            )
                .chain() // Последовательное выполнение для детерминизма
                .after(crate::nav::systems::resolve_recovery_links),
        );
    }
}
