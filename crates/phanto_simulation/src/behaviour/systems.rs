//! Behaviour ECS systems
//!
//! Порядок в FixedUpdate (chained, после navigation):
//! 1. translate_collision_events — Rapier CollisionEvent → Proximity/Contact
//! 2. sync_target_registry — позиции целей из Transform, despawn → unregister
//! 3. run_enemy_behaviours::<H> — события + update состояний (per enemy type)
//! 4. drive_nav_agents — path задачи, recovery links, движение
//! 5. flush_behaviour_outbox — feedback/attack/death/goo события наружу
//! 6. land_goo — плевки → поверхность комнаты (SceneQuery)

use crate::behaviour::agent::{NavAgent, PathPoll};
use crate::behaviour::context::{BehaviourContext, BehaviourOutbox, WorldView};
use crate::behaviour::events::{
    CollisionContact, EnemyAttack, EnemyDamaged, EnemyDied, EnemyFeedback, GooLanded, GooSpit, ProximityEvent,
};
use crate::behaviour::machine::{BehaviourHost, EnemyBehaviour};
use crate::behaviour::phanto::phanto_behaviour;
use crate::behaviour::phantom::phantom_behaviour;
use crate::behaviour::targets::{Target, TargetCollider, TargetId, TargetRegistry, TargetsInRange};
use crate::config::SimConfig;
use crate::error::BehaviourError;
use crate::logger;
use crate::nav::backend::NavMeshHandle;
use crate::nav::bookkeeper::NavMeshBookKeeper;
use crate::nav::generator::NavMeshGenerator;
use crate::nav::physics::ScenePhysics;
use crate::nav::room::SemanticLabel;
use crate::nav::scene_query::{SceneQuery, SurfaceHit};
use crate::nav::systems::{RecoveryLinkRequest, RecoveryLinkResolved};
use crate::nav::AreaMask;
use crate::DeterministicRng;
use bevy::ecs::system::SystemParam;
use bevy::prelude::*;
use bevy_rapier3d::prelude::*;
use bevy_rapier3d::rapier::geometry::CollisionEventFlags;

/// Marker: тело врага (body collider)
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct Enemy;

/// Marker: sense sphere врага (child entity, owner = parent)
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct EnemySensor;

/// Read-only ресурсы, из которых собирается `WorldView`
#[derive(SystemParam)]
pub struct BehaviourWorld<'w> {
    config: Res<'w, SimConfig>,
    targets: Res<'w, TargetRegistry>,
    bookkeeper: Res<'w, NavMeshBookKeeper>,
    mesh: Res<'w, NavMeshHandle>,
    generator: Res<'w, NavMeshGenerator>,
    scene: Res<'w, SceneQuery>,
    physics: Res<'w, ScenePhysics>,
}

impl BehaviourWorld<'_> {
    pub fn view(&self) -> WorldView<'_> {
        WorldView {
            config: &self.config,
            targets: &self.targets,
            bookkeeper: &self.bookkeeper,
            mesh: self.mesh.provider(),
            generator: &self.generator,
            scene: &self.scene,
            physics: self.physics.query(),
        }
    }
}

/// System: Rapier CollisionEvent → ProximityEvent / CollisionContact
///
/// Sensor врага ↔ collider цели = proximity. Тело врага ↔ что угодно
/// (кроме чужих sensor'ов) = contact.
pub fn translate_collision_events(
    mut collisions: EventReader<CollisionEvent>,
    registry: Res<TargetRegistry>,
    sensors: Query<&ChildOf, With<EnemySensor>>,
    enemies: Query<(), With<Enemy>>,
    mut proximity: EventWriter<ProximityEvent>,
    mut contacts: EventWriter<CollisionContact>,
) {
    for event in collisions.read() {
        let (a, b, flags, started) = match event {
            CollisionEvent::Started(a, b, flags) => (*a, *b, *flags, true),
            CollisionEvent::Stopped(a, b, flags) => (*a, *b, *flags, false),
        };

        for (this, other) in [(a, b), (b, a)] {
            if let Ok(child_of) = sensors.get(this) {
                let Some(target) = registry.by_collider(other) else {
                    continue;
                };
                proximity.write(ProximityEvent {
                    enemy: child_of.parent(),
                    target,
                    entered: started,
                });
            } else if enemies.contains(this) && !flags.contains(CollisionEventFlags::SENSOR) {
                contacts.write(CollisionContact {
                    enemy: this,
                    other,
                    target: registry.by_collider(other),
                    started,
                });
            }
        }
    }
}

/// System: позиции целей ← Transform collider'а; despawn collider'а → unregister
pub fn sync_target_registry(
    mut registry: ResMut<TargetRegistry>,
    moved: Query<(&TargetCollider, &Transform), Changed<Transform>>,
    mut removed: RemovedComponents<TargetCollider>,
) {
    for (collider, transform) in moved.iter() {
        registry.set_position(collider.0, transform.translation);
    }

    for entity in removed.read() {
        let Some(id) = registry.detach_collider(entity) else {
            continue;
        };
        if registry.unregister(id).is_some() {
            logger::log(&format!("🎯 Target {:?} removed (collider {:?} despawned)", id, entity));
        }
    }
}

fn report(entity: Entity, result: Result<(), BehaviourError>) {
    if let Err(err) = result {
        logger::log_error(&format!("❌ Enemy {:?}: {}", entity, err));
    }
}

/// Собирает BehaviourContext для одного врага и выполняет body
macro_rules! with_context {
    ($item:expr, $view:expr, $delta:expr, $elapsed:expr, $rng:expr, $outbox:expr, |$behaviour:ident, $ctx:ident| $body:expr) => {{
        let (entity, mut behaviour, mut transform, mut sensed, mut agent) = $item;
        let mut context = BehaviourContext {
            entity,
            delta: $delta,
            elapsed: $elapsed,
            transform: &mut *transform,
            sensed: &mut *sensed,
            agent: agent.as_deref_mut(),
            world: $view,
            rng: &mut $rng.rng,
            outbox: &mut *$outbox,
        };
        let $behaviour = &mut *behaviour;
        let $ctx = &mut context;
        report(entity, $body);
    }};
}

/// System: события + fixed update для всех врагов типа `H`
///
/// Порядок: proximity (обновляет TargetsInRange) → collisions → урон → update.
/// Update идёт по врагам, отсортированным по Entity (детерминизм RNG).
#[allow(clippy::too_many_arguments)]
pub fn run_enemy_behaviours<H: BehaviourHost>(
    world: BehaviourWorld,
    time: Res<Time<Fixed>>,
    mut rng: ResMut<DeterministicRng>,
    mut outbox: ResMut<BehaviourOutbox>,
    mut proximity: EventReader<ProximityEvent>,
    mut contacts: EventReader<CollisionContact>,
    mut damaged: EventReader<EnemyDamaged>,
    mut enemies: Query<(
        Entity,
        &mut EnemyBehaviour<H>,
        &mut Transform,
        &mut TargetsInRange,
        Option<&mut NavAgent>,
    )>,
) {
    let view = world.view();
    let delta = time.delta_secs();
    let elapsed = time.elapsed_secs();

    for event in proximity.read() {
        let Ok(item) = enemies.get_mut(event.enemy) else {
            continue;
        };
        with_context!(item, view, delta, elapsed, rng, outbox, |behaviour, ctx| {
            if event.entered {
                ctx.sensed.on_enter(event.target);
            } else {
                ctx.sensed.on_exit(event.target);
            }
            behaviour.route_proximity(event, ctx)
        });
    }

    for contact in contacts.read() {
        let Ok(item) = enemies.get_mut(contact.enemy) else {
            continue;
        };
        with_context!(item, view, delta, elapsed, rng, outbox, |behaviour, ctx| {
            behaviour.route_collision(contact, ctx)
        });
    }

    for damage in damaged.read() {
        let Ok(item) = enemies.get_mut(damage.enemy) else {
            continue;
        };
        with_context!(item, view, delta, elapsed, rng, outbox, |behaviour, ctx| {
            behaviour.apply_damage(damage, ctx)
        });
    }

    let mut order: Vec<Entity> = enemies.iter().map(|(entity, ..)| entity).collect();
    order.sort();
    for entity in order {
        let Ok(item) = enemies.get_mut(entity) else {
            continue;
        };
        with_context!(item, view, delta, elapsed, rng, outbox, |behaviour, ctx| {
            behaviour.update(ctx)
        });
    }
}

/// System: path задачи агентов + движение по углам пути
///
/// PathPartial → RecoveryLinkRequest (ответ придёт на следующем тике).
pub fn drive_nav_agents(
    time: Res<Time<Fixed>>,
    mesh: Res<NavMeshHandle>,
    mut resolved: EventReader<RecoveryLinkResolved>,
    mut requests: EventWriter<RecoveryLinkRequest>,
    mut agents: Query<(Entity, &mut NavAgent, &mut Transform)>,
) {
    let delta = time.delta_secs();

    for event in resolved.read() {
        let Ok((_, mut agent, _)) = agents.get_mut(event.entity) else {
            continue;
        };
        if agent.on_link_resolved(event.generation) {
            logger::log(&format!(
                "🔗 {:?}: recovery link {:?}, recalculating path",
                event.entity, event.link
            ));
        }
    }

    for (entity, mut agent, mut transform) in agents.iter_mut() {
        let position = transform.translation;
        if let PathPoll::NeedsLink { from, to } = agent.poll_path(position, mesh.provider()) {
            requests.write(RecoveryLinkRequest {
                entity,
                from,
                to,
                mask: agent.mask,
                generation: agent.generation(),
            });
        }

        let next = agent.advance(position, delta);
        let heading = (next - position).with_y(0.0);
        transform.translation = next;
        if heading.length_squared() > 1.0e-8 {
            transform.look_to(heading, Vec3::Y);
        }
    }
}

/// System: BehaviourOutbox → события
pub fn flush_behaviour_outbox(
    mut outbox: ResMut<BehaviourOutbox>,
    mut feedback: EventWriter<EnemyFeedback>,
    mut attacks: EventWriter<EnemyAttack>,
    mut deaths: EventWriter<EnemyDied>,
    mut goo: EventWriter<GooSpit>,
) {
    if outbox.is_empty() {
        return;
    }
    feedback.write_batch(outbox.feedback.drain(..));
    attacks.write_batch(outbox.attacks.drain(..));
    deaths.write_batch(outbox.deaths.drain(..));
    goo.write_batch(outbox.goo.drain(..));
}

/// Дальше этого от ближайшей поверхности goo не прилипает и падает на пол
const GOO_STICK_DISTANCE: f32 = 0.3;

/// System: куда лёг goo (стол, стена, пол...)
///
/// Плевок в воздухе (далеко от любой поверхности) — ближайший пол.
pub fn land_goo(
    mut scene: ResMut<SceneQuery>,
    mut spits: EventReader<GooSpit>,
    mut landed: EventWriter<GooLanded>,
) {
    for spit in spits.read() {
        let stuck = scene.classify(spit.point).filter(|hit| {
            scene
                .closest_surface_with_label(spit.point, hit.label)
                .is_some_and(|(_, distance)| distance <= GOO_STICK_DISTANCE)
        });
        let surface = stuck.or_else(|| {
            scene
                .closest_surface_with_label(spit.point, SemanticLabel::Floor)
                .map(|(anchor, _)| SurfaceHit {
                    anchor,
                    label: SemanticLabel::Floor,
                })
        });
        if surface.is_none() {
            logger::log_warning(&format!("⚠️ Goo from {:?} hit nothing at {:?}", spit.enemy, spit.point));
        }
        landed.write(GooLanded {
            enemy: spit.enemy,
            point: spit.point,
            surface,
        });
    }
}

/// Sense sphere child (Rapier sensor)
fn sensor_bundle(radius: f32) -> impl Bundle {
    (
        EnemySensor,
        Transform::default(),
        Collider::ball(radius),
        Sensor,
        ActiveEvents::COLLISION_EVENTS,
        ActiveCollisionTypes::default() | ActiveCollisionTypes::KINEMATIC_STATIC,
    )
}

/// Spawn Phantom (наземный): NavAgent + capsule body + sense sphere
pub fn spawn_phantom(commands: &mut Commands, config: &SimConfig, position: Vec3) -> Entity {
    let phantom = &config.phantom;
    commands
        .spawn((
            Enemy,
            phantom_behaviour(phantom),
            Transform::from_translation(position),
            TargetsInRange::default(),
            NavAgent::new(phantom.move_speed, phantom.arrive_distance, AreaMask::ALL),
            // Rapier: kinematic тело, двигает NavAgent
            RigidBody::KinematicPositionBased,
            Collider::capsule_y(0.1, 0.08),
            ActiveEvents::COLLISION_EVENTS,
            ActiveCollisionTypes::default() | ActiveCollisionTypes::KINEMATIC_STATIC,
        ))
        .with_child(sensor_bundle(phantom.sense_radius))
        .id()
}

/// Spawn Phanto (летающий босс): steering, без NavAgent
pub fn spawn_phanto(commands: &mut Commands, config: &SimConfig, position: Vec3, home: Vec3) -> Entity {
    let phanto = &config.phanto;
    commands
        .spawn((
            Enemy,
            phanto_behaviour(phanto, home),
            Transform::from_translation(position),
            TargetsInRange::default(),
            RigidBody::KinematicPositionBased,
            Collider::ball(0.3),
            ActiveEvents::COLLISION_EVENTS,
            ActiveCollisionTypes::default() | ActiveCollisionTypes::KINEMATIC_STATIC,
        ))
        .with_child(sensor_bundle(phanto.sense_radius))
        .id()
}

/// Spawn цели с collider'ом (регистрация в TargetRegistry сразу)
pub fn spawn_target(commands: &mut Commands, registry: &mut TargetRegistry, target: Target) -> (Entity, TargetId) {
    let position = target.position;
    let id = registry.register(target);
    let entity = commands
        .spawn((
            TargetCollider(id),
            Transform::from_translation(position),
            Collider::ball(0.1),
            ActiveEvents::COLLISION_EVENTS,
        ))
        .id();
    registry.attach_collider(id, entity);
    (entity, id)
}
