//! Behaviour integration test
//!
//! Враги в полном headless App (navigation + behaviour plugins).
//!
//! Проверяем:
//! - Phantom доходит по navmesh до цели и атакует
//! - урон ниже порога не вызывает реакций
//! - Phanto уходит в barrel roll от среднего удара
//! - Rapier sensor события доходят до TargetsInRange

use bevy::ecs::event::EventCursor;
use bevy_rapier3d::prelude::CollisionEvent;
use bevy_rapier3d::rapier::geometry::CollisionEventFlags;
use bevy::prelude::*;
use phanto_simulation::behaviour::*;
use phanto_simulation::nav::{SceneRoom, SceneValidation};
use phanto_simulation::*;

/// Helper: App с комнатой 4×4, validation уже завершена
fn create_room_app(seed: u64, config: SimConfig) -> App {
    let mut app = create_headless_app(seed);
    app.insert_resource(config);
    app.add_plugins(SimulationPlugin);
    app.insert_resource(SceneRoom::empty_box(4.0, 4.0, 2.5));

    for _ in 0..2000 {
        step_fixed(&mut app);
        if !app.world().resource::<SceneValidation>().is_running() {
            break;
        }
    }
    app
}

fn config(app: &App) -> SimConfig {
    app.world().resource::<SimConfig>().clone()
}

fn spawn_crystal(app: &mut App, position: Vec3) -> (Entity, TargetId) {
    let world = app.world_mut();
    let mut registry = world.remove_resource::<TargetRegistry>().unwrap_or_default();
    let spawned = spawn_target(
        &mut world.commands(),
        &mut registry,
        Target::new(TargetKind::Crystal, position),
    );
    world.insert_resource(registry);
    world.flush();
    spawned
}

fn spawn_enemy(app: &mut App, spawn: impl FnOnce(&mut Commands) -> Entity) -> Entity {
    let world = app.world_mut();
    let entity = spawn(&mut world.commands());
    world.flush();
    entity
}

fn phantom_state(app: &App, enemy: Entity) -> Option<PhantomState> {
    app.world()
        .get::<EnemyBehaviour<PhantomCore>>(enemy)
        .and_then(|b| b.current_state())
}

fn phanto_state(app: &App, enemy: Entity) -> Option<PhantoState> {
    app.world()
        .get::<EnemyBehaviour<PhantoCore>>(enemy)
        .and_then(|b| b.current_state())
}

/// Test: Phantom видит кристалл, бежит по navmesh и атакует
#[test]
fn test_phantom_chases_and_attacks_crystal() {
    let mut app = create_room_app(42, SimConfig::default());
    let config = config(&app);
    let enemy = spawn_enemy(&mut app, |commands| {
        spawn_phantom(commands, &config, Vec3::new(-1.2, 0.0, -1.2))
    });
    let (_, crystal) = spawn_crystal(&mut app, Vec3::new(1.2, 0.0, 1.2));

    step_fixed(&mut app);
    app.world_mut().send_event(ProximityEvent {
        enemy,
        target: crystal,
        entered: true,
    });

    let mut cursor = EventCursor::<EnemyAttack>::default();
    let mut attacks = Vec::new();
    for _ in 0..900 {
        step_fixed(&mut app);
        let events = app.world().resource::<Events<EnemyAttack>>();
        attacks.extend(cursor.read(events).copied());
        if !attacks.is_empty() {
            break;
        }
    }

    assert!(!attacks.is_empty(), "phantom never attacked");
    assert_eq!(attacks[0].enemy, enemy);
    assert_eq!(attacks[0].target, crystal);
    assert_eq!(phantom_state(&app, enemy), Some(PhantomState::Attack));

    let position = app.world().get::<Transform>(enemy).expect("transform").translation;
    assert!(position.xz().distance(Vec2::new(1.2, 1.2)) <= config.phantom.attack_range + 1e-3);
}

/// Test: урон ниже pain порога никогда не переключает состояние
#[test]
fn test_sub_threshold_damage_never_reacts() {
    let mut config = SimConfig::default();
    config.phantom.max_health = 100.0;
    config.phantom.pain_chance = 1.0;
    let mut app = create_room_app(7, config.clone());
    let enemy = spawn_enemy(&mut app, |commands| spawn_phantom(commands, &config, Vec3::ZERO));
    step_fixed(&mut app);

    for _ in 0..30 {
        app.world_mut().send_event(EnemyDamaged {
            enemy,
            amount: config.phantom.pain_damage_threshold * 0.5,
            source: Some(Vec3::X),
        });
        step_fixed(&mut app);
        assert_eq!(phantom_state(&app, enemy), Some(PhantomState::Roam));
    }

    let behaviour = app
        .world()
        .get::<EnemyBehaviour<PhantomCore>>(enemy)
        .expect("behaviour");
    assert!(behaviour.host.health < 100.0);
}

/// Test: Phanto — средний удар → Dodge (barrel roll) → обратно в Roam
#[test]
fn test_phanto_dodges_medium_hit() {
    let mut config = SimConfig::default();
    config.phanto.dodge_chance = 1.0;
    config.phanto.pain_chance = 0.0;
    let mut app = create_room_app(3, config.clone());
    let enemy = spawn_enemy(&mut app, |commands| {
        spawn_phanto(commands, &config, Vec3::new(0.0, 1.4, 0.0), Vec3::ZERO)
    });
    step_fixed(&mut app);

    let mut feedback = EventCursor::<EnemyFeedback>::default();
    app.world_mut().send_event(EnemyDamaged {
        enemy,
        amount: 0.5,
        source: Some(Vec3::new(0.0, 1.4, 2.0)),
    });
    step_fixed(&mut app);
    assert_eq!(phanto_state(&app, enemy), Some(PhantoState::Dodge));

    let events = app.world().resource::<Events<EnemyFeedback>>();
    assert!(feedback
        .read(events)
        .any(|f| f.enemy == enemy && f.kind == FeedbackKind::AnimationTrigger("barrel_roll")));

    let ticks = (config.phanto.barrel_roll_duration * FIXED_HZ as f32).ceil() as usize + 2;
    for _ in 0..ticks {
        step_fixed(&mut app);
    }
    assert_eq!(phanto_state(&app, enemy), Some(PhantoState::Roam));
}

/// Test: Rapier sensor → ProximityEvent → TargetsInRange → Chase
#[test]
fn test_sensor_overlap_starts_chase() {
    let mut app = create_room_app(42, SimConfig::default());
    let config = config(&app);
    let enemy = spawn_enemy(&mut app, |commands| spawn_phantom(commands, &config, Vec3::ZERO));
    let (collider, crystal) = spawn_crystal(&mut app, Vec3::new(1.5, 0.0, 0.0));
    step_fixed(&mut app);

    let mut sensors = app
        .world_mut()
        .query_filtered::<(Entity, &ChildOf), With<EnemySensor>>();
    let sensor = sensors
        .iter(app.world())
        .find(|(_, child_of)| child_of.parent() == enemy)
        .map(|(entity, _)| entity)
        .expect("phantom has a sensor");

    app.world_mut()
        .send_event(CollisionEvent::Started(sensor, collider, CollisionEventFlags::SENSOR));
    step_fixed(&mut app);

    let sensed = app.world().get::<TargetsInRange>(enemy).expect("sensed");
    assert!(sensed.contains(crystal));
    assert_eq!(phantom_state(&app, enemy), Some(PhantomState::Chase));
}
