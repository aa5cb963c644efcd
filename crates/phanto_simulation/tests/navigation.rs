//! Navigation integration test
//!
//! Полный headless App: SceneRoom → floor + мебель → validation → links.
//!
//! Проверяем:
//! - room setup строит пол, мебель и hop links
//! - scene validation завершается и помечает open треугольники
//! - RandomPointOnFloor соблюдает минимальную дистанцию
//! - смена комнаты сносит старую мебель
//! - recovery link запросы получают ответ

use bevy::prelude::*;
use phanto_simulation::nav::systems::{RecoveryLinkRequest, RecoveryLinkResolved};
use phanto_simulation::nav::*;
use phanto_simulation::*;

const MAX_VALIDATION_TICKS: usize = 2000;

/// Helper: App со всеми plugins
fn create_nav_app(seed: u64) -> App {
    let mut app = create_headless_app(seed);
    app.add_plugins(SimulationPlugin);
    app
}

fn room_with_table() -> SceneRoom {
    let mut room = SceneRoom::empty_box(4.0, 4.0, 2.5);
    room.add_furniture(SemanticLabel::Table, Vec2::ZERO, 0.0, Vec3::new(1.0, 0.8, 0.5));
    room
}

/// Тикаем, пока validation не закончится
fn settle(app: &mut App) -> usize {
    for tick in 0..MAX_VALIDATION_TICKS {
        step_fixed(app);
        if !app.world().resource::<SceneValidation>().is_running() {
            return tick + 1;
        }
    }
    panic!("scene validation did not finish in {} ticks", MAX_VALIDATION_TICKS);
}

fn furniture_generators(app: &mut App) -> Vec<FurnitureNavMeshGenerator> {
    let mut query = app.world_mut().query::<&FurnitureNavMeshGenerator>();
    query.iter(app.world()).cloned().collect()
}

#[test]
fn test_room_setup_builds_floor_furniture_and_hop_link() {
    let mut app = create_nav_app(42);
    app.insert_resource(room_with_table());
    settle(&mut app);

    let generators = furniture_generators(&mut app);
    assert_eq!(generators.len(), 1);
    let table = &generators[0];
    assert!(table.hop_link.is_some());

    let bookkeeper = app.world().resource::<NavMeshBookKeeper>();
    assert!(!bookkeeper.owner_triangles(OwnerId::FLOOR).is_empty());
    assert!(!bookkeeper.owner_triangles(table.owner).is_empty());
    // Поверхность мебели лежит на верхней грани стола (0.5m)
    assert!(bookkeeper
        .owner_triangles(table.owner)
        .iter()
        .all(|t| (t.centroid.y - 0.5).abs() < 1e-4));

    let links = app.world().resource::<NavMeshLinkController>();
    let hop = links.links_of(table.owner).find(|l| l.area == NavArea::JUMP);
    assert!(hop.is_some());
}

#[test]
fn test_validation_marks_open_floor() {
    let mut app = create_nav_app(42);
    app.insert_resource(SceneRoom::empty_box(4.0, 4.0, 2.5));
    settle(&mut app);

    let bookkeeper = app.world().resource::<NavMeshBookKeeper>();
    let all = bookkeeper.owner_triangles(OwnerId::FLOOR).len();
    let open = bookkeeper.open_triangles(OwnerId::FLOOR).len();
    assert!(all > 0);
    // Пустая комната: всё под высоким потолком, кроме треугольников у стен
    assert!(open > 0);
    assert!(open <= all);
}

#[test]
fn test_random_point_on_floor_keeps_min_distance() {
    let mut app = create_nav_app(42);
    app.insert_resource(SceneRoom::empty_box(4.0, 4.0, 2.5));
    settle(&mut app);

    let world = app.world_mut();
    let mut rng = world.remove_resource::<DeterministicRng>().expect("rng");
    let generator = world.resource::<NavMeshGenerator>();
    let bookkeeper = world.resource::<NavMeshBookKeeper>();
    let mesh = world.resource::<NavMeshHandle>();
    let config = world.resource::<SimConfig>();

    let from = Vec3::new(0.5, 0.0, -0.5);
    for _ in 0..100 {
        let point = generator
            .random_point_on_floor(
                from,
                1.0,
                true,
                bookkeeper,
                mesh.provider(),
                &mut rng.rng,
                &config.nav,
            )
            .expect("floor is built");
        assert!(point.xz().distance(from.xz()) >= 1.0 - 1e-4, "too close: {:?}", point);
        assert!(point.x.abs() <= 2.0 && point.z.abs() <= 2.0);
    }
}

#[test]
fn test_room_change_tears_down_old_furniture() {
    let mut app = create_nav_app(42);
    app.insert_resource(room_with_table());
    settle(&mut app);
    let old_owner = furniture_generators(&mut app)[0].owner;

    app.insert_resource(SceneRoom::empty_box(3.0, 3.0, 2.5));
    settle(&mut app);

    assert!(furniture_generators(&mut app).is_empty());
    let bookkeeper = app.world().resource::<NavMeshBookKeeper>();
    assert!(!bookkeeper.has_owner(old_owner));
    assert!(bookkeeper.has_owner(OwnerId::FLOOR));
    let links = app.world().resource::<NavMeshLinkController>();
    assert_eq!(links.links_of(old_owner).count(), 0);
    assert!(app.world().resource::<ValidationSubscribers>().is_empty());
}

#[test]
fn test_recovery_link_not_needed_on_open_floor() {
    let mut app = create_nav_app(42);
    app.insert_resource(SceneRoom::empty_box(4.0, 4.0, 2.5));
    settle(&mut app);

    let entity = app.world_mut().spawn_empty().id();
    app.world_mut().send_event(RecoveryLinkRequest {
        entity,
        from: Vec3::new(-1.0, 0.0, 0.0),
        to: Vec3::new(1.0, 0.0, 0.0),
        mask: AreaMask::ALL,
        generation: 3,
    });
    step_fixed(&mut app);

    let events = app.world().resource::<Events<RecoveryLinkResolved>>();
    let mut cursor = events.get_cursor();
    let resolved: Vec<_> = cursor.read(events).copied().collect();
    assert_eq!(
        resolved,
        vec![RecoveryLinkResolved {
            entity,
            generation: 3,
            link: None,
        }]
    );
}
