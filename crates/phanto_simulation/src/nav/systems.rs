//! Navigation ECS systems
//!
//! Все системы в FixedUpdate (chained, см. NavigationPlugin).

use crate::config::SimConfig;
use crate::logger;
use crate::nav::backend::NavMeshHandle;
use crate::nav::bookkeeper::NavMeshBookKeeper;
use crate::nav::furniture::{FurnitureNavMeshGenerator, ValidationSubscribers};
use crate::nav::generator::NavMeshGenerator;
use crate::nav::links::NavMeshLinkController;
use crate::nav::physics::ScenePhysics;
use crate::nav::room::SceneRoom;
use crate::nav::scene_query::SceneQuery;
use crate::nav::validation::{SceneValidated, ValidateSceneRequest};
use crate::nav::{AreaMask, LinkId, OwnerId};
use bevy::prelude::*;

/// Агент получил PathPartial — просит link до цели
#[derive(Event, Debug, Clone, Copy, PartialEq)]
pub struct RecoveryLinkRequest {
    pub entity: Entity,
    pub from: Vec3,
    pub to: Vec3,
    pub mask: AreaMask,
    /// Поколение destination агента (устаревшие ответы игнорируются)
    pub generation: u32,
}

/// Ответ на RecoveryLinkRequest (`link == None` — link не понадобился или не создан)
#[derive(Event, Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryLinkResolved {
    pub entity: Entity,
    pub generation: u32,
    pub link: Option<LinkId>,
}

/// System: полный rebuild навигации при смене SceneRoom
///
/// Старые furniture генераторы сносятся, floor строится заново,
/// мебель спавнится entity'ями (build в `initialize_furniture_generators`).
#[allow(clippy::too_many_arguments)]
pub fn setup_room_navigation(
    mut commands: Commands,
    room: Option<Res<SceneRoom>>,
    config: Res<SimConfig>,
    mut bookkeeper: ResMut<NavMeshBookKeeper>,
    mut mesh: ResMut<NavMeshHandle>,
    mut controller: ResMut<NavMeshLinkController>,
    mut generator: ResMut<NavMeshGenerator>,
    mut physics: ResMut<ScenePhysics>,
    mut scene_query: ResMut<SceneQuery>,
    mut subscribers: ResMut<ValidationSubscribers>,
    mut furniture: Query<(Entity, &mut FurnitureNavMeshGenerator)>,
    mut validate: EventWriter<ValidateSceneRequest>,
) {
    let Some(room) = room else {
        return;
    };
    if !room.is_changed() {
        return;
    }

    for (entity, mut old) in furniture.iter_mut() {
        old.teardown(&mut bookkeeper, mesh.provider_mut(), &mut controller);
        subscribers.unsubscribe(entity);
        commands.entity(entity).despawn();
    }
    controller.clear(mesh.provider_mut());
    bookkeeper.clear_nav_mesh_triangles(OwnerId::FLOOR, mesh.provider_mut());
    bookkeeper.reset();

    physics.replace(room.to_box_scene());
    scene_query.register_room(&room);

    let floor = generator.initialize(&room, &mut bookkeeper, mesh.provider_mut(), &config.nav);

    let mut spawned = 0;
    for anchor in room.furniture() {
        if let Some(furniture_generator) = FurnitureNavMeshGenerator::from_anchor(anchor, &config.nav) {
            commands.spawn(furniture_generator);
            spawned += 1;
        }
    }

    logger::log(&format!(
        "🏠 Room navigation: floor {} triangles, {} furniture generators, {} anchors",
        floor.len(),
        spawned,
        room.anchors.len()
    ));

    validate.write(ValidateSceneRequest {
        ceiling_y: room.ceiling_y,
    });
}

/// System: build новых furniture генераторов + подписка на SceneValidated
#[allow(clippy::too_many_arguments)]
pub fn initialize_furniture_generators(
    room: Option<Res<SceneRoom>>,
    config: Res<SimConfig>,
    mut bookkeeper: ResMut<NavMeshBookKeeper>,
    mut mesh: ResMut<NavMeshHandle>,
    mut controller: ResMut<NavMeshLinkController>,
    physics: Res<ScenePhysics>,
    mut subscribers: ResMut<ValidationSubscribers>,
    mut added: Query<(Entity, &mut FurnitureNavMeshGenerator), Added<FurnitureNavMeshGenerator>>,
    mut validate: EventWriter<ValidateSceneRequest>,
) {
    let Some(room) = room else {
        return;
    };

    let mut built = 0;
    for (entity, mut furniture) in added.iter_mut() {
        let triangles = furniture.initialize(
            &room,
            &mut bookkeeper,
            mesh.provider_mut(),
            &mut controller,
            physics.query(),
            &config.nav,
        );
        subscribers.subscribe(entity, furniture.owner);
        logger::log(&format!(
            "🪑 Furniture {:?} ({:?}): {} triangles",
            furniture.anchor,
            furniture.owner,
            triangles.len()
        ));
        built += 1;
    }

    // Новая мебель меняет headroom — open флаги надо пересчитать
    if built > 0 {
        validate.write(ValidateSceneRequest {
            ceiling_y: room.ceiling_y,
        });
    }
}

/// System: отписка + очистка surface/links удалённой мебели
pub fn teardown_furniture_generators(
    mut removed: RemovedComponents<FurnitureNavMeshGenerator>,
    mut subscribers: ResMut<ValidationSubscribers>,
    mut bookkeeper: ResMut<NavMeshBookKeeper>,
    mut mesh: ResMut<NavMeshHandle>,
    mut controller: ResMut<NavMeshLinkController>,
) {
    for entity in removed.read() {
        // Уже снесено room setup'ом
        let Some(owner) = subscribers.unsubscribe(entity) else {
            continue;
        };
        controller.remove_owner_links(owner, mesh.provider_mut());
        bookkeeper.clear_nav_mesh_triangles(owner, mesh.provider_mut());
        logger::log(&format!("🗑️ Furniture {:?} removed from navigation", owner));
    }
}

/// System: SceneValidated → furniture генераторы пересобирают внутренние links
pub fn regenerate_furniture_links(
    mut validated: EventReader<SceneValidated>,
    config: Res<SimConfig>,
    bookkeeper: Res<NavMeshBookKeeper>,
    mut mesh: ResMut<NavMeshHandle>,
    mut controller: ResMut<NavMeshLinkController>,
    subscribers: Res<ValidationSubscribers>,
    mut furniture: Query<&mut FurnitureNavMeshGenerator>,
) {
    if validated.read().count() == 0 {
        return;
    }

    for entity in subscribers.entities() {
        let Ok(mut generator) = furniture.get_mut(entity) else {
            logger::log_warning(&format!("ValidationSubscribers: stale subscriber {:?}", entity));
            continue;
        };
        generator.regenerate_links(&bookkeeper, mesh.provider_mut(), &mut controller, &config.nav);
    }
}

/// System: recovery links для агентов с partial путём
pub fn resolve_recovery_links(
    mut requests: EventReader<RecoveryLinkRequest>,
    config: Res<SimConfig>,
    generator: Res<NavMeshGenerator>,
    mut mesh: ResMut<NavMeshHandle>,
    mut controller: ResMut<NavMeshLinkController>,
    mut resolved: EventWriter<RecoveryLinkResolved>,
) {
    for request in requests.read() {
        let link = match generator.create_nav_mesh_link(
            request.from,
            request.to,
            request.mask,
            mesh.provider_mut(),
            &mut controller,
            &config.nav,
        ) {
            Ok(link) => link,
            Err(err) => {
                logger::log_warning(&format!(
                    "⚠️ Recovery link for {:?} failed: {}",
                    request.entity, err
                ));
                None
            }
        };
        resolved.write(RecoveryLinkResolved {
            entity: request.entity,
            generation: request.generation,
            link,
        });
    }
}
