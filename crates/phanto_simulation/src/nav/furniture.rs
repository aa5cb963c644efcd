//! FurnitureNavMeshGenerator — navmesh верхней поверхности одной мебели
//!
//! Volume берётся из volume anchor'а мебели, высота обрезается до
//! `furniture_height_clip` (75%), чтобы не залезать в floor navmesh.
//! Ориентация по конвенции "forward is actual up".
//!
//! После build'а — ровно один hop link: ray от центра верхней грани к краю,
//! шаг наружу, sphere cast вниз до пола, link край → пол.

use crate::config::NavConfig;
use crate::error::NavError;
use crate::logger;
use crate::nav::backend::{NavMeshProvider, NavVolume, SurfaceBuildRequest};
use crate::nav::bookkeeper::NavMeshBookKeeper;
use crate::nav::links::{generate_links, NavMeshLinkController};
use crate::nav::physics::{layers, SpatialQuery};
use crate::nav::room::{AnchorId, SceneAnchor, SceneRoom};
use crate::nav::triangle::NavTriangle;
use crate::nav::{LinkId, NavArea, OwnerId};
use bevy::prelude::*;
use std::collections::BTreeMap;
use std::f32::consts::FRAC_PI_2;

/// Насколько выше верхней грани пускаем лучи
const PROBE_LIFT: f32 = 0.05;
/// Верх volume чуть выше поверхности, чтобы она была строго внутри
const TOP_LIFT: f32 = 0.01;

/// Component: генератор navmesh мебели (entity на каждую мебель)
#[derive(Component, Debug, Clone)]
pub struct FurnitureNavMeshGenerator {
    pub anchor: AnchorId,
    pub owner: OwnerId,
    pub volume: NavVolume,
    pub hop_link: Option<LinkId>,
    pub internal_links: Vec<LinkId>,
}

impl FurnitureNavMeshGenerator {
    /// `None` если у anchor'а нет volume
    pub fn from_anchor(anchor: &SceneAnchor, config: &NavConfig) -> Option<Self> {
        Some(Self {
            anchor: anchor.id,
            owner: OwnerId::furniture(anchor.id),
            volume: Self::compute_volume(anchor, config)?,
            hop_link: None,
            internal_links: Vec::new(),
        })
    }

    /// Volume (w, 0.75h, d): верх на верхней грани, уходит вниз
    pub fn compute_volume(anchor: &SceneAnchor, config: &NavConfig) -> Option<NavVolume> {
        let size = anchor.volume?;
        let height = size.z * config.furniture_height_clip;
        let up = anchor.up();
        // Локальная Y volume'а = локальная Z anchor'а (вверх)
        let rotation = anchor.transform.rotation * Quat::from_rotation_x(FRAC_PI_2);
        Some(NavVolume {
            center: anchor.top_center() + up * (TOP_LIFT - height * 0.5),
            half_extents: Vec3::new(size.x * 0.5, height * 0.5, size.y * 0.5),
            rotation,
        })
    }

    /// Build surface + hop link. Возвращает новые треугольники.
    #[allow(clippy::too_many_arguments)]
    pub fn initialize(
        &mut self,
        room: &SceneRoom,
        bookkeeper: &mut NavMeshBookKeeper,
        mesh: &mut dyn NavMeshProvider,
        controller: &mut NavMeshLinkController,
        physics: &dyn SpatialQuery,
        config: &NavConfig,
    ) -> Vec<NavTriangle> {
        let request = SurfaceBuildRequest {
            volume: self.volume,
            area: NavArea::FURNITURE,
            sources: room.nav_sources(),
        };
        let triangles = bookkeeper.generate_nav_mesh_triangles(self.owner, &request, mesh);

        let Some(anchor) = room.anchor(self.anchor) else {
            logger::log_warning(&format!("FurnitureNavMesh: anchor {:?} left the room", self.anchor));
            return triangles;
        };

        if let Some(old) = self.hop_link.take() {
            // Rebuild: старый hop link больше не на краю
            release_link(self.owner, controller, old, mesh);
        }
        match self.create_hop_link(anchor, mesh, controller, physics, config) {
            Ok(id) => self.hop_link = Some(id),
            Err(err) => logger::log_warning(&format!(
                "⚠️ FurnitureNavMesh {:?}: no hop link ({})",
                self.owner, err
            )),
        }

        triangles
    }

    /// Горизонтальные направления от центра верха к краям (+ расстояние до края)
    fn edge_directions(&self) -> [(Vec3, f32); 4] {
        let forward = (self.volume.rotation * Vec3::Z).with_y(0.0).normalize_or_zero();
        let right = (self.volume.rotation * Vec3::X).with_y(0.0).normalize_or_zero();
        let half = self.volume.half_extents;
        [
            (forward, half.z),
            (-forward, half.z),
            (right, half.x),
            (-right, half.x),
        ]
    }

    /// Raycast вперёд к краю, шаг наружу, sphere cast вниз, link край → пол
    pub fn create_hop_link(
        &self,
        anchor: &SceneAnchor,
        mesh: &mut dyn NavMeshProvider,
        controller: &mut NavMeshLinkController,
        physics: &dyn SpatialQuery,
        config: &NavConfig,
    ) -> Result<LinkId, NavError> {
        let top = anchor.top_center();
        let probe_origin = top + Vec3::Y * PROBE_LIFT;

        for (direction, extent) in self.edge_directions() {
            if direction == Vec3::ZERO {
                continue;
            }
            let reach = extent + config.hop_link_step_out;
            // Стена/другая мебель за краем — пробуем следующее направление
            if physics.raycast(probe_origin, direction, reach, layers::SCENE_MESH).is_some() {
                continue;
            }

            let drop_origin = probe_origin + direction * reach;
            let Some(landing) = physics.sphere_cast(
                drop_origin,
                config.hop_link_sphere_radius,
                Vec3::NEG_Y,
                top.y + PROBE_LIFT + 10.0,
                layers::SCENE_MESH,
            ) else {
                continue;
            };

            let edge = top + direction * extent;
            let Some(edge_on_mesh) =
                mesh.nearest_point(edge, config.sample_max_distance, NavArea::FURNITURE.mask())
            else {
                continue;
            };
            let Some(floor_on_mesh) =
                mesh.nearest_point(landing.point, config.sample_max_distance, NavArea::WALKABLE.mask())
            else {
                continue;
            };

            let id = controller.create_link(
                self.owner,
                edge_on_mesh,
                floor_on_mesh,
                NavArea::JUMP,
                config.link_width,
                mesh,
            );
            logger::log(&format!(
                "🪑 FurnitureNavMesh {:?}: hop link {:?} {:?} → {:?}",
                self.owner, id, edge_on_mesh, floor_on_mesh
            ));
            return Ok(id);
        }

        Err(NavError::OffMesh(top))
    }

    /// Пересоздать внутренние links по актуальным open флагам
    pub fn regenerate_links(
        &mut self,
        bookkeeper: &NavMeshBookKeeper,
        mesh: &mut dyn NavMeshProvider,
        controller: &mut NavMeshLinkController,
        config: &NavConfig,
    ) -> usize {
        for id in std::mem::take(&mut self.internal_links) {
            release_link(self.owner, controller, id, mesh);
        }
        let triangles: Vec<NavTriangle> = bookkeeper
            .owner_triangles(self.owner)
            .into_iter()
            .cloned()
            .collect();
        self.internal_links = generate_links(self.owner, &triangles, mesh, controller, config);
        self.internal_links.len()
    }

    /// Снести surface и все links мебели. `false` если surface не было.
    pub fn teardown(
        &mut self,
        bookkeeper: &mut NavMeshBookKeeper,
        mesh: &mut dyn NavMeshProvider,
        controller: &mut NavMeshLinkController,
    ) -> bool {
        controller.remove_owner_links(self.owner, mesh);
        self.hop_link = None;
        self.internal_links.clear();
        bookkeeper.clear_nav_mesh_triangles(self.owner, mesh)
    }
}

/// Снять link мебели. Id мог устареть (controller сброшен вместе с комнатой) —
/// тогда warning и `false`.
fn release_link(
    owner: OwnerId,
    controller: &mut NavMeshLinkController,
    id: LinkId,
    mesh: &mut dyn NavMeshProvider,
) -> bool {
    match controller.remove_link(id, mesh) {
        Ok(_) => true,
        Err(err) => {
            logger::log_warning(&format!("⚠️ FurnitureNavMesh {:?}: stale link ({})", owner, err));
            false
        }
    }
}

/// Resource: подписчики SceneValidated (entity мебели → owner)
///
/// Подписка явная: генератор подписывается после build'а и ОБЯЗАН
/// отписаться при teardown.
#[derive(Resource, Debug, Default)]
pub struct ValidationSubscribers {
    subscribers: BTreeMap<Entity, OwnerId>,
}

impl ValidationSubscribers {
    pub fn subscribe(&mut self, entity: Entity, owner: OwnerId) {
        self.subscribers.insert(entity, owner);
    }

    pub fn unsubscribe(&mut self, entity: Entity) -> Option<OwnerId> {
        self.subscribers.remove(&entity)
    }

    pub fn entities(&self) -> impl Iterator<Item = Entity> + '_ {
        self.subscribers.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    pub fn clear(&mut self) {
        self.subscribers.clear();
    }
}
