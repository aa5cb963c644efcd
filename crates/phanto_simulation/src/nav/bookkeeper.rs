//! NavMeshBookKeeper — глобальный snapshot триангуляции + owner → delta треугольники
//!
//! ## Модель:
//! - Треугольники живут в арене (`TriangleId` стабилен между rebuild'ами:
//!   треугольник, равный уже известному, получает его id и сохраняет open флаг)
//! - `snapshot` — полная текущая триангуляция, подменяется целиком
//! - owner → треугольники, ВПЕРВЫЕ появившиеся при последнем rebuild'е owner'а
//!
//! Rebuild без новых треугольников записывает owner'у ПУСТОЙ список
//! (неотличимо от "ничего не изменилось").

use crate::config::NavConfig;
use crate::error::NavError;
use crate::logger;
use crate::nav::backend::{NavMeshProvider, SurfaceBuildRequest};
use crate::nav::edges::{quantize, EdgeCounts};
use crate::nav::physics::SpatialQuery;
use crate::nav::triangle::NavTriangle;
use crate::nav::validation::ValidationTask;
use crate::nav::{NavArea, OwnerId, TriangleId};
use bevy::math::{IVec3, Vec3};
use bevy::prelude::Resource;
use rand::Rng;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Кандидаты на reuse id: (ячейка квантования v1, area) → id
///
/// Равные треугольники могут попасть в соседние ячейки (округление на границе),
/// поэтому `take` смотрит 3×3×3 окрестность.
#[derive(Debug, Default)]
struct ReuseIndex {
    cells: HashMap<(IVec3, NavArea), Vec<TriangleId>>,
}

impl ReuseIndex {
    fn insert(&mut self, id: TriangleId, triangle: &NavTriangle) {
        self.cells
            .entry((quantize(triangle.v1), triangle.area_id))
            .or_default()
            .push(id);
    }

    /// Забрать id треугольника, равного `triangle` (каждый id отдаётся один раз)
    fn take(&mut self, triangle: &NavTriangle, arena: &BTreeMap<TriangleId, NavTriangle>) -> Option<TriangleId> {
        let center = quantize(triangle.v1);
        for dx in -1..=1 {
            for dy in -1..=1 {
                for dz in -1..=1 {
                    let key = (center + IVec3::new(dx, dy, dz), triangle.area_id);
                    let Some(ids) = self.cells.get_mut(&key) else {
                        continue;
                    };
                    let found = ids
                        .iter()
                        .position(|id| arena.get(id).is_some_and(|old| old == triangle));
                    if let Some(position) = found {
                        return Some(ids.swap_remove(position));
                    }
                }
            }
        }
        None
    }
}

#[derive(Resource, Debug, Default)]
pub struct NavMeshBookKeeper {
    arena: BTreeMap<TriangleId, NavTriangle>,
    snapshot: Vec<TriangleId>,
    owners: BTreeMap<OwnerId, Vec<TriangleId>>,
    edge_counts: EdgeCounts,
    next_id: u32,
}

impl NavMeshBookKeeper {
    /// Rebuild surface owner'а и вернуть только НОВЫЕ треугольники
    ///
    /// Первый вызов для owner'а возвращает все его треугольники.
    pub fn generate_nav_mesh_triangles(
        &mut self,
        owner: OwnerId,
        request: &SurfaceBuildRequest,
        mesh: &mut dyn NavMeshProvider,
    ) -> Vec<NavTriangle> {
        let built = mesh.build_surface(owner, request);
        let new_ids = self.refresh_snapshot(mesh);

        if new_ids.is_empty() {
            logger::log_warning(&format!(
                "NavMeshBookKeeper: rebuild of {:?} produced no new triangles ({} built), ownership list is empty",
                owner, built
            ));
        } else {
            logger::log(&format!(
                "🧭 NavMeshBookKeeper: {:?} → {} new triangles (snapshot {})",
                owner,
                new_ids.len(),
                self.snapshot.len()
            ));
        }

        let triangles = new_ids
            .iter()
            .filter_map(|id| self.arena.get(id).cloned())
            .collect();
        self.owners.insert(owner, new_ids);
        triangles
    }

    /// Удалить данные owner'а. `false` если owner не был зарегистрирован.
    pub fn clear_nav_mesh_triangles(&mut self, owner: OwnerId, mesh: &mut dyn NavMeshProvider) -> bool {
        let existed = self.owners.remove(&owner).is_some();
        let had_surface = mesh.remove_surface(owner);
        if had_surface {
            self.refresh_snapshot(mesh);
        }
        existed
    }

    /// Пересчитать snapshot из полной триангуляции провайдера
    ///
    /// Возвращает id треугольников, которых не было в предыдущем snapshot'е.
    fn refresh_snapshot(&mut self, mesh: &dyn NavMeshProvider) -> Vec<TriangleId> {
        let mut previous = ReuseIndex::default();
        for id in &self.snapshot {
            if let Some(t) = self.arena.get(id) {
                previous.insert(*id, t);
            }
        }

        let mut snapshot = Vec::new();
        let mut new_ids = Vec::new();
        for raw in mesh.triangulation() {
            let [a, b, c] = raw.vertices;
            let triangle = NavTriangle::new(a, b, c, raw.area);

            let reused = previous.take(&triangle, &self.arena);

            match reused {
                Some(id) => snapshot.push(id),
                None => {
                    self.next_id += 1;
                    let id = TriangleId(self.next_id);
                    self.arena.insert(id, triangle);
                    snapshot.push(id);
                    new_ids.push(id);
                }
            }
        }

        self.snapshot = snapshot;

        // Border — свойство всей триангуляции: два прохода по новому snapshot'у
        self.edge_counts.clear();
        for id in &self.snapshot {
            if let Some(t) = self.arena.get(id) {
                t.increment_edge_counts(&mut self.edge_counts);
            }
        }
        for id in &self.snapshot {
            if let Some(t) = self.arena.get_mut(id) {
                t.determine_edges(&self.edge_counts);
            }
        }

        // GC: выкидываем треугольники, которых больше нет в триангуляции
        let live: BTreeSet<TriangleId> = self.snapshot.iter().copied().collect();
        self.arena.retain(|id, _| live.contains(id));
        for ids in self.owners.values_mut() {
            ids.retain(|id| live.contains(id));
        }

        new_ids
    }

    /// Запустить кооперативную проверку open флагов по всем треугольникам owner'ов
    pub fn validate_scene(&self, ceiling_y: f32) -> ValidationTask {
        let ids: BTreeSet<TriangleId> = self.owners.values().flatten().copied().collect();
        ValidationTask::new(ids.into_iter().collect(), ceiling_y)
    }

    /// Один шаг validation (используется ValidationTask)
    pub(crate) fn verify_triangle(
        &mut self,
        id: TriangleId,
        ceiling_y: f32,
        physics: &dyn SpatialQuery,
        config: &NavConfig,
    ) -> Option<bool> {
        self.arena
            .get_mut(&id)
            .map(|t| t.verify_open(ceiling_y, physics, config))
    }

    /// Треугольник, чей центроид (в горизонтальной плоскости `center`) ближе всего к окружности
    ///
    /// Точки внутри окружности оцениваются как `radius - distance`.
    pub fn try_get_closest_triangle_on_circle<'a>(
        center: Vec3,
        radius: f32,
        triangles: impl IntoIterator<Item = &'a NavTriangle>,
    ) -> Option<&'a NavTriangle> {
        triangles
            .into_iter()
            .map(|t| {
                let projected = Vec3::new(t.centroid.x, center.y, t.centroid.z);
                let distance = projected.distance(center);
                let score = if distance < radius {
                    radius - distance
                } else {
                    distance - radius
                };
                (t, score)
            })
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(t, _)| t)
    }

    pub fn closest_triangle_on_circle<'a>(
        &self,
        center: Vec3,
        radius: f32,
        triangles: impl IntoIterator<Item = &'a NavTriangle>,
    ) -> Result<&'a NavTriangle, NavError> {
        Self::try_get_closest_triangle_on_circle(center, radius, triangles).ok_or(NavError::NoOpenTriangle)
    }

    /// Первая случайная точка (по одной на треугольник, в порядке caller'а), прошедшая predicate
    pub fn find_matching_point<'a, R: Rng + ?Sized>(
        triangles: impl IntoIterator<Item = &'a NavTriangle>,
        rng: &mut R,
        mesh: &dyn NavMeshProvider,
        max_snap_distance: f32,
        mut predicate: impl FnMut(Vec3) -> bool,
    ) -> Result<Vec3, NavError> {
        let mut attempts = 0;
        for triangle in triangles {
            attempts += 1;
            let point = triangle.random_point(rng, mesh, max_snap_distance);
            if predicate(point) {
                return Ok(point);
            }
        }
        Err(NavError::NoMatchingPoint { attempts })
    }

    /// Текущий snapshot (полная триангуляция)
    pub fn triangles(&self) -> impl Iterator<Item = &NavTriangle> {
        self.snapshot.iter().filter_map(|id| self.arena.get(id))
    }

    pub fn snapshot_len(&self) -> usize {
        self.snapshot.len()
    }

    pub fn triangle(&self, id: TriangleId) -> Option<&NavTriangle> {
        self.arena.get(&id)
    }

    pub fn owner_triangles(&self, owner: OwnerId) -> Vec<&NavTriangle> {
        self.owners
            .get(&owner)
            .map(|ids| ids.iter().filter_map(|id| self.arena.get(id)).collect())
            .unwrap_or_default()
    }

    /// Открытые треугольники owner'а; если ни одного — все (с warning)
    pub fn open_triangles(&self, owner: OwnerId) -> Vec<&NavTriangle> {
        let all = self.owner_triangles(owner);
        let open: Vec<&NavTriangle> = all.iter().copied().filter(|t| t.is_open).collect();
        if open.is_empty() && !all.is_empty() {
            logger::log_warning(&format!(
                "⚠️ {:?}: {} — falling back to {} unfiltered triangles",
                owner,
                NavError::NoOpenTriangle,
                all.len()
            ));
            return all;
        }
        open
    }

    pub fn owners(&self) -> impl Iterator<Item = OwnerId> + '_ {
        self.owners.keys().copied()
    }

    pub fn has_owner(&self, owner: OwnerId) -> bool {
        self.owners.contains_key(&owner)
    }

    /// Полный сброс (смена комнаты). Surfaces провайдера удаляет caller.
    pub fn reset(&mut self) {
        self.arena.clear();
        self.snapshot.clear();
        self.owners.clear();
        self.edge_counts.clear();
    }
}

#[cfg(test)]
#[path = "bookkeeper_tests.rs"]
mod bookkeeper_tests;
